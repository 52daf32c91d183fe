//! Task execution - drives one drawn task to its terminal outcome.
//!
//! No error ever unwinds past run(): provider failures become Failed
//! outcomes, admission starvation becomes Paused. The admission permit is
//! held as an RAII guard, so it releases on every exit path without any
//! per-path bookkeeping.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::admission::{AdmissionController, Denial, Permit};
use crate::provider::{CompletionProvider, CompletionRequest, CompletionResponse, ProviderError};
use crate::select::TaskDraw;
use crate::sink::{ArtifactRecord, ArtifactSink};
use crate::task::{OutputKind, StatsBook, TaskOutcome, TaskStatus};

/// Retry and backoff knobs.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total provider calls allowed on the rate-limit path
    pub max_attempts: u32,
    /// Backoff unit: a rate-limited attempt waits base * 2^attempt plus
    /// jitter of up to one unit
    pub backoff_base: Duration,
    /// Upper bound on any single backoff sleep
    pub backoff_cap: Duration,
    /// Fixed delay before the single retry of a non-rate-limit failure
    pub retry_delay: Duration,
    /// How many times to re-poll admission before giving up as Paused
    pub admission_retries: u32,
    /// Base sleep between admission polls
    pub admission_poll: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(64),
            retry_delay: Duration::from_secs(1),
            admission_retries: 40,
            admission_poll: Duration::from_millis(250),
        }
    }
}

/// Per-call generation parameters shared by every task in a sprint.
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    /// Model id; empty means the provider's default
    pub model_id: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model_id: String::new(),
            max_tokens: 1024,
            temperature: 0.7,
        }
    }
}

/// Executes one task at a time; shared across a batch via Arc.
pub struct TaskExecutor {
    provider: Arc<dyn CompletionProvider>,
    admission: Arc<AdmissionController>,
    stats: Arc<StatsBook>,
    sink: Arc<dyn ArtifactSink>,
    policy: RetryPolicy,
    settings: GenerationSettings,
}

impl TaskExecutor {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        admission: Arc<AdmissionController>,
        stats: Arc<StatsBook>,
        sink: Arc<dyn ArtifactSink>,
        policy: RetryPolicy,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            provider,
            admission,
            stats,
            sink,
            policy,
            settings,
        }
    }

    /// Drive one task to a terminal outcome and record it.
    pub async fn run(&self, draw: TaskDraw) -> TaskOutcome {
        let started = Instant::now();
        let task_id = draw.instance.sequence_id;
        let category_key = draw.instance.category_key.clone();

        let _permit: Permit = match self.admit().await {
            Ok(permit) => permit,
            Err(denial) => {
                log::debug!("task {} paused before start: {:?}", task_id, denial);
                let outcome = TaskOutcome::paused(task_id, category_key, started.elapsed());
                self.stats.record(&outcome);
                return outcome;
            }
        };

        let request = CompletionRequest::new(
            draw.category.system_prompt.clone(),
            draw.category.render_user_prompt(task_id),
            self.settings.model_id.clone(),
        )
        .with_max_tokens(self.settings.max_tokens)
        .with_temperature(self.settings.temperature);

        let outcome = match self.call_with_retry(&request, task_id).await {
            Ok((response, retries)) => {
                self.emit_artifact(task_id, &category_key, &response, draw.category.output_kind);
                let model = if self.settings.model_id.is_empty() {
                    self.provider.model()
                } else {
                    self.settings.model_id.as_str()
                };
                TaskOutcome::new(
                    task_id,
                    category_key,
                    TaskStatus::Success,
                    response.usage.total(),
                    response.usage.cost_usd(model),
                    started.elapsed(),
                    retries,
                )
            }
            Err((retries, err)) => {
                log::warn!("task {} failed after {} retries: {}", task_id, retries, err);
                TaskOutcome::new(
                    task_id,
                    category_key,
                    TaskStatus::Failed,
                    0,
                    0.0,
                    started.elapsed(),
                    retries,
                )
            }
        };

        self.stats.record(&outcome);
        outcome
        // _permit drops here: released on success and failure alike
    }

    /// Bounded admission polling.
    ///
    /// Permanent denials (budget, cancel) short-circuit; the transient
    /// ones are re-polled with a jittered sleep so waiting tasks do not
    /// stampede a freed slot.
    async fn admit(&self) -> Result<Permit, Denial> {
        let mut last = Denial::ConcurrencyFull;
        for _ in 0..=self.policy.admission_retries {
            match self.admission.acquire() {
                Ok(permit) => return Ok(permit),
                Err(denial) if !denial.is_transient() => return Err(denial),
                Err(denial) => {
                    last = denial;
                    tokio::time::sleep(jittered(self.policy.admission_poll)).await;
                }
            }
        }
        Err(last)
    }

    /// Call the provider, retrying per the outcome table: rate limits get
    /// exponential backoff up to max_attempts, anything else exactly one
    /// more try. Returns the response plus how many calls were repeated.
    async fn call_with_retry(
        &self,
        request: &CompletionRequest,
        task_id: u64,
    ) -> Result<(CompletionResponse, u32), (u32, ProviderError)> {
        let mut attempt: u32 = 0;
        loop {
            match self.provider.complete(request.clone()).await {
                Ok(response) => return Ok((response, attempt)),
                Err(err) => {
                    attempt += 1;
                    let may_retry = if err.is_rate_limit() {
                        attempt < self.policy.max_attempts
                    } else {
                        attempt < 2
                    };

                    if !may_retry {
                        return Err((attempt - 1, err));
                    }

                    if err.is_rate_limit() {
                        let delay = self.rate_limit_backoff(attempt);
                        tracing::warn!(
                            task_id,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "Rate limited, backing off"
                        );
                        tokio::time::sleep(delay).await;
                    } else {
                        log::warn!("task {} provider call failed ({}), retrying once", task_id, err);
                        tokio::time::sleep(self.policy.retry_delay).await;
                    }
                }
            }
        }
    }

    /// base * 2^attempt plus up to one base unit of jitter, capped.
    fn rate_limit_backoff(&self, attempt: u32) -> Duration {
        let exp = self.policy.backoff_base * 2u32.pow(attempt.min(6));
        let jitter_ms = self.policy.backoff_base.as_millis().max(1) as u64;
        let jitter = Duration::from_millis(rand::rng().random_range(0..jitter_ms));
        (exp + jitter).min(self.policy.backoff_cap)
    }

    /// Best-effort sink write; a sink failure is a data-plane problem, not
    /// a task failure - the provider did answer.
    fn emit_artifact(
        &self,
        task_id: u64,
        category_key: &str,
        response: &CompletionResponse,
        output_kind: OutputKind,
    ) {
        let payload = parse_payload(&response.text, output_kind);
        let record = ArtifactRecord::new(task_id, category_key, payload);
        if let Err(err) = self.sink.emit(&record) {
            log::warn!("artifact sink write failed for task {}: {}", task_id, err);
        }
    }
}

/// Best-effort structuring of the payload. Unparsable JSON stays as the
/// raw text.
fn parse_payload(text: &str, kind: OutputKind) -> serde_json::Value {
    match kind {
        OutputKind::Json => match serde_json::from_str(text.trim()) {
            Ok(value) => value,
            Err(_) => {
                log::debug!("payload did not parse as JSON, keeping raw text");
                serde_json::Value::String(text.to_string())
            }
        },
        OutputKind::Markdown | OutputKind::Text => serde_json::Value::String(text.to_string()),
    }
}

fn jittered(base: Duration) -> Duration {
    let base_ms = base.as_millis().max(1) as u64;
    base + Duration::from_millis(rand::rng().random_range(0..base_ms))
}
