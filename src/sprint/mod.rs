//! Sprint orchestration.
//!
//! Dispatches tasks in batches sized to the concurrency ceiling, joining
//! each batch before the next dispatch decision. Batch boundaries are the
//! only places checkpoints run and stop conditions are observed, which
//! keeps evaluation totally ordered without any cross-task coordination.
//!
//! Phase machine: Idle -> Running -> (CheckpointPending <-> Running)* ->
//! Draining -> Done. Draining means "no new batches"; in-flight tasks
//! always run to their own retry-bounded completion.

pub mod summary;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::admission::AdmissionController;
use crate::evaluate::Evaluator;
use crate::executor::TaskExecutor;
use crate::select::TaskSelector;
use crate::task::{SprintKind, SprintStats, StatsBook, TaskStatus};

pub use summary::SprintSummary;

/// Where a sprint currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SprintPhase {
    Idle,
    Running,
    CheckpointPending,
    Draining,
    Done,
}

/// Static shape of one sprint.
#[derive(Debug, Clone)]
pub struct SprintPlan {
    pub total_tasks: u64,
    pub kind: SprintKind,
    /// Tasks between checkpoints; 0 derives total_tasks / 5
    pub checkpoint_interval: u64,
    /// Summary destination; None skips persistence
    pub summary_path: Option<PathBuf>,
}

impl SprintPlan {
    pub fn new(total_tasks: u64, kind: SprintKind) -> Self {
        Self {
            total_tasks,
            kind,
            checkpoint_interval: 0,
            summary_path: None,
        }
    }

    pub fn with_checkpoint_interval(mut self, interval: u64) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    pub fn with_summary_path(mut self, path: PathBuf) -> Self {
        self.summary_path = Some(path);
        self
    }

    fn effective_checkpoint_interval(&self) -> u64 {
        if self.checkpoint_interval > 0 {
            self.checkpoint_interval
        } else {
            (self.total_tasks / 5).max(1)
        }
    }
}

/// Runs one sprint end to end.
pub struct SprintOrchestrator {
    executor: Arc<TaskExecutor>,
    selector: Arc<TaskSelector>,
    admission: Arc<AdmissionController>,
    evaluator: Arc<dyn Evaluator>,
    stats: Arc<StatsBook>,
    cancel: CancellationToken,
    plan: SprintPlan,
    phase: Mutex<SprintPhase>,
    ratings: Mutex<Vec<u8>>,
}

impl SprintOrchestrator {
    pub fn new(
        executor: Arc<TaskExecutor>,
        selector: Arc<TaskSelector>,
        admission: Arc<AdmissionController>,
        evaluator: Arc<dyn Evaluator>,
        stats: Arc<StatsBook>,
        cancel: CancellationToken,
        plan: SprintPlan,
    ) -> Self {
        Self {
            executor,
            selector,
            admission,
            evaluator,
            stats,
            cancel,
            plan,
            phase: Mutex::new(SprintPhase::Idle),
            ratings: Mutex::new(Vec::new()),
        }
    }

    /// Token that stops new admissions and new batch dispatch when fired.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn phase(&self) -> SprintPhase {
        *self.phase.lock().expect("phase lock poisoned")
    }

    /// Checkpoint ratings produced so far.
    pub fn ratings(&self) -> Vec<u8> {
        self.ratings.lock().expect("ratings lock poisoned").clone()
    }

    fn set_phase(&self, phase: SprintPhase) {
        *self.phase.lock().expect("phase lock poisoned") = phase;
    }

    /// Run the sprint to completion (or early budget/cancel drain) and
    /// return the final stats. Never errors: by this point everything
    /// task-level is outcome-shaped.
    pub async fn run_sprint(&self) -> SprintStats {
        let started = Instant::now();
        let ceiling = self.admission.ceiling().max(1) as u64;
        let checkpoint_interval = self.plan.effective_checkpoint_interval();

        log::info!(
            "sprint start: {} tasks, kind {}, ceiling {}, checkpoint every {}",
            self.plan.total_tasks,
            self.plan.kind,
            ceiling,
            checkpoint_interval
        );

        self.set_phase(SprintPhase::Running);

        let mut dispatched: u64 = 0;
        let mut since_checkpoint: u64 = 0;

        while dispatched < self.plan.total_tasks {
            if self.cancel.is_cancelled() {
                log::info!("cancellation requested, stopping dispatch");
                break;
            }
            if self.admission.budget_exhausted() {
                log::info!("budget latch tripped, stopping dispatch");
                break;
            }

            let batch = ceiling.min(self.plan.total_tasks - dispatched);
            let draws: Vec<_> = (0..batch).map(|_| self.selector.next()).collect();
            let outcomes = join_all(draws.into_iter().map(|draw| {
                let executor = Arc::clone(&self.executor);
                async move { executor.run(draw).await }
            }))
            .await;

            dispatched += batch;
            since_checkpoint += batch;

            let paused = outcomes
                .iter()
                .filter(|o| o.status == TaskStatus::Paused)
                .count();
            log::debug!(
                "batch joined: {} tasks ({} paused), {}/{} dispatched",
                batch,
                paused,
                dispatched,
                self.plan.total_tasks
            );

            if since_checkpoint >= checkpoint_interval && dispatched < self.plan.total_tasks {
                self.set_phase(SprintPhase::CheckpointPending);
                self.run_checkpoint().await;
                since_checkpoint = 0;
                self.set_phase(SprintPhase::Running);
            }
        }

        // All batches have joined; draining is the final accounting step.
        self.set_phase(SprintPhase::Draining);

        let stats = self.stats.stats();
        let duration = started.elapsed();
        self.persist_summary(&stats, duration);
        self.set_phase(SprintPhase::Done);

        log::info!(
            "sprint done: {} completed, {} failed, {} paused, {} tokens, ${:.2} in {:.1}s",
            stats.completed,
            stats.failed,
            stats.paused,
            stats.tokens_used,
            stats.cost_accumulated,
            duration.as_secs_f64()
        );

        stats
    }

    async fn run_checkpoint(&self) {
        let (stats, recent) = self.stats.snapshot();
        let evaluation = self.evaluator.evaluate(&stats, &recent).await;

        log::info!(
            "checkpoint: rating {}/10, directive {}",
            evaluation.rating,
            evaluation.directive
        );

        self.ratings
            .lock()
            .expect("ratings lock poisoned")
            .push(evaluation.rating);
        self.selector.reweight(&evaluation.directive);
    }

    fn persist_summary(&self, stats: &SprintStats, duration: std::time::Duration) {
        let Some(path) = &self.plan.summary_path else {
            return;
        };

        let summary = SprintSummary::new(self.plan.kind, stats, duration, self.ratings());
        match summary.write_to(path) {
            Ok(()) => log::info!("sprint summary written to {}", path.display()),
            Err(err) => log::warn!("failed to write sprint summary: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::BudgetCeiling;
    use crate::evaluate::Evaluation;
    use crate::executor::{GenerationSettings, RetryPolicy, TaskExecutor};
    use crate::monitor::{HealthProbe, HostHealth};
    use crate::provider::{CompletionResponse, ScriptedProvider, TokenUsage};
    use crate::select::ReweightDirective;
    use crate::sink::NullSink;
    use crate::task::{Catalog, OutputKind, TaskCategory};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    struct NormalProbe;

    impl HealthProbe for NormalProbe {
        fn health(&self) -> HostHealth {
            HostHealth::Normal
        }
    }

    /// Evaluator that counts calls and always answers the same thing.
    struct FixedEvaluator {
        calls: AtomicU64,
        evaluation: Evaluation,
    }

    impl FixedEvaluator {
        fn new(evaluation: Evaluation) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU64::new(0),
                evaluation,
            })
        }

        fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Evaluator for FixedEvaluator {
        async fn evaluate(
            &self,
            _stats: &SprintStats,
            _recent: &[crate::task::TaskOutcome],
        ) -> Evaluation {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.evaluation.clone()
        }
    }

    fn test_catalog() -> Arc<Catalog> {
        Arc::new(
            Catalog::new(vec![
                TaskCategory {
                    key: "alpha".to_string(),
                    system_prompt: "system".to_string(),
                    user_prompt_template: "alpha #{seq}".to_string(),
                    output_kind: OutputKind::Text,
                    weight_seed: 2.0,
                    estimated_value: 0.2,
                },
                TaskCategory {
                    key: "beta".to_string(),
                    system_prompt: "system".to_string(),
                    user_prompt_template: "beta #{seq}".to_string(),
                    output_kind: OutputKind::Text,
                    weight_seed: 1.0,
                    estimated_value: 0.1,
                },
            ])
            .unwrap(),
        )
    }

    struct World {
        orchestrator: SprintOrchestrator,
        admission: Arc<AdmissionController>,
        selector: Arc<TaskSelector>,
        evaluator: Arc<FixedEvaluator>,
    }

    /// Wire a full sprint world around a scripted provider. Each success
    /// costs just under $0.10 on default pricing (30_000 in + 666 out).
    fn make_world(
        total_tasks: u64,
        ceiling: usize,
        budget: BudgetCeiling,
        plan_tweak: impl FnOnce(SprintPlan) -> SprintPlan,
    ) -> World {
        let responses = (0..total_tasks as usize)
            .map(|_| {
                Ok(CompletionResponse {
                    text: "artifact".to_string(),
                    usage: TokenUsage::new(30_000, 666),
                })
            })
            .collect();
        let provider = Arc::new(ScriptedProvider::new(responses));

        let stats = Arc::new(StatsBook::new());
        let admission = Arc::new(AdmissionController::new(
            ceiling,
            budget,
            Arc::clone(&stats),
            Arc::new(NormalProbe),
        ));
        let selector = Arc::new(TaskSelector::new(test_catalog(), 42));
        let executor = Arc::new(TaskExecutor::new(
            provider,
            Arc::clone(&admission),
            Arc::clone(&stats),
            Arc::new(NullSink),
            RetryPolicy {
                backoff_base: Duration::from_millis(1),
                retry_delay: Duration::from_millis(1),
                admission_retries: 5,
                admission_poll: Duration::from_millis(1),
                ..RetryPolicy::default()
            },
            GenerationSettings::default(),
        ));
        let evaluator = FixedEvaluator::new(Evaluation {
            rating: 6,
            directive: ReweightDirective::Favor {
                category: "beta".to_string(),
            },
        });

        let plan = plan_tweak(SprintPlan::new(total_tasks, SprintKind::Content));
        let orchestrator = SprintOrchestrator::new(
            executor,
            Arc::clone(&selector),
            Arc::clone(&admission),
            Arc::clone(&evaluator) as Arc<dyn Evaluator>,
            stats,
            CancellationToken::new(),
            plan,
        );

        World {
            orchestrator,
            admission,
            selector,
            evaluator,
        }
    }

    #[test]
    fn test_effective_checkpoint_interval() {
        let plan = SprintPlan::new(50, SprintKind::Content);
        assert_eq!(plan.effective_checkpoint_interval(), 10);

        let plan = SprintPlan::new(3, SprintKind::Content);
        assert_eq!(plan.effective_checkpoint_interval(), 1);

        let plan = SprintPlan::new(50, SprintKind::Content).with_checkpoint_interval(7);
        assert_eq!(plan.effective_checkpoint_interval(), 7);
    }

    #[tokio::test]
    async fn test_full_sprint_produces_exactly_n_outcomes() {
        let world = make_world(12, 3, BudgetCeiling::new(100.0, 0.95), |p| p);
        assert_eq!(world.orchestrator.phase(), SprintPhase::Idle);

        let stats = world.orchestrator.run_sprint().await;

        assert_eq!(stats.attempted, 12);
        assert_eq!(stats.completed + stats.failed + stats.paused, 12);
        assert_eq!(world.orchestrator.phase(), SprintPhase::Done);
    }

    #[tokio::test]
    async fn test_budget_latch_stops_dispatch_early() {
        // Each success costs ~$0.10 (30_000 * $3/M + 666 * $15/M = $0.09999);
        // cutoff $0.45 trips once five outcomes have landed.
        let world = make_world(50, 1, BudgetCeiling::new(0.5, 0.9), |p| p);

        let stats = world.orchestrator.run_sprint().await;

        // Ceiling 1 means no batch overshoot at all
        assert_eq!(stats.attempted, 5);
        assert!(world.admission.budget_exhausted());
        assert_eq!(world.orchestrator.phase(), SprintPhase::Done);
    }

    #[tokio::test]
    async fn test_checkpoints_run_and_reweight() {
        let world = make_world(6, 1, BudgetCeiling::new(100.0, 0.95), |p| {
            p.with_checkpoint_interval(2)
        });

        world.orchestrator.run_sprint().await;

        // Checkpoints after tasks 2 and 4; none after the final batch
        assert_eq!(world.evaluator.calls(), 2);
        assert_eq!(world.orchestrator.ratings(), vec![6, 6]);

        // The directive favored beta: its seed 1.0 doubled to 2.0
        assert_eq!(world.selector.weights().get("beta"), Some(2.0));
    }

    #[tokio::test]
    async fn test_cancel_before_start_dispatches_nothing() {
        let world = make_world(10, 2, BudgetCeiling::new(100.0, 0.95), |p| p);
        world.orchestrator.cancel_token().cancel();

        let stats = world.orchestrator.run_sprint().await;

        assert_eq!(stats.attempted, 0);
        assert_eq!(world.orchestrator.phase(), SprintPhase::Done);
    }

    #[tokio::test]
    async fn test_summary_written_at_done() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sprint.json");
        let summary_path = path.clone();
        let world = make_world(4, 2, BudgetCeiling::new(100.0, 0.95), move |p| {
            p.with_summary_path(summary_path)
        });

        world.orchestrator.run_sprint().await;

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed["attempted"], 4);
        assert_eq!(parsed["kind"], "content");
    }
}
