//! Sprint self-evaluation.
//!
//! Two evaluators implement the same trait: one delegates the judgment to
//! a completion provider and one applies a fixed rule. The delegated
//! evaluator carries the rule-based one as its wired-in fallback, so the
//! scheduler stays fully operable with zero access to any intelligence
//! endpoint.

use std::sync::Arc;

use async_trait::async_trait;

use crate::provider::{CompletionProvider, CompletionRequest};
use crate::select::ReweightDirective;
use crate::task::{SprintStats, TaskOutcome};

/// How many recent outcomes the delegated prompt includes.
const PROMPT_OUTCOME_WINDOW: usize = 20;

/// A checkpoint verdict: how the sprint is going and what to do about it.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// 1 (going badly) to 10 (going great)
    pub rating: u8,
    pub directive: ReweightDirective,
}

/// Judges a stats/recent-outcomes snapshot.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, stats: &SprintStats, recent: &[TaskOutcome]) -> Evaluation;
}

/// Deterministic bracket rule over the cumulative success rate.
#[derive(Debug, Default)]
pub struct RuleBasedEvaluator;

impl RuleBasedEvaluator {
    pub fn new() -> Self {
        Self
    }

    fn assess(&self, stats: &SprintStats) -> Evaluation {
        let rate = stats.success_rate();
        if rate >= 0.9 {
            Evaluation {
                rating: 8,
                directive: ReweightDirective::Balanced,
            }
        } else if rate >= 0.7 {
            let directive = match best_category(stats) {
                Some(category) => ReweightDirective::Favor { category },
                None => ReweightDirective::Balanced,
            };
            Evaluation {
                rating: 6,
                directive,
            }
        } else {
            let directive = match worst_category(stats) {
                Some(category) => ReweightDirective::Suppress { category },
                None => ReweightDirective::Balanced,
            };
            Evaluation {
                rating: 4,
                directive,
            }
        }
    }
}

#[async_trait]
impl Evaluator for RuleBasedEvaluator {
    async fn evaluate(&self, stats: &SprintStats, _recent: &[TaskOutcome]) -> Evaluation {
        self.assess(stats)
    }
}

/// Category with the most completions; ties broken by key order so the
/// rule stays deterministic.
fn best_category(stats: &SprintStats) -> Option<String> {
    let mut entries: Vec<(&String, u64)> = stats
        .per_category_counts
        .iter()
        .filter(|(_, counts)| counts.completed > 0)
        .map(|(key, counts)| (key, counts.completed))
        .collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    entries.first().map(|(key, _)| (*key).clone())
}

/// Category with the most failures; ties broken by key order.
fn worst_category(stats: &SprintStats) -> Option<String> {
    let mut entries: Vec<(&String, u64)> = stats
        .per_category_counts
        .iter()
        .filter(|(_, counts)| counts.failed > 0)
        .map(|(key, counts)| (key, counts.failed))
        .collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    entries.first().map(|(key, _)| (*key).clone())
}

/// Delegates the verdict to a completion provider, parsing a two-line
/// `RATING:` / `DIRECTIVE:` reply. Any failure - provider error, empty or
/// unparsable reply - falls through to the rule.
pub struct DelegatedEvaluator {
    provider: Arc<dyn CompletionProvider>,
    model_id: String,
    fallback: RuleBasedEvaluator,
}

impl DelegatedEvaluator {
    pub fn new(provider: Arc<dyn CompletionProvider>, model_id: impl Into<String>) -> Self {
        Self {
            provider,
            model_id: model_id.into(),
            fallback: RuleBasedEvaluator::new(),
        }
    }

    /// Build the judgment prompt from a snapshot.
    fn build_prompt(&self, stats: &SprintStats, recent: &[TaskOutcome]) -> String {
        let mut prompt = String::new();

        prompt.push_str("You are reviewing an automated generation sprint in progress.\n\n");
        prompt.push_str("## Cumulative Stats\n\n");
        prompt.push_str(&format!(
            "attempted: {}, completed: {}, failed: {}, paused: {}, tokens: {}, cost: ${:.2}\n\n",
            stats.attempted,
            stats.completed,
            stats.failed,
            stats.paused,
            stats.tokens_used,
            stats.cost_accumulated
        ));

        prompt.push_str("## Recent Outcomes (newest last)\n\n");
        let window = recent.len().saturating_sub(PROMPT_OUTCOME_WINDOW);
        for outcome in &recent[window..] {
            prompt.push_str(&format!(
                "- task {} [{}]: {:?}, {} retries\n",
                outcome.task_id, outcome.category_key, outcome.status, outcome.retries
            ));
        }

        prompt.push_str("\n## Your Response\n\n");
        prompt.push_str("Respond with EXACTLY two lines:\n");
        prompt.push_str("RATING: <integer 1-10>\n");
        prompt.push_str("DIRECTIVE: balanced | favor <category_key> | suppress <category_key>\n");

        prompt
    }
}

#[async_trait]
impl Evaluator for DelegatedEvaluator {
    async fn evaluate(&self, stats: &SprintStats, recent: &[TaskOutcome]) -> Evaluation {
        let request = CompletionRequest::new(
            "You are a precise scheduling reviewer. Reply only in the requested format.",
            self.build_prompt(stats, recent),
            self.model_id.clone(),
        )
        .with_max_tokens(100)
        .with_temperature(0.0);

        match self.provider.complete(request).await {
            Ok(response) => match parse_evaluation(&response.text) {
                Some(evaluation) => evaluation,
                None => {
                    log::warn!("evaluator reply was unparsable, applying rule-based fallback");
                    self.fallback.evaluate(stats, recent).await
                }
            },
            Err(err) => {
                log::warn!("delegated evaluation failed ({}), applying rule-based fallback", err);
                self.fallback.evaluate(stats, recent).await
            }
        }
    }
}

/// Parse a `RATING:` / `DIRECTIVE:` reply. Ratings clamp into 1..=10.
fn parse_evaluation(text: &str) -> Option<Evaluation> {
    let mut rating = None;
    let mut directive = None;

    for line in text.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("RATING:") {
            rating = rest.trim().parse::<i64>().ok().map(|r| r.clamp(1, 10) as u8);
        } else if let Some(rest) = line.strip_prefix("DIRECTIVE:") {
            directive = parse_directive(rest.trim());
        }
    }

    Some(Evaluation {
        rating: rating?,
        directive: directive?,
    })
}

fn parse_directive(text: &str) -> Option<ReweightDirective> {
    let lower = text.to_lowercase();
    if lower == "balanced" {
        return Some(ReweightDirective::Balanced);
    }
    if let Some(category) = lower.strip_prefix("favor ") {
        let category = category.trim().to_string();
        if !category.is_empty() {
            return Some(ReweightDirective::Favor { category });
        }
    }
    if let Some(category) = lower.strip_prefix("suppress ") {
        let category = category.trim().to_string();
        if !category.is_empty() {
            return Some(ReweightDirective::Suppress { category });
        }
    }
    None
}
