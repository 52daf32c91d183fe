//! Task instances and their terminal outcomes.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// How many outcomes the recent-outcome ring retains for evaluation.
pub const RECENT_OUTCOME_CAPACITY: usize = 100;

/// One drawn task, alive from selection until its outcome is recorded.
#[derive(Debug, Clone)]
pub struct TaskInstance {
    /// Monotonic, unique within a sprint
    pub sequence_id: u64,
    pub category_key: String,
    pub created_at: DateTime<Utc>,
}

/// Terminal status of a task.
///
/// Rate-limit and timeout exhaustion are downgraded to Failed; Paused means
/// admission was never granted (or the budget latch tripped).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Success,
    Failed,
    Paused,
}

/// The immutable terminal record of one task's execution attempt(s).
#[derive(Debug, Clone, Serialize)]
pub struct TaskOutcome {
    pub task_id: u64,
    pub category_key: String,
    pub status: TaskStatus,
    pub token_count: u64,
    pub cost_delta: f64,
    pub duration_ms: u64,
    /// Provider calls that had to be repeated before the terminal status
    pub retries: u32,
}

impl TaskOutcome {
    pub fn new(
        task_id: u64,
        category_key: impl Into<String>,
        status: TaskStatus,
        token_count: u64,
        cost_delta: f64,
        duration: Duration,
        retries: u32,
    ) -> Self {
        Self {
            task_id,
            category_key: category_key.into(),
            status,
            token_count,
            cost_delta,
            duration_ms: duration.as_millis() as u64,
            retries,
        }
    }

    /// A task that never got past admission.
    pub fn paused(task_id: u64, category_key: impl Into<String>, duration: Duration) -> Self {
        Self::new(task_id, category_key, TaskStatus::Paused, 0, 0.0, duration, 0)
    }
}

/// Bounded ring of the most recent outcomes, oldest evicted first.
#[derive(Debug)]
pub struct RecentOutcomes {
    buf: VecDeque<TaskOutcome>,
    capacity: usize,
}

impl RecentOutcomes {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, outcome: TaskOutcome) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(outcome);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Snapshot in arrival order, oldest first.
    pub fn to_vec(&self) -> Vec<TaskOutcome> {
        self.buf.iter().cloned().collect()
    }
}

impl Default for RecentOutcomes {
    fn default() -> Self {
        Self::new(RECENT_OUTCOME_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_outcome(task_id: u64, status: TaskStatus) -> TaskOutcome {
        TaskOutcome::new(
            task_id,
            "blog_post",
            status,
            100,
            0.01,
            Duration::from_millis(250),
            0,
        )
    }

    #[test]
    fn test_outcome_duration_ms() {
        let outcome = make_outcome(1, TaskStatus::Success);
        assert_eq!(outcome.duration_ms, 250);
    }

    #[test]
    fn test_paused_outcome_has_no_cost() {
        let outcome = TaskOutcome::paused(7, "cold_email", Duration::from_millis(10));
        assert_eq!(outcome.status, TaskStatus::Paused);
        assert_eq!(outcome.token_count, 0);
        assert_eq!(outcome.cost_delta, 0.0);
        assert_eq!(outcome.retries, 0);
    }

    #[test]
    fn test_ring_keeps_insertion_order() {
        let mut ring = RecentOutcomes::new(10);
        for i in 0..5 {
            ring.push(make_outcome(i, TaskStatus::Success));
        }
        let ids: Vec<u64> = ring.to_vec().iter().map(|o| o.task_id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_ring_evicts_oldest() {
        let mut ring = RecentOutcomes::new(3);
        for i in 0..5 {
            ring.push(make_outcome(i, TaskStatus::Success));
        }
        assert_eq!(ring.len(), 3);
        let ids: Vec<u64> = ring.to_vec().iter().map(|o| o.task_id).collect();
        assert_eq!(ids, vec![2, 3, 4]);
    }

    #[test]
    fn test_ring_default_capacity() {
        let mut ring = RecentOutcomes::default();
        for i in 0..(RECENT_OUTCOME_CAPACITY as u64 + 20) {
            ring.push(make_outcome(i, TaskStatus::Failed));
        }
        assert_eq!(ring.len(), RECENT_OUTCOME_CAPACITY);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&TaskStatus::Success).unwrap();
        assert_eq!(json, "\"success\"");
    }
}
