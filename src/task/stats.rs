//! Sprint statistics behind a single-writer funnel.
//!
//! Many executors finish concurrently, but every stats and recent-outcome
//! update passes through one mutex inside StatsBook. Callers never hold the
//! lock themselves; they hand an outcome over and the book does the rest.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;

use super::outcome::{RecentOutcomes, TaskOutcome, TaskStatus};

/// Per-category terminal counts.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CategoryCounts {
    pub completed: u64,
    pub failed: u64,
    pub paused: u64,
}

/// Cumulative aggregate for one sprint.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SprintStats {
    pub attempted: u64,
    pub completed: u64,
    pub failed: u64,
    pub paused: u64,
    pub tokens_used: u64,
    pub cost_accumulated: f64,
    pub per_category_counts: HashMap<String, CategoryCounts>,
}

impl SprintStats {
    /// Completed / (completed + failed); 1.0 when nothing terminal yet.
    pub fn success_rate(&self) -> f64 {
        let denominator = self.completed + self.failed;
        if denominator == 0 {
            1.0
        } else {
            self.completed as f64 / denominator as f64
        }
    }

    fn fold(&mut self, outcome: &TaskOutcome) {
        self.attempted += 1;
        self.tokens_used += outcome.token_count;
        self.cost_accumulated += outcome.cost_delta;

        let counts = self
            .per_category_counts
            .entry(outcome.category_key.clone())
            .or_default();

        match outcome.status {
            TaskStatus::Success => {
                self.completed += 1;
                counts.completed += 1;
            }
            TaskStatus::Failed => {
                self.failed += 1;
                counts.failed += 1;
            }
            TaskStatus::Paused => {
                self.paused += 1;
                counts.paused += 1;
            }
        }
    }
}

/// The one place sprint state is written.
#[derive(Debug)]
pub struct StatsBook {
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    stats: SprintStats,
    recent: RecentOutcomes,
}

impl StatsBook {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                stats: SprintStats::default(),
                recent: RecentOutcomes::default(),
            }),
        }
    }

    /// Record one terminal outcome. Exactly one call per TaskInstance.
    pub fn record(&self, outcome: &TaskOutcome) {
        let mut inner = self.inner.lock().expect("stats lock poisoned");
        inner.stats.fold(outcome);
        inner.recent.push(outcome.clone());
    }

    /// Consistent snapshot of stats and the recent-outcome ring.
    pub fn snapshot(&self) -> (SprintStats, Vec<TaskOutcome>) {
        let inner = self.inner.lock().expect("stats lock poisoned");
        (inner.stats.clone(), inner.recent.to_vec())
    }

    /// Current cumulative stats.
    pub fn stats(&self) -> SprintStats {
        self.inner.lock().expect("stats lock poisoned").stats.clone()
    }

    /// Cost read used by the budget gate on every admission.
    pub fn cost_accumulated(&self) -> f64 {
        self.inner
            .lock()
            .expect("stats lock poisoned")
            .stats
            .cost_accumulated
    }
}

impl Default for StatsBook {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn make_outcome(task_id: u64, status: TaskStatus, cost: f64) -> TaskOutcome {
        TaskOutcome::new(
            task_id,
            "blog_post",
            status,
            50,
            cost,
            Duration::from_millis(100),
            0,
        )
    }

    #[test]
    fn test_record_success() {
        let book = StatsBook::new();
        book.record(&make_outcome(1, TaskStatus::Success, 0.05));

        let stats = book.stats();
        assert_eq!(stats.attempted, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.tokens_used, 50);
        assert!((stats.cost_accumulated - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_record_all_statuses() {
        let book = StatsBook::new();
        book.record(&make_outcome(1, TaskStatus::Success, 0.05));
        book.record(&make_outcome(2, TaskStatus::Failed, 0.0));
        book.record(&make_outcome(3, TaskStatus::Paused, 0.0));

        let stats = book.stats();
        assert_eq!(stats.attempted, 3);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.paused, 1);
    }

    #[test]
    fn test_per_category_counts() {
        let book = StatsBook::new();
        book.record(&make_outcome(1, TaskStatus::Success, 0.0));
        book.record(&make_outcome(2, TaskStatus::Failed, 0.0));

        let stats = book.stats();
        let counts = stats.per_category_counts.get("blog_post").unwrap();
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.paused, 0);
    }

    #[test]
    fn test_success_rate() {
        let mut stats = SprintStats::default();
        assert_eq!(stats.success_rate(), 1.0);

        stats.completed = 9;
        stats.failed = 1;
        assert!((stats.success_rate() - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_success_rate_ignores_paused() {
        let mut stats = SprintStats::default();
        stats.completed = 1;
        stats.paused = 99;
        assert_eq!(stats.success_rate(), 1.0);
    }

    #[test]
    fn test_snapshot_is_consistent() {
        let book = StatsBook::new();
        book.record(&make_outcome(1, TaskStatus::Success, 0.10));
        book.record(&make_outcome(2, TaskStatus::Success, 0.10));

        let (stats, recent) = book.snapshot();
        assert_eq!(stats.attempted as usize, recent.len());
    }

    #[test]
    fn test_cost_accumulated() {
        let book = StatsBook::new();
        for i in 0..10 {
            book.record(&make_outcome(i, TaskStatus::Success, 0.10));
        }
        assert!((book.cost_accumulated() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_concurrent_records_all_land() {
        let book = Arc::new(StatsBook::new());
        let mut handles = Vec::new();
        for t in 0..8u64 {
            let book = Arc::clone(&book);
            handles.push(std::thread::spawn(move || {
                for i in 0..50u64 {
                    book.record(&make_outcome(t * 50 + i, TaskStatus::Success, 0.01));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let stats = book.stats();
        assert_eq!(stats.attempted, 400);
        assert_eq!(stats.completed, 400);
    }
}
