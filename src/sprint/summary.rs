//! End-of-sprint summary persistence.
//!
//! One JSON document per sprint, written once at sprint end. No mid-sprint
//! checkpoint file exists; the summary is reporting, not recovery state.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::task::{CategoryCounts, SprintKind, SprintStats};

#[derive(Debug, Clone, Serialize)]
pub struct SprintSummary {
    pub kind: SprintKind,
    pub attempted: u64,
    pub completed: u64,
    pub failed: u64,
    pub paused: u64,
    pub tokens_used: u64,
    pub cost_usd: f64,
    pub per_category_counts: HashMap<String, CategoryCounts>,
    pub duration_secs: f64,
    /// Checkpoint ratings in the order they were produced
    pub ratings: Vec<u8>,
    pub finished_at: DateTime<Utc>,
}

impl SprintSummary {
    pub fn new(kind: SprintKind, stats: &SprintStats, duration: Duration, ratings: Vec<u8>) -> Self {
        Self {
            kind,
            attempted: stats.attempted,
            completed: stats.completed,
            failed: stats.failed,
            paused: stats.paused,
            tokens_used: stats.tokens_used,
            cost_usd: stats.cost_accumulated,
            per_category_counts: stats.per_category_counts.clone(),
            duration_secs: duration.as_secs_f64(),
            ratings,
            finished_at: Utc::now(),
        }
    }

    /// Write the summary as pretty JSON, creating parent directories.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
