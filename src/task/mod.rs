//! Task domain types - categories, instances, outcomes, and sprint stats.

pub mod category;
pub mod outcome;
pub mod stats;

pub use category::{Catalog, OutputKind, SprintKind, TaskCategory};
pub use outcome::{RECENT_OUTCOME_CAPACITY, RecentOutcomes, TaskInstance, TaskOutcome, TaskStatus};
pub use stats::{CategoryCounts, SprintStats, StatsBook};
