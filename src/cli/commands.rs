//! CLI definitions using clap.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use swarmr::task::SprintKind;

/// Task count forced by --test mode.
pub const TEST_MODE_TASKS: u64 = 5;

/// swarmr - adaptive swarm scheduler for budgeted generation sprints
#[derive(Parser, Debug)]
#[command(name = "swarmr")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Total tasks for this sprint (overrides config)
    #[arg(short, long)]
    pub tasks: Option<u64>,

    /// Sprint kind / category mix (overrides config)
    #[arg(short, long, value_enum)]
    pub kind: Option<KindArg>,

    /// Budget ceiling in USD (overrides config)
    #[arg(short, long)]
    pub budget: Option<f64>,

    /// Selector seed for reproducible category draws
    #[arg(long)]
    pub seed: Option<u64>,

    /// Test mode: force a small fixed task count
    #[arg(long)]
    pub test: bool,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Effective task count, honoring --test over --tasks.
    pub fn effective_tasks(&self, config_default: u64) -> u64 {
        if self.test {
            TEST_MODE_TASKS
        } else {
            self.tasks.unwrap_or(config_default)
        }
    }
}

/// Sprint kind as a CLI value.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindArg {
    Content,
    Outreach,
    Mixed,
}

impl From<KindArg> for SprintKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Content => SprintKind::Content,
            KindArg::Outreach => SprintKind::Outreach,
            KindArg::Mixed => SprintKind::Mixed,
        }
    }
}
