//! Admission control - the single gate in front of task execution.
//!
//! Three independent checks composed by logical AND, in order:
//! budget latch, resource health, concurrency semaphore. Every call
//! returns a Permit or a typed denial; admission itself never errors.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::monitor::{HealthProbe, HostHealth};
use crate::task::StatsBook;

/// Read-only budget configuration for one sprint.
#[derive(Debug, Clone, Copy)]
pub struct BudgetCeiling {
    pub limit_usd: f64,
    pub threshold_fraction: f64,
}

impl BudgetCeiling {
    pub fn new(limit_usd: f64, threshold_fraction: f64) -> Self {
        Self {
            limit_usd,
            threshold_fraction,
        }
    }

    /// Cost at which the latch trips.
    pub fn cutoff(&self) -> f64 {
        self.limit_usd * self.threshold_fraction
    }
}

/// Why admission was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    /// All permits are out; retry after any release
    ConcurrencyFull,
    /// Host is in the critical band; back off until the next sample
    ResourcePaused,
    /// Budget latch has tripped; permanent for the rest of the sprint
    BudgetExhausted,
    /// Sprint cancel fired; permanent, like the budget latch
    Cancelled,
}

impl Denial {
    /// Transient denials are worth polling again; the permanent ones are
    /// not.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Denial::BudgetExhausted | Denial::Cancelled)
    }
}

/// Proof of admission. Concurrency is bounded solely by permits being
/// alive: dropping the permit is the one and only release.
#[derive(Debug)]
pub struct Permit {
    _permit: OwnedSemaphorePermit,
}

/// Gates scheduling on budget, host health, and a concurrency semaphore.
pub struct AdmissionController {
    semaphore: Arc<Semaphore>,
    ceiling: usize,
    budget: BudgetCeiling,
    budget_latched: AtomicBool,
    stats: Arc<StatsBook>,
    health: Arc<dyn HealthProbe>,
    cancel: CancellationToken,
}

impl AdmissionController {
    pub fn new(
        ceiling: usize,
        budget: BudgetCeiling,
        stats: Arc<StatsBook>,
        health: Arc<dyn HealthProbe>,
    ) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(ceiling)),
            ceiling,
            budget,
            budget_latched: AtomicBool::new(false),
            stats,
            health,
            cancel: CancellationToken::new(),
        }
    }

    /// Refuse all admissions once this token fires. Without it the
    /// controller carries an inert token of its own.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Try to admit one task. Non-blocking; callers own their backoff.
    pub fn acquire(&self) -> Result<Permit, Denial> {
        if self.cancel.is_cancelled() {
            return Err(Denial::Cancelled);
        }

        if self.budget_exhausted() {
            return Err(Denial::BudgetExhausted);
        }

        if self.health.health() == HostHealth::Critical {
            return Err(Denial::ResourcePaused);
        }

        match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => Ok(Permit { _permit: permit }),
            Err(_) => Err(Denial::ConcurrencyFull),
        }
    }

    /// Check the budget latch, tripping it on first observation.
    ///
    /// One-way: once the accumulated cost crosses the cutoff the latch
    /// stays set for the rest of the sprint, even if the cost figure
    /// were ever to move.
    pub fn budget_exhausted(&self) -> bool {
        if self.budget_latched.load(Ordering::Acquire) {
            return true;
        }

        let cost = self.stats.cost_accumulated();
        if cost >= self.budget.cutoff() {
            if !self.budget_latched.swap(true, Ordering::AcqRel) {
                tracing::warn!(
                    cost_usd = cost,
                    cutoff_usd = self.budget.cutoff(),
                    "Budget threshold crossed, latching admissions shut"
                );
            }
            return true;
        }

        false
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Permits not currently held. Exposed for tests and logging.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

impl std::fmt::Debug for AdmissionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionController")
            .field("ceiling", &self.ceiling)
            .field("budget_latched", &self.budget_latched.load(Ordering::Relaxed))
            .finish()
    }
}
