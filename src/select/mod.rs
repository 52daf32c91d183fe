//! Weighted task selection.
//!
//! Draws the next task category with a seeded weighted-random walk over the
//! catalog's stable order, so a fixed seed and unchanged weights reproduce
//! an identical sequence. Reweighting replaces the whole weight vector in
//! one assignment; readers never observe a half-applied update.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::task::{Catalog, TaskCategory, TaskInstance};

/// Multiplier applied to a favored category's seed weight.
const FAVOR_MULTIPLIER: f64 = 2.0;

/// Multiplier applied to a suppressed category's seed weight.
const SUPPRESS_MULTIPLIER: f64 = 0.5;

/// Weights aligned with the catalog's stable category order.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightVector {
    weights: Vec<(String, f64)>,
}

impl WeightVector {
    /// Build from explicit (key, weight) pairs; negatives are clamped to 0.
    pub fn new(weights: Vec<(String, f64)>) -> Self {
        Self {
            weights: weights
                .into_iter()
                .map(|(key, weight)| (key, weight.max(0.0)))
                .collect(),
        }
    }

    /// Every category at its seed weight.
    pub fn from_seeds(catalog: &Catalog) -> Self {
        Self::new(
            catalog
                .categories()
                .iter()
                .map(|c| (c.key.clone(), c.weight_seed))
                .collect(),
        )
    }

    pub fn total(&self) -> f64 {
        self.weights.iter().map(|(_, w)| w).sum()
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.weights
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, w)| *w)
    }

    /// Pairs in stable order.
    pub fn entries(&self) -> &[(String, f64)] {
        &self.weights
    }
}

/// Named reweighting intent. The numeric mapping lives here in the
/// selector, not in whoever produced the directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReweightDirective {
    /// Reset every category to its seed weight
    Balanced,
    /// Boost one category relative to the rest
    Favor { category: String },
    /// Dampen one category relative to the rest
    Suppress { category: String },
}

impl std::fmt::Display for ReweightDirective {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReweightDirective::Balanced => write!(f, "balanced"),
            ReweightDirective::Favor { category } => write!(f, "favor {}", category),
            ReweightDirective::Suppress { category } => write!(f, "suppress {}", category),
        }
    }
}

/// One draw: the instance plus a copy of its category definition.
#[derive(Debug, Clone)]
pub struct TaskDraw {
    pub instance: TaskInstance,
    pub category: TaskCategory,
}

/// Weighted-random selector over an immutable catalog.
pub struct TaskSelector {
    catalog: Arc<Catalog>,
    weights: RwLock<WeightVector>,
    rng: Mutex<StdRng>,
    sequence: AtomicU64,
}

impl TaskSelector {
    pub fn new(catalog: Arc<Catalog>, seed: u64) -> Self {
        let weights = WeightVector::from_seeds(&catalog);
        Self {
            catalog,
            weights: RwLock::new(weights),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            sequence: AtomicU64::new(0),
        }
    }

    /// Draw the next task.
    pub fn next(&self) -> TaskDraw {
        let key = self.draw_key();
        let category = self
            .catalog
            .get(&key)
            .expect("weight vector key must exist in catalog")
            .clone();

        let sequence_id = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        TaskDraw {
            instance: TaskInstance {
                sequence_id,
                category_key: key,
                created_at: Utc::now(),
            },
            category,
        }
    }

    fn draw_key(&self) -> String {
        let weights = self.weights.read().expect("weights lock poisoned");
        let total = weights.total();
        let mut rng = self.rng.lock().expect("rng lock poisoned");

        if total <= 0.0 {
            // Degenerate all-zero vector: uniform over the catalog
            let index = rng.random_range(0..self.catalog.len());
            return self.catalog.categories()[index].key.clone();
        }

        let r = rng.random_range(0.0..total);
        let mut acc = 0.0;
        for (key, weight) in weights.entries() {
            acc += weight;
            if r < acc {
                return key.clone();
            }
        }

        // Floating point accumulation can land exactly on total; the last
        // positively-weighted entry takes the draw.
        weights
            .entries()
            .iter()
            .rev()
            .find(|(_, w)| *w > 0.0)
            .map(|(k, _)| k.clone())
            .expect("total > 0 implies a positive weight")
    }

    /// Replace the whole weight vector according to a directive.
    pub fn reweight(&self, directive: &ReweightDirective) {
        let next = self.weights_for(directive);
        *self.weights.write().expect("weights lock poisoned") = next;
        log::info!("reweighted selection: {}", directive);
    }

    /// Directives map onto seed weights, so repeated reweighting never
    /// drifts a category toward zero or infinity.
    fn weights_for(&self, directive: &ReweightDirective) -> WeightVector {
        let scale = |key: &str| match directive {
            ReweightDirective::Balanced => 1.0,
            ReweightDirective::Favor { category } if category == key => FAVOR_MULTIPLIER,
            ReweightDirective::Suppress { category } if category == key => SUPPRESS_MULTIPLIER,
            _ => 1.0,
        };

        if let ReweightDirective::Favor { category } | ReweightDirective::Suppress { category } =
            directive
            && self.catalog.get(category).is_none()
        {
            log::warn!("directive names unknown category {:?}, keeping seed weights", category);
            return WeightVector::from_seeds(&self.catalog);
        }

        WeightVector::new(
            self.catalog
                .categories()
                .iter()
                .map(|c| (c.key.clone(), c.weight_seed * scale(&c.key)))
                .collect(),
        )
    }

    /// Current weights (cloned), for logging and tests.
    pub fn weights(&self) -> WeightVector {
        self.weights.read().expect("weights lock poisoned").clone()
    }

    /// Tasks drawn so far this sprint.
    pub fn drawn(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }
}
