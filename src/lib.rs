//! swarmr - an adaptive swarm task scheduler
//!
//! Dispatches large numbers of independent "generate one artifact via a
//! completion call" tasks under a concurrency ceiling, a monetary budget
//! latch, and host resource pressure, re-weighting category selection from
//! periodic self-evaluation of recent outcomes.

pub mod admission;
pub mod config;
pub mod error;
pub mod evaluate;
pub mod executor;
pub mod monitor;
pub mod provider;
pub mod select;
pub mod sink;
pub mod sprint;
pub mod task;

pub use error::{Result, SwarmError};
