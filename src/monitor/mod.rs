//! Host resource monitoring.
//!
//! Samples available RAM and CPU load on a fixed interval and classifies
//! the host into health bands. Sampling is best effort: on platforms
//! without /proc (or when parsing fails) the monitor reports a neutral
//! sample rather than erroring - the scheduler must keep working on hosts
//! it cannot introspect.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;

const GIB: u64 = 1024 * 1024 * 1024;

/// Health band derived from one resource sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HostHealth {
    /// Plenty of headroom
    Normal,
    /// Under pressure but still schedulable
    Elevated,
    /// No new work until the next sample shows recovery
    Critical,
}

/// Anything the admission gate can ask for a health band.
///
/// ResourceMonitor is the production implementation; tests substitute a
/// stub to script health transitions.
pub trait HealthProbe: Send + Sync {
    fn health(&self) -> HostHealth;
}

/// One point-in-time reading of host resources.
#[derive(Debug, Clone, Copy)]
pub struct ResourceSample {
    pub available_ram_bytes: u64,
    pub total_ram_bytes: u64,
    /// 1-minute load average divided by core count
    pub load_per_core: f64,
    pub taken_at: Instant,
}

impl ResourceSample {
    /// Classify this sample into a health band.
    pub fn health(&self) -> HostHealth {
        let used_fraction = if self.total_ram_bytes == 0 {
            0.0
        } else {
            1.0 - self.available_ram_bytes as f64 / self.total_ram_bytes as f64
        };

        if used_fraction >= 0.92 || self.load_per_core >= 2.0 {
            HostHealth::Critical
        } else if used_fraction >= 0.80 || self.load_per_core >= 1.0 {
            HostHealth::Elevated
        } else {
            HostHealth::Normal
        }
    }
}

/// Concurrency ceiling heuristic from available RAM.
///
/// The completion provider may itself be a local process competing for
/// memory, so the ceiling stays coarse and conservative.
pub fn ceiling_for_available_ram(available_bytes: u64) -> usize {
    if available_bytes >= 16 * GIB {
        4
    } else if available_bytes >= 8 * GIB {
        3
    } else if available_bytes >= 4 * GIB {
        2
    } else {
        1
    }
}

/// Periodic host resource sampler.
pub struct ResourceMonitor {
    sample: RwLock<ResourceSample>,
    interval: Duration,
}

impl ResourceMonitor {
    /// Create a monitor and take an immediate first sample.
    pub fn new(interval: Duration) -> Self {
        Self {
            sample: RwLock::new(sample_now()),
            interval,
        }
    }

    /// How often the background refresher re-samples.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// The most recent sample (never blocks on sampling).
    pub fn last_sample(&self) -> ResourceSample {
        *self.sample.read().expect("sample lock poisoned")
    }

    /// Take a fresh sample now.
    pub fn refresh(&self) {
        let sample = sample_now();
        *self.sample.write().expect("sample lock poisoned") = sample;
    }

    /// Concurrency ceiling from the latest sample.
    pub fn concurrency_ceiling(&self) -> usize {
        ceiling_for_available_ram(self.last_sample().available_ram_bytes)
    }

    /// Spawn the fixed-interval refresher; it stops when `cancel` fires.
    pub fn spawn_refresher(self: Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let monitor = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(monitor.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        monitor.refresh();
                        let sample = monitor.last_sample();
                        log::debug!(
                            "resource sample: {:.1} GiB free, load/core {:.2}, health {:?}",
                            sample.available_ram_bytes as f64 / GIB as f64,
                            sample.load_per_core,
                            sample.health()
                        );
                    }
                }
            }
        })
    }
}

impl HealthProbe for ResourceMonitor {
    fn health(&self) -> HostHealth {
        self.last_sample().health()
    }
}

fn sample_now() -> ResourceSample {
    let (available, total) = read_meminfo().unwrap_or((8 * GIB, 16 * GIB));
    let load = read_load_average().unwrap_or(0.0);
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);

    ResourceSample {
        available_ram_bytes: available,
        total_ram_bytes: total,
        load_per_core: load / cores as f64,
        taken_at: Instant::now(),
    }
}

#[cfg(target_os = "linux")]
fn read_meminfo() -> Option<(u64, u64)> {
    let content = std::fs::read_to_string("/proc/meminfo").ok()?;
    parse_meminfo(&content)
}

#[cfg(not(target_os = "linux"))]
fn read_meminfo() -> Option<(u64, u64)> {
    None
}

#[cfg(target_os = "linux")]
fn read_load_average() -> Option<f64> {
    let content = std::fs::read_to_string("/proc/loadavg").ok()?;
    parse_loadavg(&content)
}

#[cfg(not(target_os = "linux"))]
fn read_load_average() -> Option<f64> {
    None
}

/// Parse (MemAvailable, MemTotal) in bytes from /proc/meminfo content.
fn parse_meminfo(content: &str) -> Option<(u64, u64)> {
    let mut available = None;
    let mut total = None;

    for line in content.lines() {
        if let Some(rest) = line.strip_prefix("MemAvailable:") {
            available = parse_kib_field(rest);
        } else if let Some(rest) = line.strip_prefix("MemTotal:") {
            total = parse_kib_field(rest);
        }
    }

    Some((available?, total?))
}

fn parse_kib_field(rest: &str) -> Option<u64> {
    rest.trim()
        .split_whitespace()
        .next()?
        .parse::<u64>()
        .ok()
        .map(|kib| kib * 1024)
}

/// Parse the 1-minute load average from /proc/loadavg content.
fn parse_loadavg(content: &str) -> Option<f64> {
    content.split_whitespace().next()?.parse::<f64>().ok()
}
