//! Global configuration.
//!
//! Loaded from ~/.config/swarmr/swarmr.yml or .swarmr.yml

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::admission::BudgetCeiling;
use crate::executor::{GenerationSettings, RetryPolicy};
use crate::task::SprintKind;

/// Global configuration for swarmr.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SwarmConfig {
    /// Completion provider settings.
    pub provider: ProviderConfig,

    /// Sprint budget ceiling.
    pub budget: BudgetConfig,

    /// Concurrency and admission polling.
    pub concurrency: ConcurrencyConfig,

    /// Resource monitor settings.
    pub monitor: MonitorConfig,

    /// Provider retry/backoff settings.
    pub retry: RetryConfig,

    /// Sprint defaults.
    pub sprint: SprintConfig,

    /// Output locations.
    pub output: OutputConfig,
}

impl SwarmConfig {
    /// Load configuration with fallback chain.
    ///
    /// Search order:
    /// 1. Explicit path if provided
    /// 2. .swarmr.yml in current directory
    /// 3. ~/.config/swarmr/swarmr.yml
    /// 4. Defaults
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path)
                .context(format!("Failed to load config from {}", path.display()));
        }

        let project_config = PathBuf::from(".swarmr.yml");
        if project_config.exists() {
            match Self::load_from_file(&project_config) {
                Ok(config) => {
                    log::info!("Loaded config from .swarmr.yml");
                    return Ok(config);
                }
                Err(e) => {
                    log::warn!("Failed to load .swarmr.yml: {}", e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("swarmr").join("swarmr.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", user_config.display());
                        return Ok(config);
                    }
                    Err(e) => {
                        log::warn!("Failed to load {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if !(self.budget.limit_usd > 0.0) {
            eyre::bail!("budget.limit-usd must be > 0");
        }
        if !(self.budget.threshold_fraction > 0.0 && self.budget.threshold_fraction <= 1.0) {
            eyre::bail!("budget.threshold-fraction must be in (0, 1]");
        }
        if self.retry.max_attempts == 0 {
            eyre::bail!("retry.max-attempts must be > 0");
        }
        if self.sprint.total_tasks == 0 {
            eyre::bail!("sprint.total-tasks must be > 0");
        }
        if self.monitor.sample_interval_ms == 0 {
            eyre::bail!("monitor.sample-interval-ms must be > 0");
        }
        Ok(())
    }

    pub fn budget_ceiling(&self) -> BudgetCeiling {
        BudgetCeiling::new(self.budget.limit_usd, self.budget.threshold_fraction)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            backoff_base: Duration::from_millis(self.retry.backoff_base_ms),
            backoff_cap: Duration::from_secs(self.retry.backoff_cap_secs),
            retry_delay: Duration::from_millis(self.retry.retry_delay_ms),
            admission_retries: self.concurrency.admission_retries,
            admission_poll: Duration::from_millis(self.concurrency.admission_poll_ms),
        }
    }

    pub fn generation_settings(&self) -> GenerationSettings {
        GenerationSettings {
            model_id: self.provider.model.clone(),
            max_tokens: self.provider.max_tokens,
            temperature: self.provider.temperature,
        }
    }
}

/// Completion provider settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Model id; empty uses the provider's default.
    pub model: String,

    /// Max tokens per artifact.
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Sampling temperature.
    pub temperature: f32,

    /// Timeout per provider call in milliseconds.
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            max_tokens: 1024,
            temperature: 0.7,
            timeout_ms: 120_000, // 2 minutes
        }
    }
}

/// Sprint budget ceiling.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BudgetConfig {
    #[serde(rename = "limit-usd")]
    pub limit_usd: f64,

    /// Fraction of the limit at which admissions latch shut.
    #[serde(rename = "threshold-fraction")]
    pub threshold_fraction: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            limit_usd: 5.0,
            threshold_fraction: 0.95,
        }
    }
}

/// Concurrency and admission polling.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// Concurrency ceiling; 0 derives it from available RAM at startup.
    #[serde(rename = "max-concurrent")]
    pub max_concurrent: usize,

    /// Admission polls before a task gives up as paused.
    #[serde(rename = "admission-retries")]
    pub admission_retries: u32,

    /// Base sleep between admission polls.
    #[serde(rename = "admission-poll-ms")]
    pub admission_poll_ms: u64,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 0,
            admission_retries: 40,
            admission_poll_ms: 250,
        }
    }
}

/// Resource monitor settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Fixed sampling interval.
    #[serde(rename = "sample-interval-ms")]
    pub sample_interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 5_000,
        }
    }
}

/// Provider retry/backoff settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total provider calls allowed on the rate-limit path.
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Backoff unit for rate-limited retries.
    #[serde(rename = "backoff-base-ms")]
    pub backoff_base_ms: u64,

    /// Cap on any single backoff sleep.
    #[serde(rename = "backoff-cap-secs")]
    pub backoff_cap_secs: u64,

    /// Delay before the single retry of other failures.
    #[serde(rename = "retry-delay-ms")]
    pub retry_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 1_000,
            backoff_cap_secs: 64,
            retry_delay_ms: 1_000,
        }
    }
}

/// Sprint defaults, overridable from the CLI.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SprintConfig {
    #[serde(rename = "total-tasks")]
    pub total_tasks: u64,

    pub kind: SprintKind,

    /// Tasks between checkpoints; 0 derives total-tasks / 5.
    #[serde(rename = "checkpoint-interval")]
    pub checkpoint_interval: u64,

    /// Selector seed; 0 picks a random seed at startup.
    pub seed: u64,
}

impl Default for SprintConfig {
    fn default() -> Self {
        Self {
            total_tasks: 25,
            kind: SprintKind::Mixed,
            checkpoint_interval: 0,
            seed: 0,
        }
    }
}

/// Output locations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    /// JSONL file receiving artifact records.
    #[serde(rename = "artifacts-path")]
    pub artifacts_path: PathBuf,

    /// Directory receiving one summary JSON per sprint.
    #[serde(rename = "summary-dir")]
    pub summary_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        let base = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("swarmr");

        Self {
            artifacts_path: base.join("artifacts.jsonl"),
            summary_dir: base.join("summaries"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SwarmConfig::default();
        assert_eq!(config.sprint.total_tasks, 25);
        assert_eq!(config.retry.max_attempts, 3);
        assert!((config.budget.limit_usd - 5.0).abs() < 1e-9);
        assert_eq!(config.concurrency.max_concurrent, 0);
    }

    #[test]
    fn test_config_validation() {
        let config = SwarmConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_budget() {
        let config = SwarmConfig {
            budget: BudgetConfig {
                limit_usd: 0.0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_threshold() {
        let config = SwarmConfig {
            budget: BudgetConfig {
                threshold_fraction: 1.5,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_retry() {
        let config = SwarmConfig {
            retry: RetryConfig {
                max_attempts: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
budget:
  limit-usd: 2.5
  threshold-fraction: 0.9
concurrency:
  max-concurrent: 2
sprint:
  total-tasks: 40
  kind: outreach
"#;
        let config: SwarmConfig = serde_yaml::from_str(yaml).unwrap();
        assert!((config.budget.limit_usd - 2.5).abs() < 1e-9);
        assert_eq!(config.concurrency.max_concurrent, 2);
        assert_eq!(config.sprint.total_tasks, 40);
        assert_eq!(config.sprint.kind, SprintKind::Outreach);
        // Other fields should have defaults
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_budget_ceiling_glue() {
        let config = SwarmConfig::default();
        let ceiling = config.budget_ceiling();
        assert!((ceiling.cutoff() - 5.0 * 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_retry_policy_glue() {
        let config = SwarmConfig::default();
        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.backoff_cap, Duration::from_secs(64));
        assert_eq!(policy.admission_poll, Duration::from_millis(250));
    }
}
