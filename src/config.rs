//! Engine configuration
//!
//! Loaded from YAML; every section and field is optional and falls back to
//! its default. [`EngineConfig::normalized`] repairs zero sizes and
//! intervals, [`EngineConfig::validate`] rejects values that cannot be
//! repaired.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::core::retry_policy::{RetryPolicy, DEFAULT_MAX_RETRIES};
use crate::types::ConfigError;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub limits: LimitsConfig,
    pub retry: RetryConfig,
    pub scheduler: SchedulerConfig,
    pub timeouts: TimeoutsConfig,
    pub create: CreateConfig,
    pub logging: LoggingConfig,
}

/// Transfer amount bounds, both inclusive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub min_amount: Decimal,
    pub max_amount: Decimal,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            min_amount: Decimal::new(1, 2),
            max_amount: Decimal::new(100_000_000, 2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    /// Zero leaves pacing to the retry sweep interval
    pub backoff_base_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base_ms: 0,
            max_backoff_ms: 300_000,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.backoff_base_ms),
            Duration::from_millis(self.max_backoff_ms),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub pending_interval_ms: u64,
    pub retry_interval_ms: u64,
    pub reconciliation_interval_ms: u64,
    pub pending_batch_size: usize,
    pub retry_batch_size: usize,
    /// Transfers processed concurrently within one sweep
    pub max_concurrent: usize,
    /// Age after which a PROCESSING transfer is considered abandoned
    pub stuck_processing_timeout_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            pending_interval_ms: 1_000,
            retry_interval_ms: 5_000,
            reconciliation_interval_ms: 30_000,
            pending_batch_size: 500,
            retry_batch_size: 100,
            max_concurrent: num_cpus::get(),
            stuck_processing_timeout_ms: 300_000,
        }
    }
}

impl SchedulerConfig {
    pub fn pending_interval(&self) -> Duration {
        Duration::from_millis(self.pending_interval_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn reconciliation_interval(&self) -> Duration {
        Duration::from_millis(self.reconciliation_interval_ms)
    }

    pub fn stuck_processing_timeout(&self) -> Duration {
        Duration::from_millis(self.stuck_processing_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    pub processor_timeout_ms: u64,
    pub storage_timeout_ms: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            processor_timeout_ms: 5_000,
            storage_timeout_ms: 2_000,
        }
    }
}

impl TimeoutsConfig {
    pub fn processor_timeout(&self) -> Duration {
        Duration::from_millis(self.processor_timeout_ms)
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateConfig {
    /// Times a create is re-run after losing an account version race
    pub conflict_retries: u32,
}

impl Default for CreateConfig {
    fn default() -> Self {
        Self { conflict_retries: 3 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl EngineConfig {
    /// Load, normalize and validate a YAML config file
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_yaml_str(&content)
    }

    /// Parse, normalize and validate YAML config text
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })?;
        let config = config.normalized();
        config.validate()?;
        Ok(config)
    }

    /// Reject values that have no sensible fallback
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.min_amount <= Decimal::ZERO {
            return Err(ConfigError::invalid(
                "limits.min_amount",
                format!("must be positive, got {}", self.limits.min_amount),
            ));
        }
        if self.limits.min_amount > self.limits.max_amount {
            return Err(ConfigError::invalid(
                "limits.max_amount",
                format!(
                    "must not be below min_amount ({} < {})",
                    self.limits.max_amount, self.limits.min_amount
                ),
            ));
        }
        if self.retry.backoff_base_ms > self.retry.max_backoff_ms {
            return Err(ConfigError::invalid(
                "retry.backoff_base_ms",
                "must not exceed retry.max_backoff_ms",
            ));
        }
        Ok(())
    }

    /// Replace zero sizes, intervals and timeouts with their defaults
    ///
    /// Each replacement is logged as a warning.
    pub fn normalized(mut self) -> Self {
        let scheduler = SchedulerConfig::default();
        let timeouts = TimeoutsConfig::default();

        fallback(&mut self.scheduler.pending_interval_ms, scheduler.pending_interval_ms, "scheduler.pending_interval_ms");
        fallback(&mut self.scheduler.retry_interval_ms, scheduler.retry_interval_ms, "scheduler.retry_interval_ms");
        fallback(
            &mut self.scheduler.reconciliation_interval_ms,
            scheduler.reconciliation_interval_ms,
            "scheduler.reconciliation_interval_ms",
        );
        fallback(&mut self.scheduler.pending_batch_size, scheduler.pending_batch_size, "scheduler.pending_batch_size");
        fallback(&mut self.scheduler.retry_batch_size, scheduler.retry_batch_size, "scheduler.retry_batch_size");
        fallback(&mut self.scheduler.max_concurrent, scheduler.max_concurrent, "scheduler.max_concurrent");
        fallback(
            &mut self.scheduler.stuck_processing_timeout_ms,
            scheduler.stuck_processing_timeout_ms,
            "scheduler.stuck_processing_timeout_ms",
        );
        fallback(&mut self.timeouts.processor_timeout_ms, timeouts.processor_timeout_ms, "timeouts.processor_timeout_ms");
        fallback(&mut self.timeouts.storage_timeout_ms, timeouts.storage_timeout_ms, "timeouts.storage_timeout_ms");

        self
    }
}

fn fallback<T>(value: &mut T, default: T, field: &str)
where
    T: Copy + Default + PartialEq + std::fmt::Display,
{
    if *value == T::default() {
        warn!(field, invalid = %value, default = %default, "Invalid config value, using default");
        *value = default;
    }
}
