//! Pipeline configuration with env overrides and TOML file loading.

use gaze_core::matcher::DEFAULT_MATCH_THRESHOLD;
use gaze_core::DistanceMetric;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_INTERVAL_MS: u64 = 250;
const DEFAULT_CYCLE_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_DEGRADED_AFTER: u32 = 3;
const DEFAULT_EVENT_CAPACITY: usize = 32;

/// Misconfiguration is fatal: it is rejected here, at construction time,
/// before the scheduler ever starts.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cycle interval must be greater than zero")]
    ZeroInterval,
    #[error("cycle timeout must be greater than zero")]
    ZeroTimeout,
    #[error("degraded_after must be at least 1")]
    ZeroDegradedAfter,
    #[error("event capacity must be at least 1")]
    ZeroEventCapacity,
    #[error("match threshold must be finite and non-negative, got {0}")]
    InvalidThreshold(f32),
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Scheduler and matcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Minimum spacing between cycle starts, in milliseconds.
    pub interval_ms: u64,
    /// Budget for one full detect→embed→match→publish cycle, in milliseconds.
    pub cycle_timeout_ms: u64,
    /// Consecutive failed/timed-out cycles before `PipelineDegraded`.
    pub degraded_after: u32,
    /// Acceptance threshold for the matcher.
    pub match_threshold: f32,
    /// Distance metric for descriptor comparison.
    pub metric: DistanceMetric,
    /// Capacity of the event broadcast channel; a lagging subscriber loses
    /// the oldest events beyond this.
    pub event_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_INTERVAL_MS,
            cycle_timeout_ms: DEFAULT_CYCLE_TIMEOUT_MS,
            degraded_after: DEFAULT_DEGRADED_AFTER,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            metric: DistanceMetric::Euclidean,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from `GAZE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            interval_ms: env_u64("GAZE_INTERVAL_MS", defaults.interval_ms),
            cycle_timeout_ms: env_u64("GAZE_CYCLE_TIMEOUT_MS", defaults.cycle_timeout_ms),
            degraded_after: env_u32("GAZE_DEGRADED_AFTER", defaults.degraded_after),
            match_threshold: env_f32("GAZE_MATCH_THRESHOLD", defaults.match_threshold),
            metric: match std::env::var("GAZE_METRIC").as_deref() {
                Ok("cosine") => DistanceMetric::Cosine,
                Ok("euclidean") => DistanceMetric::Euclidean,
                _ => defaults.metric,
            },
            event_capacity: defaults.event_capacity,
        }
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_millis(self.cycle_timeout_ms)
    }

    /// Reject invalid values before the scheduler is spawned.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_ms == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if self.cycle_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.degraded_after == 0 {
            return Err(ConfigError::ZeroDegradedAfter);
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::ZeroEventCapacity);
        }
        if !self.match_threshold.is_finite() || self.match_threshold < 0.0 {
            return Err(ConfigError::InvalidThreshold(self.match_threshold));
        }
        Ok(())
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        PipelineConfig::default().validate().unwrap();
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = PipelineConfig {
            interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroInterval)));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = PipelineConfig {
            cycle_timeout_ms: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroTimeout)));
    }

    #[test]
    fn test_zero_degraded_after_rejected() {
        let config = PipelineConfig {
            degraded_after: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroDegradedAfter)
        ));
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let config = PipelineConfig {
            match_threshold: -0.5,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidThreshold(_))
        ));
    }

    #[test]
    fn test_nan_threshold_rejected() {
        let config = PipelineConfig {
            match_threshold: f32::NAN,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidThreshold(_))
        ));
    }

    #[test]
    fn test_toml_round_trip() {
        let parsed: PipelineConfig = toml::from_str(
            r#"
            interval_ms = 100
            match_threshold = 0.45
            metric = "cosine"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.interval_ms, 100);
        assert_eq!(parsed.metric, DistanceMetric::Cosine);
        // Unspecified fields keep their defaults.
        assert_eq!(parsed.degraded_after, 3);
    }

    #[test]
    fn test_toml_unknown_field_rejected() {
        assert!(toml::from_str::<PipelineConfig>("intervalms = 100").is_err());
    }
}
