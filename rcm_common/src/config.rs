//! Engine configuration loading and validation.
//!
//! TOML-backed `EngineConfig` with bounds validation; all checks happen
//! at load time and return [`ConfigError`], never mid-cycle.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default control cycle period [µs].
pub const DEFAULT_CYCLE_TIME_US: u32 = 1_000;
/// Valid cycle period range [µs].
pub const CYCLE_TIME_RANGE_US: (u32, u32) = (100, 100_000);
/// Default CPU core the RT thread is pinned to.
pub const DEFAULT_CPU_CORE: usize = 1;
/// Default SCHED_FIFO priority.
pub const DEFAULT_RT_PRIORITY: i32 = 80;
/// Default cap on concurrently scheduled nets.
pub const DEFAULT_MAX_NETS: usize = 8;

/// Executor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Control cycle period [µs].
    pub cycle_time_us: u32,
    /// CPU core for the RT thread (only with the `rt` feature).
    pub cpu_core: usize,
    /// SCHED_FIFO priority (only with the `rt` feature).
    pub rt_priority: i32,
    /// Maximum number of concurrently scheduled nets.
    pub max_nets: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cycle_time_us: DEFAULT_CYCLE_TIME_US,
            cpu_core: DEFAULT_CPU_CORE,
            rt_priority: DEFAULT_RT_PRIORITY,
            max_nets: DEFAULT_MAX_NETS,
        }
    }
}

impl EngineConfig {
    /// Parse from a TOML string and validate.
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Validate parameter bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (lo, hi) = CYCLE_TIME_RANGE_US;
        if self.cycle_time_us < lo || self.cycle_time_us > hi {
            return Err(ConfigError::Validation(format!(
                "cycle_time_us {} outside [{lo}, {hi}]",
                self.cycle_time_us
            )));
        }
        if !(1..=99).contains(&self.rt_priority) {
            return Err(ConfigError::Validation(format!(
                "rt_priority {} outside [1, 99]",
                self.rt_priority
            )));
        }
        if self.max_nets == 0 || self.max_nets > 64 {
            return Err(ConfigError::Validation(format!(
                "max_nets {} outside [1, 64]",
                self.max_nets
            )));
        }
        Ok(())
    }

    /// Cycle period as a `Duration`.
    #[inline]
    pub fn cycle_period(&self) -> Duration {
        Duration::from_micros(self.cycle_time_us as u64)
    }

    /// Cycle period in seconds.
    #[inline]
    pub fn cycle_period_s(&self) -> f64 {
        self.cycle_time_us as f64 * 1e-6
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cycle_time_us, DEFAULT_CYCLE_TIME_US);
        assert_eq!(config.cycle_period(), Duration::from_millis(1));
        assert!((config.cycle_period_s() - 0.001).abs() < 1e-12);
    }

    #[test]
    fn parse_overrides() {
        let config = EngineConfig::from_toml(
            r#"
cycle_time_us = 2000
max_nets = 4
"#,
        )
        .unwrap();
        assert_eq!(config.cycle_time_us, 2000);
        assert_eq!(config.max_nets, 4);
        // Unspecified fields keep defaults.
        assert_eq!(config.rt_priority, DEFAULT_RT_PRIORITY);
    }

    #[test]
    fn cycle_time_bounds_rejected() {
        let err = EngineConfig::from_toml("cycle_time_us = 10").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));

        let err = EngineConfig::from_toml("cycle_time_us = 500000").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn rt_priority_bounds_rejected() {
        let err = EngineConfig::from_toml("rt_priority = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        let err = EngineConfig::from_toml("rt_priority = 100").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn max_nets_bounds_rejected() {
        let err = EngineConfig::from_toml("max_nets = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn bad_toml_is_parse_error() {
        let err = EngineConfig::from_toml("cycle_time_us = \"fast\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
