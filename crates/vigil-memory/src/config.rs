//! Monitor configuration.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::units::{self, ParseDurationError, ParseSizeError};

/// Error produced when monitor configuration cannot be constructed. This is
/// the only error surfaced to whoever builds a monitor; it is startup-fatal
/// and not retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid `threshold`: {0}")]
    Threshold(#[source] ParseSizeError),
    #[error("invalid `check_interval`: {0}")]
    CheckInterval(#[source] ParseDurationError),
    #[error("invalid `min_log_interval`: {0}")]
    MinLogInterval(#[source] ParseDurationError),
    #[error("`{0}` must be greater than zero")]
    Zero(&'static str),
}

/// Immutable monitor configuration: the usage threshold that triggers
/// mitigation, the sampling cadence, and the minimum spacing between status
/// reports. All three are positive and fixed for the monitor's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawMonitorConfig")]
pub struct MonitorConfig {
    threshold_bytes: u64,
    check_interval: Duration,
    min_log_interval: Duration,
}

impl MonitorConfig {
    /// Build a configuration from human-readable strings:
    /// `MonitorConfig::parse("500MB", "00:00:05", "00:01:00")`.
    pub fn parse(
        threshold: &str,
        check_interval: &str,
        min_log_interval: &str,
    ) -> Result<Self, ConfigError> {
        let threshold_bytes = units::parse_byte_size(threshold).map_err(ConfigError::Threshold)?;
        let check_interval =
            units::parse_duration(check_interval).map_err(ConfigError::CheckInterval)?;
        let min_log_interval =
            units::parse_duration(min_log_interval).map_err(ConfigError::MinLogInterval)?;
        Self::new(threshold_bytes, check_interval, min_log_interval)
    }

    /// Build a configuration from already-typed values.
    pub fn new(
        threshold_bytes: u64,
        check_interval: Duration,
        min_log_interval: Duration,
    ) -> Result<Self, ConfigError> {
        if threshold_bytes == 0 {
            return Err(ConfigError::Zero("threshold"));
        }
        if check_interval.is_zero() {
            return Err(ConfigError::Zero("check_interval"));
        }
        if min_log_interval.is_zero() {
            return Err(ConfigError::Zero("min_log_interval"));
        }
        Ok(Self {
            threshold_bytes,
            check_interval,
            min_log_interval,
        })
    }

    pub fn threshold_bytes(&self) -> u64 {
        self.threshold_bytes
    }

    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    pub fn min_log_interval(&self) -> Duration {
        self.min_log_interval
    }
}

/// Wire representation: the threshold accepts a raw byte count or a
/// human-readable string; intervals accept millisecond counts or duration
/// strings.
#[derive(Deserialize)]
struct RawMonitorConfig {
    threshold: SizeSpec,
    check_interval: IntervalSpec,
    min_log_interval: IntervalSpec,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SizeSpec {
    Bytes(u64),
    Human(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IntervalSpec {
    Millis(u64),
    Human(String),
}

impl TryFrom<RawMonitorConfig> for MonitorConfig {
    type Error = ConfigError;

    fn try_from(raw: RawMonitorConfig) -> Result<Self, Self::Error> {
        let threshold_bytes = match raw.threshold {
            SizeSpec::Bytes(bytes) => bytes,
            SizeSpec::Human(text) => {
                units::parse_byte_size(&text).map_err(ConfigError::Threshold)?
            }
        };
        let check_interval = interval(raw.check_interval).map_err(ConfigError::CheckInterval)?;
        let min_log_interval =
            interval(raw.min_log_interval).map_err(ConfigError::MinLogInterval)?;
        Self::new(threshold_bytes, check_interval, min_log_interval)
    }
}

fn interval(spec: IntervalSpec) -> Result<Duration, ParseDurationError> {
    match spec {
        IntervalSpec::Millis(ms) => Ok(Duration::from_millis(ms)),
        IntervalSpec::Human(text) => units::parse_duration(&text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_human_readable_strings() {
        let config = MonitorConfig::parse("500MB", "00:00:05", "00:01:00").unwrap();
        assert_eq!(config.threshold_bytes(), 500 * 1024 * 1024);
        assert_eq!(config.check_interval(), Duration::from_secs(5));
        assert_eq!(config.min_log_interval(), Duration::from_secs(60));
    }

    #[test]
    fn rejects_malformed_and_zero_values() {
        assert!(matches!(
            MonitorConfig::parse("lots", "00:00:05", "00:01:00"),
            Err(ConfigError::Threshold(_))
        ));
        assert!(matches!(
            MonitorConfig::parse("500MB", "soon", "00:01:00"),
            Err(ConfigError::CheckInterval(_))
        ));
        assert!(matches!(
            MonitorConfig::parse("500MB", "00:00:05", ""),
            Err(ConfigError::MinLogInterval(_))
        ));
        assert!(matches!(
            MonitorConfig::parse("0", "00:00:05", "00:01:00"),
            Err(ConfigError::Zero("threshold"))
        ));
        assert!(matches!(
            MonitorConfig::parse("500MB", "00:00:00", "00:01:00"),
            Err(ConfigError::Zero("check_interval"))
        ));
    }

    #[test]
    fn deserializes_both_wire_shapes() {
        let config: MonitorConfig = serde_json::from_value(serde_json::json!({
            "threshold": "100MB",
            "check_interval": "00:00:05",
            "min_log_interval": 60_000,
        }))
        .unwrap();
        assert_eq!(config.threshold_bytes(), 100 * 1024 * 1024);
        assert_eq!(config.check_interval(), Duration::from_secs(5));
        assert_eq!(config.min_log_interval(), Duration::from_secs(60));

        let config: MonitorConfig = serde_json::from_value(serde_json::json!({
            "threshold": 1024,
            "check_interval": "5s",
            "min_log_interval": "1m",
        }))
        .unwrap();
        assert_eq!(config.threshold_bytes(), 1024);
        assert_eq!(config.min_log_interval(), Duration::from_secs(60));
    }

    #[test]
    fn deserialization_enforces_the_invariants() {
        let result: Result<MonitorConfig, _> = serde_json::from_value(serde_json::json!({
            "threshold": 0,
            "check_interval": "5s",
            "min_log_interval": "1m",
        }));
        assert!(result.is_err());
    }
}
