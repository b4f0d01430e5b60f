// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! YAML configuration for the ingestion pipeline.
//!
//! Every field except the InfluxDB connection has a default, so a minimal
//! file only needs the `influxdb` section.

use crate::banner::{DEFAULT_BANNER_PATTERNS, DEFAULT_BANNER_WINDOW};
use crate::validate::{Bounds, ValidationLimits};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Serial device settings.
    #[serde(default)]
    pub serial: SerialConfig,
    /// InfluxDB connection settings.
    pub influxdb: InfluxDbConfig,
    /// Physical bounds per field class.
    #[serde(default)]
    pub validation: ValidationLimits,
    /// Offline buffer settings.
    #[serde(default)]
    pub buffer: BufferConfig,
    /// Loop timing and error thresholds.
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Serial device configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path (e.g., "/dev/ttyACM0").
    pub port: String,
    pub baud_rate: u32,
    /// Per-read timeout in milliseconds.
    pub timeout_ms: u64,
    /// Open attempts per connect before giving up.
    pub connect_attempts: u32,
    /// Delay between open attempts in milliseconds.
    pub retry_delay_ms: u64,
    /// Pause between closing and re-opening on reconnect.
    pub reconnect_delay_ms: u64,
    /// Pause after opening before the first read.
    pub settle_ms: u64,
    /// Banner lines tolerated after a (re)connect before data is expected.
    pub banner_window: usize,
    /// Substrings identifying firmware banner lines.
    pub banner_patterns: Vec<String>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyACM0".to_string(),
            baud_rate: 9600,
            timeout_ms: 2000,
            connect_attempts: 3,
            retry_delay_ms: 5000,
            reconnect_delay_ms: 2000,
            settle_ms: 500,
            banner_window: DEFAULT_BANNER_WINDOW,
            banner_patterns: DEFAULT_BANNER_PATTERNS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// InfluxDB v2 connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct InfluxDbConfig {
    /// InfluxDB URL (e.g., "http://localhost:8086").
    pub url: String,
    /// InfluxDB organization.
    pub org: String,
    /// InfluxDB bucket.
    pub bucket: String,
    /// Authentication token.
    pub token: String,
    /// HTTP request timeout in milliseconds.
    #[serde(default = "default_influx_timeout_ms")]
    pub timeout_ms: u64,
    /// Static tags attached to every point.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Measurement names per field set.
    #[serde(default)]
    pub measurements: MeasurementNames,
}

fn default_influx_timeout_ms() -> u64 {
    10_000
}

/// Measurement names written to InfluxDB.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MeasurementNames {
    pub thermocouple: String,
    pub gas: String,
}

impl Default for MeasurementNames {
    fn default() -> Self {
        Self {
            thermocouple: "mpc9601_measure".to_string(),
            gas: "mgs_v2_measure_R".to_string(),
        }
    }
}

/// Offline buffer configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Maximum buffered readings; the oldest is evicted beyond this.
    pub capacity: usize,
    /// Seconds between buffer flush attempts.
    pub flush_interval_secs: u64,
    /// Maximum readings delivered per flush cycle.
    pub flush_batch: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            flush_interval_secs: 60,
            flush_batch: 50,
        }
    }
}

/// Main loop timing and failure escalation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Sleep when no line is available, in milliseconds.
    pub poll_interval_ms: u64,
    /// Seconds between sink reachability checks.
    pub reachability_interval_secs: u64,
    /// Timeout of a single reachability check, in milliseconds.
    pub reachability_timeout_ms: u64,
    /// Consecutive rejected lines that force a device reconnect.
    pub parse_error_threshold: u32,
    /// Consecutive device I/O errors that force a device reconnect.
    pub io_error_threshold: u32,
    /// Sleep after a device I/O error, in milliseconds.
    pub io_error_backoff_ms: u64,
    /// Delivery attempts per reading on protocol-level rejection.
    pub write_attempts: u32,
    /// Delay between delivery attempts, in milliseconds.
    pub write_retry_delay_ms: u64,
    /// Consecutive failed writes after which the sink reports `Degraded`.
    pub degraded_after: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            reachability_interval_secs: 30,
            reachability_timeout_ms: 5000,
            parse_error_threshold: 10,
            io_error_threshold: 3,
            io_error_backoff_ms: 2000,
            write_attempts: 3,
            write_retry_delay_ms: 1000,
            degraded_after: 3,
        }
    }
}

impl Config {
    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.serial.port.is_empty() {
            return Err(ConfigError::Invalid("serial.port is empty".into()));
        }
        if self.serial.connect_attempts == 0 {
            return Err(ConfigError::Invalid(
                "serial.connect_attempts must be at least 1".into(),
            ));
        }
        if reqwest::Url::parse(&self.influxdb.url).is_err() {
            return Err(ConfigError::Invalid(format!(
                "influxdb.url is not a valid URL: {}",
                self.influxdb.url
            )));
        }
        if self.buffer.capacity == 0 {
            return Err(ConfigError::Invalid("buffer.capacity must be at least 1".into()));
        }
        if self.buffer.flush_batch == 0 {
            return Err(ConfigError::Invalid(
                "buffer.flush_batch must be at least 1".into(),
            ));
        }

        let p = &self.pipeline;
        for (name, value) in [
            ("pipeline.parse_error_threshold", p.parse_error_threshold),
            ("pipeline.io_error_threshold", p.io_error_threshold),
            ("pipeline.write_attempts", p.write_attempts),
            ("pipeline.degraded_after", p.degraded_after),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be at least 1", name)));
            }
        }

        if p.io_error_threshold >= p.parse_error_threshold {
            return Err(ConfigError::Invalid(format!(
                "pipeline.io_error_threshold ({}) must be lower than pipeline.parse_error_threshold ({})",
                p.io_error_threshold, p.parse_error_threshold
            )));
        }

        let v = &self.validation;
        for (name, bounds) in [
            ("temperature", v.temperature),
            ("adc", v.adc),
            ("gas", v.gas),
        ] {
            check_bounds(name, bounds)?;
        }

        Ok(())
    }
}

fn check_bounds(name: &str, bounds: Bounds) -> Result<(), ConfigError> {
    if !bounds.min.is_finite() || !bounds.max.is_finite() || bounds.min > bounds.max {
        return Err(ConfigError::Invalid(format!(
            "validation.{} bounds are invalid: [{}, {}]",
            name, bounds.min, bounds.max
        )));
    }
    Ok(())
}
