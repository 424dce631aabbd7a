//! Validated configuration snapshots consumed by the monitors.
//!
//! A `MonitorConfig` is immutable once built. Runtime changes are made by
//! publishing a whole new snapshot, so a single block event or poll cycle
//! always decides against one consistent set of thresholds and endpoints.

use std::time::Duration;

use crate::alert::DEFAULT_ALERT_QUEUE_CAPACITY;
use crate::constants::*;
use crate::error::{MonitorError, Result};

/// Length of a hex-encoded CometBFT validator address
const VALIDATOR_ADDRESS_LEN: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatorThresholds {
    /// Misses tolerated before the first `MissedBlocks` alert
    pub missed_threshold: i64,
    /// Blocks between repeated alerts within one streak
    pub repeat_threshold: i64,
    /// Misses after which the validator is declared down
    pub down_threshold: i64,
}

impl ValidatorThresholds {
    pub fn new(missed_threshold: i64, repeat_threshold: i64) -> Self {
        Self {
            missed_threshold,
            repeat_threshold,
            down_threshold: DEFAULT_DOWN_THRESHOLD,
        }
    }

    pub fn with_down_threshold(mut self, down_threshold: i64) -> Self {
        self.down_threshold = down_threshold;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.missed_threshold < 0 {
            return Err(MonitorError::Config(format!(
                "missed_threshold must not be negative, got {}",
                self.missed_threshold
            )));
        }
        if self.repeat_threshold < 1 {
            return Err(MonitorError::Config(format!(
                "repeat_threshold must be at least 1, got {}",
                self.repeat_threshold
            )));
        }
        if self.down_threshold < 1 {
            return Err(MonitorError::Config(format!(
                "down_threshold must be at least 1, got {}",
                self.down_threshold
            )));
        }
        Ok(())
    }
}

impl Default for ValidatorThresholds {
    fn default() -> Self {
        Self::new(DEFAULT_MISSED_THRESHOLD, DEFAULT_REPEAT_THRESHOLD)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeHealthConfig {
    /// Ground-truth endpoints, tried in order
    pub reference_endpoints: Vec<String>,
    pub check_endpoints: Vec<String>,
    pub lag_threshold: i64,
}

impl NodeHealthConfig {
    pub fn new(reference_endpoints: Vec<String>, check_endpoints: Vec<String>) -> Self {
        Self {
            reference_endpoints,
            check_endpoints,
            lag_threshold: DEFAULT_LAG_THRESHOLD,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.reference_endpoints.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        if self.lag_threshold < 0 {
            return Err(MonitorError::Config(format!(
                "lag_threshold must not be negative, got {}",
                self.lag_threshold
            )));
        }
        if !self.check_endpoints.is_empty() && self.reference_endpoints.is_empty() {
            return Err(MonitorError::Config(
                "check endpoints need at least one reference endpoint".to_string(),
            ));
        }
        for url in self.reference_endpoints.iter().chain(&self.check_endpoints) {
            normalize_endpoint(url)?;
        }
        Ok(())
    }
}

impl Default for NodeHealthConfig {
    fn default() -> Self {
        Self::new(Vec::new(), Vec::new())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// Validator addresses to watch, upper-case hex
    pub validators: Vec<String>,
    pub thresholds: ValidatorThresholds,
    pub node_health: NodeHealthConfig,
    pub poll_interval: Duration,
    pub http_timeout: Duration,
    pub alert_queue_capacity: usize,
    pub block_queue_capacity: usize,
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.validators.is_empty() && !self.node_health.is_enabled() {
            return Err(MonitorError::Config(
                "nothing to monitor: configure validators or reference endpoints".to_string(),
            ));
        }
        for address in &self.validators {
            if normalize_validator_address(address)? != *address {
                return Err(MonitorError::Config(format!(
                    "validator address {} is not normalized",
                    address
                )));
            }
        }
        self.thresholds.validate()?;
        self.node_health.validate()?;
        if self.poll_interval.is_zero() {
            return Err(MonitorError::Config("poll_interval must be positive".to_string()));
        }
        if self.alert_queue_capacity == 0 || self.block_queue_capacity == 0 {
            return Err(MonitorError::Config("queue capacities must be positive".to_string()));
        }
        Ok(())
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            validators: Vec::new(),
            thresholds: ValidatorThresholds::default(),
            node_health: NodeHealthConfig::default(),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            alert_queue_capacity: DEFAULT_ALERT_QUEUE_CAPACITY,
            block_queue_capacity: DEFAULT_BLOCK_QUEUE_CAPACITY,
        }
    }
}

/// Validate a hex validator address and return it upper-cased
pub fn normalize_validator_address(address: &str) -> Result<String> {
    let trimmed = address.trim();
    if trimmed.len() != VALIDATOR_ADDRESS_LEN || !trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(MonitorError::Config(format!(
            "invalid validator address {:?}: expected {} hex characters",
            address, VALIDATOR_ADDRESS_LEN
        )));
    }
    Ok(trimmed.to_ascii_uppercase())
}

/// Validate an HTTP endpoint and strip trailing slashes
pub fn normalize_endpoint(url: &str) -> Result<String> {
    let trimmed = url.trim().trim_end_matches('/');
    let host = trimmed
        .strip_prefix("http://")
        .or_else(|| trimmed.strip_prefix("https://"));
    match host {
        Some(host) if !host.is_empty() => Ok(trimmed.to_string()),
        _ => Err(MonitorError::Config(format!(
            "invalid endpoint {:?}: expected an http(s) URL",
            url
        ))),
    }
}
