use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sentinel_monitor::config::{normalize_endpoint, normalize_validator_address};
use sentinel_monitor::constants::*;
use sentinel_monitor::{MonitorConfig, NodeHealthConfig, ValidatorThresholds};

#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
pub struct Config {
    /// RPC endpoint whose websocket feeds the validator monitor
    pub rpc_endpoint: Option<String>,
    pub validators: Option<Vec<String>>,
    pub missed_threshold: Option<i64>,
    pub repeat_threshold: Option<i64>,
    pub down_threshold: Option<i64>,
    pub lag_threshold: Option<i64>,
    pub reference_endpoints: Option<Vec<String>>,
    pub check_endpoints: Option<Vec<String>>,
    pub poll_interval_secs: Option<u64>,
    pub http_timeout_secs: Option<u64>,
    pub alert_queue_capacity: Option<usize>,
    pub block_queue_capacity: Option<usize>,
    pub logs_path: Option<PathBuf>,
    pub logs_enabled: Option<bool>,
    pub log_level: Option<String>,
}

impl Config {
    pub fn from_filepath(path: &Path) -> Result<Config> {
        let file = fs::File::open(path)
            .with_context(|| format!("Failed to open config file {}", path.display()))?;
        let mut config: Config = serde_json::from_reader(file)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        if let Some(logs_path) = config.logs_path.take() {
            let config_dir = match path.parent() {
                Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
                _ => PathBuf::from("."),
            };
            config.logs_path = Some(to_absolute_path(&config_dir, &logs_path)?);
        }

        Ok(config)
    }

    /// Starter config pointing at a local node
    pub fn template() -> Config {
        Config {
            rpc_endpoint: Some("http://localhost:26657".to_string()),
            validators: Some(Vec::new()),
            missed_threshold: Some(DEFAULT_MISSED_THRESHOLD),
            repeat_threshold: Some(DEFAULT_REPEAT_THRESHOLD),
            down_threshold: Some(DEFAULT_DOWN_THRESHOLD),
            lag_threshold: Some(DEFAULT_LAG_THRESHOLD),
            reference_endpoints: Some(vec!["http://localhost:26657".to_string()]),
            check_endpoints: Some(Vec::new()),
            poll_interval_secs: Some(DEFAULT_POLL_INTERVAL_SECS),
            http_timeout_secs: Some(DEFAULT_HTTP_TIMEOUT_SECS),
            alert_queue_capacity: None,
            block_queue_capacity: None,
            logs_path: None,
            logs_enabled: Some(false),
            log_level: Some("info".to_string()),
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
        }
        let file = fs::File::create(path)
            .with_context(|| format!("Failed to create config file {}", path.display()))?;
        serde_json::to_writer_pretty(file, self).context("Failed to write config file")?;
        Ok(())
    }

    /// Normalized websocket source, if one is configured
    pub fn rpc_endpoint(&self) -> Result<Option<String>> {
        self.rpc_endpoint
            .as_deref()
            .map(normalize_endpoint)
            .transpose()
            .context("Invalid rpc_endpoint")
    }

    /// Fill defaults, normalize addresses and URLs, and validate
    pub fn resolve(&self) -> Result<MonitorConfig> {
        let mut validators: Vec<String> = Vec::new();
        for address in self.validators.iter().flatten() {
            let address = normalize_validator_address(address)?;
            if !validators.contains(&address) {
                validators.push(address);
            }
        }
        if !validators.is_empty() && self.rpc_endpoint()?.is_none() {
            bail!("validators are configured but rpc_endpoint is not set");
        }

        let thresholds = ValidatorThresholds::new(
            self.missed_threshold.unwrap_or(DEFAULT_MISSED_THRESHOLD),
            self.repeat_threshold.unwrap_or(DEFAULT_REPEAT_THRESHOLD),
        )
        .with_down_threshold(self.down_threshold.unwrap_or(DEFAULT_DOWN_THRESHOLD));

        let mut node_health = NodeHealthConfig::new(
            normalize_endpoints(self.reference_endpoints.as_deref())?,
            normalize_endpoints(self.check_endpoints.as_deref())?,
        );
        if let Some(lag_threshold) = self.lag_threshold {
            node_health.lag_threshold = lag_threshold;
        }

        let defaults = MonitorConfig::default();
        let config = MonitorConfig {
            validators,
            thresholds,
            node_health,
            poll_interval: self
                .poll_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
            http_timeout: self
                .http_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.http_timeout),
            alert_queue_capacity: self.alert_queue_capacity.unwrap_or(defaults.alert_queue_capacity),
            block_queue_capacity: self.block_queue_capacity.unwrap_or(defaults.block_queue_capacity),
        };
        config.validate()?;
        Ok(config)
    }
}

fn normalize_endpoints(urls: Option<&[String]>) -> Result<Vec<String>> {
    let mut normalized: Vec<String> = Vec::new();
    for url in urls.unwrap_or_default() {
        let url = normalize_endpoint(url)?;
        if !normalized.contains(&url) {
            normalized.push(url);
        }
    }
    Ok(normalized)
}

pub fn read_or_create_config(path: &Path) -> Result<Config> {
    if path.exists() {
        Config::from_filepath(path)
    } else {
        let config = Config::template();
        config.write(path)?;
        Ok(config)
    }
}

pub fn to_absolute_path(base_dir: &Path, path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let base_dir = base_dir
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", base_dir.display()))?;
    Ok(base_dir.join(path))
}
