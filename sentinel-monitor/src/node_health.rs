//! Node health polling.
//!
//! Every cycle resolves a reference height from the first reference endpoint
//! that answers, then compares each check endpoint against it. Any failure to
//! fetch or parse a status quarantines the endpoint for the rest of the
//! process lifetime, as does reporting the same height on two consecutive
//! cycles ("stuck"). Quarantined endpoints are never polled again.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::alert::AlertEvent;
use crate::config::NodeHealthConfig;
use crate::error::{MonitorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointRole {
    Reference,
    Check,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEndpoint {
    pub url: String,
    pub role: EndpointRole,
    /// Set once the endpoint failed or got stuck; never cleared
    pub faulty: bool,
}

impl NodeEndpoint {
    fn new(url: &str, role: EndpointRole) -> Self {
        Self {
            url: url.to_string(),
            role,
            faulty: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeStatus {
    pub latest_height: i64,
    pub is_synced: bool,
}

/// Latest known state of one endpoint, for status reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointReport {
    pub endpoint: NodeEndpoint,
    pub status: Option<NodeStatus>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    result: StatusResult,
}

#[derive(Debug, Deserialize)]
struct StatusResult {
    sync_info: SyncInfo,
}

#[derive(Debug, Deserialize)]
struct SyncInfo {
    latest_block_height: String,
    catching_up: bool,
}

/// Decode a CometBFT `/status` body
pub fn parse_status(url: &str, body: &[u8]) -> Result<NodeStatus> {
    let response: StatusResponse = serde_json::from_slice(body).map_err(|e| MonitorError::Decode {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    let sync_info = response.result.sync_info;
    let latest_height = sync_info
        .latest_block_height
        .trim()
        .parse::<i64>()
        .map_err(|_| MonitorError::InvalidHeight {
            url: url.to_string(),
            value: sync_info.latest_block_height.clone(),
        })?;
    Ok(NodeStatus {
        latest_height,
        is_synced: !sync_info.catching_up,
    })
}

/// Source of node status reports
#[async_trait]
pub trait StatusFetcher: Send + Sync {
    async fn fetch_status(&self, endpoint: &str) -> Result<NodeStatus>;
}

/// Fetches `{endpoint}/status` over HTTP
#[derive(Debug, Clone)]
pub struct HttpStatusFetcher {
    client: reqwest::Client,
}

impl HttpStatusFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MonitorError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl StatusFetcher for HttpStatusFetcher {
    async fn fetch_status(&self, endpoint: &str) -> Result<NodeStatus> {
        let url = format!("{}/status", endpoint);
        let http_error = |source| MonitorError::Http { url: url.clone(), source };

        let response = self.client.get(&url).send().await.map_err(http_error)?;
        if response.status() != reqwest::StatusCode::OK {
            return Err(MonitorError::Status {
                url: url.clone(),
                status: response.status().as_u16(),
            });
        }
        let body = response.bytes().await.map_err(http_error)?;
        parse_status(&url, &body)
    }
}

type EndpointKey = (EndpointRole, String);

pub struct NodeHealthMonitor<F = HttpStatusFetcher> {
    fetcher: F,
    references: Vec<NodeEndpoint>,
    checks: Vec<NodeEndpoint>,
    previous_heights: HashMap<EndpointKey, i64>,
    statuses: HashMap<EndpointKey, NodeStatus>,
}

impl<F: StatusFetcher> NodeHealthMonitor<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            references: Vec::new(),
            checks: Vec::new(),
            previous_heights: HashMap::new(),
            statuses: HashMap::new(),
        }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Run one poll cycle against the given endpoint snapshot
    pub async fn poll_cycle(&mut self, config: &NodeHealthConfig) -> Vec<AlertEvent> {
        self.sync_endpoints(config);
        let mut alerts = Vec::new();

        let Some((reference_url, reference_height)) = self.resolve_reference().await else {
            log::warn!("No available reference endpoints, skipping node status checks");
            alerts.push(AlertEvent::node(
                "Alert: No available reference endpoints found. Cannot check node status.",
            ));
            return alerts;
        };

        alerts.extend(self.check_progress(EndpointRole::Reference, &reference_url, reference_height));

        for index in 0..self.checks.len() {
            if self.checks[index].faulty {
                continue;
            }
            let url = self.checks[index].url.clone();

            let status = match self.fetcher.fetch_status(&url).await {
                Ok(status) => status,
                Err(e) => {
                    log::warn!("Error getting node status for {}: {}", url, e);
                    self.mark_faulty(EndpointRole::Check, &url);
                    continue;
                }
            };
            self.statuses.insert((EndpointRole::Check, url.clone()), status);

            alerts.extend(self.check_progress(EndpointRole::Check, &url, status.latest_height));

            if status.latest_height > reference_height {
                log::warn!(
                    "Reference {} is behind {} by {} blocks",
                    reference_url,
                    url,
                    status.latest_height - reference_height
                );
            } else if reference_height - status.latest_height > config.lag_threshold {
                alerts.push(AlertEvent::node(format!(
                    "Alert: Node {} is behind by more than {} blocks. Latest block height: {}, Reference block height: {}",
                    url, config.lag_threshold, status.latest_height, reference_height
                )));
            }

            if !status.is_synced {
                alerts.push(AlertEvent::node(format!("Alert: Node {} is catching up.", url)));
            }
        }

        alerts
    }

    /// Every configured endpoint with its latest known status
    pub fn endpoint_reports(&self) -> Vec<EndpointReport> {
        self.references
            .iter()
            .chain(&self.checks)
            .map(|endpoint| EndpointReport {
                endpoint: endpoint.clone(),
                status: self
                    .statuses
                    .get(&(endpoint.role, endpoint.url.clone()))
                    .copied(),
            })
            .collect()
    }

    pub fn faulty_endpoints(&self) -> Vec<NodeEndpoint> {
        self.references
            .iter()
            .chain(&self.checks)
            .filter(|endpoint| endpoint.faulty)
            .cloned()
            .collect()
    }

    /// Reference endpoints still eligible to provide the reference height
    pub fn active_references(&self) -> Vec<String> {
        self.references
            .iter()
            .filter(|endpoint| !endpoint.faulty)
            .map(|endpoint| endpoint.url.clone())
            .collect()
    }

    /// First reference endpoint that answers; failing ones are quarantined
    async fn resolve_reference(&mut self) -> Option<(String, i64)> {
        for index in 0..self.references.len() {
            if self.references[index].faulty {
                continue;
            }
            let url = self.references[index].url.clone();
            match self.fetcher.fetch_status(&url).await {
                Ok(status) => {
                    self.statuses.insert((EndpointRole::Reference, url.clone()), status);
                    return Some((url, status.latest_height));
                }
                Err(e) => {
                    log::warn!("Error getting status from reference endpoint {}: {}", url, e);
                    self.mark_faulty(EndpointRole::Reference, &url);
                }
            }
        }
        None
    }

    /// Compare against the previous cycle; an unchanged height means stuck
    fn check_progress(&mut self, role: EndpointRole, url: &str, height: i64) -> Option<AlertEvent> {
        let key = (role, url.to_string());
        match self.previous_heights.get(&key) {
            Some(previous) if *previous == height => {
                if !self.mark_faulty(role, url) {
                    return None;
                }
                let message = match role {
                    EndpointRole::Reference => format!("Alert: Reference node {} is stuck.", url),
                    EndpointRole::Check => format!("Alert: Node {} is stuck.", url),
                };
                Some(AlertEvent::node(message))
            }
            _ => {
                self.previous_heights.insert(key, height);
                None
            }
        }
    }

    /// Quarantine an endpoint; returns true if it was healthy until now
    fn mark_faulty(&mut self, role: EndpointRole, url: &str) -> bool {
        let endpoints = match role {
            EndpointRole::Reference => &mut self.references,
            EndpointRole::Check => &mut self.checks,
        };
        match endpoints.iter_mut().find(|endpoint| endpoint.url == url) {
            Some(endpoint) if !endpoint.faulty => {
                endpoint.faulty = true;
                log::warn!("Marked {:?} endpoint {} as faulty", role, url);
                true
            }
            _ => false,
        }
    }

    /// Align the endpoint tables with the config, keeping quarantine flags
    fn sync_endpoints(&mut self, config: &NodeHealthConfig) {
        sync_role(&mut self.references, &config.reference_endpoints, EndpointRole::Reference);
        sync_role(&mut self.checks, &config.check_endpoints, EndpointRole::Check);

        let references = &self.references;
        let checks = &self.checks;
        let configured = |key: &EndpointKey| {
            let endpoints = match key.0 {
                EndpointRole::Reference => references,
                EndpointRole::Check => checks,
            };
            endpoints.iter().any(|endpoint| endpoint.url == key.1)
        };
        self.previous_heights.retain(|key, _| configured(key));
        self.statuses.retain(|key, _| configured(key));
    }
}

fn sync_role(endpoints: &mut Vec<NodeEndpoint>, urls: &[String], role: EndpointRole) {
    let unchanged = endpoints.len() == urls.len()
        && endpoints.iter().zip(urls).all(|(endpoint, url)| endpoint.url == *url);
    if unchanged {
        return;
    }
    let previous = std::mem::take(endpoints);
    *endpoints = urls
        .iter()
        .map(|url| {
            previous
                .iter()
                .find(|endpoint| endpoint.url == *url)
                .cloned()
                .unwrap_or_else(|| NodeEndpoint::new(url, role))
        })
        .collect();
}
