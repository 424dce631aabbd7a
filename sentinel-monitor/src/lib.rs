//! Sentinel monitoring core
//!
//! Watches a CometBFT network from the outside:
//! - tracks consecutive missed blocks per validator and raises rate-limited
//!   `MissedBlocks` / `ValidatorDown` / `ValidatorResolved` alerts
//! - polls RPC endpoints against a reference height, flags lagging,
//!   catching-up and stuck nodes, and quarantines endpoints that fail
//!
//! Alerts go to an `AlertSink`; delivering them anywhere is up to the caller.

pub mod alert;
pub mod config;
pub mod constants;
pub mod error;
pub mod node_health;
pub mod supervisor;
pub mod transport;
pub mod validator;

pub use alert::{AlertEvent, AlertReceiver, AlertSink, Severity};
pub use config::{MonitorConfig, NodeHealthConfig, ValidatorThresholds};
pub use error::{MonitorError, Result};
pub use node_health::{
    EndpointReport, EndpointRole, HttpStatusFetcher, NodeEndpoint, NodeHealthMonitor, NodeStatus,
    StatusFetcher,
};
pub use supervisor::{MonitorSnapshot, MonitorSupervisor};
pub use transport::{BackoffPolicy, CometBftSubscriber};
pub use validator::{BlockSigningEvent, ValidatorMonitor, ValidatorPhase, ValidatorState, ValidatorStatus};
