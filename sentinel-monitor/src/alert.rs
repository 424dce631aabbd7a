//! Alert events and the outbound alert sink.
//!
//! The sink is a bounded broadcast queue. Emitting never blocks: when a
//! consumer falls behind, the oldest queued alerts are overwritten and the
//! consumer is told how many it lost. Alerts are advisory, so a slow notifier
//! must never stall block processing.

use serde::Serialize;
use std::fmt;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

/// Default number of alerts buffered for each consumer
pub const DEFAULT_ALERT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertEvent {
    MissedBlocks {
        validator: String,
        missed_count: i64,
        since_height: i64,
    },
    ValidatorDown {
        validator: String,
        missed_count: i64,
        since_height: i64,
    },
    ValidatorResolved {
        validator: String,
        height: i64,
    },
    NodeAlert {
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl AlertEvent {
    pub fn node(message: impl Into<String>) -> Self {
        AlertEvent::NodeAlert { message: message.into() }
    }

    pub fn severity(&self) -> Severity {
        match self {
            AlertEvent::ValidatorResolved { .. } => Severity::Info,
            AlertEvent::MissedBlocks { .. } | AlertEvent::NodeAlert { .. } => Severity::Warning,
            AlertEvent::ValidatorDown { .. } => Severity::Critical,
        }
    }

    /// Validator address the alert concerns, if any
    pub fn validator(&self) -> Option<&str> {
        match self {
            AlertEvent::MissedBlocks { validator, .. }
            | AlertEvent::ValidatorDown { validator, .. }
            | AlertEvent::ValidatorResolved { validator, .. } => Some(validator),
            AlertEvent::NodeAlert { .. } => None,
        }
    }
}

impl fmt::Display for AlertEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertEvent::MissedBlocks { validator, missed_count, since_height } => write!(
                f,
                "Validator {} missed {} consecutive blocks from height {}!",
                validator, missed_count, since_height
            ),
            AlertEvent::ValidatorDown { validator, missed_count, since_height } => write!(
                f,
                "URGENT!! Validator {} down for {} blocks from height {}!",
                validator, missed_count, since_height
            ),
            AlertEvent::ValidatorResolved { validator, height } => write!(
                f,
                "Validator {} is back online and signed block at height {}.",
                validator, height
            ),
            AlertEvent::NodeAlert { message } => write!(f, "{}", message),
        }
    }
}

/// Write side of the alert queue. Cheap to clone; every monitor task holds one.
#[derive(Debug, Clone)]
pub struct AlertSink {
    tx: broadcast::Sender<AlertEvent>,
}

impl AlertSink {
    /// Create a sink holding at most `capacity` undelivered alerts per consumer
    pub fn new(capacity: usize) -> (Self, AlertReceiver) {
        let (tx, rx) = broadcast::channel(capacity.max(1));
        (Self { tx }, AlertReceiver::new(rx))
    }

    pub fn emit(&self, alert: AlertEvent) {
        log::debug!("Emitting alert: {}", alert);
        if let Err(broadcast::error::SendError(alert)) = self.tx.send(alert) {
            log::warn!("No alert consumer attached, dropping: {}", alert);
        }
    }

    pub fn emit_all(&self, alerts: impl IntoIterator<Item = AlertEvent>) {
        for alert in alerts {
            self.emit(alert);
        }
    }

    /// Attach another consumer; it only sees alerts emitted from now on
    pub fn subscribe(&self) -> AlertReceiver {
        AlertReceiver::new(self.tx.subscribe())
    }
}

/// Read side of the alert queue
#[derive(Debug)]
pub struct AlertReceiver {
    rx: broadcast::Receiver<AlertEvent>,
    dropped: u64,
}

impl AlertReceiver {
    fn new(rx: broadcast::Receiver<AlertEvent>) -> Self {
        Self { rx, dropped: 0 }
    }

    /// Wait for the next alert. Returns `None` once every sink is gone.
    pub async fn recv(&mut self) -> Option<AlertEvent> {
        loop {
            match self.rx.recv().await {
                Ok(alert) => return Some(alert),
                Err(RecvError::Lagged(skipped)) => self.record_overflow(skipped),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next alert if one is queued
    pub fn try_recv(&mut self) -> Option<AlertEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(alert) => return Some(alert),
                Err(TryRecvError::Lagged(skipped)) => self.record_overflow(skipped),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Take everything currently queued
    pub fn drain(&mut self) -> Vec<AlertEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Total alerts lost to queue overflow on this receiver
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn record_overflow(&mut self, skipped: u64) {
        self.dropped += skipped;
        log::warn!(
            "Alert queue overflowed, dropped {} oldest alerts ({} total)",
            skipped,
            self.dropped
        );
    }
}
