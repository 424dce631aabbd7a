//! Lifecycle of the monitoring tasks.
//!
//! The supervisor spawns one task per monitor. Each task is the only owner of
//! its monitor state, reads a fresh config snapshot for every event or cycle,
//! and stops when the shared shutdown signal fires.

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::alert::AlertSink;
use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};
use crate::node_health::{EndpointReport, NodeHealthMonitor, StatusFetcher};
use crate::transport::CometBftSubscriber;
use crate::validator::{BlockSigningEvent, ValidatorMonitor, ValidatorStatus};

/// Point-in-time view of both monitors
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorSnapshot {
    pub validators: Vec<ValidatorStatus>,
    pub endpoints: Vec<EndpointReport>,
    /// Completed node poll cycles
    pub poll_cycles: u64,
    /// Highest block event processed
    pub last_block_height: i64,
}

struct MonitorTask {
    name: &'static str,
    handle: JoinHandle<Result<()>>,
}

pub struct MonitorSupervisor {
    config_rx: watch::Receiver<MonitorConfig>,
    sink: AlertSink,
    shutdown_tx: broadcast::Sender<()>,
    block_tx: mpsc::Sender<BlockSigningEvent>,
    block_rx: Option<mpsc::Receiver<BlockSigningEvent>>,
    snapshot_tx: Arc<watch::Sender<MonitorSnapshot>>,
    tasks: Vec<MonitorTask>,
}

impl MonitorSupervisor {
    pub fn new(config_rx: watch::Receiver<MonitorConfig>, sink: AlertSink) -> Self {
        let capacity = config_rx.borrow().block_queue_capacity.max(1);
        let (block_tx, block_rx) = mpsc::channel(capacity);
        let (shutdown_tx, _) = broadcast::channel(1);
        let (snapshot_tx, _) = watch::channel(MonitorSnapshot::default());
        Self {
            config_rx,
            sink,
            shutdown_tx,
            block_tx,
            block_rx: Some(block_rx),
            snapshot_tx: Arc::new(snapshot_tx),
            tasks: Vec::new(),
        }
    }

    /// Inbound mailbox of the validator monitor
    pub fn block_sender(&self) -> mpsc::Sender<BlockSigningEvent> {
        self.block_tx.clone()
    }

    pub fn snapshot(&self) -> watch::Receiver<MonitorSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Spawn the validator monitor and node health poller. The current config
    /// snapshot must pass `MonitorConfig::validate`.
    pub fn start<F>(&mut self, fetcher: F) -> Result<()>
    where
        F: StatusFetcher + 'static,
    {
        if self.block_rx.is_none() {
            return Err(MonitorError::AlreadyStarted);
        }
        self.config_rx.borrow().validate()?;
        let block_rx = self.block_rx.take().ok_or(MonitorError::AlreadyStarted)?;

        let handle = tokio::spawn(run_validator_monitor(
            self.config_rx.clone(),
            block_rx,
            self.sink.clone(),
            self.snapshot_tx.clone(),
            self.shutdown_tx.subscribe(),
        ));
        self.tasks.push(MonitorTask { name: "validator monitor", handle });

        let handle = tokio::spawn(run_node_health_monitor(
            self.config_rx.clone(),
            fetcher,
            self.sink.clone(),
            self.snapshot_tx.clone(),
            self.shutdown_tx.subscribe(),
        ));
        self.tasks.push(MonitorTask { name: "node health monitor", handle });

        log::info!("Monitor started");
        Ok(())
    }

    /// Feed the validator monitor from a chain subscription
    pub fn attach_subscriber(&mut self, subscriber: CometBftSubscriber) {
        log::info!("Listening for blocks on {}", subscriber.url());
        let handle = tokio::spawn(subscriber.run(self.block_tx.clone(), self.shutdown_tx.subscribe()));
        self.tasks.push(MonitorTask { name: "block subscription", handle });
    }

    /// Wait until any task exits on its own, returning its result
    pub async fn wait_any(&mut self) -> Result<()> {
        if self.tasks.is_empty() {
            return std::future::pending().await;
        }
        let handles = self.tasks.iter_mut().map(|task| &mut task.handle);
        let (result, index, _) = futures_util::future::select_all(handles).await;
        let task = self.tasks.remove(index);
        log::warn!("{} exited", task.name);
        result?
    }

    /// Signal shutdown and wait for every task to finish
    pub async fn stop(self) -> Result<()> {
        log::info!("Stopping monitor...");
        let _ = self.shutdown_tx.send(());

        let mut outcome = Ok(());
        for task in self.tasks {
            let result = match task.handle.await {
                Ok(result) => result,
                Err(e) => Err(MonitorError::from(e)),
            };
            match result {
                Ok(()) => log::info!("{} stopped", task.name),
                Err(e) => {
                    log::error!("{} failed: {}", task.name, e);
                    if outcome.is_ok() {
                        outcome = Err(e);
                    }
                }
            }
        }
        outcome
    }
}

async fn run_validator_monitor(
    config_rx: watch::Receiver<MonitorConfig>,
    mut block_rx: mpsc::Receiver<BlockSigningEvent>,
    sink: AlertSink,
    snapshot_tx: Arc<watch::Sender<MonitorSnapshot>>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()> {
    let mut monitor = ValidatorMonitor::new();
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                log::info!("Validator monitor shutting down");
                break;
            }
            event = block_rx.recv() => {
                let Some(event) = event else {
                    log::info!("Block event stream closed");
                    break;
                };
                // Runs even with no validators so removed ones are forgotten
                let config = config_rx.borrow().clone();
                let alerts = monitor.on_block_event(&event, &config);
                sink.emit_all(alerts);

                let validators = monitor.statuses();
                snapshot_tx.send_modify(|snapshot| {
                    snapshot.validators = validators;
                    snapshot.last_block_height = snapshot.last_block_height.max(event.height);
                });
            }
        }
    }
    Ok(())
}

async fn run_node_health_monitor<F: StatusFetcher>(
    config_rx: watch::Receiver<MonitorConfig>,
    fetcher: F,
    sink: AlertSink,
    snapshot_tx: Arc<watch::Sender<MonitorSnapshot>>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()> {
    let mut monitor = NodeHealthMonitor::new(fetcher);
    let mut period = config_rx.borrow().poll_interval;
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                log::info!("Node health monitor shutting down");
                break;
            }
            _ = ticker.tick() => {
                let config = config_rx.borrow().clone();
                if config.poll_interval.is_zero() {
                    log::warn!("Ignoring zero poll interval, keeping {:?}", period);
                } else if config.poll_interval != period {
                    log::info!("Poll interval changed from {:?} to {:?}", period, config.poll_interval);
                    period = config.poll_interval;
                    ticker = tokio::time::interval_at(Instant::now() + period, period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                }
                if !config.node_health.is_enabled() {
                    log::debug!("No reference endpoints configured, skipping poll");
                    continue;
                }

                log::debug!("Polling node endpoints");
                let alerts = tokio::select! {
                    _ = shutdown_rx.recv() => {
                        log::info!("Node health monitor shutting down mid-cycle");
                        break;
                    }
                    alerts = monitor.poll_cycle(&config.node_health) => alerts,
                };
                sink.emit_all(alerts);

                let endpoints = monitor.endpoint_reports();
                snapshot_tx.send_modify(|snapshot| {
                    snapshot.endpoints = endpoints;
                    snapshot.poll_cycles += 1;
                });
            }
        }
    }
    Ok(())
}
