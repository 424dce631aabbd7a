use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::watch;

use sentinel_monitor::{AlertSink, CometBftSubscriber, HttpStatusFetcher, MonitorConfig, MonitorSupervisor};

use crate::config_file::{self, Config};
use crate::logging;
use crate::notifier;

#[derive(Debug, Parser)]
pub struct Opts {
    #[clap(long, default_value = "./sentinel.json")]
    config: PathBuf,
}

pub async fn run(opts: &Opts) -> Result<()> {
    let config = config_file::read_or_create_config(&opts.config).context("Failed to read config")?;
    logging::init_logging(config.logs_path.clone(), config.logs_enabled, config.log_level.clone())?;

    let monitor_config = config.resolve().context("Invalid config")?;
    let rpc_endpoint = config.rpc_endpoint()?;
    log::info!(
        "Watching {} validators, {} reference and {} check endpoints",
        monitor_config.validators.len(),
        monitor_config.node_health.reference_endpoints.len(),
        monitor_config.node_health.check_endpoints.len()
    );

    let (sink, alerts) = AlertSink::new(monitor_config.alert_queue_capacity);
    let notifier = tokio::spawn(notifier::run(alerts));

    let fetcher = HttpStatusFetcher::new(monitor_config.http_timeout)?;
    let (config_tx, config_rx) = watch::channel(monitor_config);
    let mut supervisor = MonitorSupervisor::new(config_rx, sink);
    supervisor.start(fetcher)?;
    if let Some(rpc_endpoint) = &rpc_endpoint {
        supervisor.attach_subscriber(CometBftSubscriber::new(rpc_endpoint)?);
    }

    #[cfg(unix)]
    let reloader = spawn_reload_on_hangup(opts.config.clone(), rpc_endpoint, config_tx)?;
    #[cfg(not(unix))]
    let _config_tx = config_tx;

    let outcome = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for ctrl-c")?;
            log::info!("Received ctrl-c, shutting down");
            Ok(())
        }
        result = supervisor.wait_any() => result,
    };

    #[cfg(unix)]
    reloader.abort();
    let stopped = supervisor.stop().await;
    notifier.await.context("Alert notifier panicked")?;

    outcome.context("Monitor task failed")?;
    stopped.context("Monitor did not stop cleanly")?;
    log::info!("Monitor stopped");
    Ok(())
}

/// Re-read and publish the config file on every SIGHUP
#[cfg(unix)]
fn spawn_reload_on_hangup(
    path: PathBuf,
    rpc_endpoint: Option<String>,
    config_tx: watch::Sender<MonitorConfig>,
) -> Result<tokio::task::JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;
    Ok(tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            log::info!("Received SIGHUP, reloading {}", path.display());
            match reload(&path) {
                Ok((config, reloaded_rpc)) => {
                    if reloaded_rpc != rpc_endpoint {
                        log::warn!("rpc_endpoint changes take effect after a restart");
                    }
                    if config_tx.send(config).is_err() {
                        break;
                    }
                    log::info!("Config reloaded");
                }
                Err(e) => log::error!("Keeping current config, reload failed: {:#}", e),
            }
        }
    }))
}

#[cfg(unix)]
fn reload(path: &std::path::Path) -> Result<(MonitorConfig, Option<String>)> {
    let config = Config::from_filepath(path)?;
    Ok((config.resolve()?, config.rpc_endpoint()?))
}
