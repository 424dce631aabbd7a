use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use sentinel_monitor::{EndpointReport, EndpointRole, HttpStatusFetcher, NodeHealthMonitor};

use crate::config_file::Config;
use crate::logging;

#[derive(Debug, Parser)]
pub struct Opts {
    #[clap(long, default_value = "./sentinel.json")]
    config: PathBuf,
}

pub async fn run(opts: &Opts) -> Result<()> {
    let config = Config::from_filepath(&opts.config)?;
    logging::init_logging(None, Some(false), config.log_level.clone())?;
    let monitor_config = config.resolve().context("Invalid config")?;
    if !monitor_config.node_health.is_enabled() {
        println!("No reference endpoints configured, nothing to poll");
        return Ok(());
    }

    let fetcher = HttpStatusFetcher::new(monitor_config.http_timeout)?;
    let mut monitor = NodeHealthMonitor::new(fetcher);
    let alerts = monitor.poll_cycle(&monitor_config.node_health).await;

    println!("Endpoints:");
    for report in monitor.endpoint_reports() {
        println!("  {}", format_report(&report));
    }

    let faulty = monitor.faulty_endpoints();
    if !faulty.is_empty() {
        println!("Faulty:");
        for endpoint in faulty {
            println!("  {}", endpoint.url);
        }
    }

    if alerts.is_empty() {
        println!("No alerts");
    } else {
        println!("Alerts:");
        for alert in alerts {
            println!("  {}", alert);
        }
    }
    Ok(())
}

fn format_report(report: &EndpointReport) -> String {
    let role = match report.endpoint.role {
        EndpointRole::Reference => "reference",
        EndpointRole::Check => "check",
    };
    let state = match report.status {
        _ if report.endpoint.faulty => "faulty".to_string(),
        Some(status) if status.is_synced => format!("height {}", status.latest_height),
        Some(status) => format!("height {} (catching up)", status.latest_height),
        None => "not polled".to_string(),
    };
    format!("{:<9} {} {}", role, report.endpoint.url, state)
}
