//! Writes alerts to the log.

use sentinel_monitor::{AlertEvent, AlertReceiver, Severity};

const ALERT_TARGET: &str = "sentinel::alert";

/// Drain the alert queue until every sink is dropped
pub async fn run(mut alerts: AlertReceiver) {
    while let Some(alert) = alerts.recv().await {
        log_alert(&alert);
    }
    if alerts.dropped() > 0 {
        log::warn!(target: ALERT_TARGET, "{} alerts were lost to queue overflow", alerts.dropped());
    }
    log::debug!("Alert notifier stopped");
}

pub fn log_alert(alert: &AlertEvent) {
    match alert.severity() {
        Severity::Critical => log::error!(target: ALERT_TARGET, "{}", alert),
        Severity::Warning => log::warn!(target: ALERT_TARGET, "{}", alert),
        Severity::Info => log::info!(target: ALERT_TARGET, "{}", alert),
    }
}
