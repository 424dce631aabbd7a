mod common;

use common::{Reply, ScriptedFetcher};
use sentinel_monitor::{
    AlertEvent, EndpointRole, HttpStatusFetcher, MonitorError, NodeHealthConfig, NodeHealthMonitor,
    NodeStatus, StatusFetcher,
};
use std::time::Duration;

const REF: &str = "http://reference:26657";
const REF_BACKUP: &str = "http://reference-backup:26657";
const CHECK: &str = "http://check:26657";
const CHECK_2: &str = "http://check-2:26657";

fn health_config(references: &[&str], checks: &[&str]) -> NodeHealthConfig {
    NodeHealthConfig::new(
        references.iter().map(|s| s.to_string()).collect(),
        checks.iter().map(|s| s.to_string()).collect(),
    )
}

#[tokio::test]
async fn stuck_check_endpoint_alerts_once_and_is_never_polled_again() {
    let fetcher = ScriptedFetcher::new()
        .script(REF, vec![Reply::Height(100), Reply::Height(101), Reply::Height(102)])
        .script(CHECK, vec![Reply::Height(90), Reply::Height(90), Reply::Height(95)]);
    let config = health_config(&[REF], &[CHECK]);
    let mut monitor = NodeHealthMonitor::new(fetcher);

    assert!(monitor.poll_cycle(&config).await.is_empty());

    let alerts = monitor.poll_cycle(&config).await;
    assert_eq!(alerts, vec![AlertEvent::node(format!("Alert: Node {} is stuck.", CHECK))]);

    assert!(monitor.poll_cycle(&config).await.is_empty());
    assert_eq!(monitor.fetcher().calls(CHECK), 2);
    assert_eq!(monitor.fetcher().calls(REF), 3);

    let faulty = monitor.faulty_endpoints();
    assert_eq!(faulty.len(), 1);
    assert_eq!(faulty[0].url, CHECK);
    assert_eq!(faulty[0].role, EndpointRole::Check);
}

#[tokio::test]
async fn check_ahead_of_reference_is_log_only() {
    let fetcher = ScriptedFetcher::new()
        .script(REF, vec![Reply::Height(1000), Reply::Height(1010)])
        .script(CHECK, vec![Reply::Height(1003), Reply::Height(1012)])
        .script(CHECK_2, vec![Reply::Height(990), Reply::Height(1001)]);
    let config = health_config(&[REF], &[CHECK, CHECK_2]);
    let mut monitor = NodeHealthMonitor::new(fetcher);

    assert!(monitor.poll_cycle(&config).await.is_empty());
    assert!(monitor.poll_cycle(&config).await.is_empty());
    assert!(monitor.faulty_endpoints().is_empty());
}

#[tokio::test]
async fn lagging_check_endpoint_raises_one_alert() {
    let fetcher = ScriptedFetcher::new()
        .script(REF, vec![Reply::Height(1000)])
        .script(CHECK, vec![Reply::Height(949)])
        .script(CHECK_2, vec![Reply::Height(950)]);
    let config = health_config(&[REF], &[CHECK, CHECK_2]);
    let mut monitor = NodeHealthMonitor::new(fetcher);

    let alerts = monitor.poll_cycle(&config).await;
    assert_eq!(
        alerts,
        vec![AlertEvent::node(format!(
            "Alert: Node {} is behind by more than 50 blocks. Latest block height: 949, Reference block height: 1000",
            CHECK
        ))]
    );
}

#[tokio::test]
async fn catching_up_alerts_regardless_of_height() {
    let fetcher = ScriptedFetcher::new()
        .script(REF, vec![Reply::Height(500)])
        .script(CHECK, vec![Reply::CatchingUp(520)])
        .script(CHECK_2, vec![Reply::CatchingUp(400)]);
    let config = health_config(&[REF], &[CHECK, CHECK_2]);
    let mut monitor = NodeHealthMonitor::new(fetcher);

    let alerts = monitor.poll_cycle(&config).await;
    assert_eq!(alerts.len(), 3);
    assert_eq!(alerts[0], AlertEvent::node(format!("Alert: Node {} is catching up.", CHECK)));
    assert!(alerts[1].to_string().contains("is behind by more than 50 blocks"));
    assert_eq!(alerts[2], AlertEvent::node(format!("Alert: Node {} is catching up.", CHECK_2)));

    let reports = monitor.endpoint_reports();
    let check = reports.iter().find(|r| r.endpoint.url == CHECK).unwrap();
    assert_eq!(check.status, Some(NodeStatus { latest_height: 520, is_synced: false }));
}

#[tokio::test]
async fn failing_check_endpoint_is_quarantined_silently() {
    let fetcher = ScriptedFetcher::new()
        .script(REF, vec![Reply::Height(10), Reply::Height(11)])
        .script(CHECK, vec![Reply::Fail, Reply::Height(11)]);
    let config = health_config(&[REF], &[CHECK]);
    let mut monitor = NodeHealthMonitor::new(fetcher);

    assert!(monitor.poll_cycle(&config).await.is_empty());
    assert!(monitor.poll_cycle(&config).await.is_empty());
    assert_eq!(monitor.fetcher().calls(CHECK), 1);
    assert_eq!(monitor.faulty_endpoints()[0].url, CHECK);
}

#[tokio::test]
async fn no_reference_aborts_the_cycle() {
    let fetcher = ScriptedFetcher::new()
        .script(REF, vec![Reply::Fail])
        .script(REF_BACKUP, vec![Reply::Fail])
        .script(CHECK, vec![Reply::Height(10)]);
    let config = health_config(&[REF, REF_BACKUP], &[CHECK]);
    let mut monitor = NodeHealthMonitor::new(fetcher);

    let expected = vec![AlertEvent::node(
        "Alert: No available reference endpoints found. Cannot check node status.",
    )];
    assert_eq!(monitor.poll_cycle(&config).await, expected);
    assert_eq!(monitor.fetcher().calls(CHECK), 0);

    // Quarantined references are not retried, the alert repeats every cycle
    assert_eq!(monitor.poll_cycle(&config).await, expected);
    assert_eq!(monitor.fetcher().calls(REF), 1);
    assert_eq!(monitor.fetcher().calls(REF_BACKUP), 1);
    assert!(monitor.active_references().is_empty());
}

#[tokio::test]
async fn failing_reference_falls_back_to_the_next_one() {
    let fetcher = ScriptedFetcher::new()
        .script(REF, vec![Reply::Fail])
        .script(REF_BACKUP, vec![Reply::Height(300)])
        .script(CHECK, vec![Reply::Height(200)]);
    let config = health_config(&[REF, REF_BACKUP], &[CHECK]);
    let mut monitor = NodeHealthMonitor::new(fetcher);

    let alerts = monitor.poll_cycle(&config).await;
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].to_string().contains("Reference block height: 300"));
    assert_eq!(monitor.active_references(), vec![REF_BACKUP.to_string()]);
}

#[tokio::test]
async fn stuck_reference_is_removed_from_the_reference_set() {
    let fetcher = ScriptedFetcher::new()
        .script(REF, vec![Reply::Height(100)])
        .script(REF_BACKUP, vec![Reply::Height(102), Reply::Height(103)])
        .script(CHECK, vec![Reply::Height(99), Reply::Height(100), Reply::Height(101)]);
    let config = health_config(&[REF, REF_BACKUP], &[CHECK]);
    let mut monitor = NodeHealthMonitor::new(fetcher);

    assert!(monitor.poll_cycle(&config).await.is_empty());
    let alerts = monitor.poll_cycle(&config).await;
    assert_eq!(alerts, vec![AlertEvent::node(format!("Alert: Reference node {} is stuck.", REF))]);
    assert_eq!(monitor.active_references(), vec![REF_BACKUP.to_string()]);

    assert!(monitor.poll_cycle(&config).await.is_empty());
    assert_eq!(monitor.fetcher().calls(REF), 2);
    assert_eq!(monitor.fetcher().calls(REF_BACKUP), 1);
}

#[tokio::test]
async fn removed_endpoints_are_forgotten() {
    let fetcher = ScriptedFetcher::new()
        .script(REF, vec![Reply::Height(1), Reply::Height(2)])
        .script(CHECK, vec![Reply::Height(1)])
        .script(CHECK_2, vec![Reply::Height(1), Reply::Height(2)]);
    let mut monitor = NodeHealthMonitor::new(fetcher);

    monitor.poll_cycle(&health_config(&[REF], &[CHECK, CHECK_2])).await;
    monitor.poll_cycle(&health_config(&[REF], &[CHECK_2])).await;

    let urls: Vec<_> = monitor.endpoint_reports().into_iter().map(|r| r.endpoint.url).collect();
    assert_eq!(urls, vec![REF.to_string(), CHECK_2.to_string()]);
    assert_eq!(monitor.fetcher().calls(CHECK), 1);
}

#[tokio::test]
async fn http_fetcher_reads_cometbft_status() {
    use warp::Filter;

    let healthy = warp::path!("status").map(|| {
        warp::reply::json(&serde_json::json!({
            "jsonrpc": "2.0",
            "id": -1,
            "result": {"sync_info": {"latest_block_height": "1234", "catching_up": false}}
        }))
    });
    let broken = warp::path!("broken" / "status")
        .map(|| warp::reply::with_status("unavailable", warp::http::StatusCode::SERVICE_UNAVAILABLE));
    let garbage = warp::path!("garbage" / "status").map(|| "<html>not json</html>");
    let (addr, server) = warp::serve(healthy.or(broken).or(garbage)).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);

    let fetcher = HttpStatusFetcher::new(Duration::from_secs(2)).unwrap();
    let base = format!("http://{}", addr);

    let status = fetcher.fetch_status(&base).await.unwrap();
    assert_eq!(status, NodeStatus { latest_height: 1234, is_synced: true });

    assert!(matches!(
        fetcher.fetch_status(&format!("{}/broken", base)).await,
        Err(MonitorError::Status { status: 503, .. })
    ));
    assert!(matches!(
        fetcher.fetch_status(&format!("{}/garbage", base)).await,
        Err(MonitorError::Decode { .. })
    ));

    let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let closed_addr = closed.local_addr().unwrap();
    drop(closed);
    assert!(matches!(
        fetcher.fetch_status(&format!("http://{}", closed_addr)).await,
        Err(MonitorError::Http { .. })
    ));
}
