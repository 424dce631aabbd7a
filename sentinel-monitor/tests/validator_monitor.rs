mod common;

use common::{OTHER_VALIDATOR, VALIDATOR};
use sentinel_monitor::{
    AlertEvent, BlockSigningEvent, MonitorConfig, ValidatorMonitor, ValidatorPhase, ValidatorState,
    ValidatorThresholds,
};

fn config(missed_threshold: i64, repeat_threshold: i64) -> MonitorConfig {
    MonitorConfig {
        validators: vec![VALIDATOR.to_string()],
        thresholds: ValidatorThresholds::new(missed_threshold, repeat_threshold),
        ..MonitorConfig::default()
    }
}

fn signed(height: i64) -> BlockSigningEvent {
    BlockSigningEvent::new(height, [VALIDATOR, OTHER_VALIDATOR])
}

fn missed(height: i64) -> BlockSigningEvent {
    BlockSigningEvent::new(height, [OTHER_VALIDATOR])
}

/// Run events through a fresh monitor, returning (height, alert) pairs
fn replay(events: &[BlockSigningEvent], config: &MonitorConfig) -> (ValidatorMonitor, Vec<(i64, AlertEvent)>) {
    let mut monitor = ValidatorMonitor::new();
    let mut alerts = Vec::new();
    for event in events {
        for alert in monitor.on_block_event(event, config) {
            alerts.push((event.height, alert));
        }
    }
    (monitor, alerts)
}

fn streak(signed_at: i64, misses: i64) -> Vec<BlockSigningEvent> {
    let mut events = vec![signed(signed_at)];
    events.extend((1..=misses).map(|offset| missed(signed_at + offset)));
    events
}

#[test]
fn always_signing_validator_never_alerts() {
    let events: Vec<_> = (1..=500).map(signed).collect();
    let (monitor, alerts) = replay(&events, &config(5, 10));

    assert!(alerts.is_empty());
    let state = monitor.state(VALIDATOR).unwrap();
    assert_eq!(state.missed_blocks, 0);
    assert_eq!(state.last_signed_height, 500);
    assert_eq!(state.phase(), ValidatorPhase::Healthy);
}

#[test]
fn missed_blocks_alert_fires_once_then_repeats_after_interval() {
    // Last signed at 100, so the streak covers 101 onwards
    let (_, alerts) = replay(&streak(100, 15), &config(5, 10));

    let missed_alerts: Vec<_> = alerts
        .iter()
        .filter(|(_, alert)| matches!(alert, AlertEvent::MissedBlocks { .. }))
        .collect();
    assert_eq!(
        missed_alerts,
        vec![&(
            106,
            AlertEvent::MissedBlocks {
                validator: VALIDATOR.to_string(),
                missed_count: 6,
                since_height: 101,
            }
        )]
    );

    let (_, alerts) = replay(&streak(100, 16), &config(5, 10));
    let heights: Vec<i64> = alerts.iter().map(|(height, _)| *height).collect();
    assert_eq!(heights, vec![106, 116]);
    assert_eq!(
        alerts[1].1,
        AlertEvent::MissedBlocks {
            validator: VALIDATOR.to_string(),
            missed_count: 16,
            since_height: 101,
        }
    );
}

#[test]
fn validator_down_fires_once_when_count_exceeds_twenty() {
    let config = config(5, 10);
    let events: Vec<_> = (100..=125).map(missed).collect();
    let (monitor, alerts) = replay(&events, &config);

    let down: Vec<_> = alerts
        .iter()
        .filter(|(_, alert)| matches!(alert, AlertEvent::ValidatorDown { .. }))
        .collect();
    assert_eq!(
        down,
        vec![&(
            120,
            AlertEvent::ValidatorDown {
                validator: VALIDATOR.to_string(),
                missed_count: 21,
                since_height: 100,
            }
        )]
    );

    let state = monitor.state(VALIDATOR).unwrap();
    assert!(state.is_down);
    assert_eq!(state.last_down_alert_height, 120);
    assert_eq!(state.phase(), ValidatorPhase::Down);
}

#[test]
fn missed_alerts_stop_once_down() {
    let events: Vec<_> = (100..=135).map(missed).collect();
    let (_, alerts) = replay(&events, &config(5, 10));

    let expected = vec![
        (105, "missed", 6),
        (115, "missed", 16),
        (120, "down", 21),
        (130, "down", 31),
    ];
    let actual: Vec<_> = alerts
        .iter()
        .map(|(height, alert)| match alert {
            AlertEvent::MissedBlocks { missed_count, .. } => (*height, "missed", *missed_count),
            AlertEvent::ValidatorDown { missed_count, .. } => (*height, "down", *missed_count),
            other => panic!("unexpected alert {:?}", other),
        })
        .collect();
    assert_eq!(actual, expected);
}

#[test]
fn signing_after_down_resolves_and_resets() {
    let mut events: Vec<_> = (100..=124).map(missed).collect();
    events.push(signed(125));
    events.push(signed(126));
    let (monitor, alerts) = replay(&events, &config(5, 10));

    let resolved: Vec<_> = alerts
        .iter()
        .filter(|(_, alert)| matches!(alert, AlertEvent::ValidatorResolved { .. }))
        .collect();
    assert_eq!(
        resolved,
        vec![&(
            125,
            AlertEvent::ValidatorResolved {
                validator: VALIDATOR.to_string(),
                height: 125,
            }
        )]
    );

    assert_eq!(
        monitor.state(VALIDATOR).unwrap(),
        &ValidatorState {
            last_signed_height: 126,
            ..ValidatorState::default()
        }
    );
}

#[test]
fn new_streak_after_resolution_starts_fresh() {
    let mut events: Vec<_> = (100..=120).map(missed).collect();
    events.push(signed(121));
    events.extend((122..=127).map(missed));
    let (monitor, alerts) = replay(&events, &config(5, 10));

    assert_eq!(
        alerts.last().unwrap(),
        &(
            127,
            AlertEvent::MissedBlocks {
                validator: VALIDATOR.to_string(),
                missed_count: 6,
                since_height: 122,
            }
        )
    );
    let state = monitor.state(VALIDATOR).unwrap();
    assert_eq!(state.start_missed_height, 122);
    assert!(!state.is_down);
}

#[test]
fn replaying_the_same_events_is_deterministic() {
    let mut events = Vec::new();
    for height in 1..=400 {
        // Signs in bursts, with two long outages
        let down = (50..90).contains(&height) || (200..260).contains(&height) || height % 17 == 0;
        events.push(if down { missed(height) } else { signed(height) });
    }
    let config = config(3, 7);

    let (first_monitor, first) = replay(&events, &config);
    let (second_monitor, second) = replay(&events, &config);

    assert!(!first.is_empty());
    assert_eq!(first, second);
    assert_eq!(first_monitor.state(VALIDATOR), second_monitor.state(VALIDATOR));
}

#[test]
fn thresholds_follow_each_config_snapshot() {
    let mut config = config(5, 10);
    let mut monitor = ValidatorMonitor::new();
    for height in 1..=3 {
        assert!(monitor.on_block_event(&missed(height), &config).is_empty());
    }

    config.thresholds.missed_threshold = 2;
    let alerts = monitor.on_block_event(&missed(4), &config);
    assert_eq!(
        alerts,
        vec![AlertEvent::MissedBlocks {
            validator: VALIDATOR.to_string(),
            missed_count: 4,
            since_height: 1,
        }]
    );
}
