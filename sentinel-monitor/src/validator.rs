//! Validator uptime tracking.
//!
//! Each monitored validator has a `ValidatorState` driven by one block
//! signing event at a time:
//!
//! ```text
//! Healthy -> Missing -> AlertedMissing -> Down -> Healthy
//!               \             \______________________/^
//!                \____________________________________/
//! ```
//!
//! Only a validator that reached `Down` produces a `ValidatorResolved` alert
//! when it signs again. Events must arrive in non-decreasing height order;
//! reordering is the transport's responsibility.

use std::collections::{HashMap, HashSet};

use crate::alert::AlertEvent;
use crate::config::{MonitorConfig, ValidatorThresholds};

/// Signers of one committed block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSigningEvent {
    pub height: i64,
    pub signers: HashSet<String>,
}

impl BlockSigningEvent {
    /// Build an event, upper-casing signer addresses so lookups ignore case
    pub fn new<I, S>(height: i64, signers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            height,
            signers: signers
                .into_iter()
                .map(|s| s.as_ref().to_ascii_uppercase())
                .collect(),
        }
    }

    pub fn is_signed_by(&self, validator: &str) -> bool {
        self.signers.contains(validator)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidatorPhase {
    Healthy,
    Missing,
    AlertedMissing,
    Down,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatorState {
    pub missed_blocks: i64,
    pub is_down: bool,
    pub last_missed_alert_height: i64,
    pub last_down_alert_height: i64,
    pub last_signed_height: i64,
    /// First height of the active miss streak, 0 when no streak is active
    pub start_missed_height: i64,
}

impl ValidatorState {
    pub fn phase(&self) -> ValidatorPhase {
        if self.is_down {
            ValidatorPhase::Down
        } else if self.last_missed_alert_height != 0 {
            ValidatorPhase::AlertedMissing
        } else if self.missed_blocks > 0 {
            ValidatorPhase::Missing
        } else {
            ValidatorPhase::Healthy
        }
    }

    /// Apply one block to this validator and return the alerts it triggers
    pub fn on_block_event(
        &mut self,
        height: i64,
        signers: &HashSet<String>,
        validator: &str,
        thresholds: &ValidatorThresholds,
    ) -> Vec<AlertEvent> {
        if signers.contains(validator) {
            self.record_signed(height, validator)
        } else {
            self.record_missed(height, validator, thresholds)
        }
    }

    fn record_signed(&mut self, height: i64, validator: &str) -> Vec<AlertEvent> {
        let mut alerts = Vec::new();
        if self.is_down {
            alerts.push(AlertEvent::ValidatorResolved {
                validator: validator.to_string(),
                height,
            });
            self.is_down = false;
            log::info!("Validator {} is back online at block {}", validator, height);
        }
        self.missed_blocks = 0;
        self.last_missed_alert_height = 0;
        self.last_down_alert_height = 0;
        self.start_missed_height = 0;
        self.last_signed_height = height;
        alerts
    }

    fn record_missed(
        &mut self,
        height: i64,
        validator: &str,
        thresholds: &ValidatorThresholds,
    ) -> Vec<AlertEvent> {
        let mut alerts = Vec::new();
        if self.start_missed_height == 0 {
            self.start_missed_height = height;
        }
        self.missed_blocks += 1;
        log::info!("Validator {} did not sign the block {}", validator, height);

        if !self.is_down && self.missed_blocks > thresholds.missed_threshold {
            if self.last_missed_alert_height == 0
                || height - self.last_missed_alert_height >= thresholds.repeat_threshold
            {
                alerts.push(AlertEvent::MissedBlocks {
                    validator: validator.to_string(),
                    missed_count: self.missed_blocks,
                    since_height: self.start_missed_height,
                });
                self.last_missed_alert_height = height;
            }

            if self.missed_blocks > thresholds.down_threshold {
                alerts.push(self.down_alert(validator));
                self.is_down = true;
                self.last_down_alert_height = height;
            }
        } else if self.is_down && height - self.last_down_alert_height >= thresholds.repeat_threshold {
            // Still down: repeat the alert every `repeat_threshold` blocks
            alerts.push(self.down_alert(validator));
            self.last_down_alert_height = height;
        }
        alerts
    }

    fn down_alert(&self, validator: &str) -> AlertEvent {
        AlertEvent::ValidatorDown {
            validator: validator.to_string(),
            missed_count: self.missed_blocks,
            since_height: self.start_missed_height,
        }
    }
}

/// Read-only view of one validator for status reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorStatus {
    pub address: String,
    pub phase: ValidatorPhase,
    pub missed_blocks: i64,
    pub is_down: bool,
    pub last_signed_height: i64,
}

/// Owns the state of every monitored validator
#[derive(Debug, Default)]
pub struct ValidatorMonitor {
    order: Vec<String>,
    states: HashMap<String, ValidatorState>,
}

impl ValidatorMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a block to every configured validator, in configuration order
    pub fn on_block_event(&mut self, event: &BlockSigningEvent, config: &MonitorConfig) -> Vec<AlertEvent> {
        if event.height <= 0 {
            log::warn!("Ignoring block event with invalid height {}", event.height);
            return Vec::new();
        }
        self.sync_validators(&config.validators);

        let mut alerts = Vec::new();
        for validator in &self.order {
            let state = self.states.entry(validator.clone()).or_default();
            alerts.extend(state.on_block_event(
                event.height,
                &event.signers,
                validator,
                &config.thresholds,
            ));
        }
        alerts
    }

    pub fn state(&self, validator: &str) -> Option<&ValidatorState> {
        self.states.get(validator)
    }

    pub fn statuses(&self) -> Vec<ValidatorStatus> {
        self.order
            .iter()
            .map(|address| {
                let state = self.states.get(address).cloned().unwrap_or_default();
                ValidatorStatus {
                    address: address.clone(),
                    phase: state.phase(),
                    missed_blocks: state.missed_blocks,
                    is_down: state.is_down,
                    last_signed_height: state.last_signed_height,
                }
            })
            .collect()
    }

    /// Forget validators dropped from the config and start new ones healthy
    fn sync_validators(&mut self, validators: &[String]) {
        if self.order == validators {
            return;
        }
        let keep: HashSet<&String> = validators.iter().collect();
        self.states.retain(|address, _| {
            let kept = keep.contains(address);
            if !kept {
                log::info!("Validator {} is no longer monitored", address);
            }
            kept
        });
        for address in validators {
            if !self.states.contains_key(address) {
                log::info!("Monitoring validator {}", address);
                self.states.insert(address.clone(), ValidatorState::default());
            }
        }
        self.order = validators.to_vec();
    }
}
