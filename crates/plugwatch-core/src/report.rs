//! Results of one reconciliation tick

use chrono::{DateTime, Local};
use plugwatch_util::{DeviceKey, TickId};
use std::fmt;

/// Which precedence rule decided a device's desired state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionReason {
    /// Unplug detected, or still flagged
    Unplugged,
    /// Manual override latched; nothing automatic happens
    Overridden,
    /// Schedule window closed for the day
    ScheduleEnded,
    /// Combined group limit reached
    GroupLimitReached,
    /// Individual limit reached
    IndividualLimitReached,
    /// Schedule window decides
    Schedule,
    /// No usable schedule; last known state is kept
    NoSchedule,
}

impl DecisionReason {
    /// Reasons that hold a device off regardless of what an operator wants
    pub fn holds_off(&self) -> bool {
        matches!(
            self,
            DecisionReason::Unplugged
                | DecisionReason::ScheduleEnded
                | DecisionReason::GroupLimitReached
                | DecisionReason::IndividualLimitReached
        )
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DecisionReason::Unplugged => "device is unplugged",
            DecisionReason::Overridden => "manual override is active",
            DecisionReason::ScheduleEnded => "schedule has ended for today",
            DecisionReason::GroupLimitReached => "combined limit reached",
            DecisionReason::IndividualLimitReached => "power limit reached",
            DecisionReason::Schedule => "outside scheduled hours",
            DecisionReason::NoSchedule => "no schedule",
        };
        write!(f, "{}", s)
    }
}

/// What happened to one device during a tick
#[derive(Debug, Clone, PartialEq)]
pub enum OutcomeStatus {
    /// Already converged
    Unchanged,
    /// All planned writes succeeded
    Written { writes: usize },
    /// A control change was held back by the debouncer
    Debounced,
    /// A write failed; later writes for this device were not attempted
    Failed { applied: usize, error: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceOutcome {
    pub key: DeviceKey,
    pub reason: DecisionReason,
    pub status: OutcomeStatus,
}

/// Summary of one tick, used for logging and tests
#[derive(Debug, Clone)]
pub struct TickReport {
    pub tick_id: TickId,
    pub started_at: DateTime<Local>,
    /// Set when the snapshot could not be read and nothing was evaluated
    pub skipped: Option<String>,
    pub devices_examined: usize,
    pub writes_issued: usize,
    pub writes_failed: usize,
    pub gate_writes: usize,
    pub outcomes: Vec<DeviceOutcome>,
}

impl TickReport {
    pub fn new(tick_id: TickId, started_at: DateTime<Local>) -> Self {
        Self {
            tick_id,
            started_at,
            skipped: None,
            devices_examined: 0,
            writes_issued: 0,
            writes_failed: 0,
            gate_writes: 0,
            outcomes: Vec::new(),
        }
    }

    pub fn skip(mut self, reason: impl Into<String>) -> Self {
        self.skipped = Some(reason.into());
        self
    }

    pub fn is_skipped(&self) -> bool {
        self.skipped.is_some()
    }

    pub fn outcome(&self, key: &str) -> Option<&DeviceOutcome> {
        self.outcomes.iter().find(|o| o.key.as_str() == key)
    }
}
