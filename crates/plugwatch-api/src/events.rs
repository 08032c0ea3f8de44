//! Activity events recorded for manual actions

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a person did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    TurnedOn,
    TurnedOff,
    BypassConfirmed,
    BypassReleased,
    ScheduleSet,
    ScheduleRemoved,
    PowerLimitSet,
    GroupUpdated,
}

impl fmt::Display for ActivityAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActivityAction::TurnedOn => "Turned on",
            ActivityAction::TurnedOff => "Turned off",
            ActivityAction::BypassConfirmed => "Bypassed restrictions",
            ActivityAction::BypassReleased => "Released bypass",
            ActivityAction::ScheduleSet => "Set schedule",
            ActivityAction::ScheduleRemoved => "Removed schedule",
            ActivityAction::PowerLimitSet => "Set power limit",
            ActivityAction::GroupUpdated => "Updated combined limit",
        };
        write!(f, "{}", s)
    }
}

/// One entry of the activity log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    /// Who performed the action
    pub actor: String,
    pub action: ActivityAction,
    /// Department / office of the device
    pub location: String,
    /// Display name of the device, or the group's department
    pub appliance: String,
    pub timestamp: DateTime<Local>,
}

impl ActivityEvent {
    pub fn new(
        actor: impl Into<String>,
        action: ActivityAction,
        location: impl Into<String>,
        appliance: impl Into<String>,
        timestamp: DateTime<Local>,
    ) -> Self {
        Self {
            actor: actor.into(),
            action,
            location: location.into(),
            appliance: appliance.into(),
            timestamp,
        }
    }
}
