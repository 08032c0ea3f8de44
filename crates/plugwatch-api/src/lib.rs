//! Data model for plugwatch
//!
//! This crate defines the records exchanged with the telemetry store:
//! - Devices, schedules, unplug bookkeeping and daily energy logs
//! - Combined (group) limit configuration
//! - Partial field updates written back by the reconciler and operators
//! - Activity events for manual actions

mod events;
mod types;
mod updates;

pub use events::*;
pub use types::*;
pub use updates::*;

/// Sentinel used on the wire for an absent limit
pub const NO_LIMIT: &str = "No Limit";
