//! Shared utilities for plugwatch
//!
//! This crate provides:
//! - ID types (DeviceKey, Department, TickId)
//! - Time utilities (mock-able wall clock, day masks, schedule time parsing)
//! - Error types
//! - Per-device action debouncing
//! - Default paths for data and config files

mod debounce;
mod error;
mod ids;
mod paths;
mod time;

pub use debounce::*;
pub use error::*;
pub use ids::*;
pub use paths::*;
pub use time::*;
