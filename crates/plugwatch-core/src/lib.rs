//! Policy reconciliation engine for plugwatch
//!
//! This crate is the heart of plugwatch, containing:
//! - Schedule evaluation with fail-safe fallback
//! - Monthly energy accounting against individual and combined limits
//! - Unplug detection from sensor timestamp staleness
//! - The per-device precedence state machine and its diff-only writer
//! - The periodic scheduler loop and the operator (manual action) surface

mod energy;
mod operator;
mod overrides;
mod reconciler;
mod report;
mod schedule;
mod scheduler;
mod unplug;

pub use energy::*;
pub use operator::*;
pub use overrides::*;
pub use reconciler::*;
pub use report::*;
pub use schedule::*;
pub use scheduler::*;
pub use unplug::*;
