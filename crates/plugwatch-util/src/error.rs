//! Error types for plugwatch

use thiserror::Error;

use crate::DeviceKey;

/// Core error type for plugwatch operations
#[derive(Debug, Error)]
pub enum PlugwatchError {
    #[error("Device not found: {0}")]
    DeviceNotFound(DeviceKey),

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl PlugwatchError {
    pub fn schedule(msg: impl Into<String>) -> Self {
        Self::InvalidSchedule(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, PlugwatchError>;
