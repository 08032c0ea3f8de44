//! Manual override (bypass) tracking

use plugwatch_api::{Device, MainStatus};

/// True while a human has bypassed automatic control of this device
pub fn is_overridden(device: &Device) -> bool {
    device.main_status == MainStatus::On
}
