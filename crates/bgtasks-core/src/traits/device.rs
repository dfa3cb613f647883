//! Device information trait.

use crate::types::{BatteryState, DeviceMetadata};

pub trait DeviceInfo: Send + Sync {
    /// Charge level in `0.0..=1.0`, or `-1.0` when unknown.
    fn battery_level(&self) -> f32;

    fn battery_state(&self) -> BatteryState;

    fn metadata(&self) -> DeviceMetadata;
}
