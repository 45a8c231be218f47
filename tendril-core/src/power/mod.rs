//! Power management
//!
//! - [`battery`] - boot gate and running battery supervision
//! - [`PowerManager`] - idle sleep policy reported in telemetry

pub mod battery;

pub use battery::{
    check_boot_voltage, BatteryMonitor, BatteryParameters, BatteryStatus, BootDecision,
};

use serde_json::Value;
use tendril_protocol::Document;

/// Idle sleep policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerManager {
    sleep_when_idle: bool,
}

impl PowerManager {
    pub fn new(sleep_when_idle: bool) -> Self {
        Self { sleep_when_idle }
    }

    pub fn sleep_when_idle(&self) -> bool {
        self.sleep_when_idle
    }

    /// Fill the `pm` telemetry object
    pub fn populate_telemetry(&self, telemetry: &mut Document) {
        telemetry.insert("sleepWhenIdle".into(), Value::Bool(self.sleep_when_idle));
    }
}
