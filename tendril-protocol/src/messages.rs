//! Outbound messages: boot announcement and telemetry

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use serde::de::{self, Deserializer, Unexpected};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Document;

/// Outcome of peripheral and function construction during boot
///
/// Serialized as its integer value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum InitState {
    /// Every declared peripheral and function was constructed
    Success = 0,
    /// At least one peripheral failed to construct
    PeripheralError = 1,
    /// At least one function failed to construct
    FunctionError = 2,
}

impl InitState {
    /// Get the state as a byte value
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Create a state from a byte value
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(InitState::Success),
            1 => Some(InitState::PeripheralError),
            2 => Some(InitState::FunctionError),
            _ => None,
        }
    }
}

impl fmt::Display for InitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitState::Success => f.write_str("success"),
            InitState::PeripheralError => f.write_str("peripheral-error"),
            InitState::FunctionError => f.write_str("function-error"),
        }
    }
}

impl Serialize for InitState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for InitState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = u8::deserialize(deserializer)?;
        InitState::from_u8(value).ok_or_else(|| {
            de::Error::invalid_value(Unexpected::Unsigned(u64::from(value)), &"0, 1 or 2")
        })
    }
}

/// Construction result of a single peripheral or function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemReport {
    /// Declared factory type
    #[serde(rename = "type")]
    pub type_name: String,
    /// Declared instance name
    pub name: String,
    /// Whether construction succeeded
    pub success: bool,
    /// Failure description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Report of an abnormal termination, carried to the next boot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrashReport {
    /// What brought the device down
    pub reason: String,
    /// Uptime at the moment of the crash
    pub uptime_ms: u64,
}

/// One-shot boot announcement published when bring-up completes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitMessage {
    pub model: String,
    pub instance: String,
    pub mac: String,
    /// Complete device settings document
    pub settings: Document,
    pub version: String,
    pub debug: bool,
    /// Reset reason identifier
    pub reset: String,
    /// Wakeup cause identifier
    pub wakeup: String,
    pub boot_count: u32,
    /// Wall-clock time in seconds since the epoch
    pub time: u64,
    pub state: InitState,
    pub peripherals: Vec<ItemReport>,
    pub functions: Vec<ItemReport>,
    pub sleep_when_idle: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crash: Option<CrashReport>,
}

/// Battery section of a telemetry snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryTelemetry {
    /// Voltage in volts
    pub voltage: f64,
    /// Estimated charge, 0-100
    pub percentage: u8,
    /// Current in milliamps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<i32>,
    /// Seconds until empty
    #[serde(
        rename = "time-to-empty",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub time_to_empty: Option<u32>,
}

/// Heap section of a telemetry snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryTelemetry {
    #[serde(rename = "free-heap")]
    pub free_heap: usize,
    #[serde(rename = "min-heap")]
    pub min_heap: usize,
}

/// Periodic telemetry snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryMessage {
    /// Milliseconds since boot
    pub uptime: u64,
    /// Wall-clock milliseconds since the epoch
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery: Option<BatteryTelemetry>,
    pub wifi: Document,
    pub mqtt: Document,
    pub memory: MemoryTelemetry,
    pub pm: Document,
    /// Per-feature telemetry, one object per feature
    pub features: Vec<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use alloc::vec;
    use serde_json::json;

    fn sample_init() -> InitMessage {
        InitMessage {
            model: "field-node".to_string(),
            instance: "aa:bb:cc:dd:ee:ff".to_string(),
            mac: "aa:bb:cc:dd:ee:ff".to_string(),
            settings: Document::new(),
            version: "0.1.0".to_string(),
            debug: false,
            reset: "power-on".to_string(),
            wakeup: "undefined".to_string(),
            boot_count: 3,
            time: 1_700_000_000,
            state: InitState::PeripheralError,
            peripherals: vec![ItemReport {
                type_name: "valve".to_string(),
                name: "main".to_string(),
                success: false,
                error: Some("missing pin".to_string()),
            }],
            functions: vec![],
            sleep_when_idle: true,
            crash: None,
        }
    }

    #[test]
    fn test_init_state_serializes_as_integer() {
        assert_eq!(serde_json::to_value(InitState::Success).unwrap(), json!(0));
        assert_eq!(
            serde_json::to_value(InitState::FunctionError).unwrap(),
            json!(2)
        );
        let parsed: InitState = serde_json::from_value(json!(1)).unwrap();
        assert_eq!(parsed, InitState::PeripheralError);
        assert!(serde_json::from_value::<InitState>(json!(7)).is_err());
    }

    #[test]
    fn test_init_message_field_names() {
        let value = serde_json::to_value(sample_init()).unwrap();
        assert_eq!(value["bootCount"], json!(3));
        assert_eq!(value["sleepWhenIdle"], json!(true));
        assert_eq!(value["state"], json!(1));
        assert_eq!(value["peripherals"][0]["type"], json!("valve"));
        assert_eq!(value["peripherals"][0]["success"], json!(false));
        assert!(value.get("crash").is_none());
    }

    #[test]
    fn test_init_message_with_crash_report() {
        let mut message = sample_init();
        message.crash = Some(CrashReport {
            reason: "Watchdog timed out".to_string(),
            uptime_ms: 900_000,
        });
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["crash"]["reason"], json!("Watchdog timed out"));
    }

    #[test]
    fn test_telemetry_optional_battery_fields() {
        let message = TelemetryMessage {
            uptime: 1000,
            timestamp: 1_700_000_000_000,
            battery: Some(BatteryTelemetry {
                voltage: 3.7,
                percentage: 64,
                current: None,
                time_to_empty: Some(3600),
            }),
            wifi: Document::new(),
            mqtt: Document::new(),
            memory: MemoryTelemetry {
                free_heap: 1024,
                min_heap: 512,
            },
            pm: Document::new(),
            features: vec![],
        };
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["battery"]["time-to-empty"], json!(3600));
        assert!(value["battery"].get("current").is_none());
        assert_eq!(value["memory"]["free-heap"], json!(1024));
    }
}
