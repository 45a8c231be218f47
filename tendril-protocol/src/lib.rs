//! Tendril message bus protocol
//!
//! This crate defines the JSON documents a Tendril node exchanges over its
//! message bus: the one-shot `init` announcement, periodic `telemetry`,
//! and request/response bodies of the remote commands.
//!
//! # Topics
//!
//! ```text
//! [<location>/]devices/tendril/<instance>/
//!     init                  boot announcement
//!     telemetry             periodic snapshot
//!     commands/<name>       inbound command requests
//!     responses/<name>      command responses
//! ```

#![no_std]
#![deny(unsafe_code)]

extern crate alloc;
#[cfg(test)]
extern crate std;

pub mod commands;
pub mod delivery;
pub mod messages;
pub mod topics;

use alloc::string::String;
use serde::Serialize;
use serde_json::Value;

pub use delivery::{QoS, Retention};
pub use messages::{
    BatteryTelemetry, CrashReport, InitMessage, InitState, ItemReport, MemoryTelemetry,
    TelemetryMessage,
};

/// A JSON object, the unit of every message and configuration payload
pub type Document = serde_json::Map<String, Value>;

/// Serialize a value into a [`Document`]
///
/// Values that do not serialize to a JSON object yield an empty document.
pub fn to_document<T: Serialize>(value: &T) -> Document {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => map,
        _ => Document::new(),
    }
}
