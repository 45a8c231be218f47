//! Board-agnostic bring-up and lifecycle core for Tendril field nodes
//!
//! This crate contains all device logic that does not depend on specific
//! hardware or transports:
//!
//! - Namespaced key-value store over a flash partition
//! - Typed configuration sections with NVS and file persistence
//! - Readiness gates for sequencing subsystems
//! - Watchdog, battery gate and monitor, factory reset, status LED
//! - Remote commands, telemetry, plugins and boot record
//! - The bring-up sequencer, [`kernel::Kernel`]

#![no_std]
#![deny(unsafe_code)]

extern crate alloc;
#[cfg(test)]
extern crate std;

// Must come first so the logging macros are visible to every module
mod fmt;

pub mod boot;
pub mod clock;
pub mod commands;
pub mod config;
pub mod kernel;
pub mod plugins;
pub mod power;
pub mod provision;
pub mod reset;
pub mod state;
pub mod status;
pub mod store;
pub mod switch;
pub mod telemetry;
pub mod traits;
pub mod update;
pub mod watchdog;

#[cfg(test)]
pub(crate) mod testing;

pub use kernel::{Board, BootError, Drivers, Kernel, Shutdown};
pub use state::{ModuleStates, State, StateSource};
