//! Tendril Hardware Abstraction Layer
//!
//! This crate defines the hardware traits the Tendril kernel runs on, so
//! the same bring-up logic can be driven by a board implementation or by
//! host-side test doubles.
//!
//! # Traits
//!
//! - [`gpio::OutputPin`], [`gpio::InputPin`], [`gpio::EdgeInput`] - Digital I/O
//! - [`flash::Partition`] - Namespaced non-volatile storage
//! - [`system::SystemControl`] - Restart, sleep, identity
//! - [`battery::BatteryProbe`] - Battery voltage and current
//!
//! With the `sequential-storage` feature, [`sequential::SequentialPartition`]
//! implements [`flash::Partition`] over any async NOR flash.

#![no_std]
#![deny(unsafe_code)]

#[cfg(test)]
extern crate std;

pub mod battery;
pub mod flash;
pub mod gpio;
#[cfg(feature = "sequential-storage")]
pub mod sequential;
pub mod system;

// Re-export key traits at crate root for convenience
pub use battery::BatteryProbe;
pub use flash::{FlashError, NvsKey, Partition, MAX_VALUE_SIZE};
pub use gpio::{EdgeInput, InputPin, OutputPin};
pub use system::{MemoryStats, ResetReason, SystemControl, WakeupCause};
