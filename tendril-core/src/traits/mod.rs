//! Collaborator traits
//!
//! The kernel drives these services but does not implement them. A board
//! crate provides the real drivers; tests provide doubles.

pub mod bus;
pub mod clock;
pub mod network;
pub mod update;

pub use bus::{BusRoot, IncomingCommand, MessageBus, PublishError};
pub use clock::{ClockError, WallClock};
pub use network::NetworkControl;
pub use update::{FirmwareUpdater, UpdateError};
