//! Typed configuration model
//!
//! Configuration is declared as sections of typed, defaulted properties.
//! A section loads from a JSON document tolerantly (a malformed property
//! keeps its previous value) and always stores a complete document.
//!
//! Persistence is attached through adapters:
//! - [`NvsConfiguration`] - one key of a store namespace
//! - [`ConfigurationFile`] - one file of a [`FileSystem`]
//!
//! Both register an update listener, so every accepted update is written
//! back before `update()` returns.

pub mod device;
pub mod file;
pub mod nvs;
pub mod property;
pub mod section;
pub mod value;

pub use device::{DeviceSettings, NetworkConfig, NtpConfig};
pub use file::{ConfigurationFile, FileError, FileSystem, MemoryFileSystem};
pub use nvs::NvsConfiguration;
pub use property::{ArrayProperty, Field, NamedEntry, Property};
pub use section::{Configuration, Listener, LoadSummary, Section};
pub use tendril_protocol::Document;
pub use value::{parse_duration, ConfigValue, LogLevel, RawJson};

use crate::store::StoreError;

/// Errors from loading or persisting configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Persisted document is present but not a JSON object
    Malformed,
    /// Store operation failed
    Storage(StoreError),
    /// File operation failed
    File(FileError),
    /// Document could not be serialized
    Encode,
}

impl From<StoreError> for ConfigError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Malformed => ConfigError::Malformed,
            other => ConfigError::Storage(other),
        }
    }
}

impl From<FileError> for ConfigError {
    fn from(e: FileError) -> Self {
        ConfigError::File(e)
    }
}
