//! Persistent key-value store
//!
//! [`NvsStore`] is a handle on one namespace of a shared [`Partition`].
//! Stores opened on different namespaces never see each other's keys.
//! Each operation locks the partition for its own duration only.

pub mod memory;

use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;
use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use serde_json::Value;
use tendril_hal::flash::{FlashError, Partition};

use crate::config::Document;

pub use memory::MemoryPartition;

/// Network and device configuration documents, pending update
pub const CONFIG_NAMESPACE: &str = "config";
/// Peripheral runtime state
pub const PERIPHERAL_STATE_NAMESPACE: &str = "perf-state";
/// Function configuration
pub const FUNCTION_CONFIG_NAMESPACE: &str = "function-cfg";
/// Boot record
pub const KERNEL_NAMESPACE: &str = "kernel";

/// Namespaces wiped by a complete factory reset
pub const CONFIGURATION_NAMESPACES: [&str; 3] = [
    CONFIG_NAMESPACE,
    PERIPHERAL_STATE_NAMESPACE,
    FUNCTION_CONFIG_NAMESPACE,
];

pub use tendril_hal::MAX_VALUE_SIZE;

/// A partition shared between tasks
pub type SharedPartition<P> = Mutex<CriticalSectionRawMutex, RefCell<P>>;

/// Wrap a partition for sharing
pub const fn shared<P>(partition: P) -> SharedPartition<P> {
    Mutex::new(RefCell::new(partition))
}

/// Errors from store operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StoreError {
    /// Partition operation failed
    Flash(FlashError),
    /// Stored value is not valid JSON
    Malformed,
    /// Value could not be serialized
    Encode,
}

impl From<FlashError> for StoreError {
    fn from(e: FlashError) -> Self {
        StoreError::Flash(e)
    }
}

/// Initialise the partition
///
/// A partition reporting itself truncated or written by another format
/// version is erased and initialised once more. Any other failure, or a
/// second failure, is returned.
pub fn init_storage<P: Partition>(partition: &SharedPartition<P>) -> Result<(), FlashError> {
    partition.lock(|cell| {
        let mut partition = cell.borrow_mut();
        match partition.init() {
            Err(e) if e.is_recoverable_by_erase() => {
                warn!("Storage partition unusable ({}), erasing", e);
                partition.erase()?;
                partition.init()
            }
            result => result,
        }
    })
}

/// Handle on one namespace of a shared partition
pub struct NvsStore<'a, P> {
    partition: &'a SharedPartition<P>,
    namespace: &'static str,
}

impl<P> Clone for NvsStore<'_, P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P> Copy for NvsStore<'_, P> {}

impl<'a, P: Partition> NvsStore<'a, P> {
    /// Open a namespace
    pub fn new(partition: &'a SharedPartition<P>, namespace: &'static str) -> Self {
        Self {
            partition,
            namespace,
        }
    }

    /// Name of the namespace
    pub fn namespace(&self) -> &'static str {
        self.namespace
    }

    fn with<R>(&self, f: impl FnOnce(&mut P) -> R) -> R {
        self.partition.lock(|cell| f(&mut cell.borrow_mut()))
    }

    /// Read a raw value; `None` when the key is absent
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut buffer = vec![0u8; MAX_VALUE_SIZE];
        let len = self.with(|p| p.read(self.namespace, key, &mut buffer))?;
        Ok(len.map(|len| {
            buffer.truncate(len);
            buffer
        }))
    }

    /// Check whether a key is present
    pub fn contains(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }

    /// Read and parse a JSON value
    pub fn get_json(&self, key: &str) -> Result<Option<Value>, StoreError> {
        match self.get(key)? {
            None => Ok(None),
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|_| StoreError::Malformed),
        }
    }

    /// Read a JSON object
    ///
    /// A stored value that is valid JSON but not an object is malformed.
    pub fn get_document(&self, key: &str) -> Result<Option<Document>, StoreError> {
        match self.get_json(key)? {
            None => Ok(None),
            Some(Value::Object(document)) => Ok(Some(document)),
            Some(_) => Err(StoreError::Malformed),
        }
    }

    /// Write a raw value
    pub fn set(&self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        self.with(|p| p.write(self.namespace, key, data))?;
        Ok(())
    }

    /// Serialize and write a JSON value
    pub fn set_json(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(value).map_err(|_| StoreError::Encode)?;
        self.set(key, &bytes)
    }

    /// Serialize and write a JSON object
    pub fn set_document(&self, key: &str, document: &Document) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(document).map_err(|_| StoreError::Encode)?;
        self.set(key, &bytes)
    }

    /// Remove a key, returning whether it was present
    pub fn remove(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.with(|p| p.remove(self.namespace, key))?)
    }

    /// List every key of the namespace
    pub fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        self.with(|p| p.for_each_key(self.namespace, &mut |key: &str| keys.push(key.to_string())))?;
        Ok(keys)
    }

    /// Remove every key of the namespace
    pub fn erase_all(&self) -> Result<(), StoreError> {
        self.with(|p| p.erase_namespace(self.namespace))?;
        Ok(())
    }
}
