//! RAM-backed partition
//!
//! Used on the host and in tests. Supports failure injection so storage
//! error paths can be exercised.

use alloc::collections::{BTreeMap, VecDeque};
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use tendril_hal::flash::{self, FlashError, Partition, MAX_VALUE_SIZE};

/// Partition that keeps every entry in memory
#[derive(Debug, Default)]
pub struct MemoryPartition {
    entries: BTreeMap<(String, String), Vec<u8>>,
    init_errors: VecDeque<FlashError>,
    fail_writes: bool,
    erase_count: usize,
}

impl MemoryPartition {
    /// Create an empty partition
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a partition whose first `init` calls fail with `errors`
    pub fn with_init_errors(errors: impl IntoIterator<Item = FlashError>) -> Self {
        Self {
            init_errors: errors.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Make every following write fail
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// Number of full erases performed
    pub fn erase_count(&self) -> usize {
        self.erase_count
    }

    /// Number of entries across all namespaces
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no namespace holds any entry
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry_key(namespace: &str, key: &str) -> Result<(String, String), FlashError> {
        flash::name(namespace)?;
        flash::name(key)?;
        Ok((namespace.to_string(), key.to_string()))
    }
}

impl Partition for MemoryPartition {
    fn init(&mut self) -> Result<(), FlashError> {
        match self.init_errors.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn erase(&mut self) -> Result<(), FlashError> {
        self.entries.clear();
        self.erase_count += 1;
        Ok(())
    }

    fn read(
        &mut self,
        namespace: &str,
        key: &str,
        buffer: &mut [u8],
    ) -> Result<Option<usize>, FlashError> {
        let entry_key = Self::entry_key(namespace, key)?;
        match self.entries.get(&entry_key) {
            None => Ok(None),
            Some(data) => {
                if buffer.len() < data.len() {
                    return Err(FlashError::BufferTooSmall);
                }
                buffer[..data.len()].copy_from_slice(data);
                Ok(Some(data.len()))
            }
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), FlashError> {
        let entry_key = Self::entry_key(namespace, key)?;
        if data.len() > MAX_VALUE_SIZE {
            return Err(FlashError::ValueTooLarge);
        }
        if self.fail_writes {
            return Err(FlashError::Flash);
        }
        self.entries.insert(entry_key, data.to_vec());
        Ok(())
    }

    fn remove(&mut self, namespace: &str, key: &str) -> Result<bool, FlashError> {
        let entry_key = Self::entry_key(namespace, key)?;
        if self.fail_writes {
            return Err(FlashError::Flash);
        }
        Ok(self.entries.remove(&entry_key).is_some())
    }

    fn for_each_key(
        &mut self,
        namespace: &str,
        visit: &mut dyn FnMut(&str),
    ) -> Result<(), FlashError> {
        self.entries
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .for_each(|(_, key)| visit(key));
        Ok(())
    }

    fn erase_namespace(&mut self, namespace: &str) -> Result<(), FlashError> {
        self.entries.retain(|(ns, _), _| ns != namespace);
        Ok(())
    }
}
