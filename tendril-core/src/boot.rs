//! Boot record
//!
//! Survives restarts in the `kernel` namespace, encoded with postcard.
//! It counts announced boots and carries a crash report from the boot
//! that crashed to the announcement of the next one.

use alloc::string::ToString;

use serde::{Deserialize, Serialize};
use tendril_hal::Partition;
use tendril_protocol::CrashReport;

use crate::store::{NvsStore, StoreError};

/// Store key of the record in the `kernel` namespace
pub const BOOT_RECORD_KEY: &str = "boot";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootRecord {
    /// Boots announced so far
    pub boot_count: u32,
    /// Crash of an earlier boot, not yet announced
    pub crash: Option<CrashReport>,
}

impl BootRecord {
    /// Load the record; an absent or undecodable one starts afresh
    pub fn load<P: Partition>(store: &NvsStore<'_, P>) -> Result<Self, StoreError> {
        let Some(bytes) = store.get(BOOT_RECORD_KEY)? else {
            debug!("No boot record, starting afresh");
            return Ok(Self::default());
        };
        match postcard::from_bytes(&bytes) {
            Ok(record) => Ok(record),
            Err(_) => {
                warn!("Boot record unreadable, starting afresh");
                Ok(Self::default())
            }
        }
    }

    pub fn save<P: Partition>(&self, store: &NvsStore<'_, P>) -> Result<(), StoreError> {
        let bytes = postcard::to_allocvec(self).map_err(|_| StoreError::Encode)?;
        store.set(BOOT_RECORD_KEY, &bytes)
    }

    /// Persist a crash report for the next boot to announce
    pub fn record_crash<P: Partition>(
        store: &NvsStore<'_, P>,
        reason: &str,
        uptime_ms: u64,
    ) -> Result<(), StoreError> {
        let mut record = Self::load(store)?;
        record.crash = Some(CrashReport {
            reason: reason.to_string(),
            uptime_ms,
        });
        record.save(store)
    }

    /// Account for an announcement of this boot
    ///
    /// The count always advances; the crash report is cleared only once
    /// it was delivered.
    pub fn announced(&mut self, delivered: bool) {
        self.boot_count = self.boot_count.wrapping_add(1);
        if delivered {
            self.crash = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{shared, MemoryPartition, KERNEL_NAMESPACE};

    #[test]
    fn test_absent_record_is_fresh() {
        let partition = shared(MemoryPartition::new());
        let store = NvsStore::new(&partition, KERNEL_NAMESPACE);
        assert_eq!(BootRecord::load(&store).unwrap(), BootRecord::default());
    }

    #[test]
    fn test_crash_reported_once() {
        let partition = shared(MemoryPartition::new());
        let store = NvsStore::new(&partition, KERNEL_NAMESPACE);
        BootRecord::record_crash(&store, "Watchdog timed out", 900_000).unwrap();

        let mut record = BootRecord::load(&store).unwrap();
        assert_eq!(record.boot_count, 0);
        assert_eq!(
            record.crash.as_ref().map(|crash| crash.reason.as_str()),
            Some("Watchdog timed out")
        );

        record.announced(true);
        record.save(&store).unwrap();

        let record = BootRecord::load(&store).unwrap();
        assert_eq!(record.boot_count, 1);
        assert_eq!(record.crash, None);
    }

    #[test]
    fn test_undelivered_crash_kept() {
        let mut record = BootRecord {
            boot_count: 4,
            crash: Some(CrashReport {
                reason: "abort".to_string(),
                uptime_ms: 10,
            }),
        };
        record.announced(false);
        assert_eq!(record.boot_count, 5);
        assert!(record.crash.is_some());
    }

    #[test]
    fn test_garbage_record_starts_afresh() {
        let partition = shared(MemoryPartition::new());
        let store = NvsStore::new(&partition, KERNEL_NAMESPACE);
        store.set(BOOT_RECORD_KEY, &[0xff, 0xff, 0xff, 0xff, 0xff, 0xff]).unwrap();
        assert_eq!(BootRecord::load(&store).unwrap(), BootRecord::default());
    }
}
