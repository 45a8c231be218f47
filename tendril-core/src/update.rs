//! Pending firmware update
//!
//! The `update` command only records the URL and restarts. The next boot
//! picks the record up, removes it so a failing image cannot cause a boot
//! loop, and hands the URL to the updater once the network is ready.

use alloc::string::{String, ToString};

use serde::{Deserialize, Serialize};
use tendril_hal::{Partition, SystemControl};

use crate::state::State;
use crate::store::{NvsStore, StoreError};
use crate::traits::{FirmwareUpdater, UpdateError};

/// Store key of the pending update in the `config` namespace
pub const PENDING_UPDATE_KEY: &str = "update";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct PendingUpdate {
    url: String,
}

/// Record an update to perform after the next restart
pub fn store_pending_update<P: Partition>(
    store: &NvsStore<'_, P>,
    url: &str,
) -> Result<(), StoreError> {
    let record = PendingUpdate {
        url: url.to_string(),
    };
    let bytes = serde_json::to_vec(&record).map_err(|_| StoreError::Encode)?;
    store.set(PENDING_UPDATE_KEY, &bytes)
}

/// Remove and return the pending update URL
///
/// An unreadable record is dropped.
pub fn take_pending_update<P: Partition>(
    store: &NvsStore<'_, P>,
) -> Result<Option<String>, StoreError> {
    let Some(bytes) = store.get(PENDING_UPDATE_KEY)? else {
        return Ok(None);
    };
    store.remove(PENDING_UPDATE_KEY)?;
    match serde_json::from_slice::<PendingUpdate>(&bytes) {
        Ok(record) => Ok(Some(record.url)),
        Err(_) => {
            warn!("Dropping unreadable pending update record");
            Ok(None)
        }
    }
}

/// Outcome of [`perform_pending_update`]
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PendingUpdateOutcome {
    /// No update was pending
    NotPending,
    /// Image installed, restart requested
    Installed,
    /// Update failed, the device keeps running the current image
    Failed(UpdateError),
}

/// Perform a pending update, restarting on success
///
/// Waits for `network_ready` only when an update is pending.
pub async fn perform_pending_update<P, U, S>(
    store: &NvsStore<'_, P>,
    network_ready: State<'_>,
    updater: &U,
    system: &S,
) -> Result<PendingUpdateOutcome, StoreError>
where
    P: Partition,
    U: FirmwareUpdater,
    S: SystemControl,
{
    let Some(url) = take_pending_update(store)? else {
        return Ok(PendingUpdateOutcome::NotPending);
    };

    if !network_ready.is_set() {
        info!("Waiting for network to perform pending update");
    }
    network_ready.wait_set().await;
    info!("Performing pending update");
    match updater.perform(&url).await {
        Ok(()) => {
            info!("Update installed, restarting");
            system.restart();
            Ok(PendingUpdateOutcome::Installed)
        }
        Err(e) => {
            error!("Update failed: {}", e);
            Ok(PendingUpdateOutcome::Failed(e))
        }
    }
}
