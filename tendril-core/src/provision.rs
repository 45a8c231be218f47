//! Configuration provisioning
//!
//! Seeds the `config` namespace from JSON text, for factory images and
//! first-time setup. Documents are checked to be JSON objects and stored
//! in compact form.

use serde_json::Value;
use tendril_hal::Partition;

use crate::config::device::{DEVICE_CONFIG_KEY, NETWORK_CONFIG_KEY};
use crate::config::Document;
use crate::store::{NvsStore, StoreError};

/// Errors from provisioning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProvisionError {
    /// Text is not valid JSON
    InvalidJson,
    /// JSON is valid but not an object
    NotAnObject,
    /// Store write failed
    Storage(StoreError),
}

impl From<StoreError> for ProvisionError {
    fn from(e: StoreError) -> Self {
        ProvisionError::Storage(e)
    }
}

/// Parse configuration text into a document
pub fn parse_document(text: &str) -> Result<Document, ProvisionError> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(document)) => Ok(document),
        Ok(_) => Err(ProvisionError::NotAnObject),
        Err(_) => Err(ProvisionError::InvalidJson),
    }
}

/// Store one configuration document under `key`
pub fn provision<P: Partition>(
    store: &NvsStore<'_, P>,
    key: &str,
    text: &str,
) -> Result<(), ProvisionError> {
    let document = parse_document(text)?;
    store.set_document(key, &document)?;
    info!("Provisioned {}/{}", store.namespace(), key);
    Ok(())
}

/// Store network and device configuration
///
/// Both documents are validated before either is written.
pub fn provision_device<P: Partition>(
    store: &NvsStore<'_, P>,
    network_config: &str,
    device_config: &str,
) -> Result<(), ProvisionError> {
    let network = parse_document(network_config)?;
    let device = parse_document(device_config)?;
    store.set_document(NETWORK_CONFIG_KEY, &network)?;
    store.set_document(DEVICE_CONFIG_KEY, &device)?;
    info!("Provisioned network and device configuration");
    Ok(())
}
