//! Configuration persisted under one key of a store namespace

use alloc::format;
use alloc::string::String;

use tendril_hal::flash::Partition;

use super::section::{Configuration, LoadSummary, Section};
use super::{ConfigError, Document};
use crate::store::{NvsStore, StoreError};

/// A section loaded from, and written back to, a store key
pub struct NvsConfiguration<'a, P, S> {
    store: NvsStore<'a, P>,
    key: &'static str,
    config: Configuration<'a, S>,
}

impl<'a, P: Partition + 'a, S: Section> NvsConfiguration<'a, P, S> {
    /// Load `section` from `key`
    ///
    /// A missing key keeps the defaults. A present value that is not a
    /// JSON object is an error.
    pub fn open(store: NvsStore<'a, P>, key: &'static str, section: S) -> Result<Self, ConfigError> {
        let mut config = Configuration::new(section);

        let stored = store.get_document(key).map_err(|e| {
            if e == StoreError::Malformed {
                error!("Cannot parse configuration {}/{}", store.namespace(), key);
            }
            ConfigError::from(e)
        })?;

        match stored {
            None => debug!(
                "No configuration at {}/{}, using defaults",
                store.namespace(),
                key
            ),
            Some(document) => {
                let summary = config.section_mut().load(&document);
                if !summary.is_clean() {
                    warn!(
                        "{}/{}: {} properties fell back",
                        store.namespace(),
                        key,
                        summary.rejected.len()
                    );
                }
            }
        }

        config.on_update(move |document: &Document| {
            store.set_document(key, document)?;
            Ok(())
        });

        Ok(Self { store, key, config })
    }

    /// Typed access to the section
    pub fn config(&self) -> &S {
        self.config.get()
    }

    /// Load a document and persist the result
    pub fn update(&mut self, document: &Document) -> Result<LoadSummary, ConfigError> {
        self.config.update(document)
    }

    /// Register an additional listener, run after the store write
    pub fn on_update(&mut self, listener: impl FnMut(&Document) -> Result<(), ConfigError> + 'a) {
        self.config.on_update(listener);
    }

    /// Restore defaults and persist them
    pub fn reset(&mut self) -> Result<(), ConfigError> {
        self.config.reset()
    }

    pub fn store(&self) -> Document {
        self.config.store()
    }

    pub fn to_json_string(&self) -> String {
        self.config.to_json_string()
    }

    /// Location used in logs, `namespace/key`
    pub fn identity(&self) -> String {
        format!("{}/{}", self.store.namespace(), self.key)
    }
}
