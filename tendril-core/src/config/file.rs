//! Configuration persisted as a JSON file

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use core::cell::{Cell, RefCell};

use serde_json::Value;

use super::section::{Configuration, LoadSummary, Section};
use super::{ConfigError, Document};

/// File system errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FileError {
    /// Read or write failed
    Io,
    /// File system is not mounted
    NotMounted,
    /// Path is not valid on this file system
    InvalidPath,
}

/// Minimal file access needed by [`ConfigurationFile`]
pub trait FileSystem {
    /// Read a whole file; `None` when it does not exist
    fn read_to_string(&self, path: &str) -> Result<Option<String>, FileError>;

    /// Replace a whole file
    fn write_all(&self, path: &str, contents: &str) -> Result<(), FileError>;
}

/// File system held in RAM
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    files: RefCell<BTreeMap<String, String>>,
    fail_writes: Cell<bool>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following write fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }

    /// Create or replace a file directly
    pub fn insert(&self, path: &str, contents: &str) {
        self.files
            .borrow_mut()
            .insert(path.to_string(), contents.to_string());
    }
}

impl FileSystem for MemoryFileSystem {
    fn read_to_string(&self, path: &str) -> Result<Option<String>, FileError> {
        if path.is_empty() {
            return Err(FileError::InvalidPath);
        }
        Ok(self.files.borrow().get(path).cloned())
    }

    fn write_all(&self, path: &str, contents: &str) -> Result<(), FileError> {
        if path.is_empty() {
            return Err(FileError::InvalidPath);
        }
        if self.fail_writes.get() {
            return Err(FileError::Io);
        }
        self.insert(path, contents);
        Ok(())
    }
}

/// A section loaded from, and written back to, a file
pub struct ConfigurationFile<'a, S> {
    path: &'static str,
    config: Configuration<'a, S>,
}

impl<'a, S: Section> ConfigurationFile<'a, S> {
    /// Load `section` from `path`
    ///
    /// A missing or blank file keeps the defaults. Content that is not a
    /// JSON object is an error.
    pub fn open<F: FileSystem>(fs: &'a F, path: &'static str, section: S) -> Result<Self, ConfigError> {
        let mut config = Configuration::new(section);

        match fs.read_to_string(path)? {
            None => debug!("Configuration file {} not found, using defaults", path),
            Some(contents) if contents.trim().is_empty() => {
                debug!("Configuration file {} is empty, using defaults", path)
            }
            Some(contents) => match serde_json::from_str::<Value>(&contents) {
                Ok(Value::Object(document)) => {
                    let summary = config.section_mut().load(&document);
                    if !summary.is_clean() {
                        warn!(
                            "{}: {} properties fell back",
                            path,
                            summary.rejected.len()
                        );
                    }
                }
                _ => {
                    error!("Cannot parse configuration file {}", path);
                    return Err(ConfigError::Malformed);
                }
            },
        }

        config.on_update(move |document: &Document| {
            let contents = serde_json::to_string(document).map_err(|_| ConfigError::Encode)?;
            fs.write_all(path, &contents)?;
            Ok(())
        });

        Ok(Self { path, config })
    }

    pub fn config(&self) -> &S {
        self.config.get()
    }

    /// Load a document and persist the result
    pub fn update(&mut self, document: &Document) -> Result<LoadSummary, ConfigError> {
        self.config.update(document)
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

    /// Location used in logs
    pub fn identity(&self) -> &'static str {
        self.path
    }
}
