//! Configuration properties
//!
//! A property is a named, typed, defaulted value inside a section.
//! Reading never fails: before any load, and after a rejected load, the
//! property holds its default or last accepted value.

use alloc::format;
use alloc::vec::Vec;

use serde_json::Value;

use super::section::{LoadSummary, Section};
use super::value::ConfigValue;

/// A named member of a section
pub trait Field {
    /// Key of the field inside its section's document
    fn name(&self) -> &'static str;

    /// Replace the value from JSON
    ///
    /// Returns `false` and keeps the current value when `value` has the
    /// wrong shape.
    fn load(&mut self, value: &Value) -> bool;

    /// Load `value`, recording what was rejected in `summary`
    fn load_into(&mut self, value: &Value, summary: &mut LoadSummary) {
        if !self.load(value) {
            summary.reject(self.name());
        }
    }

    /// Current value as JSON
    fn store(&self) -> Value;

    /// Restore the compiled-in default
    fn reset(&mut self);
}

/// A single typed value
#[derive(Debug, Clone)]
pub struct Property<T> {
    name: &'static str,
    default: T,
    value: T,
    specified: bool,
}

impl<T: ConfigValue> Property<T> {
    pub fn new(name: &'static str, default: T) -> Self {
        Self {
            name,
            value: default.clone(),
            default,
            specified: false,
        }
    }

    /// Current value
    pub fn get(&self) -> &T {
        &self.value
    }

    /// Compiled-in default
    pub fn default_value(&self) -> &T {
        &self.default
    }

    /// Whether a loaded document supplied the value
    pub fn is_specified(&self) -> bool {
        self.specified
    }
}

impl<T: ConfigValue> Field for Property<T> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn load(&mut self, value: &Value) -> bool {
        match T::from_json(value) {
            Some(parsed) => {
                self.value = parsed;
                self.specified = true;
                true
            }
            None => {
                warn!("Ignoring malformed value for property '{}'", self.name);
                false
            }
        }
    }

    fn store(&self) -> Value {
        self.value.to_json()
    }

    fn reset(&mut self) {
        self.value = self.default.clone();
        self.specified = false;
    }
}

/// An ordered list of homogeneous values
///
/// A list containing any malformed element is rejected as a whole.
#[derive(Debug, Clone)]
pub struct ArrayProperty<T> {
    name: &'static str,
    entries: Vec<T>,
}

impl<T: ConfigValue> ArrayProperty<T> {
    /// Create an array property that defaults to empty
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: Vec::new(),
        }
    }

    pub fn get(&self) -> &[T] {
        &self.entries
    }
}

impl<T: ConfigValue> Field for ArrayProperty<T> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn load(&mut self, value: &Value) -> bool {
        let parsed = match value {
            Value::Array(items) => items.iter().map(T::from_json).collect::<Option<Vec<T>>>(),
            _ => None,
        };
        match parsed {
            Some(entries) => {
                self.entries = entries;
                true
            }
            None => {
                warn!("Ignoring malformed array for property '{}'", self.name);
                false
            }
        }
    }

    fn store(&self) -> Value {
        Value::Array(self.entries.iter().map(ConfigValue::to_json).collect())
    }

    fn reset(&mut self) {
        self.entries.clear();
    }
}

/// A nested section stored under its own key
#[derive(Debug, Clone)]
pub struct NamedEntry<S> {
    name: &'static str,
    section: S,
}

impl<S: Section> NamedEntry<S> {
    pub fn new(name: &'static str, section: S) -> Self {
        Self { name, section }
    }

    pub fn get(&self) -> &S {
        &self.section
    }
}

impl<S: Section> Field for NamedEntry<S> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn load(&mut self, value: &Value) -> bool {
        match value {
            Value::Object(document) => {
                self.section.load(document);
                true
            }
            _ => {
                warn!("Ignoring non-object value for section '{}'", self.name);
                false
            }
        }
    }

    fn load_into(&mut self, value: &Value, summary: &mut LoadSummary) {
        match value {
            Value::Object(document) => {
                let nested = self.section.load(document);
                for field in nested.rejected {
                    summary.rejected.push(format!("{}.{}", self.name, field));
                }
            }
            _ => {
                if !self.load(value) {
                    summary.reject(self.name);
                }
            }
        }
    }

    fn store(&self) -> Value {
        Value::Object(self.section.store())
    }

    fn reset(&mut self) {
        self.section.reset();
    }
}
