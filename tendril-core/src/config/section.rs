//! Configuration sections
//!
//! A section is a fixed set of fields. Loading overlays the keys present
//! in a document; storing always writes every field.

use alloc::boxed::Box;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use super::property::Field;
use super::{ConfigError, Document};

/// Outcome of loading a document into a section
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Fields whose incoming value was rejected and left unchanged
    ///
    /// Fields of nested sections are named by their dotted path.
    pub rejected: Vec<String>,
}

impl LoadSummary {
    pub fn reject(&mut self, name: &str) {
        self.rejected.push(name.to_string());
    }

    /// Whether every present value was accepted
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// A named grouping of configuration fields
///
/// Implement with the [`section!`](crate::section) macro.
pub trait Section {
    /// Visit every field
    fn for_each_field(&self, visit: &mut dyn FnMut(&dyn Field));

    /// Visit every field mutably
    fn for_each_field_mut(&mut self, visit: &mut dyn FnMut(&mut dyn Field));

    /// Overlay the values present in `document`
    ///
    /// Absent keys keep their current value. A rejected value does not
    /// stop the remaining fields from loading.
    fn load(&mut self, document: &Document) -> LoadSummary {
        let mut summary = LoadSummary::default();
        self.for_each_field_mut(&mut |field: &mut dyn Field| {
            if let Some(value) = document.get(field.name()) {
                field.load_into(value, &mut summary);
            }
        });
        summary
    }

    /// Serialize every field
    fn store(&self) -> Document {
        let mut document = Document::new();
        self.for_each_field(&mut |field: &dyn Field| {
            document.insert(field.name().to_string(), field.store());
        });
        document
    }

    /// Restore every field to its default
    fn reset(&mut self) {
        self.for_each_field_mut(&mut |field: &mut dyn Field| field.reset());
    }
}

/// Implement [`Section`] for a struct by listing its fields
///
/// ```ignore
/// pub struct NtpConfig {
///     pub host: Property<String>,
/// }
///
/// section!(NtpConfig { host });
/// ```
#[macro_export]
macro_rules! section {
    ($section:ty { $($field:ident),+ $(,)? }) => {
        impl $crate::config::Section for $section {
            fn for_each_field(&self, visit: &mut dyn FnMut(&dyn $crate::config::Field)) {
                $( visit(&self.$field); )+
            }

            fn for_each_field_mut(
                &mut self,
                visit: &mut dyn FnMut(&mut dyn $crate::config::Field),
            ) {
                $( visit(&mut self.$field); )+
            }
        }
    };
}

/// Called with the complete stored document after every update
pub type Listener<'a> = Box<dyn FnMut(&Document) -> Result<(), ConfigError> + 'a>;

/// A section together with its update listeners
pub struct Configuration<'a, S> {
    section: S,
    listeners: Vec<Listener<'a>>,
}

impl<'a, S: Section> Configuration<'a, S> {
    pub fn new(section: S) -> Self {
        Self {
            section,
            listeners: Vec::new(),
        }
    }

    /// Typed access to the section
    pub fn get(&self) -> &S {
        &self.section
    }

    /// Mutable access that bypasses the listeners
    pub(crate) fn section_mut(&mut self) -> &mut S {
        &mut self.section
    }

    /// Register a listener; listeners run in registration order
    pub fn on_update(&mut self, listener: impl FnMut(&Document) -> Result<(), ConfigError> + 'a) {
        self.listeners.push(Box::new(listener));
    }

    /// Load a document and notify the listeners
    ///
    /// Stops at, and returns, the first listener error.
    pub fn update(&mut self, document: &Document) -> Result<LoadSummary, ConfigError> {
        let summary = self.section.load(document);
        self.notify()?;
        Ok(summary)
    }

    /// Restore defaults and notify the listeners
    pub fn reset(&mut self) -> Result<(), ConfigError> {
        self.section.reset();
        self.notify()
    }

    /// Serialize the section
    pub fn store(&self) -> Document {
        self.section.store()
    }

    /// Serialize the section as JSON text
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(&self.section.store()).unwrap_or_default()
    }

    fn notify(&mut self) -> Result<(), ConfigError> {
        if self.listeners.is_empty() {
            return Ok(());
        }
        let document = self.section.store();
        for listener in self.listeners.iter_mut() {
            listener(&document)?;
        }
        Ok(())
    }
}
