//! Function registry
//!
//! Functions are built after every peripheral. Their runtime configuration
//! lives in the `function-cfg` namespace under the function's name; an
//! absent entry configures the function with an empty document.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use tendril_hal::Partition;
use tendril_protocol::{Document, ItemReport};

use super::peripheral::{Peripheral, PeripheralManager};
use super::{item_report, Declaration, PluginError};
use crate::config::RawJson;
use crate::store::NvsStore;

/// A constructed function
pub trait Function {
    fn name(&self) -> &str;

    /// Apply a runtime configuration document
    fn configure(&self, config: &Document) -> Result<(), PluginError>;

    /// The complete runtime configuration in effect
    fn config(&self) -> Document;
}

/// What a factory gets to build a function from
pub struct FunctionInit<'d, 'p> {
    pub name: &'d str,
    pub params: &'d Document,
    peripherals: &'d PeripheralManager<'p>,
}

impl FunctionInit<'_, '_> {
    /// A peripheral built earlier in the boot
    pub fn peripheral(&self, name: &str) -> Result<Rc<dyn Peripheral>, PluginError> {
        self.peripherals.get(name).ok_or_else(|| {
            warn!("Function '{}' refers to unknown peripheral '{}'", self.name, name);
            PluginError::PeripheralNotFound
        })
    }

    /// A peripheral that must have the valve capability
    pub fn valve(&self, name: &str) -> Result<Rc<dyn Peripheral>, PluginError> {
        let peripheral = self.peripheral(name)?;
        if peripheral.as_valve().is_none() {
            return Err(PluginError::MissingCapability);
        }
        Ok(peripheral)
    }
}

/// Builds functions of one type
pub type FunctionFactory<'a> =
    Box<dyn Fn(&FunctionInit<'_, '_>) -> Result<Rc<dyn Function>, PluginError> + 'a>;

/// Function factories and the functions built so far
pub struct FunctionManager<'a, P> {
    config: NvsStore<'a, P>,
    factories: BTreeMap<String, FunctionFactory<'a>>,
    functions: Vec<Rc<dyn Function>>,
}

impl<'a, P: Partition> FunctionManager<'a, P> {
    /// `config` is the `function-cfg` namespace
    pub fn new(config: NvsStore<'a, P>) -> Self {
        Self {
            config,
            factories: BTreeMap::new(),
            functions: Vec::new(),
        }
    }

    pub fn register_factory(
        &mut self,
        type_name: &str,
        factory: impl Fn(&FunctionInit<'_, '_>) -> Result<Rc<dyn Function>, PluginError> + 'a,
    ) {
        debug!("Registering function factory {}", type_name);
        self.factories
            .insert(type_name.to_string(), Box::new(factory));
    }

    pub fn get(&self, name: &str) -> Option<Rc<dyn Function>> {
        self.functions
            .iter()
            .find(|function| function.name() == name)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    fn stored_config(&self, name: &str) -> Result<Document, PluginError> {
        match self.config.get_document(name) {
            Ok(config) => Ok(config.unwrap_or_default()),
            Err(e) => {
                error!("Stored configuration of function '{}' unreadable: {}", name, e);
                Err(PluginError::InvalidParameters)
            }
        }
    }

    fn build(
        &mut self,
        declaration: &Declaration,
        peripherals: &PeripheralManager<'_>,
    ) -> Result<(), PluginError> {
        if self.get(&declaration.name).is_some() {
            return Err(PluginError::DuplicateName);
        }
        let factory = self
            .factories
            .get(&declaration.type_name)
            .ok_or(PluginError::UnknownType)?;
        let function = factory(&FunctionInit {
            name: &declaration.name,
            params: &declaration.params,
            peripherals,
        })?;

        let config = self.stored_config(&declaration.name)?;
        function.configure(&config)?;
        self.functions.push(function);
        Ok(())
    }

    /// Build and configure one declared function
    pub fn create(&mut self, raw: &RawJson, peripherals: &PeripheralManager<'_>) -> ItemReport {
        let declaration = match Declaration::parse(raw) {
            Ok(declaration) => declaration,
            Err(e) => {
                error!("Invalid function declaration: {}", raw.as_str());
                return item_report(None, Err(e));
            }
        };

        info!(
            "Creating function '{}' of type '{}'",
            declaration.name.as_str(),
            declaration.type_name.as_str()
        );
        let result = self.build(&declaration, peripherals);
        if let Err(e) = result {
            error!(
                "Failed to create function '{}': {}",
                declaration.name.as_str(),
                e
            );
        }
        item_report(Some(&declaration), result)
    }

    /// Apply a new configuration to a running function and persist it
    ///
    /// Only an accepted configuration is stored, in the complete form the
    /// function reports back, which is also returned.
    pub fn reconfigure(&self, name: &str, config: &Document) -> Result<Document, PluginError> {
        let function = self.get(name).ok_or(PluginError::FunctionNotFound)?;
        function.configure(config)?;
        let stored = function.config();
        self.config
            .set_document(name, &stored)
            .map_err(PluginError::Storage)?;
        info!("Stored configuration of function '{}'", name);
        Ok(stored)
    }
}
