//! Thermostat function
//!
//! Drives a valve-like switch peripheral. The `overrideState` setting of
//! its runtime configuration forces the switch open or closed; without it
//! the switch returns to its own default.

use alloc::rc::Rc;
use alloc::string::{String, ToString};
use core::cell::RefCell;

use tendril_hal::Partition;
use tendril_protocol::Document;

use super::function::{Function, FunctionInit, FunctionManager};
use super::peripheral::Peripheral;
use super::valve::TargetState;
use super::PluginError;
use crate::config::{Property, Section};
use crate::section;

/// Factory type name
pub const THERMOSTAT: &str = "thermostat";

/// Declaration parameters
pub struct ThermostatSettings {
    /// Name of the switch peripheral
    pub switch: Property<String>,
}

section!(ThermostatSettings { switch });

impl Default for ThermostatSettings {
    fn default() -> Self {
        Self {
            switch: Property::new("switch", String::new()),
        }
    }
}

/// Runtime configuration
pub struct ThermostatConfig {
    pub override_state: Property<Option<TargetState>>,
}

section!(ThermostatConfig { override_state });

impl Default for ThermostatConfig {
    fn default() -> Self {
        Self {
            override_state: Property::new("overrideState", None),
        }
    }
}

pub struct Thermostat {
    name: String,
    switch: Rc<dyn Peripheral>,
    config: RefCell<ThermostatConfig>,
}

impl Thermostat {
    pub fn new(name: &str, switch: Rc<dyn Peripheral>) -> Self {
        Self {
            name: name.to_string(),
            switch,
            config: RefCell::new(ThermostatConfig::default()),
        }
    }
}

impl Function for Thermostat {
    fn name(&self) -> &str {
        &self.name
    }

    fn configure(&self, config: &Document) -> Result<(), PluginError> {
        let mut settings = ThermostatConfig::default();
        if !settings.load(config).is_clean() {
            return Err(PluginError::InvalidParameters);
        }
        let target = *settings.override_state.get();
        match target {
            Some(state) => info!("Thermostat '{}' applying override: {}", self.name.as_str(), state),
            None => info!("Thermostat '{}' cleared override", self.name.as_str()),
        }
        self.switch
            .as_valve()
            .ok_or(PluginError::MissingCapability)?
            .transition_to(target);
        *self.config.borrow_mut() = settings;
        Ok(())
    }

    fn config(&self) -> Document {
        self.config.borrow().store()
    }
}

/// Register the thermostat factory
pub fn register<P: Partition>(functions: &mut FunctionManager<'_, P>) {
    functions.register_factory(THERMOSTAT, |init: &FunctionInit<'_, '_>| {
        let mut settings = ThermostatSettings::default();
        settings.load(init.params);
        if settings.switch.get().is_empty() {
            return Err(PluginError::InvalidParameters);
        }
        let switch = init.valve(settings.switch.get())?;
        Ok(Rc::new(Thermostat::new(init.name, switch)) as Rc<dyn Function>)
    });
}
