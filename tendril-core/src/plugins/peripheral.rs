//! Peripheral registry

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use tendril_protocol::{Document, ItemReport};

use super::valve::Valve;
use super::{item_report, Declaration, PluginError};
use crate::config::RawJson;
use crate::telemetry::{TelemetryCollector, TelemetryFeature};

/// A constructed peripheral
pub trait Peripheral {
    fn name(&self) -> &str;

    /// The valve capability, if the peripheral has one
    fn as_valve(&self) -> Option<&dyn Valve> {
        None
    }

    /// Whether the peripheral adds an entry to the `features` telemetry
    fn reports_telemetry(&self) -> bool {
        false
    }

    fn populate_telemetry(&self, _telemetry: &mut Document) {}
}

/// What a factory gets to build a peripheral from
pub struct PeripheralInit<'d> {
    pub name: &'d str,
    pub params: &'d Document,
}

/// Builds peripherals of one type
pub type PeripheralFactory<'a> =
    Box<dyn Fn(&PeripheralInit<'_>) -> Result<Rc<dyn Peripheral>, PluginError> + 'a>;

struct PeripheralTelemetry(Rc<dyn Peripheral>);

impl TelemetryFeature for PeripheralTelemetry {
    fn populate_telemetry(&self, telemetry: &mut Document) {
        self.0.populate_telemetry(telemetry);
    }
}

/// Peripheral factories and the peripherals built so far
pub struct PeripheralManager<'a> {
    telemetry: &'a TelemetryCollector,
    factories: BTreeMap<String, PeripheralFactory<'a>>,
    peripherals: Vec<Rc<dyn Peripheral>>,
}

impl<'a> PeripheralManager<'a> {
    pub fn new(telemetry: &'a TelemetryCollector) -> Self {
        Self {
            telemetry,
            factories: BTreeMap::new(),
            peripherals: Vec::new(),
        }
    }

    /// Register the factory for a peripheral type
    pub fn register_factory(
        &mut self,
        type_name: &str,
        factory: impl Fn(&PeripheralInit<'_>) -> Result<Rc<dyn Peripheral>, PluginError> + 'a,
    ) {
        debug!("Registering peripheral factory {}", type_name);
        self.factories
            .insert(type_name.to_string(), Box::new(factory));
    }

    /// Look up a built peripheral by name
    pub fn get(&self, name: &str) -> Option<Rc<dyn Peripheral>> {
        self.peripherals
            .iter()
            .find(|peripheral| peripheral.name() == name)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.peripherals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peripherals.is_empty()
    }

    fn build(&mut self, declaration: &Declaration) -> Result<(), PluginError> {
        if self.get(&declaration.name).is_some() {
            return Err(PluginError::DuplicateName);
        }
        let factory = self
            .factories
            .get(&declaration.type_name)
            .ok_or(PluginError::UnknownType)?;
        let peripheral = factory(&PeripheralInit {
            name: &declaration.name,
            params: &declaration.params,
        })?;

        if peripheral.reports_telemetry() {
            self.telemetry.register(
                &declaration.type_name,
                &declaration.name,
                Rc::new(PeripheralTelemetry(peripheral.clone())),
            );
        }
        self.peripherals.push(peripheral);
        Ok(())
    }

    /// Build one declared peripheral
    pub fn create(&mut self, raw: &RawJson) -> ItemReport {
        let declaration = match Declaration::parse(raw) {
            Ok(declaration) => declaration,
            Err(e) => {
                error!("Invalid peripheral declaration: {}", raw.as_str());
                return item_report(None, Err(e));
            }
        };

        info!(
            "Creating peripheral '{}' of type '{}'",
            declaration.name.as_str(),
            declaration.type_name.as_str()
        );
        let result = self.build(&declaration);
        if let Err(e) = result {
            error!(
                "Failed to create peripheral '{}': {}",
                declaration.name.as_str(),
                e
            );
        }
        item_report(Some(&declaration), result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::tests::{raw, valve_factories};
    use serde_json::{json, Value};

    struct Meter {
        name: String,
    }

    impl Peripheral for Meter {
        fn name(&self) -> &str {
            &self.name
        }

        fn reports_telemetry(&self) -> bool {
            true
        }

        fn populate_telemetry(&self, telemetry: &mut Document) {
            telemetry.insert("flow".into(), Value::from(12));
        }
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let telemetry = TelemetryCollector::new();
        let mut manager = PeripheralManager::new(&telemetry);
        valve_factories(&mut manager);

        assert!(manager.create(&raw(json!({"type": "valve", "name": "a"}))).success);
        let duplicate = manager.create(&raw(json!({"type": "valve", "name": "a"})));
        assert_eq!(duplicate.error.as_deref(), Some("duplicate name"));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_capability_lookup() {
        let telemetry = TelemetryCollector::new();
        let mut manager = PeripheralManager::new(&telemetry);
        valve_factories(&mut manager);
        manager.create(&raw(json!({"type": "valve", "name": "main"})));

        let peripheral = manager.get("main").unwrap();
        assert!(peripheral.as_valve().is_some());
        assert!(manager.get("other").is_none());
    }

    #[test]
    fn test_telemetry_registered_for_reporting_peripherals() {
        let telemetry = TelemetryCollector::new();
        let mut manager = PeripheralManager::new(&telemetry);
        valve_factories(&mut manager);
        manager.register_factory("meter", |init: &PeripheralInit<'_>| {
            Ok(Rc::new(Meter {
                name: init.name.to_string(),
            }) as Rc<dyn Peripheral>)
        });

        manager.create(&raw(json!({"type": "valve", "name": "main"})));
        manager.create(&raw(json!({"type": "meter", "name": "flow"})));

        assert_eq!(
            telemetry.collect(),
            alloc::vec![json!({"type": "meter", "name": "flow", "flow": 12})]
        );
    }
}
