//! Peripheral and function plugins
//!
//! Plugins are declared in the device settings as JSON objects:
//!
//! ```json
//! { "type": "valve", "name": "main", "params": { "pin": 4 } }
//! ```
//!
//! Each registry maps a `type` to a factory closure. Peripherals are
//! built first, then functions, which look peripherals up by name and
//! reach their capabilities through accessors such as
//! [`Peripheral::as_valve`]. Every declaration is attempted; failures are
//! recorded per item and folded into an [`InitState`].

pub mod function;
pub mod peripheral;
pub mod thermostat;
pub mod valve;

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use serde::Deserialize;
use tendril_protocol::{Document, InitState, ItemReport};

use crate::config::RawJson;
use crate::store::StoreError;

pub use function::{Function, FunctionFactory, FunctionInit, FunctionManager};
pub use peripheral::{Peripheral, PeripheralFactory, PeripheralInit, PeripheralManager};
pub use valve::{TargetState, Valve};

/// Why a plugin could not be built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PluginError {
    /// Declaration is not an object with `type` and `name`
    InvalidDeclaration,
    /// No factory is registered for the type
    UnknownType,
    /// Another plugin already uses the name
    DuplicateName,
    /// `params` or stored configuration does not fit the plugin
    InvalidParameters,
    /// A referenced peripheral does not exist
    PeripheralNotFound,
    /// A referenced peripheral lacks the required capability
    MissingCapability,
    /// No function of that name was built
    FunctionNotFound,
    /// Hardware did not respond
    Hardware,
    /// Configuration could not be persisted
    Storage(StoreError),
}

impl PluginError {
    /// Text reported in the boot announcement
    pub fn message(self) -> &'static str {
        match self {
            PluginError::InvalidDeclaration => "invalid declaration",
            PluginError::UnknownType => "unknown type",
            PluginError::DuplicateName => "duplicate name",
            PluginError::InvalidParameters => "invalid parameters",
            PluginError::PeripheralNotFound => "peripheral not found",
            PluginError::MissingCapability => "peripheral lacks required capability",
            PluginError::FunctionNotFound => "function not found",
            PluginError::Hardware => "hardware error",
            PluginError::Storage(_) => "storage error",
        }
    }
}

/// A parsed plugin declaration
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Declaration {
    #[serde(rename = "type")]
    pub type_name: String,
    pub name: String,
    #[serde(default)]
    pub params: Document,
}

impl Declaration {
    /// Parse a declaration kept in the settings
    pub fn parse(raw: &RawJson) -> Result<Self, PluginError> {
        serde_json::from_str(raw.as_str()).map_err(|_| PluginError::InvalidDeclaration)
    }
}

/// Outcome of building one declaration
pub(crate) fn item_report(
    declaration: Option<&Declaration>,
    result: Result<(), PluginError>,
) -> ItemReport {
    let (type_name, name) = match declaration {
        Some(declaration) => (declaration.type_name.clone(), declaration.name.clone()),
        None => (String::new(), String::new()),
    };
    ItemReport {
        type_name,
        name,
        success: result.is_ok(),
        error: result.err().map(|e| e.message().to_string()),
    }
}

/// Construction results of every declared plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginReport {
    pub state: InitState,
    pub peripherals: Vec<ItemReport>,
    pub functions: Vec<ItemReport>,
}

impl Default for PluginReport {
    fn default() -> Self {
        Self {
            state: InitState::Success,
            peripherals: Vec::new(),
            functions: Vec::new(),
        }
    }
}

impl PluginReport {
    pub fn record_peripheral(&mut self, report: ItemReport) {
        if !report.success {
            self.state = InitState::PeripheralError;
        }
        self.peripherals.push(report);
    }

    /// A function failure takes precedence over any peripheral failure
    pub fn record_function(&mut self, report: ItemReport) {
        if !report.success {
            self.state = InitState::FunctionError;
        }
        self.functions.push(report);
    }
}

/// Build built-in peripherals, configured peripherals and functions, in
/// that order
pub fn build_plugins<P: tendril_hal::Partition>(
    peripherals: &mut PeripheralManager<'_>,
    functions: &mut FunctionManager<'_, P>,
    builtin: &[RawJson],
    configured_peripherals: &[RawJson],
    configured_functions: &[RawJson],
) -> PluginReport {
    let mut report = PluginReport::default();

    debug!("Creating {} built-in peripherals", builtin.len());
    for declaration in builtin {
        report.record_peripheral(peripherals.create(declaration));
    }

    info!(
        "Creating {} user-configured peripherals",
        configured_peripherals.len()
    );
    for declaration in configured_peripherals {
        report.record_peripheral(peripherals.create(declaration));
    }

    info!(
        "Creating {} user-configured functions",
        configured_functions.len()
    );
    for declaration in configured_functions {
        report.record_function(functions.create(declaration, peripherals));
    }

    report
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::{shared, MemoryPartition, NvsStore, FUNCTION_CONFIG_NAMESPACE};
    use crate::telemetry::TelemetryCollector;
    use alloc::rc::Rc;
    use alloc::vec;
    use core::cell::Cell;
    use serde_json::{json, Value};

    /// Valve that remembers where it was sent
    pub(crate) struct TestValve {
        name: String,
        state: Cell<Option<TargetState>>,
    }

    impl TestValve {
        pub(crate) fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                state: Cell::new(None),
            }
        }
    }

    impl Valve for TestValve {
        fn transition_to(&self, target: Option<TargetState>) {
            self.state.set(Some(target.unwrap_or(TargetState::Closed)));
        }

        fn state(&self) -> Option<TargetState> {
            self.state.get()
        }
    }

    impl Peripheral for TestValve {
        fn name(&self) -> &str {
            &self.name
        }

        fn as_valve(&self) -> Option<&dyn Valve> {
            Some(self)
        }
    }

    /// Peripherals of type `valve`, failing when `params.fail` is true
    pub(crate) fn valve_factories(manager: &mut PeripheralManager<'_>) {
        manager.register_factory("valve", |init: &PeripheralInit<'_>| {
            if init.params.get("fail").and_then(Value::as_bool) == Some(true) {
                return Err(PluginError::Hardware);
            }
            Ok(Rc::new(TestValve::new(init.name)) as Rc<dyn Peripheral>)
        });
    }

    pub(crate) fn raw(value: Value) -> RawJson {
        RawJson::from_value(&value)
    }

    #[test]
    fn test_declaration_parse() {
        let declaration =
            Declaration::parse(&raw(json!({"type": "valve", "name": "main"}))).unwrap();
        assert_eq!(declaration.type_name, "valve");
        assert!(declaration.params.is_empty());
        assert_eq!(
            Declaration::parse(&raw(json!({"name": "main"}))),
            Err(PluginError::InvalidDeclaration)
        );
        assert_eq!(
            Declaration::parse(&raw(json!("valve"))),
            Err(PluginError::InvalidDeclaration)
        );
    }

    #[test]
    fn test_second_of_three_peripherals_fails() {
        let partition = shared(MemoryPartition::new());
        let telemetry = TelemetryCollector::new();
        let mut peripherals = PeripheralManager::new(&telemetry);
        valve_factories(&mut peripherals);
        let mut functions =
            FunctionManager::new(NvsStore::new(&partition, FUNCTION_CONFIG_NAMESPACE));

        let declared = vec![
            raw(json!({"type": "valve", "name": "first"})),
            raw(json!({"type": "valve", "name": "second", "params": {"fail": true}})),
            raw(json!({"type": "valve", "name": "third"})),
        ];
        let report = build_plugins(&mut peripherals, &mut functions, &[], &declared, &[]);

        assert_eq!(report.state, InitState::PeripheralError);
        let outcomes: Vec<(&str, bool)> = report
            .peripherals
            .iter()
            .map(|item| (item.name.as_str(), item.success))
            .collect();
        assert_eq!(
            outcomes,
            vec![("first", true), ("second", false), ("third", true)]
        );
        assert_eq!(
            report.peripherals[1].error.as_deref(),
            Some("hardware error")
        );
        assert!(peripherals.get("third").is_some());
        assert!(peripherals.get("second").is_none());
    }

    #[test]
    fn test_function_failure_takes_precedence() {
        let partition = shared(MemoryPartition::new());
        let telemetry = TelemetryCollector::new();
        let mut peripherals = PeripheralManager::new(&telemetry);
        valve_factories(&mut peripherals);
        let mut functions =
            FunctionManager::new(NvsStore::new(&partition, FUNCTION_CONFIG_NAMESPACE));
        thermostat::register(&mut functions);

        let report = build_plugins(
            &mut peripherals,
            &mut functions,
            &[raw(json!({"type": "valve", "name": "builtin"}))],
            &[raw(json!({"type": "pump", "name": "p"}))],
            &[raw(json!({"type": "thermostat", "name": "t", "params": {"switch": "nowhere"}}))],
        );

        assert_eq!(report.state, InitState::FunctionError);
        assert_eq!(report.peripherals.len(), 2);
        assert!(report.peripherals[0].success);
        assert_eq!(report.peripherals[1].error.as_deref(), Some("unknown type"));
        assert_eq!(
            report.functions[0].error.as_deref(),
            Some("peripheral not found")
        );
    }

    #[test]
    fn test_report_serializes_type_and_name() {
        let report = item_report(None, Err(PluginError::InvalidDeclaration));
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(
            value,
            json!({"type": "", "name": "", "success": false, "error": "invalid declaration"})
        );
    }
}
