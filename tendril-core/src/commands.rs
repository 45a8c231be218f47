//! Remote command dispatch
//!
//! Handlers are registered by name and run synchronously in the command
//! loop. A handler fills in a response document; non-empty responses are
//! published to `responses/<name>` under the device root.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cell::RefCell;

use embassy_time::Instant;
use serde::Serialize;
use tendril_hal::{Partition, SystemControl};
use tendril_protocol::commands::{self as cmd, parse_request};
use tendril_protocol::{to_document, Document};

use crate::plugins::{FunctionManager, PluginError};
use crate::store::NvsStore;
use crate::telemetry::TelemetryRequests;
use crate::traits::{BusRoot, MessageBus};
use crate::update::store_pending_update;

/// Why a command produced an error response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandError {
    /// No handler is registered under the name
    UnknownCommand,
    /// The request body does not match the command
    InvalidRequest,
}

impl CommandError {
    /// Message sent in the `error` field of the response
    pub fn message(self) -> &'static str {
        match self {
            CommandError::UnknownCommand => cmd::UNKNOWN_COMMAND,
            CommandError::InvalidRequest => cmd::INVALID_REQUEST,
        }
    }
}

/// Command handler: request in, response out
pub type CommandHandler<'a> = Box<dyn FnMut(&Document, &mut Document) -> Result<(), CommandError> + 'a>;

/// Commands by name
#[derive(Default)]
pub struct CommandRegistry<'a> {
    handlers: BTreeMap<String, CommandHandler<'a>>,
}

impl<'a> CommandRegistry<'a> {
    pub fn new() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }

    /// Register a handler, replacing any previous one of the same name
    pub fn register(
        &mut self,
        name: &str,
        handler: impl FnMut(&Document, &mut Document) -> Result<(), CommandError> + 'a,
    ) {
        if self
            .handlers
            .insert(name.to_string(), Box::new(handler))
            .is_some()
        {
            warn!("Command {} registered twice, keeping the latest", name);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered command names in order
    pub fn names(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }

    /// Run the handler for `name`
    pub fn dispatch(&mut self, name: &str, request: &Document) -> Result<Document, CommandError> {
        let handler = self
            .handlers
            .get_mut(name)
            .ok_or(CommandError::UnknownCommand)?;
        let mut response = Document::new();
        handler(request, &mut response)?;
        Ok(response)
    }

    /// Run the handler for `name`, turning failures into error responses
    pub fn handle(&mut self, name: &str, request: &Document) -> Document {
        match self.dispatch(name, request) {
            Ok(response) => response,
            Err(e) => {
                warn!("Command {} failed: {}", name, e);
                to_document(&cmd::ErrorResponse { error: e.message() })
            }
        }
    }

    /// Receive, dispatch and answer commands forever
    pub async fn run<B: MessageBus>(&mut self, root: &BusRoot<'_, B>) -> ! {
        info!("Command task started");

        loop {
            let command = root.bus().receive_command().await;
            debug!("Received command {}", command.name.as_str());
            let response = self.handle(&command.name, &command.request);
            if response.is_empty() {
                continue;
            }
            if let Err(e) = root.publish_response(&command.name, &response).await {
                warn!("Failed to publish response to {}: {}", command.name.as_str(), e);
            }
        }
    }
}

fn respond<T: Serialize>(response: &mut Document, body: &T) {
    response.extend(to_document(body));
}

/// `restart` and `sleep`
pub fn register_system_commands<'a, S: SystemControl>(
    registry: &mut CommandRegistry<'a>,
    system: &'a S,
) {
    registry.register(cmd::RESTART, move |_, _| {
        info!("Restarting");
        system.restart();
        Ok(())
    });
    registry.register(cmd::SLEEP, move |request, _| {
        let request: cmd::SleepRequest =
            parse_request(request).map_err(|_| CommandError::InvalidRequest)?;
        let duration = request.duration.map(core::time::Duration::from_secs);
        match request.duration {
            Some(secs) => info!("Sleeping deep for {} seconds", secs),
            None => info!("Sleeping deep until woken"),
        }
        system.deep_sleep(duration);
        Ok(())
    });
}

/// `storage/list`, `storage/read`, `storage/write` and `storage/remove`
pub fn register_storage_commands<'a, P: Partition + 'a>(
    registry: &mut CommandRegistry<'a>,
    store: NvsStore<'a, P>,
) {
    registry.register(cmd::STORAGE_LIST, move |_, response| {
        let entries = match store.list() {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Failed to list {}: {}", store.namespace(), e);
                Vec::new()
            }
        };
        respond(
            response,
            &cmd::ListResponse {
                entries: entries
                    .into_iter()
                    .map(|key| cmd::ListEntry { key })
                    .collect(),
            },
        );
        Ok(())
    });

    registry.register(cmd::STORAGE_READ, move |request, response| {
        let request: cmd::KeyRequest =
            parse_request(request).map_err(|_| CommandError::InvalidRequest)?;
        info!("Reading key {}", request.key.as_str());
        let value = store.get_json(&request.key).ok().flatten();
        let error = value.is_none().then_some(cmd::KEY_NOT_FOUND);
        respond(
            response,
            &cmd::ReadResponse {
                key: request.key,
                value,
                error,
            },
        );
        Ok(())
    });

    registry.register(cmd::STORAGE_WRITE, move |request, response| {
        let request: cmd::WriteRequest =
            parse_request(request).map_err(|_| CommandError::InvalidRequest)?;
        info!("Writing key {}", request.key.as_str());
        let written = store.set_json(&request.key, &request.value).is_ok();
        respond(
            response,
            &cmd::WriteResponse {
                key: request.key,
                written,
                error: (!written).then_some(cmd::WRITE_FAILED),
            },
        );
        Ok(())
    });

    registry.register(cmd::STORAGE_REMOVE, move |request, response| {
        let request: cmd::KeyRequest =
            parse_request(request).map_err(|_| CommandError::InvalidRequest)?;
        info!("Removing key {}", request.key.as_str());
        let removed = matches!(store.remove(&request.key), Ok(true));
        respond(
            response,
            &cmd::RemoveResponse {
                key: request.key,
                removed: removed.then_some(true),
                error: (!removed).then_some(cmd::REMOVE_FAILED),
            },
        );
        Ok(())
    });
}

/// `update`: record the URL and restart into the update
pub fn register_update_command<'a, P: Partition + 'a, S: SystemControl>(
    registry: &mut CommandRegistry<'a>,
    store: NvsStore<'a, P>,
    system: &'a S,
) {
    registry.register(cmd::UPDATE, move |request, response| {
        let request: cmd::UpdateRequest = parse_request(request).unwrap_or_default();
        let outcome = match request.url() {
            None => cmd::UpdateResponse::failed(cmd::NO_URL),
            Some("") => cmd::UpdateResponse::failed(cmd::EMPTY_URL),
            Some(url) => match store_pending_update(&store, url) {
                Ok(()) => {
                    info!("Update scheduled, restarting");
                    system.restart();
                    cmd::UpdateResponse::succeeded()
                }
                Err(e) => {
                    error!("Failed to store pending update: {}", e);
                    cmd::UpdateResponse::failed(cmd::WRITE_FAILED)
                }
            },
        };
        respond(response, &outcome);
        Ok(())
    });
}

/// `ping`: answer with the uptime and publish telemetry
pub fn register_ping_command<'a>(
    registry: &mut CommandRegistry<'a>,
    telemetry: &'a TelemetryRequests,
) {
    registry.register(cmd::PING, move |_, response| {
        telemetry.request();
        respond(
            response,
            &cmd::PongResponse {
                pong: Instant::now().as_millis(),
            },
        );
        Ok(())
    });
}

/// `functions/config`: apply and persist a function's runtime configuration
pub fn register_function_config_command<'a, 'f, P>(
    registry: &mut CommandRegistry<'a>,
    functions: &'a RefCell<FunctionManager<'f, P>>,
) where
    'f: 'a,
    P: Partition + 'a,
{
    registry.register(cmd::FUNCTION_CONFIG, move |request, response| {
        let request: cmd::FunctionConfigRequest =
            parse_request(request).map_err(|_| CommandError::InvalidRequest)?;
        info!("Configuring function {}", request.name.as_str());
        let result = functions
            .borrow()
            .reconfigure(&request.name, &request.config);
        let body = match result {
            Ok(config) => cmd::FunctionConfigResponse {
                name: request.name,
                config: Some(config),
                error: None,
            },
            Err(e) => {
                warn!("Failed to configure function {}: {}", request.name.as_str(), e);
                cmd::FunctionConfigResponse {
                    name: request.name,
                    config: None,
                    error: Some(PluginError::message(e)),
                }
            }
        };
        respond(response, &body);
        Ok(())
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::tests::{raw, valve_factories};
    use crate::plugins::{thermostat, PeripheralManager};
    use crate::store::{shared, MemoryPartition, CONFIG_NAMESPACE, FUNCTION_CONFIG_NAMESPACE};
    use crate::telemetry::TelemetryCollector;
    use crate::testing::{MockBus, MockSystem, SystemCall};
    use crate::update::{take_pending_update, PENDING_UPDATE_KEY};
    use alloc::vec;
    use embassy_futures::block_on;
    use embassy_futures::select::select;
    use embassy_time::Timer;
    use serde_json::{json, Value};
    use tendril_protocol::QoS;

    fn document(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_unknown_command() {
        let mut registry = CommandRegistry::new();
        assert_eq!(
            registry.dispatch("reboot", &Document::new()),
            Err(CommandError::UnknownCommand)
        );
        assert_eq!(
            Value::Object(registry.handle("reboot", &Document::new())),
            json!({"error": "Unknown command"})
        );
    }

    #[test]
    fn test_system_commands() {
        let system = MockSystem::new();
        let mut registry = CommandRegistry::new();
        register_system_commands(&mut registry, &system);

        assert!(registry.dispatch("restart", &Document::new()).unwrap().is_empty());
        registry
            .dispatch("sleep", &document(json!({"duration": 30})))
            .unwrap();
        registry.dispatch("sleep", &Document::new()).unwrap();
        assert_eq!(
            registry.dispatch("sleep", &document(json!({"duration": "soon"}))),
            Err(CommandError::InvalidRequest)
        );

        assert_eq!(
            system.calls(),
            vec![
                SystemCall::Restart,
                SystemCall::DeepSleep(Some(core::time::Duration::from_secs(30))),
                SystemCall::DeepSleep(None),
            ]
        );
    }

    #[test]
    fn test_storage_commands() {
        let partition = shared(MemoryPartition::new());
        let store = NvsStore::new(&partition, CONFIG_NAMESPACE);
        let mut registry = CommandRegistry::new();
        register_storage_commands(&mut registry, store);

        let written = registry
            .dispatch(
                "storage/write",
                &document(json!({"key": "device-config", "value": {"model": "pump"}})),
            )
            .unwrap();
        assert_eq!(
            Value::Object(written),
            json!({"key": "device-config", "written": true})
        );

        let read = registry
            .dispatch("storage/read", &document(json!({"key": "device-config"})))
            .unwrap();
        assert_eq!(
            Value::Object(read),
            json!({"key": "device-config", "value": {"model": "pump"}})
        );

        let listed = registry.dispatch("storage/list", &Document::new()).unwrap();
        assert_eq!(
            Value::Object(listed),
            json!({"entries": [{"key": "device-config"}]})
        );

        let removed = registry
            .dispatch("storage/remove", &document(json!({"key": "device-config"})))
            .unwrap();
        assert_eq!(
            Value::Object(removed),
            json!({"key": "device-config", "removed": true})
        );

        let missing = registry
            .dispatch("storage/read", &document(json!({"key": "device-config"})))
            .unwrap();
        assert_eq!(
            Value::Object(missing),
            json!({"key": "device-config", "error": "Key not found"})
        );

        let not_removed = registry
            .dispatch("storage/remove", &document(json!({"key": "device-config"})))
            .unwrap();
        assert_eq!(
            Value::Object(not_removed),
            json!({"key": "device-config", "error": "Key not found or could not be removed"})
        );

        assert_eq!(
            registry.dispatch("storage/read", &Document::new()),
            Err(CommandError::InvalidRequest)
        );
    }

    #[test]
    fn test_failed_write_is_reported() {
        let partition = shared(MemoryPartition::new());
        let store = NvsStore::new(&partition, CONFIG_NAMESPACE);
        let mut registry = CommandRegistry::new();
        register_storage_commands(&mut registry, store);
        partition.lock(|cell| cell.borrow_mut().set_fail_writes(true));

        let response = registry
            .dispatch("storage/write", &document(json!({"key": "k", "value": 1})))
            .unwrap();
        assert_eq!(
            Value::Object(response),
            json!({"key": "k", "written": false, "error": "Could not write key"})
        );
    }

    #[test]
    fn test_update_command() {
        let partition = shared(MemoryPartition::new());
        let store = NvsStore::new(&partition, CONFIG_NAMESPACE);
        let system = MockSystem::new();
        let mut registry = CommandRegistry::new();
        register_update_command(&mut registry, store, &system);

        let response = registry.dispatch("update", &Document::new()).unwrap();
        assert_eq!(
            Value::Object(response),
            json!({"failure": "Command contains no URL"})
        );
        let response = registry
            .dispatch("update", &document(json!({"url": 42})))
            .unwrap();
        assert_eq!(
            Value::Object(response),
            json!({"failure": "Command contains no URL"})
        );
        let response = registry
            .dispatch("update", &document(json!({"url": ""})))
            .unwrap();
        assert_eq!(
            Value::Object(response),
            json!({"failure": "Command contains empty url"})
        );
        assert!(!store.contains(PENDING_UPDATE_KEY).unwrap());
        assert!(system.calls().is_empty());

        let response = registry
            .dispatch("update", &document(json!({"url": "https://fw.local/1.bin"})))
            .unwrap();
        assert_eq!(Value::Object(response), json!({"success": true}));
        assert_eq!(system.calls(), vec![SystemCall::Restart]);
        assert_eq!(
            take_pending_update(&store).unwrap().as_deref(),
            Some("https://fw.local/1.bin")
        );
    }

    #[test]
    fn test_function_configuration_applied_and_stored() {
        let partition = shared(MemoryPartition::new());
        let store = NvsStore::new(&partition, FUNCTION_CONFIG_NAMESPACE);
        let telemetry = TelemetryCollector::new();
        let mut peripherals = PeripheralManager::new(&telemetry);
        valve_factories(&mut peripherals);
        peripherals.create(&raw(json!({"type": "valve", "name": "heater"})));
        let mut functions = FunctionManager::new(store);
        thermostat::register(&mut functions);
        functions.create(
            &raw(json!({"type": "thermostat", "name": "greenhouse", "params": {"switch": "heater"}})),
            &peripherals,
        );
        let functions = RefCell::new(functions);
        let mut registry = CommandRegistry::new();
        register_function_config_command(&mut registry, &functions);

        let response = registry
            .dispatch(
                "functions/config",
                &document(json!({"name": "greenhouse", "config": {"overrideState": "OPEN"}})),
            )
            .unwrap();
        assert_eq!(
            Value::Object(response),
            json!({"name": "greenhouse", "config": {"overrideState": "open"}})
        );
        assert_eq!(
            store.get_json("greenhouse").unwrap(),
            Some(json!({"overrideState": "open"}))
        );

        let response = registry
            .dispatch("functions/config", &document(json!({"name": "cellar"})))
            .unwrap();
        assert_eq!(
            Value::Object(response),
            json!({"name": "cellar", "error": "function not found"})
        );
        assert_eq!(
            registry.dispatch("functions/config", &Document::new()),
            Err(CommandError::InvalidRequest)
        );
    }

    #[test]
    fn test_ping_requests_telemetry() {
        let telemetry = TelemetryRequests::new();
        let mut registry = CommandRegistry::new();
        register_ping_command(&mut registry, &telemetry);

        let response = registry.dispatch("ping", &Document::new()).unwrap();
        assert!(response.get("pong").is_some_and(Value::is_u64));
        assert!(telemetry.is_pending());
        assert_eq!(registry.names(), vec!["ping"]);
    }

    #[test]
    fn test_command_loop_publishes_responses() {
        let bus = MockBus::new();
        let root = BusRoot::new(&bus, "devices/tendril/node".into());
        let telemetry = TelemetryRequests::new();
        let system = MockSystem::new();
        let mut registry = CommandRegistry::new();
        register_ping_command(&mut registry, &telemetry);
        register_system_commands(&mut registry, &system);

        bus.send_command("ping", Document::new());
        bus.send_command("restart", Document::new());
        bus.send_command("self-destruct", Document::new());

        block_on(select(registry.run(&root), Timer::after_millis(50)));

        let pongs = bus.published_to("devices/tendril/node/responses/ping");
        assert_eq!(pongs.len(), 1);
        assert_eq!(pongs[0].qos, QoS::ExactlyOnce);
        assert!(bus
            .published_to("devices/tendril/node/responses/restart")
            .is_empty());
        let errors = bus.published_to("devices/tendril/node/responses/self-destruct");
        assert_eq!(
            Value::Object(errors[0].payload.clone()),
            json!({"error": "Unknown command"})
        );
        assert_eq!(system.calls(), vec![SystemCall::Restart]);
    }
}
