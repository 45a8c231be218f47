//! Sections shipped with every device
//!
//! - [`NetworkConfig`] under `config/network-config`
//! - [`DeviceSettings`] under `config/device-config`

use alloc::string::{String, ToString};

use embassy_time::Duration;
use tendril_protocol::topics;

use super::property::{ArrayProperty, NamedEntry, Property};
use super::value::{LogLevel, RawJson};
use crate::section;

/// Store key of [`NetworkConfig`]
pub const NETWORK_CONFIG_KEY: &str = "network-config";
/// Store key of [`DeviceSettings`]
pub const DEVICE_CONFIG_KEY: &str = "device-config";

/// Default message bus port
pub const DEFAULT_BUS_PORT: u16 = 1883;
/// Default outbound message queue length
pub const DEFAULT_QUEUE_SIZE: u16 = 16;

/// Time server settings
pub struct NtpConfig {
    /// Server to synchronize with, empty for the platform default
    pub host: Property<String>,
}

section!(NtpConfig { host });

impl Default for NtpConfig {
    fn default() -> Self {
        Self {
            host: Property::new("host", String::new()),
        }
    }
}

/// Message bus connection, device identity and time server
pub struct NetworkConfig {
    /// Broker host, empty to discover
    pub host: Property<String>,
    pub port: Property<u16>,
    /// Client identifier, empty to derive from the instance
    pub client_id: Property<String>,
    pub queue_size: Property<u16>,
    /// Instance name, defaults to the hardware address
    pub instance: Property<String>,
    /// Optional topic prefix
    pub location: Property<String>,
    pub ntp: NamedEntry<NtpConfig>,
}

section!(NetworkConfig {
    host,
    port,
    client_id,
    queue_size,
    instance,
    location,
    ntp,
});

impl NetworkConfig {
    pub fn new(default_instance: &str) -> Self {
        Self {
            host: Property::new("host", String::new()),
            port: Property::new("port", DEFAULT_BUS_PORT),
            client_id: Property::new("clientId", String::new()),
            queue_size: Property::new("queueSize", DEFAULT_QUEUE_SIZE),
            instance: Property::new("instance", default_instance.to_string()),
            location: Property::new("location", String::new()),
            ntp: NamedEntry::new("ntp", NtpConfig::default()),
        }
    }

    /// Network hostname derived from the instance name
    pub fn hostname(&self) -> String {
        topics::hostname(self.instance.get())
    }

    /// Root of every topic the device publishes or subscribes to
    pub fn topic_root(&self) -> String {
        topics::topic_root(self.location.get(), self.instance.get())
    }
}

/// Device model, plugin declarations and lifecycle timing
pub struct DeviceSettings {
    pub model: Property<String>,
    /// Peripheral declarations, one JSON object each
    pub peripherals: ArrayProperty<RawJson>,
    /// Function declarations, one JSON object each
    pub functions: ArrayProperty<RawJson>,
    pub sleep_when_idle: Property<bool>,
    /// How often to publish telemetry
    pub publish_interval: Property<Duration>,
    pub publish_logs: Property<LogLevel>,
    /// How long without published telemetry before the device aborts
    pub watchdog_timeout: Property<Duration>,
}

section!(DeviceSettings {
    model,
    peripherals,
    functions,
    sleep_when_idle,
    publish_interval,
    publish_logs,
    watchdog_timeout,
});

impl DeviceSettings {
    pub fn new(default_model: &str) -> Self {
        Self {
            model: Property::new("model", default_model.to_string()),
            peripherals: ArrayProperty::new("peripherals"),
            functions: ArrayProperty::new("functions"),
            sleep_when_idle: Property::new("sleepWhenIdle", true),
            publish_interval: Property::new("publishInterval", Duration::from_secs(5 * 60)),
            publish_logs: Property::new("publishLogs", LogLevel::default_level()),
            watchdog_timeout: Property::new("watchdogTimeout", Duration::from_secs(15 * 60)),
        }
    }
}
