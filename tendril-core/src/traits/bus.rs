//! Message bus transport

use alloc::format;
use alloc::string::String;

use embassy_time::Duration;
use tendril_protocol::{topics, Document, QoS, Retention};

/// Errors that can occur when publishing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PublishError {
    /// Not connected to the broker
    Disconnected,
    /// Delivery was not confirmed before the deadline
    Timeout,
    /// Outbound queue is full
    QueueFull,
    /// Payload could not be serialized
    Encode,
}

/// A command request received from the bus
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingCommand {
    /// Command name relative to `<root>/commands/`, e.g. `storage/read`
    pub name: String,
    pub request: Document,
}

/// Connection to the message broker
///
/// Topics passed to `publish` are complete. Connection management,
/// reconnects and retries are the implementation's concern; it sets
/// `mqtt_ready` while connected.
pub trait MessageBus {
    /// Publish a document
    ///
    /// With a `deadline`, waits at most that long for delivery to be
    /// confirmed at the requested `qos`.
    fn publish(
        &self,
        topic: &str,
        payload: &Document,
        retention: Retention,
        qos: QoS,
        deadline: Option<Duration>,
    ) -> impl core::future::Future<Output = Result<(), PublishError>>;

    /// Wait for the next command addressed to this device
    fn receive_command(&self) -> impl core::future::Future<Output = IncomingCommand>;

    /// Add connection statistics to the `mqtt` telemetry object
    fn populate_telemetry(&self, _telemetry: &mut Document) {}
}

/// A bus scoped to the device topic root
pub struct BusRoot<'a, B> {
    bus: &'a B,
    root: String,
}

impl<'a, B: MessageBus> BusRoot<'a, B> {
    pub fn new(bus: &'a B, root: String) -> Self {
        Self { bus, root }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn bus(&self) -> &'a B {
        self.bus
    }

    /// Complete topic for a suffix under the root
    pub fn topic(&self, suffix: &str) -> String {
        format!("{}/{}", self.root, suffix)
    }

    /// Publish under the root
    pub async fn publish(
        &self,
        suffix: &str,
        payload: &Document,
        retention: Retention,
        qos: QoS,
        deadline: Option<Duration>,
    ) -> Result<(), PublishError> {
        self.bus
            .publish(&self.topic(suffix), payload, retention, qos, deadline)
            .await
    }

    /// Publish the response to `command`
    pub async fn publish_response(
        &self,
        command: &str,
        response: &Document,
    ) -> Result<(), PublishError> {
        self.publish(
            &topics::response_topic(command),
            response,
            Retention::NoRetain,
            QoS::ExactlyOnce,
            None,
        )
        .await
    }
}
