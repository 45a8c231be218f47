//! Test doubles for the collaborator traits

use alloc::collections::VecDeque;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::Duration;
use tendril_hal::{BatteryProbe, OutputPin, ResetReason, SystemControl, WakeupCause};
use tendril_protocol::{Document, QoS, Retention};

use crate::traits::{
    ClockError, FirmwareUpdater, IncomingCommand, MessageBus, NetworkControl, PublishError,
    UpdateError, WallClock,
};

pub const MAC: [u8; 6] = [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x01];

/// 2023-11-14
pub const SYNCED_TIME: u64 = 1_700_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemCall {
    Restart,
    DeepSleep(Option<core::time::Duration>),
    Abort(String),
}

pub struct MockSystem {
    calls: RefCell<Vec<SystemCall>>,
}

impl MockSystem {
    pub fn new() -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<SystemCall> {
        self.calls.borrow().clone()
    }
}

impl SystemControl for MockSystem {
    fn restart(&self) {
        self.calls.borrow_mut().push(SystemCall::Restart);
    }

    fn deep_sleep(&self, wake_after: Option<core::time::Duration>) {
        self.calls.borrow_mut().push(SystemCall::DeepSleep(wake_after));
    }

    fn abort(&self, reason: &str) {
        self.calls
            .borrow_mut()
            .push(SystemCall::Abort(reason.to_string()));
    }

    fn reset_reason(&self) -> ResetReason {
        ResetReason::PowerOn
    }

    fn wakeup_cause(&self) -> WakeupCause {
        WakeupCause::Undefined
    }

    fn mac_address(&self) -> [u8; 6] {
        MAC
    }
}

#[derive(Debug, Clone)]
pub struct Published {
    pub topic: String,
    pub payload: Document,
    pub retention: Retention,
    pub qos: QoS,
    pub deadline: Option<Duration>,
}

pub struct MockBus {
    published: RefCell<Vec<Published>>,
    /// Messages published while failing
    undelivered: RefCell<Vec<Published>>,
    commands: Channel<CriticalSectionRawMutex, IncomingCommand, 8>,
    fail: Cell<bool>,
}

impl MockBus {
    pub fn new() -> Self {
        Self {
            published: RefCell::new(Vec::new()),
            undelivered: RefCell::new(Vec::new()),
            commands: Channel::new(),
            fail: Cell::new(false),
        }
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.set(fail);
    }

    pub fn send_command(&self, name: &str, request: Document) {
        let _ = self.commands.try_send(IncomingCommand {
            name: name.to_string(),
            request,
        });
    }

    pub fn published(&self) -> Vec<Published> {
        self.published.borrow().clone()
    }

    pub fn published_to(&self, topic: &str) -> Vec<Published> {
        filter_topic(&self.published.borrow(), topic)
    }

    pub fn undelivered_to(&self, topic: &str) -> Vec<Published> {
        filter_topic(&self.undelivered.borrow(), topic)
    }
}

fn filter_topic(messages: &[Published], topic: &str) -> Vec<Published> {
    messages
        .iter()
        .filter(|message| message.topic == topic)
        .cloned()
        .collect()
}

impl MessageBus for MockBus {
    async fn publish(
        &self,
        topic: &str,
        payload: &Document,
        retention: Retention,
        qos: QoS,
        deadline: Option<Duration>,
    ) -> Result<(), PublishError> {
        let message = Published {
            topic: topic.to_string(),
            payload: payload.clone(),
            retention,
            qos,
            deadline,
        };
        if self.fail.get() {
            self.undelivered.borrow_mut().push(message);
            return Err(PublishError::Disconnected);
        }
        self.published.borrow_mut().push(message);
        Ok(())
    }

    async fn receive_command(&self) -> IncomingCommand {
        self.commands.receive().await
    }
}

pub struct MockNetwork {
    pub forgotten: Cell<bool>,
    pub power_save: Cell<Option<bool>>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self {
            forgotten: Cell::new(false),
            power_save: Cell::new(None),
        }
    }
}

impl NetworkControl for MockNetwork {
    fn forget_association(&self) {
        self.forgotten.set(true);
    }

    fn set_power_save(&self, enabled: bool) {
        self.power_save.set(Some(enabled));
    }
}

pub struct MockClock {
    time: Cell<u64>,
    failures: Cell<usize>,
    pub attempts: Cell<usize>,
    pub hosts: RefCell<Vec<Option<String>>>,
}

impl MockClock {
    pub fn new(time: u64) -> Self {
        Self {
            time: Cell::new(time),
            failures: Cell::new(0),
            attempts: Cell::new(0),
            hosts: RefCell::new(Vec::new()),
        }
    }

    /// Fail the next `count` synchronizations
    pub fn fail_next(&self, count: usize) {
        self.failures.set(count);
    }
}

impl WallClock for MockClock {
    fn unix_time(&self) -> u64 {
        self.time.get()
    }

    async fn synchronize(&self, host: Option<&str>, _timeout: Duration) -> Result<(), ClockError> {
        self.attempts.set(self.attempts.get() + 1);
        self.hosts.borrow_mut().push(host.map(String::from));
        if self.failures.get() > 0 {
            self.failures.set(self.failures.get() - 1);
            return Err(ClockError::Timeout);
        }
        self.time.set(SYNCED_TIME);
        Ok(())
    }
}

pub struct MockUpdater {
    result: Result<(), UpdateError>,
    pub urls: RefCell<Vec<String>>,
}

impl MockUpdater {
    pub fn new(result: Result<(), UpdateError>) -> Self {
        Self {
            result,
            urls: RefCell::new(Vec::new()),
        }
    }
}

impl FirmwareUpdater for MockUpdater {
    async fn perform(&self, url: &str) -> Result<(), UpdateError> {
        self.urls.borrow_mut().push(url.to_string());
        self.result
    }
}

/// Battery that reads the scripted voltages, then repeats the last one
pub struct MockBattery {
    readings: VecDeque<u16>,
    last: u16,
}

impl MockBattery {
    pub fn new(readings: &[u16]) -> Self {
        Self {
            readings: readings.iter().copied().collect(),
            last: 0,
        }
    }
}

impl BatteryProbe for MockBattery {
    async fn voltage_mv(&mut self) -> u16 {
        if let Some(next) = self.readings.pop_front() {
            self.last = next;
        }
        self.last
    }
}

#[derive(Default)]
pub struct MockLed {
    pub high: bool,
}

impl OutputPin for MockLed {
    fn set_high(&mut self) {
        self.high = true;
    }

    fn set_low(&mut self) {
        self.high = false;
    }

    fn is_set_high(&self) -> bool {
        self.high
    }
}
