//! Device bring-up
//!
//! [`Kernel::run`] brings a freshly booted device to readiness:
//!
//! 1. Battery gate: too low a voltage sends the device back to sleep
//!    before anything else draws current
//! 2. Storage bring-up, erasing an unusable partition once
//! 3. Network and device configuration, boot record
//! 4. Watchdog armed with the configured timeout
//! 5. Background tasks: watchdog, status LED, reset button, battery
//!    monitor, clock sync
//! 6. Commands registered and the command loop started beside the rest
//!    of bring-up; a pending update is applied once the network is up
//! 7. Wait for the wall clock
//! 8. Peripherals and functions built, failures collected
//! 9. Telemetry loop started
//! 10. `kernel_ready` set and the boot announced on `init`
//!
//! Network association and the bus connection are external drivers that
//! publish their readiness on the shared [`ModuleStates`].

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cell::RefCell;

use embassy_futures::join::join;
use embassy_futures::select::{select, select3, select4, Either, Either3, Either4};
use embassy_time::{Duration, Instant};
use tendril_hal::{BatteryProbe, EdgeInput, FlashError, OutputPin, Partition, SystemControl};
use tendril_protocol::topics::format_mac;
use tendril_protocol::{to_document, InitMessage, MemoryTelemetry, QoS, Retention, TelemetryMessage};

use crate::boot::BootRecord;
use crate::clock::ClockSync;
use crate::commands::{
    register_function_config_command, register_ping_command, register_storage_commands,
    register_system_commands, register_update_command, CommandRegistry,
};
use crate::config::device::{DEVICE_CONFIG_KEY, NETWORK_CONFIG_KEY};
use crate::config::{ConfigError, DeviceSettings, Document, NetworkConfig, NvsConfiguration, RawJson};
use crate::plugins::{build_plugins, thermostat, FunctionManager, PeripheralManager};
use crate::power::{check_boot_voltage, BatteryMonitor, BatteryParameters, BootDecision, PowerManager};
use crate::reset::{watch_reset_button, FactoryReset};
use crate::state::ModuleStates;
use crate::status::StatusLed;
use crate::store::{
    init_storage, NvsStore, SharedPartition, CONFIG_NAMESPACE, FUNCTION_CONFIG_NAMESPACE,
    KERNEL_NAMESPACE,
};
use crate::switch::{SwitchMode, SwitchMonitor};
use crate::telemetry::{run_publish_loop, TelemetryCollector, TelemetryRequests};
use crate::traits::{BusRoot, FirmwareUpdater, MessageBus, NetworkControl, WallClock};
use crate::update::{perform_pending_update, PendingUpdateOutcome};
use crate::watchdog::Watchdog;

/// How long the boot announcement may take to be confirmed
pub const INIT_DEADLINE: Duration = Duration::from_secs(5);

/// Crash reason recorded when the watchdog fires
pub const WATCHDOG_CRASH: &str = "Watchdog timed out";

const INIT_TOPIC: &str = "init";
const TELEMETRY_TOPIC: &str = "telemetry";

/// Errors that stop bring-up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootError {
    /// Partition unusable even after erasing
    Storage(FlashError),
    /// Stored configuration could not be loaded
    Config(ConfigError),
}

impl BootError {
    /// Abort reason passed to the system
    pub fn reason(&self) -> &'static str {
        match self {
            BootError::Storage(_) => "Storage unusable",
            BootError::Config(_) => "Configuration unreadable",
        }
    }
}

/// Why [`Kernel::run`] returned
///
/// On hardware the system call behind each variant does not return, so
/// the kernel returns only on host builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Shutdown {
    /// Sent to deep sleep to recharge
    LowBattery { voltage_mv: u16 },
    /// Watchdog fired and the system aborted
    WatchdogTimeout,
    /// Restarted after installing a pending update
    Restart,
    /// Bring-up failed and the system aborted
    Fatal(BootError),
}

/// The hardware a device is built from
///
/// Implemented once per board; supplies the driver types, the device
/// identity and the plugin factories.
pub trait Board {
    type Partition: Partition;
    type System: SystemControl;
    type Bus: MessageBus;
    type Network: NetworkControl;
    type Clock: WallClock;
    type Updater: FirmwareUpdater;
    type Led: OutputPin;
    type Button: EdgeInput;
    type Battery: BatteryProbe;

    /// Model reported when the device configuration does not name one
    fn model(&self) -> &'static str;

    /// Firmware version
    fn version(&self) -> &'static str;

    /// Battery thresholds, `None` for mains-powered boards
    fn battery_parameters(&self) -> Option<BatteryParameters> {
        None
    }

    fn reset_switch_mode(&self) -> SwitchMode {
        SwitchMode::PullUp
    }

    /// Peripherals every unit of the board has
    fn builtin_peripherals(&self) -> Vec<RawJson> {
        Vec::new()
    }

    fn register_peripheral_factories<'b>(&'b self, _peripherals: &mut PeripheralManager<'b>) {}

    fn register_function_factories<'b>(
        &'b self,
        functions: &mut FunctionManager<'b, Self::Partition>,
    ) {
        thermostat::register(functions);
    }
}

/// Driver instances handed to the kernel
pub struct Drivers<'a, D: Board> {
    pub partition: &'a SharedPartition<D::Partition>,
    pub system: &'a D::System,
    pub bus: &'a D::Bus,
    pub network: &'a D::Network,
    pub clock: &'a D::Clock,
    pub updater: &'a D::Updater,
    pub status_led: D::Led,
    pub reset_button: D::Button,
    /// Required for the battery gate and monitor
    pub battery: Option<D::Battery>,
}

pub struct Kernel<'a, D: Board> {
    board: &'a D,
    drivers: Drivers<'a, D>,
}

fn fatal<S: SystemControl>(system: &S, error: BootError) -> Shutdown {
    error!("Bring-up failed: {}", error);
    system.abort(error.reason());
    Shutdown::Fatal(error)
}

impl<'a, D: Board> Kernel<'a, D> {
    pub fn new(board: &'a D, drivers: Drivers<'a, D>) -> Self {
        Self { board, drivers }
    }

    /// Bring the device up and keep it running
    pub async fn run(self, states: &ModuleStates) -> Shutdown {
        let Kernel { board, drivers } = self;
        let Drivers {
            partition,
            system,
            bus,
            network,
            clock,
            updater,
            mut status_led,
            reset_button,
            mut battery,
        } = drivers;

        info!("Starting {} version {}", board.model(), board.version());

        // Battery gate
        let battery_parameters = board.battery_parameters();
        if let (Some(parameters), Some(probe)) = (battery_parameters.as_ref(), battery.as_mut()) {
            let voltage_mv = probe.voltage_mv().await;
            if let BootDecision::DeepSleep { voltage_mv } = check_boot_voltage(voltage_mv, parameters)
            {
                warn!(
                    "Battery voltage too low ({} mV < {} mV), going back to sleep",
                    voltage_mv,
                    parameters.boot_threshold_mv
                );
                system.deep_sleep(None);
                return Shutdown::LowBattery { voltage_mv };
            }
        }

        // Storage
        if let Err(e) = init_storage(partition) {
            return fatal(system, BootError::Storage(e));
        }

        // Configuration
        let config_store = NvsStore::new(partition, CONFIG_NAMESPACE);
        match config_store.list() {
            Ok(keys) => {
                for key in &keys {
                    debug!(" - {}/{}", CONFIG_NAMESPACE, key.as_str());
                }
            }
            Err(e) => warn!("Failed to list stored configuration: {}", e),
        }

        let mac = format_mac(&system.mac_address());
        let network_config =
            match NvsConfiguration::open(config_store, NETWORK_CONFIG_KEY, NetworkConfig::new(&mac)) {
                Ok(config) => config,
                Err(e) => return fatal(system, BootError::Config(e)),
            };
        let device = match NvsConfiguration::open(
            config_store,
            DEVICE_CONFIG_KEY,
            DeviceSettings::new(board.model()),
        ) {
            Ok(config) => config,
            Err(e) => return fatal(system, BootError::Config(e)),
        };
        let settings = device.config();
        let network_settings = network_config.config();

        let kernel_store = NvsStore::new(partition, KERNEL_NAMESPACE);
        let mut boot_record = BootRecord::load(&kernel_store).unwrap_or_else(|e| {
            warn!("Failed to read boot record: {}", e);
            BootRecord::default()
        });

        // Watchdog
        let watchdog = Watchdog::new(*settings.watchdog_timeout.get());
        let watchdog_task = async {
            watchdog
                .run(|_| {
                    let uptime_ms = Instant::now().as_millis();
                    if let Err(e) = BootRecord::record_crash(&kernel_store, WATCHDOG_CRASH, uptime_ms)
                    {
                        error!("Failed to record crash: {}", e);
                    }
                    system.abort(WATCHDOG_CRASH);
                })
                .await;
            Shutdown::WatchdogTimeout
        };

        // Background tasks
        let power = PowerManager::new(*settings.sleep_when_idle.get());
        network.set_power_save(power.sleep_when_idle());

        let status = StatusLed::new();
        let telemetry_requests = TelemetryRequests::new();
        let features = TelemetryCollector::new();

        let factory_reset = FactoryReset::new(&status, partition, network, system);
        let mut reset_button =
            SwitchMonitor::new("factory-reset", reset_button, board.reset_switch_mode());

        let ntp_host: String = network_settings.ntp.get().host.get().clone();
        let clock_sync = ClockSync::new(clock, states.network_ready.state(), &states.rtc_in_sync);

        let background = select3(
            status.run(&mut status_led, states),
            watch_reset_button(&mut reset_button, &factory_reset, &telemetry_requests),
            clock_sync.run(&ntp_host),
        );

        let monitor = battery_parameters.map(BatteryMonitor::new);
        let battery_task = async {
            match (monitor.as_ref(), battery.as_mut()) {
                (Some(monitor), Some(probe)) => {
                    let voltage_mv = monitor.run(probe).await;
                    system.deep_sleep(None);
                    Shutdown::LowBattery { voltage_mv }
                }
                _ => core::future::pending().await,
            }
        };

        let root = BusRoot::new(bus, network_settings.topic_root());
        info!("Topic root is {}", root.root());

        let mut peripherals = PeripheralManager::new(&features);
        board.register_peripheral_factories(&mut peripherals);
        let mut functions = FunctionManager::new(NvsStore::new(partition, FUNCTION_CONFIG_NAMESPACE));
        board.register_function_factories(&mut functions);
        let functions = RefCell::new(functions);

        let mut commands = CommandRegistry::new();
        register_system_commands(&mut commands, system);
        register_storage_commands(&mut commands, config_store);
        register_update_command(&mut commands, config_store, system);
        register_ping_command(&mut commands, &telemetry_requests);
        register_function_config_command(&mut commands, &functions);

        let sequence = async {
            // Pending update
            match perform_pending_update(
                &config_store,
                states.network_ready.state(),
                updater,
                system,
            )
            .await
            {
                Ok(PendingUpdateOutcome::Installed) => return Shutdown::Restart,
                Ok(_) => {}
                Err(e) => error!("Failed to read pending update: {}", e),
            }

            // Clock
            if !states.rtc_in_sync.is_set() {
                info!("Waiting for time sync");
            }
            states.rtc_in_sync.state().wait_set().await;

            // Plugins
            let report = build_plugins(
                &mut peripherals,
                &mut *functions.borrow_mut(),
                &board.builtin_peripherals(),
                settings.peripherals.get(),
                settings.functions.get(),
            );

            // Telemetry
            let root = &root;
            let features = &features;
            let power = &power;
            let monitor = monitor.as_ref();
            let publish_loop = run_publish_loop(
                *settings.publish_interval.get(),
                &watchdog,
                &telemetry_requests,
                move || {
                    let mut wifi = Document::new();
                    network.populate_telemetry(&mut wifi);
                    let mut mqtt = Document::new();
                    bus.populate_telemetry(&mut mqtt);
                    let mut pm = Document::new();
                    power.populate_telemetry(&mut pm);
                    let memory = system.memory();
                    let message = to_document(&TelemetryMessage {
                        uptime: Instant::now().as_millis(),
                        timestamp: clock.unix_time_ms(),
                        battery: monitor.and_then(BatteryMonitor::status).map(|s| s.telemetry()),
                        wifi,
                        mqtt,
                        memory: MemoryTelemetry {
                            free_heap: memory.free_heap,
                            min_heap: memory.min_free_heap,
                        },
                        pm,
                        features: features.collect(),
                    });
                    async move {
                        if let Err(e) = root
                            .publish(
                                TELEMETRY_TOPIC,
                                &message,
                                Retention::NoRetain,
                                QoS::AtLeastOnce,
                                None,
                            )
                            .await
                        {
                            warn!("Failed to publish telemetry: {}", e);
                        }
                    }
                },
            );

            // Announcement
            let announce = async {
                states.kernel_ready.set();

                let message = InitMessage {
                    model: settings.model.get().clone(),
                    instance: network_settings.instance.get().clone(),
                    mac: mac.clone(),
                    settings: device.store(),
                    version: board.version().to_string(),
                    debug: cfg!(feature = "debug"),
                    reset: system.reset_reason().as_str().to_string(),
                    wakeup: system.wakeup_cause().as_str().to_string(),
                    boot_count: boot_record.boot_count,
                    time: clock.unix_time(),
                    state: report.state,
                    peripherals: report.peripherals,
                    functions: report.functions,
                    sleep_when_idle: power.sleep_when_idle(),
                    crash: boot_record.crash.clone(),
                };
                let delivered = root
                    .publish(
                        INIT_TOPIC,
                        &to_document(&message),
                        Retention::NoRetain,
                        QoS::AtLeastOnce,
                        Some(INIT_DEADLINE),
                    )
                    .await;
                if let Err(e) = delivered {
                    warn!("Failed to publish init message: {}", e);
                }

                boot_record.announced(delivered.is_ok());
                if let Err(e) = boot_record.save(&kernel_store) {
                    warn!("Failed to save boot record: {}", e);
                }
                info!(
                    "Device ready in {} ms, state {}",
                    Instant::now().as_millis(),
                    message.state
                );
            };

            let (never, ()) = join(publish_loop, announce).await;
            never
        };

        let running = async {
            match select(commands.run(&root), sequence).await {
                Either::First(never) => never,
                Either::Second(shutdown) => shutdown,
            }
        };

        match select4(watchdog_task, battery_task, background, running).await {
            Either4::First(shutdown) | Either4::Second(shutdown) | Either4::Fourth(shutdown) => {
                shutdown
            }
            Either4::Third(Either3::First(never))
            | Either4::Third(Either3::Second(never))
            | Either4::Third(Either3::Third(never)) => never,
        }
    }
}
