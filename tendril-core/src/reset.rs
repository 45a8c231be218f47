//! Reset button handling
//!
//! The action is chosen by how long the button was held, measured when it
//! is released:
//!
//! | Held         | Action                                          |
//! |--------------|-------------------------------------------------|
//! | < 200 ms     | nothing                                         |
//! | 200 ms..5 s  | publish telemetry                               |
//! | 5 s..15 s    | forget network association, restart             |
//! | >= 15 s      | also erase all configuration, restart           |

use embassy_time::{Duration, Timer};
use tendril_hal::{EdgeInput, Partition, SystemControl};

use crate::status::StatusLed;
use crate::store::{NvsStore, SharedPartition, CONFIGURATION_NAMESPACES};
use crate::switch::SwitchMonitor;
use crate::telemetry::TelemetryRequests;
use crate::traits::NetworkControl;

/// Shortest hold that does anything
pub const TELEMETRY_HOLD: Duration = Duration::from_millis(200);
/// Shortest hold that resets the network association
pub const NETWORK_RESET_HOLD: Duration = Duration::from_secs(5);
/// Shortest hold that erases all configuration
pub const COMPLETE_RESET_HOLD: Duration = Duration::from_secs(15);

/// Default time between LED confirmation steps
pub const STEP_DELAY: Duration = Duration::from_secs(1);

/// What a button release asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResetAction {
    PublishTelemetry,
    /// Forget the network association
    NetworkReset,
    /// Forget the network association and erase all configuration
    CompleteReset,
}

impl ResetAction {
    /// Action for a button held for `held`
    pub fn from_hold(held: Duration) -> Option<Self> {
        if held >= COMPLETE_RESET_HOLD {
            Some(ResetAction::CompleteReset)
        } else if held >= NETWORK_RESET_HOLD {
            Some(ResetAction::NetworkReset)
        } else if held >= TELEMETRY_HOLD {
            Some(ResetAction::PublishTelemetry)
        } else {
            None
        }
    }
}

/// Performs network and factory resets
pub struct FactoryReset<'a, P, N, S> {
    led: &'a StatusLed,
    partition: &'a SharedPartition<P>,
    network: &'a N,
    system: &'a S,
    step: Duration,
}

impl<'a, P: Partition, N: NetworkControl, S: SystemControl> FactoryReset<'a, P, N, S> {
    pub fn new(
        led: &'a StatusLed,
        partition: &'a SharedPartition<P>,
        network: &'a N,
        system: &'a S,
    ) -> Self {
        Self {
            led,
            partition,
            network,
            system,
            step: STEP_DELAY,
        }
    }

    /// Change the delay between LED confirmation steps
    pub fn with_step(mut self, step: Duration) -> Self {
        self.step = step;
        self
    }

    async fn blink(&self) {
        Timer::after(self.step).await;
        self.led.turn_off();
        Timer::after(self.step).await;
        self.led.turn_on();
    }

    /// Reset and restart
    ///
    /// A complete reset also erases every configuration namespace. The
    /// boot record survives.
    pub async fn perform(&self, complete: bool) {
        info!("Performing factory reset");

        self.led.turn_on();
        self.blink().await;

        info!(" - Forgetting network association");
        self.network.forget_association();

        if complete {
            self.blink().await;

            info!(" - Erasing configuration");
            for namespace in CONFIGURATION_NAMESPACES {
                if let Err(e) = NvsStore::new(self.partition, namespace).erase_all() {
                    error!("Failed to erase namespace {}: {}", namespace, e);
                }
            }
        }

        info!(" - Restarting");
        self.system.restart();
    }

    /// Carry out the action for a button release
    pub async fn handle(&self, action: ResetAction, telemetry: &TelemetryRequests) {
        match action {
            ResetAction::PublishTelemetry => {
                debug!("Reset button requested telemetry");
                telemetry.request();
            }
            ResetAction::NetworkReset => self.perform(false).await,
            ResetAction::CompleteReset => self.perform(true).await,
        }
    }
}

/// Watch the reset button forever
pub async fn watch_reset_button<I, P, N, S>(
    button: &mut SwitchMonitor<I>,
    reset: &FactoryReset<'_, P, N, S>,
    telemetry: &TelemetryRequests,
) -> !
where
    I: EdgeInput,
    P: Partition,
    N: NetworkControl,
    S: SystemControl,
{
    info!("Reset button task started");

    loop {
        let event = button.next_event().await;
        if event.engaged {
            continue;
        }
        let held = event.time_since_last_change;
        match ResetAction::from_hold(held) {
            Some(action) => {
                info!("Reset button held for {} ms: {}", held.as_millis(), action);
                reset.handle(action, telemetry).await;
            }
            None => trace!("Reset button tap ignored"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{shared, MemoryPartition, CONFIG_NAMESPACE, KERNEL_NAMESPACE};
    use crate::switch::tests::ScriptedPin;
    use crate::switch::SwitchMode;
    use crate::testing::{MockNetwork, MockSystem, SystemCall};
    use embassy_futures::block_on;
    use embassy_futures::select::select;

    #[test]
    fn test_hold_thresholds() {
        assert_eq!(ResetAction::from_hold(Duration::from_millis(150)), None);
        assert_eq!(
            ResetAction::from_hold(Duration::from_secs(3)),
            Some(ResetAction::PublishTelemetry)
        );
        assert_eq!(
            ResetAction::from_hold(Duration::from_secs(10)),
            Some(ResetAction::NetworkReset)
        );
        assert_eq!(
            ResetAction::from_hold(Duration::from_secs(20)),
            Some(ResetAction::CompleteReset)
        );
    }

    #[test]
    fn test_hold_boundaries() {
        assert_eq!(
            ResetAction::from_hold(TELEMETRY_HOLD),
            Some(ResetAction::PublishTelemetry)
        );
        assert_eq!(
            ResetAction::from_hold(NETWORK_RESET_HOLD),
            Some(ResetAction::NetworkReset)
        );
        assert_eq!(
            ResetAction::from_hold(COMPLETE_RESET_HOLD),
            Some(ResetAction::CompleteReset)
        );
    }

    fn seeded() -> SharedPartition<MemoryPartition> {
        let partition = shared(MemoryPartition::new());
        NvsStore::new(&partition, CONFIG_NAMESPACE)
            .set("network-config", b"{}")
            .unwrap();
        NvsStore::new(&partition, KERNEL_NAMESPACE)
            .set("boot", b"\x01")
            .unwrap();
        partition
    }

    #[test]
    fn test_network_reset_keeps_configuration() {
        let partition = seeded();
        let led = StatusLed::new();
        let network = MockNetwork::new();
        let system = MockSystem::new();
        let reset = FactoryReset::new(&led, &partition, &network, &system)
            .with_step(Duration::from_millis(1));

        block_on(reset.perform(false));

        assert!(network.forgotten.get());
        assert_eq!(system.calls(), alloc::vec![SystemCall::Restart]);
        assert!(NvsStore::new(&partition, CONFIG_NAMESPACE)
            .contains("network-config")
            .unwrap());
    }

    #[test]
    fn test_complete_reset_erases_configuration_only() {
        let partition = seeded();
        let led = StatusLed::new();
        let network = MockNetwork::new();
        let system = MockSystem::new();
        let reset = FactoryReset::new(&led, &partition, &network, &system)
            .with_step(Duration::from_millis(1));

        block_on(reset.perform(true));

        assert!(network.forgotten.get());
        assert_eq!(system.calls(), alloc::vec![SystemCall::Restart]);
        assert!(NvsStore::new(&partition, CONFIG_NAMESPACE)
            .list()
            .unwrap()
            .is_empty());
        assert!(NvsStore::new(&partition, KERNEL_NAMESPACE)
            .contains("boot")
            .unwrap());
    }

    #[test]
    fn test_short_press_requests_telemetry() {
        let partition = seeded();
        let led = StatusLed::new();
        let network = MockNetwork::new();
        let system = MockSystem::new();
        let reset = FactoryReset::new(&led, &partition, &network, &system);
        let telemetry = TelemetryRequests::new();
        let mut button = SwitchMonitor::new(
            "factory-reset",
            ScriptedPin::new(true, &[(10, false), (300, true), (10, false), (50, true)]),
            SwitchMode::PullUp,
        );

        block_on(select(
            watch_reset_button(&mut button, &reset, &telemetry),
            Timer::after_millis(600),
        ));

        assert!(telemetry.is_pending());
        assert!(!network.forgotten.get());
        assert!(system.calls().is_empty());
    }
}
