//! Switch monitoring
//!
//! Turns pin edges into engage/disengage events carrying how long the
//! switch stayed in its previous position.

use embassy_time::{Duration, Instant};
use tendril_hal::EdgeInput;

/// Electrical wiring of a switch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SwitchMode {
    /// Pulled up, engaged when low
    PullUp,
    /// Pulled down, engaged when high
    PullDown,
}

/// A switch changed position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SwitchEvent {
    pub engaged: bool,
    /// Time spent in the previous position
    pub time_since_last_change: Duration,
}

/// Watches one switch
pub struct SwitchMonitor<I> {
    name: &'static str,
    pin: I,
    mode: SwitchMode,
    engaged: bool,
    last_change: Instant,
}

impl<I: EdgeInput> SwitchMonitor<I> {
    pub fn new(name: &'static str, pin: I, mode: SwitchMode) -> Self {
        let engaged = Self::read(&pin, mode);
        Self {
            name,
            pin,
            mode,
            engaged,
            last_change: Instant::now(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged
    }

    fn read(pin: &I, mode: SwitchMode) -> bool {
        match mode {
            SwitchMode::PullUp => pin.is_low(),
            SwitchMode::PullDown => pin.is_high(),
        }
    }

    /// Wait for the switch to change position
    ///
    /// Edges that leave the position unchanged are ignored.
    pub async fn next_event(&mut self) -> SwitchEvent {
        loop {
            self.pin.wait_for_any_edge().await;
            let engaged = Self::read(&self.pin, self.mode);
            if engaged == self.engaged {
                continue;
            }

            let now = Instant::now();
            let event = SwitchEvent {
                engaged,
                time_since_last_change: now - self.last_change,
            };
            self.engaged = engaged;
            self.last_change = now;
            trace!("Switch {} engaged: {}", self.name, engaged);
            return event;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use alloc::collections::VecDeque;
    use embassy_futures::block_on;
    use embassy_time::Timer;
    use tendril_hal::InputPin;

    /// Pin that changes level after scripted delays
    pub(crate) struct ScriptedPin {
        high: bool,
        script: VecDeque<(u64, bool)>,
    }

    impl ScriptedPin {
        /// `script` holds `(delay_ms, level)` steps
        pub(crate) fn new(high: bool, script: &[(u64, bool)]) -> Self {
            Self {
                high,
                script: script.iter().copied().collect(),
            }
        }
    }

    impl InputPin for ScriptedPin {
        fn is_high(&self) -> bool {
            self.high
        }
    }

    impl EdgeInput for ScriptedPin {
        async fn wait_for_any_edge(&mut self) {
            match self.script.pop_front() {
                Some((delay_ms, high)) => {
                    Timer::after_millis(delay_ms).await;
                    self.high = high;
                }
                None => core::future::pending().await,
            }
        }
    }

    #[test]
    fn test_pull_up_press_and_release() {
        let pin = ScriptedPin::new(true, &[(10, false), (120, true)]);
        let mut switch = SwitchMonitor::new("factory-reset", pin, SwitchMode::PullUp);
        assert!(!switch.is_engaged());

        let pressed = block_on(switch.next_event());
        assert!(pressed.engaged);

        let released = block_on(switch.next_event());
        assert!(!released.engaged);
        assert!(released.time_since_last_change >= Duration::from_millis(120));
        assert!(released.time_since_last_change < Duration::from_millis(1000));
    }

    #[test]
    fn test_pull_down_ignores_repeated_levels() {
        let pin = ScriptedPin::new(false, &[(5, false), (5, true), (5, true), (5, false)]);
        let mut switch = SwitchMonitor::new("door", pin, SwitchMode::PullDown);

        assert!(block_on(switch.next_event()).engaged);
        assert!(!block_on(switch.next_event()).engaged);
        assert_eq!(switch.name(), "door");
    }
}
