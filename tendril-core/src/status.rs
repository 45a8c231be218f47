//! Status LED
//!
//! The LED shows how far bring-up got. Factory reset takes over the LED
//! with [`StatusLed::turn_on`]/[`StatusLed::turn_off`] to confirm each
//! step, and the pattern resumes once it calls [`StatusLed::release`].

use core::cell::Cell;

use embassy_futures::select::select;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer};
use tendril_hal::OutputPin;

use crate::state::ModuleStates;

/// How often a steady pattern is re-evaluated
pub const REFRESH_INTERVAL: Duration = Duration::from_millis(100);

/// What the LED shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LedPattern {
    Off,
    On,
    Blink { on: Duration, off: Duration },
}

impl LedPattern {
    pub const FAST_BLINK: Self = Self::Blink {
        on: Duration::from_millis(100),
        off: Duration::from_millis(100),
    };
    pub const BLINK: Self = Self::Blink {
        on: Duration::from_millis(200),
        off: Duration::from_millis(200),
    };
    pub const SLOW_BLINK: Self = Self::Blink {
        on: Duration::from_millis(500),
        off: Duration::from_millis(1500),
    };
}

/// Pattern for the current bring-up progress
///
/// Provisioning portal blinks fast, network association blinks, no
/// network lights steadily, waiting for the clock, bus or kernel blinks
/// slowly, and a ready device keeps the LED dark.
pub fn status_pattern(states: &ModuleStates) -> LedPattern {
    if states.config_portal_running.is_set() {
        LedPattern::FAST_BLINK
    } else if states.network_connecting.is_set() {
        LedPattern::BLINK
    } else if !states.network_ready.is_set() {
        LedPattern::On
    } else if !states.rtc_in_sync.is_set()
        || !states.mqtt_ready.is_set()
        || !states.kernel_ready.is_set()
    {
        LedPattern::SLOW_BLINK
    } else {
        LedPattern::Off
    }
}

/// Status LED driver
pub struct StatusLed {
    forced: Mutex<CriticalSectionRawMutex, Cell<Option<bool>>>,
    changed: Signal<CriticalSectionRawMutex, ()>,
}

impl Default for StatusLed {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusLed {
    pub const fn new() -> Self {
        Self {
            forced: Mutex::new(Cell::new(None)),
            changed: Signal::new(),
        }
    }

    /// Override the pattern with a lit LED
    pub fn turn_on(&self) {
        self.force(Some(true));
    }

    /// Override the pattern with a dark LED
    pub fn turn_off(&self) {
        self.force(Some(false));
    }

    /// Return to the bring-up pattern
    pub fn release(&self) {
        self.force(None);
    }

    /// The pattern shown right now
    pub fn pattern(&self, states: &ModuleStates) -> LedPattern {
        match self.forced.lock(Cell::get) {
            Some(true) => LedPattern::On,
            Some(false) => LedPattern::Off,
            None => status_pattern(states),
        }
    }

    fn force(&self, forced: Option<bool>) {
        self.forced.lock(|cell| cell.set(forced));
        self.changed.signal(());
    }

    async fn hold(&self, duration: Duration) {
        select(Timer::after(duration), self.changed.wait()).await;
    }

    /// Drive the LED forever
    pub async fn run<L: OutputPin>(&self, led: &mut L, states: &ModuleStates) -> ! {
        info!("Status LED task started");

        loop {
            match self.pattern(states) {
                LedPattern::Off => {
                    led.set_low();
                    self.hold(REFRESH_INTERVAL).await;
                }
                LedPattern::On => {
                    led.set_high();
                    self.hold(REFRESH_INTERVAL).await;
                }
                LedPattern::Blink { on, off } => {
                    led.set_high();
                    self.hold(on).await;
                    led.set_low();
                    self.hold(off).await;
                }
            }
        }
    }
}
