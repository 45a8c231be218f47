//! System control
//!
//! Restart, sleep and identity services of the microcontroller.

use core::time::Duration;

/// Why the chip came out of reset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResetReason {
    Unknown,
    PowerOn,
    External,
    Software,
    Panic,
    Watchdog,
    DeepSleep,
    Brownout,
}

impl ResetReason {
    /// Stable identifier used in boot announcements
    pub fn as_str(self) -> &'static str {
        match self {
            ResetReason::Unknown => "unknown",
            ResetReason::PowerOn => "power-on",
            ResetReason::External => "external",
            ResetReason::Software => "software",
            ResetReason::Panic => "panic",
            ResetReason::Watchdog => "watchdog",
            ResetReason::DeepSleep => "deep-sleep",
            ResetReason::Brownout => "brownout",
        }
    }
}

/// What woke the chip from deep sleep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WakeupCause {
    /// Not a wakeup from deep sleep
    Undefined,
    Timer,
    Gpio,
    External,
}

impl WakeupCause {
    /// Stable identifier used in boot announcements
    pub fn as_str(self) -> &'static str {
        match self {
            WakeupCause::Undefined => "undefined",
            WakeupCause::Timer => "timer",
            WakeupCause::Gpio => "gpio",
            WakeupCause::External => "external",
        }
    }
}

/// Heap usage figures
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MemoryStats {
    /// Currently free heap in bytes
    pub free_heap: usize,
    /// Lowest free heap seen since boot in bytes
    pub min_free_heap: usize,
}

/// Chip-level control
///
/// `restart`, `deep_sleep` and `abort` do not return on hardware.
/// Host implementations record the call and return so callers can
/// observe it.
pub trait SystemControl {
    /// Restart the chip
    fn restart(&self);

    /// Enter deep sleep, waking after `wake_after` if given
    fn deep_sleep(&self, wake_after: Option<Duration>);

    /// Abort with a reason, leading to a restart
    fn abort(&self, reason: &str);

    /// Reason for the last reset
    fn reset_reason(&self) -> ResetReason;

    /// Cause of the wakeup from deep sleep
    fn wakeup_cause(&self) -> WakeupCause;

    /// Hardware (MAC) address
    fn mac_address(&self) -> [u8; 6];

    /// Current heap usage
    fn memory(&self) -> MemoryStats {
        MemoryStats::default()
    }
}
