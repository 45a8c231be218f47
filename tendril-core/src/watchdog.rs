//! Liveness watchdog
//!
//! The watchdog fires once when it has not been restarted for a full
//! timeout period. The telemetry loop restarts it after every publish
//! attempt, so a device that stops publishing aborts and reboots.

use core::cell::Cell;

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer};

/// Watchdog lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WatchdogState {
    /// Counting down, restarts re-arm the timer
    Armed,
    /// Fired, restarts are ignored
    TimedOut,
}

/// Software watchdog
pub struct Watchdog {
    timeout: Duration,
    restarts: Signal<CriticalSectionRawMutex, ()>,
    state: Mutex<CriticalSectionRawMutex, Cell<WatchdogState>>,
}

impl Watchdog {
    pub const fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            restarts: Signal::new(),
            state: Mutex::new(Cell::new(WatchdogState::Armed)),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn state(&self) -> WatchdogState {
        self.state.lock(Cell::get)
    }

    /// Re-arm the timer; no effect once timed out
    pub fn restart(&self) {
        if self.state() == WatchdogState::TimedOut {
            return;
        }
        self.restarts.signal(());
    }

    /// Supervise until the timeout elapses without a restart
    ///
    /// Calls `on_timeout` exactly once, then returns.
    pub async fn run(&self, on_timeout: impl FnOnce(Duration)) {
        info!("Watchdog task started, timeout {} s", self.timeout.as_secs());
        self.restarts.reset();

        loop {
            match select(Timer::after(self.timeout), self.restarts.wait()).await {
                Either::First(()) => break,
                Either::Second(()) => trace!("Watchdog restarted"),
            }
        }

        self.state.lock(|state| state.set(WatchdogState::TimedOut));
        error!("Watchdog timed out after {} s", self.timeout.as_secs());
        on_timeout(self.timeout);
    }
}
