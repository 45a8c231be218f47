//! Wall clock synchronization
//!
//! The clock counts as set once it reads past 2022-01-01; a chip that
//! kept its RTC across deep sleep is therefore in sync before the network
//! is up. Synchronization then repeats whenever the network is ready.

use embassy_time::{Duration, Timer};

use crate::state::{State, StateSource};
use crate::traits::WallClock;

/// 2022-01-01T00:00:00Z; a clock past this has been set
pub const TIME_SET_THRESHOLD: u64 = 1_640_995_200;

/// Whether a Unix time comes from a set clock
pub fn is_time_set(unix_time: u64) -> bool {
    unix_time > TIME_SET_THRESHOLD
}

/// Timing of the synchronization loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SyncSchedule {
    /// How long one synchronization may take
    pub timeout: Duration,
    /// Wait after a failed attempt
    pub retry: Duration,
    /// Wait after a successful attempt
    pub resync: Duration,
}

impl Default for SyncSchedule {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retry: Duration::from_secs(10),
            resync: Duration::from_secs(60 * 60),
        }
    }
}

/// Keeps the wall clock synchronized and publishes `rtc_in_sync`
pub struct ClockSync<'a, C> {
    clock: &'a C,
    network_ready: State<'a>,
    in_sync: &'a StateSource,
    schedule: SyncSchedule,
}

impl<'a, C: WallClock> ClockSync<'a, C> {
    /// Set `in_sync` right away if the clock already holds a real time
    pub fn new(clock: &'a C, network_ready: State<'a>, in_sync: &'a StateSource) -> Self {
        if is_time_set(clock.unix_time()) {
            info!("Time is already set");
            in_sync.set();
        }
        Self {
            clock,
            network_ready,
            in_sync,
            schedule: SyncSchedule::default(),
        }
    }

    pub fn with_schedule(mut self, schedule: SyncSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// One synchronization attempt
    pub async fn synchronize(&self, host: &str) -> bool {
        let host = if host.is_empty() { None } else { Some(host) };
        if let Some(host) = host {
            debug!("Using time server {} from configuration", host);
        }
        match self.clock.synchronize(host, self.schedule.timeout).await {
            Ok(()) => {
                self.in_sync.set();
                debug!("Time sync finished");
                true
            }
            Err(e) => {
                debug!("Time sync failed: {}", e);
                false
            }
        }
    }

    /// Synchronize forever
    pub async fn run(&self, host: &str) -> ! {
        info!("Clock sync task started");

        loop {
            self.network_ready.wait_set().await;
            if self.synchronize(host).await {
                Timer::after(self.schedule.resync).await;
            } else {
                error!(
                    "Time sync failed, retrying in {} s",
                    self.schedule.retry.as_secs()
                );
                Timer::after(self.schedule.retry).await;
            }
        }
    }
}
