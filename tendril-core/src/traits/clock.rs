//! Wall clock

use embassy_time::Duration;

/// Errors from clock synchronization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockError {
    /// No answer within the timeout
    Timeout,
    /// Time server could not be reached
    Unreachable,
}

/// Real-time clock backed by a time server
pub trait WallClock {
    /// Seconds since the Unix epoch
    fn unix_time(&self) -> u64;

    /// Milliseconds since the Unix epoch
    fn unix_time_ms(&self) -> u64 {
        self.unix_time().saturating_mul(1000)
    }

    /// Synchronize with `host`, or the platform default when `None`
    fn synchronize(
        &self,
        host: Option<&str>,
        timeout: Duration,
    ) -> impl core::future::Future<Output = Result<(), ClockError>>;
}
