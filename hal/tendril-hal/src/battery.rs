//! Battery probe abstraction

/// Battery fuel gauge or voltage divider
pub trait BatteryProbe {
    /// Read the battery voltage in millivolts
    ///
    /// Returns 0 when no reading is available.
    fn voltage_mv(&mut self) -> impl core::future::Future<Output = u16>;

    /// Read the battery current in milliamps, if the probe measures it
    fn current_ma(&mut self) -> impl core::future::Future<Output = Option<i32>> {
        core::future::ready(None)
    }

    /// Estimated seconds until empty, if the probe tracks it
    fn time_to_empty_secs(&mut self) -> impl core::future::Future<Output = Option<u32>> {
        core::future::ready(None)
    }
}
