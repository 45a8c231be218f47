//! Battery gate and monitor
//!
//! The gate decides at boot whether there is enough charge to bring the
//! device up at all. The monitor keeps a moving average while the device
//! runs and returns once the average falls below the shutdown threshold.

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_time::{Duration, Ticker};
use heapless::Deque;
use tendril_hal::BatteryProbe;
use tendril_protocol::BatteryTelemetry;

/// Samples averaged by the monitor
pub const AVERAGE_WINDOW: usize = 10;

/// Default interval between monitor samples
pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Voltage thresholds of a battery chemistry, in millivolts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BatteryParameters {
    /// Below this the device does not boot
    pub boot_threshold_mv: u16,
    /// Below this the running device shuts down
    pub shutdown_threshold_mv: u16,
    /// Voltage reported as 0 %
    pub empty_mv: u16,
    /// Voltage reported as 100 %
    pub full_mv: u16,
}

impl BatteryParameters {
    /// Single-cell lithium-ion
    pub const LI_ION: Self = Self {
        boot_threshold_mv: 3300,
        shutdown_threshold_mv: 3000,
        empty_mv: 3000,
        full_mv: 4100,
    };

    /// Linear charge estimate, clamped to 0..=100
    pub fn percentage(&self, voltage_mv: u16) -> u8 {
        if voltage_mv <= self.empty_mv || self.full_mv <= self.empty_mv {
            return 0;
        }
        if voltage_mv >= self.full_mv {
            return 100;
        }
        let span = u32::from(self.full_mv - self.empty_mv);
        let above = u32::from(voltage_mv - self.empty_mv);
        (above * 100 / span) as u8
    }
}

/// Outcome of the boot-time battery check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootDecision {
    Proceed,
    /// Charge too low to boot, sleep until charged
    DeepSleep { voltage_mv: u16 },
}

/// Decide whether a measured voltage allows booting
///
/// A reading of 0 means no reading and never blocks the boot.
pub fn check_boot_voltage(voltage_mv: u16, parameters: &BatteryParameters) -> BootDecision {
    if voltage_mv != 0 && voltage_mv < parameters.boot_threshold_mv {
        BootDecision::DeepSleep { voltage_mv }
    } else {
        BootDecision::Proceed
    }
}

/// Latest averaged battery figures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BatteryStatus {
    pub voltage_mv: u16,
    pub percentage: u8,
    pub current_ma: Option<i32>,
    pub time_to_empty_secs: Option<u32>,
}

impl BatteryStatus {
    pub fn telemetry(&self) -> BatteryTelemetry {
        BatteryTelemetry {
            voltage: f64::from(self.voltage_mv) / 1000.0,
            percentage: self.percentage,
            current: self.current_ma,
            time_to_empty: self.time_to_empty_secs,
        }
    }
}

/// Running battery supervision
pub struct BatteryMonitor {
    parameters: BatteryParameters,
    interval: Duration,
    status: Mutex<CriticalSectionRawMutex, Cell<Option<BatteryStatus>>>,
}

impl BatteryMonitor {
    pub const fn new(parameters: BatteryParameters) -> Self {
        Self::with_interval(parameters, SAMPLE_INTERVAL)
    }

    pub const fn with_interval(parameters: BatteryParameters, interval: Duration) -> Self {
        Self {
            parameters,
            interval,
            status: Mutex::new(Cell::new(None)),
        }
    }

    pub fn parameters(&self) -> &BatteryParameters {
        &self.parameters
    }

    /// Latest figures, `None` before the first valid sample
    pub fn status(&self) -> Option<BatteryStatus> {
        self.status.lock(Cell::get)
    }

    /// Sample until the averaged voltage drops below the shutdown threshold
    ///
    /// Returns the average that triggered the shutdown. Zero readings are
    /// skipped, and no decision is made before the window is full.
    pub async fn run<B: BatteryProbe>(&self, probe: &mut B) -> u16 {
        info!("Battery monitor task started");

        let mut samples: Deque<u16, AVERAGE_WINDOW> = Deque::new();
        let mut ticker = Ticker::every(self.interval);

        loop {
            let voltage_mv = probe.voltage_mv().await;
            if voltage_mv != 0 {
                if samples.is_full() {
                    samples.pop_front();
                }
                // Cannot fail, a slot was freed above
                let _ = samples.push_back(voltage_mv);

                let average = average(&samples);
                let status = BatteryStatus {
                    voltage_mv: average,
                    percentage: self.parameters.percentage(average),
                    current_ma: probe.current_ma().await,
                    time_to_empty_secs: probe.time_to_empty_secs().await,
                };
                self.status.lock(|cell| cell.set(Some(status)));

                if samples.is_full() && average < self.parameters.shutdown_threshold_mv {
                    warn!(
                        "Battery voltage low ({} mV < {} mV), shutting down",
                        average,
                        self.parameters.shutdown_threshold_mv
                    );
                    return average;
                }
            }

            ticker.next().await;
        }
    }
}

fn average(samples: &Deque<u16, AVERAGE_WINDOW>) -> u16 {
    if samples.is_empty() {
        return 0;
    }
    let sum: u32 = samples.iter().map(|&mv| u32::from(mv)).sum();
    (sum / samples.len() as u32) as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::collections::VecDeque;
    use embassy_futures::block_on;

    const PARAMETERS: BatteryParameters = BatteryParameters::LI_ION;

    struct ScriptedProbe {
        readings: VecDeque<u16>,
        last: u16,
    }

    impl ScriptedProbe {
        fn new(readings: &[u16]) -> Self {
            Self {
                readings: readings.iter().copied().collect(),
                last: 0,
            }
        }
    }

    impl BatteryProbe for ScriptedProbe {
        async fn voltage_mv(&mut self) -> u16 {
            if let Some(next) = self.readings.pop_front() {
                self.last = next;
            }
            self.last
        }

        async fn current_ma(&mut self) -> Option<i32> {
            Some(-120)
        }
    }

    #[test]
    fn test_boot_gate_threshold() {
        assert_eq!(
            check_boot_voltage(3200, &PARAMETERS),
            BootDecision::DeepSleep { voltage_mv: 3200 }
        );
        assert_eq!(check_boot_voltage(3400, &PARAMETERS), BootDecision::Proceed);
        assert_eq!(check_boot_voltage(3300, &PARAMETERS), BootDecision::Proceed);
        assert_eq!(check_boot_voltage(0, &PARAMETERS), BootDecision::Proceed);
    }

    #[test]
    fn test_percentage_is_clamped() {
        assert_eq!(PARAMETERS.percentage(2900), 0);
        assert_eq!(PARAMETERS.percentage(3000), 0);
        assert_eq!(PARAMETERS.percentage(3550), 50);
        assert_eq!(PARAMETERS.percentage(4100), 100);
        assert_eq!(PARAMETERS.percentage(4300), 100);
    }

    #[test]
    fn test_monitor_shuts_down_on_low_average() {
        let monitor = BatteryMonitor::with_interval(PARAMETERS, Duration::from_millis(1));
        let mut readings = [3700u16; 20];
        readings[10..].fill(2800);
        let mut probe = ScriptedProbe::new(&readings);

        let average = block_on(monitor.run(&mut probe));
        assert!(average < PARAMETERS.shutdown_threshold_mv);

        let status = monitor.status().unwrap();
        assert_eq!(status.voltage_mv, average);
        assert_eq!(status.current_ma, Some(-120));
    }

    #[test]
    fn test_single_low_sample_does_not_shut_down() {
        let monitor = BatteryMonitor::with_interval(PARAMETERS, Duration::from_millis(1));
        let mut readings = [3700u16; 12];
        readings[0] = 2500;
        readings[11] = 0;
        let mut probe = ScriptedProbe::new(&readings);

        let result = block_on(embassy_time::with_timeout(
            Duration::from_millis(100),
            monitor.run(&mut probe),
        ));
        assert!(result.is_err());
        assert!(monitor.status().unwrap().voltage_mv > PARAMETERS.shutdown_threshold_mv);
    }

    #[test]
    fn test_telemetry_in_volts() {
        let status = BatteryStatus {
            voltage_mv: 3850,
            percentage: 77,
            current_ma: None,
            time_to_empty_secs: Some(3600),
        };
        let telemetry = status.telemetry();
        assert!((telemetry.voltage - 3.85).abs() < 1e-9);
        assert_eq!(telemetry.time_to_empty, Some(3600));
    }
}
