//! Telemetry collection and publishing
//!
//! The publish loop sends a snapshot, restarts the watchdog, then waits
//! for the next interval or an explicit request, whichever comes first.
//! Requests are debounced so a burst yields at most one snapshot per
//! [`DEBOUNCE`].

use alloc::rc::Rc;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cell::RefCell;
use core::future::Future;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{with_deadline, Duration, Instant, Timer};
use serde_json::Value;
use tendril_protocol::Document;

use crate::watchdog::Watchdog;

/// Minimum time between two snapshots
pub const DEBOUNCE: Duration = Duration::from_millis(500);

/// Out-of-schedule publish requests
///
/// Requests made while a snapshot is being published are kept and served
/// after the debounce.
pub struct TelemetryRequests {
    signal: Signal<CriticalSectionRawMutex, ()>,
}

impl Default for TelemetryRequests {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryRequests {
    pub const fn new() -> Self {
        Self {
            signal: Signal::new(),
        }
    }

    /// Ask for a snapshot as soon as possible
    pub fn request(&self) {
        self.signal.signal(());
    }

    /// Whether a request is waiting to be served
    pub fn is_pending(&self) -> bool {
        self.signal.signaled()
    }

    async fn wait_until(&self, deadline: Instant) -> bool {
        with_deadline(deadline, self.signal.wait()).await.is_ok()
    }
}

/// Something that reports state in the `features` telemetry array
pub trait TelemetryFeature {
    fn populate_telemetry(&self, telemetry: &mut Document);
}

struct Feature {
    type_name: String,
    name: String,
    feature: Rc<dyn TelemetryFeature>,
}

/// Registry of telemetry features
#[derive(Default)]
pub struct TelemetryCollector {
    features: RefCell<Vec<Feature>>,
}

impl TelemetryCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, type_name: &str, name: &str, feature: Rc<dyn TelemetryFeature>) {
        self.features.borrow_mut().push(Feature {
            type_name: type_name.to_string(),
            name: name.to_string(),
            feature,
        });
    }

    pub fn len(&self) -> usize {
        self.features.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.borrow().is_empty()
    }

    /// One object per feature, tagged with its type and name
    pub fn collect(&self) -> Vec<Value> {
        self.features
            .borrow()
            .iter()
            .map(|entry| {
                let mut telemetry = Document::new();
                telemetry.insert("type".into(), Value::from(entry.type_name.as_str()));
                telemetry.insert("name".into(), Value::from(entry.name.as_str()));
                entry.feature.populate_telemetry(&mut telemetry);
                Value::Object(telemetry)
            })
            .collect()
    }
}

/// Publish telemetry forever
///
/// `publish` sends one snapshot and handles its own errors. The watchdog
/// is restarted after every attempt, failed or not.
pub async fn run_publish_loop<F, Fut>(
    interval: Duration,
    watchdog: &Watchdog,
    requests: &TelemetryRequests,
    mut publish: F,
) -> !
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    info!("Telemetry task started, interval {} ms", interval.as_millis());
    let interval = if interval < DEBOUNCE { DEBOUNCE } else { interval };

    loop {
        let started = Instant::now();

        publish().await;
        watchdog.restart();

        Timer::at(started + DEBOUNCE).await;
        if requests.wait_until(started + interval).await {
            trace!("Telemetry requested");
        }
    }
}
