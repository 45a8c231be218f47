//! Subsystem readiness
//!
//! Subsystems announce readiness through [`StateSource`] latches and
//! sequence themselves by waiting on [`State`] handles, alone or combined
//! with [`State::all_of`] and [`State::any_of`].

mod gate;

pub use gate::{State, StateSource, MAX_WAITERS};

/// The readiness gates shared by the kernel and the external drivers
///
/// `const`-constructible so a board can keep it in a `static`.
pub struct ModuleStates {
    /// Network association in progress
    pub network_connecting: StateSource,
    /// Network associated and addressed
    pub network_ready: StateSource,
    /// Provisioning portal running
    pub config_portal_running: StateSource,
    /// Wall clock holds a real time
    pub rtc_in_sync: StateSource,
    /// Message bus connected
    pub mqtt_ready: StateSource,
    /// Bring-up finished
    pub kernel_ready: StateSource,
}

impl Default for ModuleStates {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleStates {
    pub const fn new() -> Self {
        Self {
            network_connecting: StateSource::new(),
            network_ready: StateSource::new(),
            config_portal_running: StateSource::new(),
            rtc_in_sync: StateSource::new(),
            mqtt_ready: StateSource::new(),
            kernel_ready: StateSource::new(),
        }
    }
}
