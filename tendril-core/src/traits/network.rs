//! Network association driver

use tendril_protocol::Document;

/// Control over the network association
///
/// The driver owns association and reconnects, and publishes
/// `network_connecting`, `network_ready` and `config_portal_running`.
pub trait NetworkControl {
    /// Drop stored credentials so the next boot provisions again
    fn forget_association(&self);

    /// Enable or disable radio power saving
    fn set_power_save(&self, enabled: bool);

    /// Add link statistics to the `wifi` telemetry object
    fn populate_telemetry(&self, _telemetry: &mut Document) {}
}
