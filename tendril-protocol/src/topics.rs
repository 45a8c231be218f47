//! Topic, hostname and identity derivation

use alloc::format;
use alloc::string::String;

/// Device family segment of every topic root
pub const DEVICE_FAMILY: &str = "tendril";

/// Topic root of a device: `[<location>/]devices/tendril/<instance>`
pub fn topic_root(location: &str, instance: &str) -> String {
    if location.is_empty() {
        format!("devices/{DEVICE_FAMILY}/{instance}")
    } else {
        format!("{location}/devices/{DEVICE_FAMILY}/{instance}")
    }
}

/// Topic on which the response of `command` is published
pub fn response_topic(command: &str) -> String {
    format!("responses/{command}")
}

/// Network hostname for an instance name
///
/// Colons become dashes and question marks are dropped.
pub fn hostname(instance: &str) -> String {
    instance
        .chars()
        .filter(|c| *c != '?')
        .map(|c| if c == ':' { '-' } else { c })
        .collect()
}

/// Format a hardware address as `aa:bb:cc:dd:ee:ff`
pub fn format_mac(mac: &[u8; 6]) -> String {
    format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    )
}
