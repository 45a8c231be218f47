//! Firmware update transfer

/// Errors from a firmware update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UpdateError {
    /// Image could not be downloaded
    Download,
    /// Image failed verification
    Verify,
    /// Image could not be written to the update slot
    Write,
}

/// Downloads and installs a firmware image
pub trait FirmwareUpdater {
    /// Install the image at `url`; the caller restarts on success
    fn perform(&self, url: &str) -> impl core::future::Future<Output = Result<(), UpdateError>>;
}
