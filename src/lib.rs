//! Batch firmware provisioning for wireless receivers.
//!
//! Two transports share one loop: over-the-air through each device's own
//! Wi-Fi access point, or serial flashing through the chip's ROM bootloader.
//! Either way one device is handled at a time, every wait is bounded and
//! cancellable, and a failed device never stops the batch.

pub mod artifact;
pub mod batch;
pub mod cancel;
pub mod commands;
pub mod config;
pub mod device;
pub mod error;
pub mod flash;
pub mod job;
pub mod ota;
pub mod reporter;
pub mod ssid;
pub mod traits;
pub mod wifi;

#[cfg(test)]
mod test_helpers;

pub use error::{ErrorClass, ProvisionError, ProvisionResult};
