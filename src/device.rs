//! Serial port enumeration for choosing the flashing port.

use serde::Serialize;
use serialport::{available_ports, SerialPortType};

use crate::error::{ProvisionError, ProvisionResult};

/// One serial port visible to the operating system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SerialPortEntry {
    /// Port path (e.g. "COM3" or "/dev/ttyUSB0").
    pub port: String,
    /// USB vendor and product ID, for USB adapters.
    pub vid: Option<u16>,
    pub pid: Option<u16>,
    pub product: Option<String>,
    pub manufacturer: Option<String>,
}

impl SerialPortEntry {
    /// Get a display label for this port.
    pub fn display_label(&self) -> String {
        match (&self.product, self.vid, self.pid) {
            (Some(product), _, _) => format!("{} ({})", self.port, product),
            (None, Some(vid), Some(pid)) => format!("{} ({:04x}:{:04x})", self.port, vid, pid),
            _ => self.port.clone(),
        }
    }
}

/// List serial ports, sorted by name.
///
/// On macOS, `tty.*` ports are skipped since each device also appears as
/// `cu.*`, which does not block waiting for DCD.
pub fn list_serial_ports() -> ProvisionResult<Vec<SerialPortEntry>> {
    let ports = available_ports()
        .map_err(|e| ProvisionError::Config(format!("Failed to enumerate serial ports: {}", e)))?;

    let mut entries: Vec<SerialPortEntry> = ports
        .into_iter()
        .filter(|port| !skip_port(&port.port_name))
        .map(|port| match port.port_type {
            SerialPortType::UsbPort(usb) => SerialPortEntry {
                port: port.port_name,
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                product: usb.product,
                manufacturer: usb.manufacturer,
            },
            _ => SerialPortEntry {
                port: port.port_name,
                vid: None,
                pid: None,
                product: None,
                manufacturer: None,
            },
        })
        .collect();

    entries.sort_by(|a, b| a.port.cmp(&b.port));
    Ok(entries)
}

#[cfg(target_os = "macos")]
fn skip_port(name: &str) -> bool {
    name.contains("/dev/tty.")
}

#[cfg(not(target_os = "macos"))]
fn skip_port(_name: &str) -> bool {
    false
}
