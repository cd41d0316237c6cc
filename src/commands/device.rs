//! `ports` and `profiles`: listings for choosing what to flash.

use std::path::Path;

use crate::device::list_serial_ports;
use crate::error::ProvisionResult;
use crate::flash::load_profiles;

pub fn ports(json: bool) -> ProvisionResult<()> {
    let ports = list_serial_ports()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&ports)?);
    } else if ports.is_empty() {
        println!("No serial ports found.");
    } else {
        for port in &ports {
            println!("{}", port.display_label());
        }
    }
    Ok(())
}

pub fn profiles(path: &Path, json: bool) -> ProvisionResult<()> {
    let profiles = load_profiles(path)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&profiles)?);
    } else {
        for profile in &profiles {
            println!("{}", profile);
            for segment in &profile.segments {
                println!(
                    "    {:<12} {:>10} {:>10}{}",
                    segment.label,
                    segment.offset,
                    segment.size,
                    if segment.required { "" } else { "  (optional)" }
                );
            }
        }
    }
    Ok(())
}
