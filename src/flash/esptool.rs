//! Argument building and output interpretation for `esptool`.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::config::{CHIP_DETECTED_MARKER, FAILURE_REASON_MARKERS};

use super::profile::{FlashPlan, PlannedRead};

static MAC_ADDRESS: OnceLock<Regex> = OnceLock::new();

/// Builds argument vectors for one port and chip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EsptoolCommand {
    pub chip: String,
    pub port: String,
    pub baud: u32,
    pub detect_baud: u32,
}

impl EsptoolCommand {
    /// The chip is already in boot mode, so the tool must not reset it.
    fn base_args(&self, baud: u32) -> Vec<String> {
        vec![
            "--chip".into(),
            self.chip.clone(),
            "--port".into(),
            self.port.clone(),
            "--baud".into(),
            baud.to_string(),
            "--before".into(),
            "no_reset".into(),
            "--after".into(),
            "no_reset".into(),
        ]
    }

    pub fn chip_id(&self) -> Vec<String> {
        let mut args = self.base_args(self.detect_baud);
        args.push("chip_id".into());
        args
    }

    pub fn read_mac(&self) -> Vec<String> {
        let mut args = self.base_args(self.detect_baud);
        args.push("read_mac".into());
        args
    }

    /// `write_flash <offset> <path> ...` for every planned segment.
    pub fn write_flash(&self, plan: &FlashPlan) -> Vec<String> {
        let mut args = self.base_args(self.baud);
        args.push("write_flash".into());
        for write in &plan.writes {
            args.push(format!("0x{:x}", write.offset));
            args.push(write.path.to_string_lossy().into_owned());
        }
        args
    }

    pub fn read_flash(&self, segment: &PlannedRead, out_file: &Path) -> Vec<String> {
        let mut args = self.base_args(self.baud);
        args.push("read_flash".into());
        args.push(format!("0x{:x}", segment.offset));
        args.push(format!("0x{:x}", segment.size));
        args.push(out_file.to_string_lossy().into_owned());
        args
    }
}

/// Identification succeeded only if the tool says which chip it found.
pub fn is_chip_detected(exit_code: Option<i32>, output: &str) -> bool {
    exit_code == Some(0)
        && output
            .to_lowercase()
            .contains(&CHIP_DETECTED_MARKER.to_lowercase())
}

/// The most telling line of a failed probe: the first line naming a known
/// failure, otherwise the last non-empty line.
pub fn short_failure_reason(output: &str) -> String {
    let lines: Vec<&str> = output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let markers: Vec<String> = FAILURE_REASON_MARKERS
        .iter()
        .map(|m| m.to_lowercase())
        .collect();

    lines
        .iter()
        .find(|line| {
            let lower = line.to_lowercase();
            markers.iter().any(|m| lower.contains(m.as_str()))
        })
        .or_else(|| lines.last())
        .map(|l| l.to_string())
        .unwrap_or_default()
}

/// `xx:xx:xx:xx:xx:xx` from `read_mac` output.
pub fn extract_mac(output: &str) -> Option<String> {
    let regex = MAC_ADDRESS
        .get_or_init(|| Regex::new(r"MAC:\s*([0-9a-fA-F:]{17})").expect("static pattern"));
    regex.captures(output).map(|caps| caps[1].to_string())
}

/// Per-device clone directory name, safe on every filesystem.
pub fn clone_dir_name(mac: &str) -> String {
    let name: String = mac
        .chars()
        .map(|c| match c {
            ':' => '-',
            c if c.is_ascii_alphanumeric() || c == '-' || c == '_' => c,
            _ => '_',
        })
        .collect();
    format!("clone_{}", name)
}
