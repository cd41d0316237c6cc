//! Chip profiles and pre-flight segment resolution.
//!
//! A profile names a receiver model, the chip identifier passed to the
//! flashing tool and the ordered list of flash segments. Profiles are kept in
//! a `receivers.json` list so new hardware needs no rebuild.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ProvisionError, ProvisionResult};

/// Default file name of the profile list.
pub const PROFILES_FILENAME: &str = "receivers.json";

fn default_chip() -> String {
    "auto".to_string()
}

fn default_required() -> bool {
    true
}

/// A named region of target flash populated from one artifact file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceSegment {
    #[serde(alias = "Label")]
    pub label: String,
    /// Flash offset, decimal or `0x` hex, exactly as the tool expects it.
    #[serde(alias = "Offset")]
    pub offset: String,
    /// Region length, used by read-clone.
    #[serde(default, alias = "Size")]
    pub size: String,
    #[serde(default = "default_required", alias = "Required")]
    pub required: bool,
}

/// Receiver model description for the serial transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChipProfile {
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(default = "default_chip", alias = "Chip")]
    pub chip: String,
    #[serde(default, alias = "Segments")]
    pub segments: Vec<DeviceSegment>,
}

impl std::fmt::Display for ChipProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}, {} segments)", self.name, self.chip, self.segments.len())
    }
}

/// Parse `0x`-prefixed hex or plain decimal.
pub fn parse_number(text: &str) -> Option<u64> {
    let text = text.trim();
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        text.parse().ok()
    }
}

/// Load the profile list from `path`.
pub fn load_profiles(path: &Path) -> ProvisionResult<Vec<ChipProfile>> {
    if !path.exists() {
        return Err(ProvisionError::Config(format!(
            "Profile list not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path)?;
    let profiles: Vec<ChipProfile> = serde_json::from_str(&contents)?;
    tracing::debug!("Loaded {} chip profiles from {}", profiles.len(), path.display());
    Ok(profiles)
}

/// Find a profile by name, ignoring case.
pub fn find_profile<'a>(profiles: &'a [ChipProfile], name: &str) -> Option<&'a ChipProfile> {
    profiles
        .iter()
        .find(|p| p.name.eq_ignore_ascii_case(name.trim()))
}

/// One segment with its artifact resolved and its offset checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedWrite {
    pub label: String,
    pub offset: u64,
    pub path: PathBuf,
}

/// Fully resolved write plan. Building one is the pre-flight check: a plan
/// exists only if every required segment has an artifact on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashPlan {
    pub chip: String,
    pub writes: Vec<PlannedWrite>,
}

impl FlashPlan {
    /// Match profile segments to artifact paths. Labels compare case-insensitively.
    pub fn resolve(
        profile: &ChipProfile,
        paths_by_label: &HashMap<String, PathBuf>,
    ) -> ProvisionResult<Self> {
        let lookup: HashMap<String, &PathBuf> = paths_by_label
            .iter()
            .filter(|(_, path)| !path.as_os_str().is_empty())
            .map(|(label, path)| (label.to_lowercase(), path))
            .collect();

        let mut writes = Vec::new();
        for segment in &profile.segments {
            let Some(path) = lookup.get(&segment.label.to_lowercase()) else {
                if segment.required {
                    return Err(ProvisionError::Config(format!(
                        "Missing file for required segment: {}",
                        segment.label
                    )));
                }
                continue;
            };

            if !path.is_file() {
                return Err(ProvisionError::Config(format!(
                    "File for segment '{}' not found: {}",
                    segment.label,
                    path.display()
                )));
            }

            let offset = parse_number(&segment.offset).ok_or_else(|| {
                ProvisionError::Config(format!(
                    "Invalid offset '{}' for segment {}",
                    segment.offset, segment.label
                ))
            })?;

            writes.push(PlannedWrite {
                label: segment.label.clone(),
                offset,
                path: (*path).clone(),
            });
        }

        if writes.is_empty() {
            return Err(ProvisionError::Config(format!(
                "No segment files selected for profile {}",
                profile.name
            )));
        }

        Ok(Self {
            chip: profile.chip.clone(),
            writes,
        })
    }
}

/// One region to read back into `<label>.bin`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedRead {
    pub label: String,
    pub offset: u64,
    pub size: u64,
}

/// Every segment of a profile, with offsets and sizes parsed.
pub fn read_plan(profile: &ChipProfile) -> ProvisionResult<Vec<PlannedRead>> {
    profile
        .segments
        .iter()
        .map(|segment| {
            let offset = parse_number(&segment.offset);
            let size = parse_number(&segment.size);
            match (offset, size) {
                (Some(offset), Some(size)) => Ok(PlannedRead {
                    label: segment.label.clone(),
                    offset,
                    size,
                }),
                _ => Err(ProvisionError::Config(format!(
                    "Segment {} needs a numeric offset and size to be read",
                    segment.label
                ))),
            }
        })
        .collect()
}
