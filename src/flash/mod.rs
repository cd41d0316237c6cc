//! Serial flashing through the chip's ROM bootloader with an external tool.

mod engine;
mod esptool;
mod profile;

pub use engine::{FlashEngine, FlashState};
pub use esptool::{
    clone_dir_name, extract_mac, is_chip_detected, short_failure_reason, EsptoolCommand,
};
pub use profile::{
    find_profile, load_profiles, parse_number, read_plan, ChipProfile, DeviceSegment, FlashPlan,
    PlannedRead, PlannedWrite, PROFILES_FILENAME,
};
