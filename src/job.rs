//! Batch job description.
//!
//! A job is read once from a JSON file, validated, and then treated as
//! immutable for the whole run. Every field has a default mirroring the
//! constants in [`crate::config`], so a minimal wireless job is just:
//!
//! ```json
//! { "transport": "wireless", "firmware": "rx.bin",
//!   "match": { "mode": "prefix", "value": "ExpressLRS RX" } }
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::{
    AFTER_UPLOAD_SETTLE_MS, BETWEEN_DEVICES_DELAY_MS, BOOT_WAIT_TIMEOUT_MS, CONNECT_TIMEOUT_MS,
    DEFAULT_FLASH_TOOL, DETECT_BAUD_RATE, DEVICE_BASE_URL, FILE_SIZE_HEADER, FLASH_BAUD_RATE,
    HTTP_TIMEOUT_MS, LIVENESS_TIMEOUT_MS, REACHABILITY_TIMEOUT_MS, REBOOT_SETTLE_MS,
    RECONNECT_TIMEOUT_MS, RETRY_FLASH_COUNT, SCAN_TIMEOUT_MS,
};
use crate::error::{ProvisionError, ProvisionResult};
use crate::flash::{ChipProfile, FlashPlan};
use crate::ota::template;
use crate::ssid::SsidMatcher;

/// How a network name is compared against the configured value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    Exact,
    #[serde(alias = "startsWith", alias = "starts_with")]
    Prefix,
    #[serde(alias = "regex")]
    Pattern,
}

/// Which visible network counts as "the next device".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SsidMatchSpec {
    pub mode: MatchMode,
    pub value: String,
}

impl Default for SsidMatchSpec {
    fn default() -> Self {
        Self {
            mode: MatchMode::Prefix,
            value: "ExpressLRS RX".to_string(),
        }
    }
}

/// When to go back to the network that was associated before the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconnectPolicy {
    Never,
    #[default]
    AfterEachDevice,
    AtEnd,
}

/// Which transport a job drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Wireless,
    Serial,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Wireless => write!(f, "wireless"),
            TransportKind::Serial => write!(f, "serial"),
        }
    }
}

/// Complete job file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum BatchJobSpec {
    Wireless(WirelessJob),
    Serial(SerialJob),
}

impl BatchJobSpec {
    /// Read and parse a job file. Does not validate.
    pub fn load(path: &Path) -> ProvisionResult<Self> {
        if !path.exists() {
            return Err(ProvisionError::Config(format!(
                "Job file not found: {}",
                path.display()
            )));
        }

        let contents = fs::read_to_string(path)?;
        if contents.trim().is_empty() {
            return Err(ProvisionError::Config(format!(
                "Job file is empty: {}",
                path.display()
            )));
        }

        Ok(serde_json::from_str(&contents)?)
    }

    pub fn save(&self, path: &Path) -> ProvisionResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            BatchJobSpec::Wireless(_) => TransportKind::Wireless,
            BatchJobSpec::Serial(_) => TransportKind::Serial,
        }
    }

    /// Pre-flight checks. Any error here is fatal to the whole run.
    pub fn validate(&self) -> ProvisionResult<()> {
        match self {
            BatchJobSpec::Wireless(job) => job.validate(true),
            BatchJobSpec::Serial(job) => job.validate().map(|_| ()),
        }
    }
}

// ============================================================================
// Wireless
// ============================================================================

/// Timeouts of the wireless path, all in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WirelessTimeouts {
    pub scan_ms: u64,
    pub connect_ms: u64,
    pub liveness_ms: u64,
    pub http_ms: u64,
    pub reachability_ms: u64,
    pub after_upload_settle_ms: u64,
    pub reconnect_ms: u64,
}

impl Default for WirelessTimeouts {
    fn default() -> Self {
        Self {
            scan_ms: SCAN_TIMEOUT_MS,
            connect_ms: CONNECT_TIMEOUT_MS,
            liveness_ms: LIVENESS_TIMEOUT_MS,
            http_ms: HTTP_TIMEOUT_MS,
            reachability_ms: REACHABILITY_TIMEOUT_MS,
            after_upload_settle_ms: AFTER_UPLOAD_SETTLE_MS,
            reconnect_ms: RECONNECT_TIMEOUT_MS,
        }
    }
}

impl WirelessTimeouts {
    fn validate(&self) -> ProvisionResult<()> {
        let named = [
            ("scanMs", self.scan_ms),
            ("connectMs", self.connect_ms),
            ("livenessMs", self.liveness_ms),
            ("httpMs", self.http_ms),
            ("reachabilityMs", self.reachability_ms),
        ];
        for (name, value) in named {
            if value == 0 {
                return Err(ProvisionError::Config(format!(
                    "Timeout {} must be greater than zero",
                    name
                )));
            }
        }
        Ok(())
    }
}

fn default_size_header() -> String {
    FILE_SIZE_HEADER.to_string()
}

/// Upload target overrides. Anything left unset is autodetected from the
/// device's root page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOverrides {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default = "default_size_header")]
    pub size_header: String,
}

impl Default for UploadOverrides {
    fn default() -> Self {
        Self {
            path: None,
            field: None,
            size_header: default_size_header(),
        }
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// A static JSON POST sent after the upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonPostSpec {
    pub path: String,
    #[serde(default = "empty_object")]
    pub body: Value,
}

fn default_bind_path() -> String {
    "/config".to_string()
}

/// Bind phrase request: `template` with the `"$UID6"` placeholder replaced by `uid`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindSpec {
    #[serde(default = "default_bind_path")]
    pub path: String,
    pub template: Value,
    pub uid: Vec<i64>,
}

fn default_domain_path() -> String {
    "/options.json".to_string()
}

/// Regulatory/frequency request: `baseBody` plus optional `freq1`/`freq2`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainSpec {
    #[serde(default = "default_domain_path")]
    pub path: String,
    #[serde(default)]
    pub base_body: Map<String, Value>,
    #[serde(default)]
    pub freq1: Option<i64>,
    #[serde(default)]
    pub freq2: Option<i64>,
}

fn default_reboot_path() -> String {
    "/reboot".to_string()
}

fn default_reboot_settle_ms() -> u64 {
    REBOOT_SETTLE_MS
}

/// Explicit reboot request followed by a settle delay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebootSpec {
    #[serde(default = "default_reboot_path")]
    pub path: String,
    #[serde(default = "default_reboot_settle_ms")]
    pub settle_ms: u64,
}

impl Default for RebootSpec {
    fn default() -> Self {
        Self {
            path: default_reboot_path(),
            settle_ms: default_reboot_settle_ms(),
        }
    }
}

fn default_base_url() -> String {
    DEVICE_BASE_URL.to_string()
}

/// Over-the-air job through the device's own access point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WirelessJob {
    /// Firmware image. Only the configure-only session runs without one.
    #[serde(default)]
    pub firmware: Option<PathBuf>,

    #[serde(rename = "match", default)]
    pub ssid_match: SsidMatchSpec,

    /// Pre-shared key. Absent or empty means an open network.
    #[serde(default)]
    pub password: Option<String>,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub timeouts: WirelessTimeouts,

    #[serde(default)]
    pub upload: UploadOverrides,

    #[serde(default)]
    pub bind: Option<BindSpec>,

    #[serde(default)]
    pub domain: Option<DomainSpec>,

    #[serde(default)]
    pub follow_up: Vec<JsonPostSpec>,

    #[serde(default)]
    pub reboot: Option<RebootSpec>,

    #[serde(default)]
    pub reconnect: ReconnectPolicy,

    #[serde(default)]
    pub inter_device_delay_ms: u64,
}

impl WirelessJob {
    /// A job that matches `ssid_match` and uploads `firmware`, everything else default.
    pub fn new(firmware: Option<PathBuf>, ssid_match: SsidMatchSpec) -> Self {
        Self {
            firmware,
            ssid_match,
            password: None,
            base_url: default_base_url(),
            timeouts: WirelessTimeouts::default(),
            upload: UploadOverrides::default(),
            bind: None,
            domain: None,
            follow_up: Vec::new(),
            reboot: None,
            reconnect: ReconnectPolicy::default(),
            inter_device_delay_ms: 0,
        }
    }

    /// Password with empty strings folded into `None`.
    pub fn effective_password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }

    /// Absolute URL for a device path. Paths that are already URLs pass through.
    pub fn resolve_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }

    /// True when anything beyond the upload itself is sent to the device.
    pub fn has_follow_up(&self) -> bool {
        self.bind.is_some() || self.domain.is_some() || !self.follow_up.is_empty()
    }

    /// Pre-flight checks; `require_firmware` is false only for configure-only runs.
    pub fn validate(&self, require_firmware: bool) -> ProvisionResult<()> {
        if self.ssid_match.value.trim().is_empty() {
            return Err(ProvisionError::Config(
                "Network match value must not be empty".into(),
            ));
        }
        // Compiles the pattern eagerly so a bad regex stops the run here.
        SsidMatcher::new(&self.ssid_match)?;

        match &self.firmware {
            Some(path) if path.is_file() => {}
            Some(path) => {
                return Err(ProvisionError::Config(format!(
                    "Firmware not found: {}",
                    path.display()
                )))
            }
            None if require_firmware => {
                return Err(ProvisionError::Config("No firmware file selected".into()))
            }
            None => {}
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ProvisionError::Config(format!(
                "Device base URL must be http(s): {}",
                self.base_url
            )));
        }

        self.timeouts.validate()?;

        if let Some(bind) = &self.bind {
            template::validate_uid(&bind.uid)?;
        }

        Ok(())
    }
}

// ============================================================================
// Serial
// ============================================================================

fn default_tool() -> String {
    DEFAULT_FLASH_TOOL.to_string()
}

fn default_baud() -> u32 {
    FLASH_BAUD_RATE
}

fn default_detect_baud() -> u32 {
    DETECT_BAUD_RATE
}

fn default_boot_wait_ms() -> u64 {
    BOOT_WAIT_TIMEOUT_MS
}

fn default_retry_count() -> u32 {
    RETRY_FLASH_COUNT
}

fn default_between_devices_ms() -> u64 {
    BETWEEN_DEVICES_DELAY_MS
}

/// Wired job through the bootloader of a chip held in boot mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerialJob {
    #[serde(default = "default_tool")]
    pub tool: String,

    #[serde(default)]
    pub port: String,

    #[serde(default = "default_baud")]
    pub baud: u32,

    #[serde(default = "default_detect_baud")]
    pub detect_baud: u32,

    /// Inline profile. The CLI may fill this from a profile list instead.
    #[serde(default)]
    pub profile: Option<ChipProfile>,

    /// Artifact per segment label (`app`, `boot`, `nvs`, ...).
    #[serde(default)]
    pub segments: HashMap<String, PathBuf>,

    #[serde(default = "default_boot_wait_ms")]
    pub boot_wait_timeout_ms: u64,

    /// Extra attempts after the first failure.
    #[serde(default = "default_retry_count")]
    pub retry_flash_count: u32,

    #[serde(default = "default_between_devices_ms")]
    pub between_devices_delay_ms: u64,
}

impl Default for SerialJob {
    fn default() -> Self {
        Self {
            tool: default_tool(),
            port: String::new(),
            baud: default_baud(),
            detect_baud: default_detect_baud(),
            profile: None,
            segments: HashMap::new(),
            boot_wait_timeout_ms: default_boot_wait_ms(),
            retry_flash_count: default_retry_count(),
            between_devices_delay_ms: default_between_devices_ms(),
        }
    }
}

impl SerialJob {
    pub fn new(port: &str, profile: ChipProfile) -> Self {
        Self {
            port: port.to_string(),
            profile: Some(profile),
            ..Self::default()
        }
    }

    pub fn profile(&self) -> ProvisionResult<&ChipProfile> {
        self.profile
            .as_ref()
            .ok_or_else(|| ProvisionError::Config("No chip profile selected".into()))
    }

    /// Settings shared by write and read, without requiring artifacts.
    pub fn validate_connection(&self) -> ProvisionResult<()> {
        if self.tool.trim().is_empty() {
            return Err(ProvisionError::Config("Flashing tool path is empty".into()));
        }
        if self.port.trim().is_empty() {
            return Err(ProvisionError::Config("No serial port selected".into()));
        }
        if self.baud == 0 || self.detect_baud == 0 {
            return Err(ProvisionError::Config("Baud rate must be greater than zero".into()));
        }
        if self.boot_wait_timeout_ms == 0 {
            return Err(ProvisionError::Config(
                "Boot wait timeout must be greater than zero".into(),
            ));
        }
        self.profile().map(|_| ())
    }

    /// Full pre-flight check for flashing. Returns the resolved plan.
    pub fn validate(&self) -> ProvisionResult<FlashPlan> {
        self.validate_connection()?;
        FlashPlan::resolve(self.profile()?, &self.segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ChipProfileBuilder, TestContext};

    #[test]
    fn test_minimal_wireless_job_gets_defaults() {
        let job: BatchJobSpec = serde_json::from_str(
            r#"{"transport": "wireless", "firmware": "rx.bin",
                "match": {"mode": "startsWith", "value": "ExpressLRS RX"}}"#,
        )
        .unwrap();

        let BatchJobSpec::Wireless(job) = job else {
            panic!("expected wireless job");
        };
        assert_eq!(job.ssid_match.mode, MatchMode::Prefix);
        assert_eq!(job.base_url, DEVICE_BASE_URL);
        assert_eq!(job.timeouts.connect_ms, CONNECT_TIMEOUT_MS);
        assert_eq!(job.upload.size_header, FILE_SIZE_HEADER);
        assert_eq!(job.reconnect, ReconnectPolicy::AfterEachDevice);
        assert!(job.effective_password().is_none());
        assert!(!job.has_follow_up());
    }

    #[test]
    fn test_match_mode_aliases() {
        let spec: SsidMatchSpec =
            serde_json::from_str(r#"{"mode": "regex", "value": "^RX-\\d+$"}"#).unwrap();
        assert_eq!(spec.mode, MatchMode::Pattern);
        let spec: SsidMatchSpec =
            serde_json::from_str(r#"{"mode": "exact", "value": "RX"}"#).unwrap();
        assert_eq!(spec.mode, MatchMode::Exact);
    }

    #[test]
    fn test_serial_job_defaults() {
        let job: BatchJobSpec = serde_json::from_str(
            r#"{"transport": "serial", "port": "COM5",
                "segments": {"app": "firmware.bin"}}"#,
        )
        .unwrap();

        let BatchJobSpec::Serial(job) = job else {
            panic!("expected serial job");
        };
        assert_eq!(job.tool, DEFAULT_FLASH_TOOL);
        assert_eq!(job.baud, FLASH_BAUD_RATE);
        assert_eq!(job.detect_baud, DETECT_BAUD_RATE);
        assert_eq!(job.retry_flash_count, 1);
        assert_eq!(job.between_devices_delay_ms, 1_500);
        assert!(matches!(job.validate(), Err(ProvisionError::Config(_))));
    }

    #[test]
    fn test_resolve_url() {
        let job = WirelessJob::new(None, SsidMatchSpec::default());
        assert_eq!(job.resolve_url("/update"), "http://10.0.0.1/update");
        assert_eq!(job.resolve_url("reboot"), "http://10.0.0.1/reboot");
        assert_eq!(
            job.resolve_url("http://10.0.0.2/config"),
            "http://10.0.0.2/config"
        );
    }

    #[test]
    fn test_wireless_validation() {
        let ctx = TestContext::new();
        let firmware = ctx.create_file_bytes("rx.bin", &[0xE9, 0x00]);

        let mut job = WirelessJob::new(Some(firmware), SsidMatchSpec::default());
        assert!(job.validate(true).is_ok());

        job.ssid_match.value = "  ".into();
        assert!(job.validate(true).is_err());

        job.ssid_match = SsidMatchSpec {
            mode: MatchMode::Pattern,
            value: "RX-(".into(),
        };
        assert!(matches!(job.validate(true), Err(ProvisionError::Config(_))));

        job.ssid_match = SsidMatchSpec::default();
        job.firmware = Some(ctx.path("missing.bin"));
        assert!(job.validate(true).is_err());

        job.firmware = None;
        assert!(job.validate(true).is_err());
        assert!(job.validate(false).is_ok());

        job.timeouts.connect_ms = 0;
        assert!(job.validate(false).is_err());
    }

    #[test]
    fn test_bind_uid_checked_up_front() {
        let mut job = WirelessJob::new(None, SsidMatchSpec::default());
        job.bind = Some(BindSpec {
            path: default_bind_path(),
            template: serde_json::json!({"uid": "$UID6"}),
            uid: vec![1, 2, 3, 4, 5, 256],
        });
        assert!(job.validate(false).is_err());
    }

    #[test]
    fn test_serial_validation_resolves_plan() {
        let ctx = TestContext::new();
        let app = ctx.create_file_bytes("app.bin", &[0u8; 8]);
        let profile = ChipProfileBuilder::new("RX")
            .segment("app", "0x10000", "0x100000", true)
            .build();

        let mut job = SerialJob::new("", profile);
        job.segments.insert("app".into(), app);
        assert!(job.validate().is_err());

        job.port = "/dev/ttyUSB0".into();
        let plan = job.validate().unwrap();
        assert_eq!(plan.writes.len(), 1);
    }

    #[test]
    fn test_save_and_load() {
        let ctx = TestContext::new();
        let path = ctx.path("jobs/wireless.json");
        let spec = BatchJobSpec::Wireless(WirelessJob::new(None, SsidMatchSpec::default()));

        spec.save(&path).unwrap();
        let loaded = BatchJobSpec::load(&path).unwrap();
        assert_eq!(loaded.kind(), TransportKind::Wireless);
        assert!(ctx.read_file("jobs/wireless.json").contains("\"transport\": \"wireless\""));
    }

    #[test]
    fn test_load_rejects_missing_and_empty() {
        let ctx = TestContext::new();
        assert!(BatchJobSpec::load(&ctx.path("none.json")).is_err());

        let empty = ctx.create_file("empty.json", "  ");
        assert!(matches!(
            BatchJobSpec::load(&empty),
            Err(ProvisionError::Config(_))
        ));

        let broken = ctx.create_file("broken.json", "{\"transport\": \"carrier-pigeon\"}");
        let err = BatchJobSpec::load(&broken).unwrap_err();
        assert_eq!(err.class(), crate::error::ErrorClass::Configuration);
    }
}
