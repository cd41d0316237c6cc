//! Protocol and timing constants shared by both transports.

use std::time::Duration;

// ============================================================================
// Device HTTP Protocol
// ============================================================================

/// Management address every receiver serves while in Wi-Fi update mode.
pub const DEVICE_BASE_URL: &str = "http://10.0.0.1";

/// Upload path used when the root page has no `<form action=...>`.
pub const DEFAULT_UPLOAD_PATH: &str = "/update";

/// File input name used when the root page has no `<input type="file">`.
pub const DEFAULT_UPLOAD_FIELD: &str = "upload";

/// Header carrying the exact artifact length ahead of the multipart body.
pub const FILE_SIZE_HEADER: &str = "X-FileSize";

/// Extra multipart text field some web updaters expect next to the file.
pub const FILE_NAME_FIELD: &str = "file_name";

/// Chunk size for streaming the artifact into the request body.
pub const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

// ============================================================================
// Wireless Timeouts
// ============================================================================

/// Interval between visible-network scans while waiting for a device AP.
pub const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Overall bound on one scan phase before it reports a timeout.
pub const SCAN_TIMEOUT_MS: u64 = 180_000;

/// Bound on association after issuing a connect request.
pub const CONNECT_TIMEOUT_MS: u64 = 20_000;

/// Interval between "currently associated network" queries.
pub const ASSOCIATION_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Timeout of the single liveness probe after association.
pub const LIVENESS_TIMEOUT_MS: u64 = 5_000;

/// Per-request timeout for device HTTP calls.
pub const HTTP_TIMEOUT_MS: u64 = 20_000;

/// Wall-clock bound for the device web server to start answering.
pub const REACHABILITY_TIMEOUT_MS: u64 = 20_000;

/// Interval between reachability probes.
pub const REACHABILITY_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Wait after a successful upload while the receiver reboots.
pub const AFTER_UPLOAD_SETTLE_MS: u64 = 8_000;

/// Wait after an explicit reboot request.
pub const REBOOT_SETTLE_MS: u64 = 15_000;

/// Bound on reconnecting to the operator's own network.
pub const RECONNECT_TIMEOUT_MS: u64 = 10_000;

// ============================================================================
// Serial Flashing
// ============================================================================

/// Flashing tool looked up on PATH when the job does not name one.
pub const DEFAULT_FLASH_TOOL: &str = "esptool";

/// Baud rate for write/read operations.
pub const FLASH_BAUD_RATE: u32 = 921_600;

/// Baud rate for identification and MAC queries.
pub const DETECT_BAUD_RATE: u32 = 115_200;

/// Overall bound on waiting for a bootloader to answer.
pub const BOOT_WAIT_TIMEOUT_MS: u64 = 30_000;

/// Interval between identification probes.
pub const BOOT_POLL_INTERVAL: Duration = Duration::from_millis(600);

/// Time budget for one identification probe.
pub const BOOT_PROBE_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Additional flash attempts after the first failure.
pub const RETRY_FLASH_COUNT: u32 = 1;

/// Pause between flash attempts on the same device.
pub const RETRY_BACKOFF: Duration = Duration::from_millis(800);

/// Pause between a finished device and waiting for the next one.
pub const BETWEEN_DEVICES_DELAY_MS: u64 = 1_500;

/// Pause before waiting again after a device exhausted its retries.
pub const WAIT_AGAIN_DELAY: Duration = Duration::from_millis(800);

/// Substring that identification output must contain to count as detected.
pub const CHIP_DETECTED_MARKER: &str = "Chip is";

/// Output lines that explain a failed probe better than the last line does.
pub const FAILURE_REASON_MARKERS: &[&str] = &[
    "Failed to connect",
    "No serial data",
    "Could not open port",
    "Access is denied",
    "Invalid head of packet",
    "Timed out",
];

// ============================================================================
// Diagnostic Truncation
// ============================================================================

/// Maximum characters of an HTTP response body kept in errors and logs.
pub const HTTP_BODY_EXCERPT: usize = 180;

/// Maximum characters of a flash failure kept in logs.
pub const FLASH_ERROR_EXCERPT: usize = 600;

/// Maximum characters of a probe error kept in logs.
pub const PROBE_ERROR_EXCERPT: usize = 140;

/// Maximum characters of successful flash output kept in logs.
pub const FLASH_OUTPUT_EXCERPT: usize = 500;

// ============================================================================
// Bind Phrase Templating
// ============================================================================

/// Quoted placeholder replaced by the numeric UID array.
pub const UID_PLACEHOLDER: &str = "\"$UID6\"";

/// Number of bytes in a bind-phrase UID.
pub const UID_LENGTH: usize = 6;
