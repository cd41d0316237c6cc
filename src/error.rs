//! Error types for batch provisioning.

use thiserror::Error;

/// Result type alias for provisioning operations.
pub type ProvisionResult<T> = Result<T, ProvisionError>;

/// Coarse failure classes the batch loop uses to decide between aborting,
/// looping back to discovery, retrying, or unwinding quietly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Invalid or incomplete job. Fatal to the whole run.
    Configuration,
    /// Nothing showed up within the bound. Handled by looping.
    DiscoveryTimeout,
    /// Non-2xx HTTP, non-zero exit, unreachable device. Retried where allowed.
    Transport,
    /// Explicit operator stop.
    Cancelled,
}

/// Errors that can occur while provisioning a device.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Job specification is missing something or is malformed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// No matching network appeared within the scan bound.
    #[error("No network matching '{target}' within {timeout_ms}ms")]
    ScanTimeout { target: String, timeout_ms: u64 },

    /// The radio never associated with the candidate network.
    #[error("Wi-Fi connect timeout for '{ssid}' after {timeout_ms}ms")]
    ConnectTimeout { ssid: String, timeout_ms: u64 },

    /// Bootloader identification never succeeded.
    #[error("Bootloader not detected within {timeout_ms}ms")]
    BootloaderTimeout { timeout_ms: u64 },

    /// Associated with the network but the device web server does not answer.
    #[error("Device not reachable at {url}: {reason}")]
    DeviceUnreachable { url: String, reason: String },

    /// Device answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// Transport-level HTTP failure (connect refused, reset, timeout).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// External tool exited unsuccessfully.
    #[error("Process exited with code {exit_code:?}: {output}")]
    ProcessFailed { exit_code: Option<i32>, output: String },

    /// External tool did not finish within its time budget and was killed.
    #[error("Process '{program}' timed out after {timeout_ms}ms")]
    ProcessTimeout { program: String, timeout_ms: u64 },

    /// External tool could not be started at all.
    #[error("Failed to start '{program}': {reason}")]
    ProcessSpawn { program: String, reason: String },

    /// Wireless profile management failed.
    #[error("Network control error: {0}")]
    NetworkControl(String),

    /// Every flash attempt failed.
    #[error("Flash failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// Standard I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialisation error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Operation was cancelled by the operator.
    #[error("Operation cancelled by user")]
    Cancelled,
}

impl ProvisionError {
    /// Map this error onto the batch-level failure classes.
    pub fn class(&self) -> ErrorClass {
        match self {
            ProvisionError::Config(_) | ProvisionError::Json(_) => ErrorClass::Configuration,
            ProvisionError::ScanTimeout { .. }
            | ProvisionError::ConnectTimeout { .. }
            | ProvisionError::BootloaderTimeout { .. } => ErrorClass::DiscoveryTimeout,
            ProvisionError::Cancelled => ErrorClass::Cancelled,
            ProvisionError::DeviceUnreachable { .. }
            | ProvisionError::HttpStatus { .. }
            | ProvisionError::Http(_)
            | ProvisionError::ProcessFailed { .. }
            | ProvisionError::ProcessTimeout { .. }
            | ProvisionError::ProcessSpawn { .. }
            | ProvisionError::NetworkControl(_)
            | ProvisionError::RetriesExhausted { .. }
            | ProvisionError::Io(_) => ErrorClass::Transport,
        }
    }

    /// Check if this error is worth another attempt on the same device.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            ProvisionError::HttpStatus { .. }
                | ProvisionError::Http(_)
                | ProvisionError::ProcessFailed { .. }
                | ProvisionError::ProcessTimeout { .. }
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProvisionError::Cancelled)
    }

    /// Get a user-friendly error code for support purposes.
    pub fn error_code(&self) -> &'static str {
        match self {
            ProvisionError::Config(_) => "RXB-001",
            ProvisionError::Json(_) => "RXB-002",
            ProvisionError::Io(_) => "RXB-003",
            ProvisionError::ScanTimeout { .. } => "RXB-010",
            ProvisionError::ConnectTimeout { .. } => "RXB-011",
            ProvisionError::BootloaderTimeout { .. } => "RXB-012",
            ProvisionError::DeviceUnreachable { .. } => "RXB-020",
            ProvisionError::HttpStatus { .. } => "RXB-021",
            ProvisionError::Http(_) => "RXB-022",
            ProvisionError::NetworkControl(_) => "RXB-030",
            ProvisionError::ProcessFailed { .. } => "RXB-040",
            ProvisionError::ProcessTimeout { .. } => "RXB-041",
            ProvisionError::ProcessSpawn { .. } => "RXB-042",
            ProvisionError::RetriesExhausted { .. } => "RXB-043",
            ProvisionError::Cancelled => "RXB-099",
        }
    }
}

/// Cut a diagnostic down to at most `max` characters, ending in an ellipsis
/// when anything was dropped. Line breaks are flattened so a body fits on one log line.
pub fn truncate_diagnostic(text: &str, max: usize) -> String {
    let flat = text.replace('\r', "").replace('\n', " ");
    let flat = flat.trim();
    if flat.chars().count() <= max {
        return flat.to_string();
    }
    let cut: String = flat.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", cut)
}
