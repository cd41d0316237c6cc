//! Progress and log reporting.
//!
//! Sessions never print. They report through a [`Reporter`], which a CLI, a
//! UI bridge or a test implements. Calls may arrive from any tokio worker, so
//! implementations must be `Send + Sync` and cheap.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::batch::RunCounters;

/// Phases of one device cycle, for status display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", content = "data", rename_all = "snake_case")]
pub enum ProvisionStage {
    /// Scanning for the next device's access point.
    Scanning { target: String },
    /// Candidate network found.
    DeviceFound { ssid: String },
    /// Recreating the stored connection profile.
    EnsuringProfile { ssid: String },
    /// Waiting for the radio to associate.
    Connecting { ssid: String },
    /// Liveness probe against the device.
    Verifying,
    /// Waiting for the device web server.
    WaitingForWeb,
    /// Streaming the firmware image to the device's update form.
    Uploading { path: String },
    /// Sending a configuration request.
    Configuring { path: String },
    /// Reboot requested.
    Rebooting,
    /// Fixed wait while the device restarts.
    Settling { ms: u64 },
    /// Going back to the operator's own network.
    Reconnecting { ssid: String },
    /// Polling for a bootloader on the serial port.
    WaitingForBootloader,
    /// Writing segments.
    Flashing { attempt: u32, total: u32 },
    /// Reading one segment back.
    ReadingSegment { label: String },
    /// Device finished successfully.
    DeviceDone { count: u32 },
    /// Device failed; the batch moves on.
    DeviceFailed { reason: String },
    /// Run stopped by the operator.
    Stopped,
}

impl ProvisionStage {
    /// Progress bar position for this stage, if it moves the bar.
    pub fn percent(&self) -> Option<u8> {
        match self {
            ProvisionStage::Scanning { .. } => Some(0),
            ProvisionStage::WaitingForBootloader => Some(5),
            ProvisionStage::Flashing { .. } => Some(35),
            ProvisionStage::DeviceDone { .. } => Some(100),
            ProvisionStage::DeviceFailed { .. } | ProvisionStage::Stopped => Some(0),
            _ => None,
        }
    }

    /// Human-readable status line.
    pub fn message(&self) -> String {
        match self {
            ProvisionStage::Scanning { target } => format!("Waiting for device ({})...", target),
            ProvisionStage::DeviceFound { ssid } => format!("Found device AP: {}", ssid),
            ProvisionStage::EnsuringProfile { ssid } => format!("Preparing profile for {}", ssid),
            ProvisionStage::Connecting { ssid } => format!("Connecting to {}...", ssid),
            ProvisionStage::Verifying => "Checking device is reachable...".into(),
            ProvisionStage::WaitingForWeb => "Waiting for device web server...".into(),
            ProvisionStage::Uploading { path } => format!("Uploading to {} ...", path),
            ProvisionStage::Configuring { path } => format!("Sending {}", path),
            ProvisionStage::Rebooting => "Rebooting device...".into(),
            ProvisionStage::Settling { ms } => format!("Waiting {}ms for device restart...", ms),
            ProvisionStage::Reconnecting { ssid } => format!("Reconnecting back to {}...", ssid),
            ProvisionStage::WaitingForBootloader => "Waiting for bootloader...".into(),
            ProvisionStage::Flashing { attempt, total } => {
                format!("Flashing (attempt {}/{})...", attempt, total)
            }
            ProvisionStage::ReadingSegment { label } => format!("Reading {}...", label),
            ProvisionStage::DeviceDone { count } => format!("DONE #{}", count),
            ProvisionStage::DeviceFailed { reason } => format!("Device failed: {}", reason),
            ProvisionStage::Stopped => "Stopped".into(),
        }
    }
}

/// Sink for progress and log output.
pub trait Reporter: Send + Sync {
    /// Overall progress of the current device, 0..=100.
    fn progress(&self, percent: u8);

    /// One log line.
    fn log(&self, line: &str);

    fn stage(&self, stage: &ProvisionStage) {
        self.log(&stage.message());
        if let Some(percent) = stage.percent() {
            self.progress(percent);
        }
    }

    fn counters(&self, counters: &RunCounters) {
        self.log(&format!(
            "Succeeded {} of {} attempted",
            counters.succeeded, counters.attempted
        ));
    }
}

/// Reporter that writes everything to `tracing`.
#[derive(Debug, Default, Clone)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn progress(&self, percent: u8) {
        tracing::debug!(percent, "progress");
    }

    fn log(&self, line: &str) {
        tracing::info!("{}", line);
    }

    fn stage(&self, stage: &ProvisionStage) {
        tracing::info!("{}", stage.message());
    }

    fn counters(&self, counters: &RunCounters) {
        tracing::info!(
            attempted = counters.attempted,
            succeeded = counters.succeeded,
            retry = counters.current_retry,
            "counters"
        );
    }
}

/// Timestamped event for a UI or a JSON-lines consumer.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    Progress {
        at: DateTime<Utc>,
        percent: u8,
    },
    Log {
        at: DateTime<Utc>,
        line: String,
    },
    Stage {
        at: DateTime<Utc>,
        stage: ProvisionStage,
        message: String,
    },
    Counters {
        at: DateTime<Utc>,
        counters: RunCounters,
    },
}

/// Reporter that forwards [`ProgressEvent`]s over a channel. A closed
/// receiver is ignored.
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: UnboundedSender<ProgressEvent>,
}

impl ChannelReporter {
    pub fn new(tx: UnboundedSender<ProgressEvent>) -> Self {
        Self { tx }
    }

    fn send(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }
}

impl Reporter for ChannelReporter {
    fn progress(&self, percent: u8) {
        self.send(ProgressEvent::Progress {
            at: Utc::now(),
            percent,
        });
    }

    fn log(&self, line: &str) {
        self.send(ProgressEvent::Log {
            at: Utc::now(),
            line: line.to_string(),
        });
    }

    fn stage(&self, stage: &ProvisionStage) {
        self.send(ProgressEvent::Stage {
            at: Utc::now(),
            stage: stage.clone(),
            message: stage.message(),
        });
        if let Some(percent) = stage.percent() {
            self.progress(percent);
        }
    }

    fn counters(&self, counters: &RunCounters) {
        self.send(ProgressEvent::Counters {
            at: Utc::now(),
            counters: counters.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::RecordingReporter;

    #[test]
    fn test_stage_messages() {
        assert_eq!(
            ProvisionStage::Flashing {
                attempt: 2,
                total: 2
            }
            .message(),
            "Flashing (attempt 2/2)..."
        );
        assert_eq!(ProvisionStage::DeviceDone { count: 3 }.percent(), Some(100));
        assert_eq!(ProvisionStage::Verifying.percent(), None);
    }

    #[test]
    fn test_default_stage_logs_and_moves_progress() {
        let reporter = RecordingReporter::new();
        reporter.stage(&ProvisionStage::WaitingForBootloader);
        reporter.stage(&ProvisionStage::Rebooting);

        assert_eq!(reporter.progress_values(), vec![5]);
        assert!(reporter.has_line("Waiting for bootloader..."));
        assert!(reporter.has_line("Rebooting device..."));
    }

    #[test]
    fn test_channel_reporter_emits_events() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let reporter = ChannelReporter::new(tx);

        reporter.log("hello");
        reporter.stage(&ProvisionStage::Flashing {
            attempt: 1,
            total: 2,
        });
        reporter.counters(&RunCounters {
            attempted: 2,
            succeeded: 1,
            current_retry: 0,
        });

        let first = rx.try_recv().unwrap();
        assert!(matches!(first, ProgressEvent::Log { ref line, .. } if line == "hello"));

        let second = serde_json::to_value(rx.try_recv().unwrap()).unwrap();
        assert_eq!(second["event"], "stage");
        assert_eq!(second["stage"]["stage"], "flashing");
        assert_eq!(second["stage"]["data"]["attempt"], 1);

        assert!(matches!(
            rx.try_recv().unwrap(),
            ProgressEvent::Progress { percent: 35, .. }
        ));
        assert!(matches!(
            rx.try_recv().unwrap(),
            ProgressEvent::Counters { ref counters, .. } if counters.succeeded == 1
        ));
    }

    #[test]
    fn test_channel_reporter_ignores_closed_receiver() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);
        ChannelReporter::new(tx).log("nobody listening");
    }
}
