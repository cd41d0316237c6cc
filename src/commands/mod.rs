//! Command handlers behind the CLI.
//!
//! Each handler wires the real adapters (netsh, reqwest, tokio processes),
//! arms Ctrl-C cancellation and picks a reporter, then hands over to the
//! library. Handlers never print except through the reporter, apart from the
//! listing commands whose output is the point.

pub mod configure;
pub mod device;
pub mod serial;
pub mod wireless;

use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{ProvisionError, ProvisionResult};
use crate::job::BatchJobSpec;
use crate::reporter::{ChannelReporter, ProgressEvent, Reporter, TracingReporter};

/// Cancellation and reporting for one command invocation.
pub struct CommandSession {
    pub cancel: CancellationToken,
    pub reporter: Arc<dyn Reporter>,
    printer: Option<JoinHandle<()>>,
}

impl CommandSession {
    /// With `json`, every event is printed to stdout as one JSON line;
    /// otherwise everything goes to the tracing log.
    pub fn start(json: bool) -> Self {
        let cancel = CancellationToken::new();
        cancel_on_ctrl_c(cancel.clone());

        if json {
            let (tx, rx) = unbounded_channel();
            Self {
                cancel,
                reporter: Arc::new(ChannelReporter::new(tx)),
                printer: Some(tokio::spawn(print_events(rx))),
            }
        } else {
            Self {
                cancel,
                reporter: Arc::new(TracingReporter),
                printer: None,
            }
        }
    }

    /// Close the event stream and wait until everything has been printed.
    pub async fn finish(self) {
        drop(self.reporter);
        if let Some(printer) = self.printer {
            let _ = printer.await;
        }
    }
}

fn cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Stop requested, finishing current step...");
                cancel.cancel();
            }
            Err(e) => tracing::warn!("Could not listen for Ctrl-C: {}", e),
        }
    });
}

async fn print_events(mut rx: UnboundedReceiver<ProgressEvent>) {
    while let Some(event) = rx.recv().await {
        match serde_json::to_string(&event) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::warn!("Could not serialise event: {}", e),
        }
    }
}

/// Load a job file and check it is for the expected transport.
pub(crate) fn load_job(path: &Path) -> ProvisionResult<BatchJobSpec> {
    let job = BatchJobSpec::load(path)?;
    tracing::debug!("Loaded {} job from {}", job.kind(), path.display());
    Ok(job)
}

pub(crate) fn wrong_transport(path: &Path, job: &BatchJobSpec, expected: &str) -> ProvisionError {
    ProvisionError::Config(format!(
        "{} is a {} job, expected {}",
        path.display(),
        job.kind(),
        expected
    ))
}
