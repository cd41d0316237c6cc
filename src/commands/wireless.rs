//! `wifi`: the wireless batch.

use std::path::PathBuf;
use std::sync::Arc;

use crate::batch::{RunCounters, WirelessBatch};
use crate::error::ProvisionResult;
use crate::job::{BatchJobSpec, MatchMode, ReconnectPolicy, SsidMatchSpec, WirelessJob};
use crate::ota::ReqwestTransferClient;
use crate::traits::{ProcessExecutor, TokioProcessExecutor};
use crate::wifi::NetshNetworkControl;

use super::{load_job, wrong_transport, CommandSession};

/// Command-line values layered over an optional job file.
#[derive(Debug, Clone, Default)]
pub struct WirelessOptions {
    pub job: Option<PathBuf>,
    pub firmware: Option<PathBuf>,
    pub ssid: Option<String>,
    pub mode: Option<MatchMode>,
    pub password: Option<String>,
    pub reconnect: Option<ReconnectPolicy>,
    /// Write the merged job here before starting.
    pub save_job: Option<PathBuf>,
    pub json: bool,
}

/// Merge the job file (if any) with the command-line overrides.
pub fn build_job(options: &WirelessOptions) -> ProvisionResult<WirelessJob> {
    let mut job = match &options.job {
        Some(path) => match load_job(path)? {
            BatchJobSpec::Wireless(job) => job,
            other => return Err(wrong_transport(path, &other, "wireless")),
        },
        None => WirelessJob::new(None, SsidMatchSpec::default()),
    };

    if let Some(firmware) = &options.firmware {
        job.firmware = Some(firmware.clone());
    }
    if let Some(ssid) = &options.ssid {
        job.ssid_match.value = ssid.clone();
    }
    if let Some(mode) = options.mode {
        job.ssid_match.mode = mode;
    }
    if let Some(password) = &options.password {
        job.password = Some(password.clone());
    }
    if let Some(reconnect) = options.reconnect {
        job.reconnect = reconnect;
    }

    Ok(job)
}

pub async fn run(options: WirelessOptions) -> ProvisionResult<RunCounters> {
    let job = build_job(&options)?;
    job.validate(true)?;
    if let Some(path) = &options.save_job {
        BatchJobSpec::Wireless(job.clone()).save(path)?;
        tracing::info!("Saved job to {}", path.display());
    }

    let executor: Arc<dyn ProcessExecutor> = Arc::new(TokioProcessExecutor);
    let network = NetshNetworkControl::new(executor);
    let transfer = ReqwestTransferClient::new()?;

    let session = CommandSession::start(options.json);
    let result = WirelessBatch::new(&network, &transfer, Arc::clone(&session.reporter), &job)
        .run(&session.cancel)
        .await;
    session.finish().await;
    result
}
