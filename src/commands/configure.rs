//! `configure`: connect to one device and send configuration without
//! uploading firmware.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ProvisionError, ProvisionResult};
use crate::job::{BatchJobSpec, WirelessJob};
use tokio_util::sync::CancellationToken;

use crate::ota::{OtaReport, OtaSession, ReqwestTransferClient};
use crate::reporter::Reporter;
use crate::ssid::SsidMatcher;
use crate::traits::{NetworkControl, ProcessExecutor, TokioProcessExecutor, TransferClient};
use crate::wifi::{ConnectionSession, ConnectionTimeouts, NetshNetworkControl};

use super::{load_job, wrong_transport, CommandSession};

#[derive(Debug, Clone, Default)]
pub struct ConfigureOptions {
    pub job: PathBuf,
    pub ssid: Option<String>,
    pub json: bool,
}

/// The job file's requests, without the firmware.
pub fn build_job(options: &ConfigureOptions) -> ProvisionResult<WirelessJob> {
    let mut job = match load_job(&options.job)? {
        BatchJobSpec::Wireless(job) => job,
        other => return Err(wrong_transport(&options.job, &other, "wireless")),
    };
    job.firmware = None;
    if let Some(ssid) = &options.ssid {
        job.ssid_match.value = ssid.clone();
    }

    job.validate(false)?;
    if !job.has_follow_up() && job.reboot.is_none() {
        return Err(ProvisionError::Config(
            "Nothing to configure: the job has no bind, domain, follow-up or reboot".into(),
        ));
    }
    Ok(job)
}

/// Connect to the next matching device and apply the job's requests.
pub async fn configure_device(
    network: &dyn NetworkControl,
    transfer: &dyn TransferClient,
    reporter: Arc<dyn Reporter>,
    job: &WirelessJob,
    cancel: &CancellationToken,
) -> ProvisionResult<OtaReport> {
    let matcher = SsidMatcher::new(&job.ssid_match)?;
    let timeouts = ConnectionTimeouts {
        scan: Duration::from_millis(job.timeouts.scan_ms),
        connect: Duration::from_millis(job.timeouts.connect_ms),
        liveness: Duration::from_millis(job.timeouts.liveness_ms),
    };

    let ssid = ConnectionSession::new(
        network,
        transfer,
        reporter.as_ref(),
        &matcher,
        job.effective_password(),
        job.resolve_url("/"),
        timeouts,
    )
    .run(cancel)
    .await?;

    let report = OtaSession::new(transfer, Arc::clone(&reporter), job)
        .run(cancel)
        .await?;
    reporter.log(&format!(
        "Configured {}: {} requests sent{}",
        ssid,
        report.requests_sent,
        if report.rebooted { ", rebooted" } else { "" }
    ));
    Ok(report)
}

pub async fn run(options: ConfigureOptions) -> ProvisionResult<OtaReport> {
    let job = build_job(&options)?;

    let executor: Arc<dyn ProcessExecutor> = Arc::new(TokioProcessExecutor);
    let network = NetshNetworkControl::new(executor);
    let transfer = ReqwestTransferClient::new()?;

    let session = CommandSession::start(options.json);
    let result = configure_device(
        &network,
        &transfer,
        Arc::clone(&session.reporter),
        &job,
        &session.cancel,
    )
    .await;
    session.finish().await;
    result
}
