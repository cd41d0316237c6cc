use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::artifact;
use crate::cancel::sleep_or_cancel;
use crate::error::{ErrorClass, ProvisionError, ProvisionResult};
use crate::job::{ReconnectPolicy, WirelessJob};
use crate::ota::OtaSession;
use crate::reporter::{ProvisionStage, Reporter};
use crate::ssid::SsidMatcher;
use crate::traits::{NetworkControl, TransferClient};
use crate::wifi::{wait_for_association, ConnectionSession, ConnectionTimeouts};

use super::outcome::{RunCounters, TransferOutcome};

const SEPARATOR: &str = "--------------------------------------------------";

/// Wireless batch: find a device AP, connect, run the OTA session, repeat.
///
/// Never ends on its own. A failed device is logged and the loop resumes
/// discovery; only a configuration error or cancellation stops the run.
pub struct WirelessBatch<'a> {
    network: &'a dyn NetworkControl,
    transfer: &'a dyn TransferClient,
    reporter: Arc<dyn Reporter>,
    job: &'a WirelessJob,
}

impl<'a> WirelessBatch<'a> {
    pub fn new(
        network: &'a dyn NetworkControl,
        transfer: &'a dyn TransferClient,
        reporter: Arc<dyn Reporter>,
        job: &'a WirelessJob,
    ) -> Self {
        Self {
            network,
            transfer,
            reporter,
            job,
        }
    }

    /// Returns the final counters once cancelled.
    pub async fn run(&self, cancel: &CancellationToken) -> ProvisionResult<RunCounters> {
        self.job.validate(true)?;
        let matcher = SsidMatcher::new(&self.job.ssid_match)?;
        if let Some(firmware) = &self.job.firmware {
            let info = artifact::inspect(firmware)?;
            self.reporter.log(&format!("Firmware: {}", info));
        }

        let original = match self.network.associated_network().await {
            Ok(current) => current,
            Err(e) => {
                tracing::warn!("Could not read current Wi-Fi: {}", e);
                None
            }
        };
        self.reporter.log(&format!(
            "Current Wi-Fi: {}",
            original.as_deref().unwrap_or("(none)")
        ));
        self.reporter
            .log("Batch started. Put RX into WiFi mode one by one.");

        let mut counters = RunCounters::default();
        let result = self
            .device_loop(&matcher, original.as_deref(), &mut counters, cancel)
            .await;

        if self.job.reconnect == ReconnectPolicy::AtEnd {
            if let Some(original) = &original {
                // The run token is already cancelled here; the reconnect has its own bound.
                self.reconnect(original, &CancellationToken::new()).await;
            }
        }

        self.reporter.stage(&ProvisionStage::Stopped);
        self.reporter.counters(&counters);
        tracing::info!(
            attempted = counters.attempted,
            succeeded = counters.succeeded,
            failed = counters.failed(),
            "wireless batch finished"
        );

        result.map(|()| counters)
    }

    async fn device_loop(
        &self,
        matcher: &SsidMatcher,
        original: Option<&str>,
        counters: &mut RunCounters,
        cancel: &CancellationToken,
    ) -> ProvisionResult<()> {
        let timeouts = ConnectionTimeouts {
            scan: Duration::from_millis(self.job.timeouts.scan_ms),
            connect: Duration::from_millis(self.job.timeouts.connect_ms),
            liveness: Duration::from_millis(self.job.timeouts.liveness_ms),
        };

        while !cancel.is_cancelled() {
            let mut connection = ConnectionSession::new(
                self.network,
                self.transfer,
                self.reporter.as_ref(),
                matcher,
                self.job.effective_password(),
                self.job.resolve_url("/"),
                timeouts,
            );

            let connected = connection.run(cancel).await;
            let outcome = match connected {
                Ok(_) => {
                    counters.attempted += 1;
                    self.reporter.counters(counters);
                    self.transfer_to_device(counters, cancel).await?
                }
                Err(e) if e.class() == ErrorClass::Configuration => return Err(e),
                Err(e) => {
                    let outcome = TransferOutcome::from_error(&e);
                    if matches!(outcome, TransferOutcome::TransportError(_)) {
                        counters.attempted += 1;
                    }
                    outcome
                }
            };

            match outcome {
                TransferOutcome::Cancelled => break,
                TransferOutcome::Timeout(reason) => {
                    self.reporter
                        .log(&format!("{}. Still waiting...", reason));
                }
                TransferOutcome::TransportError(reason) => {
                    tracing::warn!("Device failed: {}", reason);
                    self.reporter
                        .stage(&ProvisionStage::DeviceFailed { reason });
                    self.reporter.counters(counters);
                    self.reporter.log(SEPARATOR);
                }
                TransferOutcome::Success(_) => {
                    if self.job.reconnect == ReconnectPolicy::AfterEachDevice {
                        if let Some(original) = original {
                            self.reconnect(original, cancel).await;
                        }
                    }
                    self.reporter.log(&format!(
                        "DONE #{}. Ready for next RX.",
                        counters.succeeded
                    ));
                    self.reporter.log(SEPARATOR);

                    if self.job.inter_device_delay_ms > 0
                        && sleep_or_cancel(
                            Duration::from_millis(self.job.inter_device_delay_ms),
                            cancel,
                        )
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// OTA session against the connected device. Only configuration errors
    /// escape; everything else becomes an outcome.
    async fn transfer_to_device(
        &self,
        counters: &mut RunCounters,
        cancel: &CancellationToken,
    ) -> ProvisionResult<TransferOutcome> {
        let session = OtaSession::new(self.transfer, Arc::clone(&self.reporter), self.job);
        match session.run(cancel).await {
            Ok(report) => {
                counters.succeeded += 1;
                self.reporter.stage(&ProvisionStage::DeviceDone {
                    count: counters.succeeded,
                });
                self.reporter.counters(counters);
                Ok(TransferOutcome::Success(
                    report.upload_response.unwrap_or_default(),
                ))
            }
            Err(e) if e.class() == ErrorClass::Configuration => Err(e),
            Err(e) => Ok(TransferOutcome::from_error(&e)),
        }
    }

    /// Best effort: a failure is logged and otherwise ignored.
    async fn reconnect(&self, ssid: &str, cancel: &CancellationToken) {
        self.reporter.stage(&ProvisionStage::Reconnecting {
            ssid: ssid.to_string(),
        });

        let timeout = Duration::from_millis(self.job.timeouts.reconnect_ms);
        let result = async {
            self.network.connect(ssid).await?;
            wait_for_association(self.network, ssid, timeout, cancel).await
        }
        .await;

        match result {
            Ok(()) => tracing::info!("Reconnected to {}", ssid),
            Err(ProvisionError::Cancelled) => {}
            Err(e) => {
                tracing::debug!("Reconnect failed: {}", e);
                self.reporter
                    .log("Could not reconnect to original Wi-Fi (ignored).");
            }
        }
    }
}
