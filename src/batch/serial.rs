use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::artifact;
use crate::cancel::sleep_or_cancel;
use crate::config::WAIT_AGAIN_DELAY;
use crate::error::{ErrorClass, ProvisionResult};
use crate::flash::{read_plan, FlashEngine, FlashPlan};
use crate::job::SerialJob;
use crate::reporter::{ProvisionStage, Reporter};
use crate::traits::ProcessExecutor;

use super::outcome::{RunCounters, TransferOutcome};

const SEPARATOR: &str = "--------------------------------------------------";

/// Serial batch: wait for a chip in boot mode, flash it, wait for the next.
///
/// Artifacts are resolved before the first process is started, so a missing
/// required segment aborts the run without touching the port.
pub struct SerialBatch<'a> {
    executor: &'a dyn ProcessExecutor,
    reporter: &'a dyn Reporter,
    job: &'a SerialJob,
}

impl<'a> SerialBatch<'a> {
    pub fn new(
        executor: &'a dyn ProcessExecutor,
        reporter: &'a dyn Reporter,
        job: &'a SerialJob,
    ) -> Self {
        Self {
            executor,
            reporter,
            job,
        }
    }

    pub async fn run(&self, cancel: &CancellationToken) -> ProvisionResult<RunCounters> {
        let plan = self.job.validate()?;
        for write in &plan.writes {
            let info = artifact::inspect(&write.path)?;
            self.reporter
                .log(&format!("{} @ 0x{:x}: {}", write.label, write.offset, info));
        }

        let mut engine = FlashEngine::new(self.executor, self.reporter, self.job)?;
        self.reporter.log(
            "Batch started. Put RX into BOOT and keep BOOT pressed until flashing starts.",
        );
        self.reporter.log(SEPARATOR);

        let mut counters = RunCounters::default();
        let result = self
            .device_loop(&mut engine, &plan, &mut counters, cancel)
            .await;

        self.reporter.stage(&ProvisionStage::Stopped);
        self.reporter.counters(&counters);
        tracing::info!(
            attempted = counters.attempted,
            succeeded = counters.succeeded,
            failed = counters.failed(),
            "serial batch finished"
        );

        result.map(|()| counters)
    }

    /// Read every segment of the chip currently in boot mode into `dest`.
    /// One device, no loop.
    pub async fn read_clone(
        &self,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> ProvisionResult<PathBuf> {
        self.job.validate_connection()?;
        let profile = self.job.profile()?;
        read_plan(profile)?;

        let mut engine = FlashEngine::new(self.executor, self.reporter, self.job)?;
        engine.wait_for_boot(cancel).await?;
        engine.read_clone(profile, dest, cancel).await
    }

    async fn device_loop(
        &self,
        engine: &mut FlashEngine<'_>,
        plan: &FlashPlan,
        counters: &mut RunCounters,
        cancel: &CancellationToken,
    ) -> ProvisionResult<()> {
        while !cancel.is_cancelled() {
            let outcome = match self.flash_one(engine, plan, counters, cancel).await {
                Ok(excerpt) => TransferOutcome::Success(excerpt),
                Err(e) if e.class() == ErrorClass::Configuration => return Err(e),
                Err(e) => TransferOutcome::from_error(&e),
            };

            let pause = match outcome {
                TransferOutcome::Cancelled => break,
                TransferOutcome::Success(excerpt) => {
                    self.reporter.stage(&ProvisionStage::DeviceDone {
                        count: counters.succeeded,
                    });
                    self.reporter.counters(counters);
                    if !excerpt.is_empty() {
                        self.reporter.log(&excerpt);
                    }
                    self.reporter
                        .log("Disconnect/power-cycle RX and connect next.");
                    self.reporter.log(SEPARATOR);
                    Duration::from_millis(self.job.between_devices_delay_ms)
                }
                TransferOutcome::Timeout(reason) => {
                    // Nobody put a chip in boot mode yet; keep waiting.
                    self.reporter
                        .log(&format!("{}. Still waiting...", reason));
                    Duration::ZERO
                }
                TransferOutcome::TransportError(reason) => {
                    self.reporter
                        .stage(&ProvisionStage::DeviceFailed { reason });
                    self.reporter.counters(counters);
                    self.reporter.log("Waiting for device again...");
                    WAIT_AGAIN_DELAY
                }
            };

            if sleep_or_cancel(pause, cancel).await.is_err() {
                break;
            }
        }

        Ok(())
    }

    async fn flash_one(
        &self,
        engine: &mut FlashEngine<'_>,
        plan: &FlashPlan,
        counters: &mut RunCounters,
        cancel: &CancellationToken,
    ) -> ProvisionResult<String> {
        engine.wait_for_boot(cancel).await?;

        counters.attempted += 1;
        self.reporter.counters(counters);

        let excerpt = engine.flash_with_retries(plan, counters, cancel).await?;
        counters.succeeded += 1;
        tracing::info!(count = counters.succeeded, "device flashed");
        Ok(excerpt)
    }
}
