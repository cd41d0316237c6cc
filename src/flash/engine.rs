//! Boot-Wait / Flash Retry Engine.
//!
//! ```text
//! WaitingBoot -> Flashing -> Success
//!                   |  ^
//!                   v  |
//!                 Retrying -> Exhausted
//! ```
//!
//! Exhaustion ends this device's cycle. The batch goes back to waiting for a
//! bootloader, which will normally be the next physical device.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::batch::RunCounters;
use crate::cancel::{check_cancelled, sleep_or_cancel};
use crate::config::{
    BOOT_POLL_INTERVAL, BOOT_PROBE_TIMEOUT, FLASH_ERROR_EXCERPT, FLASH_OUTPUT_EXCERPT,
    PROBE_ERROR_EXCERPT, RETRY_BACKOFF,
};
use crate::error::{truncate_diagnostic, ProvisionError, ProvisionResult};
use crate::job::SerialJob;
use crate::reporter::{ProvisionStage, Reporter};
use crate::traits::ProcessExecutor;

use super::esptool::{
    clone_dir_name, extract_mac, is_chip_detected, short_failure_reason, EsptoolCommand,
};
use super::profile::{read_plan, ChipProfile, FlashPlan};

/// Where the engine is in the current device cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashState {
    WaitingBoot,
    Flashing,
    Retrying,
    Success,
    Exhausted,
}

pub struct FlashEngine<'a> {
    executor: &'a dyn ProcessExecutor,
    reporter: &'a dyn Reporter,
    tool: String,
    command: EsptoolCommand,
    boot_wait_timeout: Duration,
    retry_count: u32,
    state: FlashState,
}

impl<'a> FlashEngine<'a> {
    pub fn new(
        executor: &'a dyn ProcessExecutor,
        reporter: &'a dyn Reporter,
        job: &SerialJob,
    ) -> ProvisionResult<Self> {
        let profile = job.profile()?;
        Ok(Self {
            executor,
            reporter,
            tool: job.tool.clone(),
            command: EsptoolCommand {
                chip: profile.chip.clone(),
                port: job.port.clone(),
                baud: job.baud,
                detect_baud: job.detect_baud,
            },
            boot_wait_timeout: Duration::from_millis(job.boot_wait_timeout_ms),
            retry_count: job.retry_flash_count,
            state: FlashState::WaitingBoot,
        })
    }

    pub fn state(&self) -> FlashState {
        self.state
    }

    /// Poll chip identification until a bootloader answers or the boot-wait
    /// bound elapses. Only changes in the failure reason are logged.
    pub async fn wait_for_boot(&mut self, cancel: &CancellationToken) -> ProvisionResult<()> {
        self.state = FlashState::WaitingBoot;
        self.reporter.stage(&ProvisionStage::WaitingForBootloader);

        let deadline = Instant::now() + self.boot_wait_timeout;
        let mut last_reason: Option<String> = None;

        loop {
            check_cancelled(cancel)?;

            let probe = self
                .executor
                .run(
                    &self.tool,
                    self.command.chip_id(),
                    Some(BOOT_PROBE_TIMEOUT),
                    cancel,
                )
                .await;

            let reason = match probe {
                Ok(output) if is_chip_detected(output.exit_code, &output.combined()) => {
                    self.reporter.log("Detected device.");
                    return Ok(());
                }
                Ok(output) => {
                    let reason = short_failure_reason(&output.combined());
                    (!reason.is_empty()).then(|| format!("chip_id: {}", reason))
                }
                Err(ProvisionError::Cancelled) => return Err(ProvisionError::Cancelled),
                Err(e) => Some(format!(
                    "chip_id error: {}",
                    truncate_diagnostic(&e.to_string(), PROBE_ERROR_EXCERPT)
                )),
            };

            if let Some(reason) = reason {
                if last_reason.as_deref() != Some(reason.as_str()) {
                    self.reporter.log(&reason);
                    last_reason = Some(reason);
                }
            }

            if Instant::now() >= deadline {
                return Err(ProvisionError::BootloaderTimeout {
                    timeout_ms: self.boot_wait_timeout.as_millis() as u64,
                });
            }

            sleep_or_cancel(BOOT_POLL_INTERVAL, cancel).await?;
        }
    }

    /// Write every planned segment, retrying up to the configured count.
    /// Returns an excerpt of the tool's output on success.
    pub async fn flash_with_retries(
        &mut self,
        plan: &FlashPlan,
        counters: &mut RunCounters,
        cancel: &CancellationToken,
    ) -> ProvisionResult<String> {
        let total = self.retry_count + 1;
        let mut last_error = String::new();

        for attempt in 1..=total {
            check_cancelled(cancel)?;
            self.state = FlashState::Flashing;
            counters.current_retry = attempt - 1;
            self.reporter
                .stage(&ProvisionStage::Flashing { attempt, total });

            let result = self
                .executor
                .run(&self.tool, self.command.write_flash(plan), None, cancel)
                .await;

            let failure = match result {
                Ok(output) if output.success() => {
                    self.state = FlashState::Success;
                    counters.current_retry = 0;
                    return Ok(truncate_diagnostic(
                        &output.combined(),
                        FLASH_OUTPUT_EXCERPT,
                    ));
                }
                Ok(output) => ProvisionError::ProcessFailed {
                    exit_code: output.exit_code,
                    output: truncate_diagnostic(&output.combined(), FLASH_ERROR_EXCERPT),
                },
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => e,
            };

            last_error = truncate_diagnostic(&failure.to_string(), FLASH_ERROR_EXCERPT);
            self.reporter.progress(0);
            self.reporter
                .log(&format!("FLASH ERROR (attempt {}/{}):", attempt, total));
            self.reporter.log(&last_error);
            tracing::warn!(attempt, total, code = failure.error_code(), "flash attempt failed");

            if !failure.is_retriable() {
                self.state = FlashState::Exhausted;
                return Err(failure);
            }

            if attempt < total {
                self.state = FlashState::Retrying;
                self.reporter.log("Retrying... keep RX in BOOT.");
                sleep_or_cancel(RETRY_BACKOFF, cancel).await?;
            }
        }

        self.state = FlashState::Exhausted;
        Err(ProvisionError::RetriesExhausted {
            attempts: total,
            last_error,
        })
    }

    /// Read every profile segment into `<label>.bin`. When the device reports
    /// its MAC the files go into a `clone_<mac>` subdirectory of `dest`.
    pub async fn read_clone(
        &mut self,
        profile: &ChipProfile,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> ProvisionResult<PathBuf> {
        let reads = read_plan(profile)?;

        let mac = match self
            .executor
            .run(
                &self.tool,
                self.command.read_mac(),
                Some(BOOT_PROBE_TIMEOUT),
                cancel,
            )
            .await
        {
            Ok(output) if output.success() => extract_mac(&output.combined()),
            Ok(_) => None,
            Err(ProvisionError::Cancelled) => return Err(ProvisionError::Cancelled),
            Err(e) => {
                tracing::debug!("read_mac failed: {}", e);
                None
            }
        };

        let dir = match &mac {
            Some(mac) => {
                self.reporter.log(&format!("MAC: {}", mac));
                dest.join(clone_dir_name(mac))
            }
            None => dest.to_path_buf(),
        };
        tokio::fs::create_dir_all(&dir).await?;

        for segment in &reads {
            check_cancelled(cancel)?;
            self.reporter.stage(&ProvisionStage::ReadingSegment {
                label: segment.label.clone(),
            });

            let out_file = dir.join(format!("{}.bin", segment.label));
            let output = self
                .executor
                .run(
                    &self.tool,
                    self.command.read_flash(segment, &out_file),
                    None,
                    cancel,
                )
                .await?;

            if !output.success() {
                return Err(ProvisionError::ProcessFailed {
                    exit_code: output.exit_code,
                    output: format!(
                        "Read {} failed: {}",
                        segment.label,
                        truncate_diagnostic(&output.combined(), FLASH_ERROR_EXCERPT)
                    ),
                });
            }
        }

        self.reporter
            .log(&format!("Clone saved to: {}", dir.display()));
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ChipProfileBuilder, RecordingReporter, TestContext};
    use crate::traits::{MockProcessExecutor, ProcessOutput};
    use std::collections::HashMap;

    fn output(code: i32, text: &str) -> ProcessOutput {
        ProcessOutput {
            exit_code: Some(code),
            stdout: text.to_string(),
            stderr: String::new(),
        }
    }

    fn has_arg(args: &[String], arg: &str) -> bool {
        args.iter().any(|a| a == arg)
    }

    fn serial_job(retries: u32) -> SerialJob {
        let profile = ChipProfileBuilder::new("RX")
            .chip("esp32")
            .segment("app", "0x10000", "0x1000", true)
            .segment("nvs", "0x9000", "0x5000", false)
            .build();
        let mut job = SerialJob::new("COM3", profile);
        job.retry_flash_count = retries;
        job
    }

    fn plan(ctx: &TestContext, job: &SerialJob) -> FlashPlan {
        let app = ctx.create_file_bytes("app.bin", &[0u8; 32]);
        let mut paths = HashMap::new();
        paths.insert("app".to_string(), app);
        FlashPlan::resolve(job.profile().unwrap(), &paths).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_boot_wait_times_out_after_bound() {
        let mut executor = MockProcessExecutor::new();
        executor
            .expect_run()
            .withf(|_, args, timeout, _| {
                has_arg(args, "chip_id") && *timeout == Some(BOOT_PROBE_TIMEOUT)
            })
            .returning(|_, _, _, _| {
                Ok(output(
                    2,
                    "Connecting....\nA fatal error occurred: Failed to connect to ESP32: No serial data received.",
                ))
            });
        let reporter = RecordingReporter::new();
        let job = serial_job(1);
        let mut engine = FlashEngine::new(&executor, &reporter, &job).unwrap();
        let cancel = CancellationToken::new();

        let started = Instant::now();
        let err = engine.wait_for_boot(&cancel).await.unwrap_err();

        assert!(matches!(err, ProvisionError::BootloaderTimeout { timeout_ms: 30_000 }));
        assert!(started.elapsed() >= Duration::from_secs(30));
        assert!(started.elapsed() < Duration::from_secs(31));
        assert!(!reporter.has_line("Detected device."));
        // The same reason repeated fifty times is logged once.
        assert_eq!(reporter.lines_containing("chip_id:"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_boot_wait_logs_each_new_reason() {
        let mut executor = MockProcessExecutor::new();
        let mut calls = 0;
        executor.expect_run().returning(move |_, _, _, _| {
            calls += 1;
            match calls {
                1 | 2 => Ok(output(2, "could not open port 'COM3'")),
                3 => Err(ProvisionError::ProcessTimeout {
                    program: "esptool".into(),
                    timeout_ms: 5_000,
                }),
                4 => Ok(output(2, "Timed out waiting for packet header")),
                _ => Ok(output(0, "Chip is ESP32-D0WD-V3 (revision v3.0)")),
            }
        });
        let reporter = RecordingReporter::new();
        let job = serial_job(1);
        let mut engine = FlashEngine::new(&executor, &reporter, &job).unwrap();
        let cancel = CancellationToken::new();

        engine.wait_for_boot(&cancel).await.unwrap();

        assert_eq!(reporter.lines_containing("could not open port"), 1);
        assert_eq!(reporter.lines_containing("chip_id error:"), 1);
        assert_eq!(reporter.lines_containing("Timed out waiting"), 1);
        assert!(reporter.has_line("Detected device."));
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_flash_runs_retry_count_plus_one() {
        for retries in [0u32, 1, 3] {
            let ctx = TestContext::new();
            let job = serial_job(retries);
            let plan = plan(&ctx, &job);

            let mut executor = MockProcessExecutor::new();
            executor
                .expect_run()
                .withf(|program, args, _, _| program == "esptool" && has_arg(args, "write_flash"))
                .times(retries as usize + 1)
                .returning(|_, _, _, _| Ok(output(2, "A fatal error occurred: Invalid head of packet")));
            let reporter = RecordingReporter::new();
            let mut engine = FlashEngine::new(&executor, &reporter, &job).unwrap();
            let mut counters = RunCounters::default();
            let cancel = CancellationToken::new();

            let err = engine
                .flash_with_retries(&plan, &mut counters, &cancel)
                .await
                .unwrap_err();

            match err {
                ProvisionError::RetriesExhausted {
                    attempts,
                    last_error,
                } => {
                    assert_eq!(attempts, retries + 1);
                    assert!(last_error.contains("Invalid head of packet"));
                }
                other => panic!("unexpected error: {:?}", other),
            }
            assert_eq!(engine.state(), FlashState::Exhausted);
            assert_eq!(counters.current_retry, retries);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_flash_succeeds_on_retry() {
        let ctx = TestContext::new();
        let job = serial_job(1);
        let plan = plan(&ctx, &job);

        let mut executor = MockProcessExecutor::new();
        let mut calls = 0;
        executor.expect_run().times(2).returning(move |_, args, _, _| {
            calls += 1;
            assert!(args.contains(&"0x10000".to_string()));
            if calls == 1 {
                Ok(output(1, "A fatal error occurred: Failed to write to target RAM"))
            } else {
                Ok(output(0, "Wrote 32 bytes at 0x00010000\nHash of data verified."))
            }
        });
        let reporter = RecordingReporter::new();
        let mut engine = FlashEngine::new(&executor, &reporter, &job).unwrap();
        let mut counters = RunCounters::default();
        let cancel = CancellationToken::new();

        let started = Instant::now();
        let excerpt = engine
            .flash_with_retries(&plan, &mut counters, &cancel)
            .await
            .unwrap();

        assert!(excerpt.contains("Hash of data verified."));
        assert_eq!(engine.state(), FlashState::Success);
        assert!(started.elapsed() >= RETRY_BACKOFF);
        assert!(reporter.has_line("FLASH ERROR (attempt 1/2):"));
        assert!(reporter.has_line("Retrying... keep RX in BOOT."));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_tool_is_not_retried() {
        let ctx = TestContext::new();
        let job = serial_job(3);
        let plan = plan(&ctx, &job);

        let mut executor = MockProcessExecutor::new();
        executor.expect_run().times(1).returning(|program, _, _, _| {
            Err(ProvisionError::ProcessSpawn {
                program: program.to_string(),
                reason: "No such file or directory".into(),
            })
        });
        let reporter = RecordingReporter::new();
        let mut engine = FlashEngine::new(&executor, &reporter, &job).unwrap();
        let mut counters = RunCounters::default();
        let cancel = CancellationToken::new();

        let result = engine.flash_with_retries(&plan, &mut counters, &cancel).await;

        assert!(matches!(result, Err(ProvisionError::ProcessSpawn { .. })));
        assert_eq!(engine.state(), FlashState::Exhausted);
        assert_eq!(reporter.lines_containing("FLASH ERROR (attempt"), 1);
        assert!(!reporter.has_line("Retrying... keep RX in BOOT."));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_without_retry() {
        let ctx = TestContext::new();
        let job = serial_job(5);
        let plan = plan(&ctx, &job);

        let mut executor = MockProcessExecutor::new();
        executor
            .expect_run()
            .times(1)
            .returning(|_, _, _, _| Err(ProvisionError::Cancelled));
        let reporter = RecordingReporter::new();
        let mut engine = FlashEngine::new(&executor, &reporter, &job).unwrap();
        let mut counters = RunCounters::default();
        let cancel = CancellationToken::new();

        let result = engine.flash_with_retries(&plan, &mut counters, &cancel).await;
        assert!(matches!(result, Err(ProvisionError::Cancelled)));
    }

    #[tokio::test]
    async fn test_read_clone_uses_mac_directory() {
        let ctx = TestContext::new();
        let job = serial_job(1);

        let mut executor = MockProcessExecutor::new();
        executor
            .expect_run()
            .withf(|_, args, _, _| has_arg(args, "read_mac"))
            .times(1)
            .returning(|_, _, _, _| Ok(output(0, "Chip is ESP32\nMAC: aa:bb:cc:00:11:22\n")));
        executor
            .expect_run()
            .withf(|_, args, _, _| has_arg(args, "read_flash"))
            .times(2)
            .returning(|_, args, _, _| {
                assert!(args.last().unwrap().contains("clone_aa-bb-cc-00-11-22"));
                Ok(output(0, "Read 4096 bytes"))
            });
        let reporter = RecordingReporter::new();
        let mut engine = FlashEngine::new(&executor, &reporter, &job).unwrap();
        let cancel = CancellationToken::new();

        let dir = engine
            .read_clone(job.profile().unwrap(), ctx.root(), &cancel)
            .await
            .unwrap();

        assert_eq!(dir, ctx.path("clone_aa-bb-cc-00-11-22"));
        assert!(dir.is_dir());
        assert!(reporter.has_line("MAC: aa:bb:cc:00:11:22"));
    }

    #[tokio::test]
    async fn test_read_clone_without_mac_uses_destination() {
        let ctx = TestContext::new();
        let job = serial_job(1);

        let mut executor = MockProcessExecutor::new();
        executor
            .expect_run()
            .withf(|_, args, _, _| has_arg(args, "read_mac"))
            .returning(|_, _, _, _| Ok(output(2, "Failed to connect")));
        executor
            .expect_run()
            .withf(|_, args, _, _| has_arg(args, "read_flash"))
            .times(1)
            .returning(|_, _, _, _| Ok(output(1, "A fatal error occurred")));
        let reporter = RecordingReporter::new();
        let mut engine = FlashEngine::new(&executor, &reporter, &job).unwrap();
        let cancel = CancellationToken::new();

        let err = engine
            .read_clone(job.profile().unwrap(), ctx.root(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::ProcessFailed { ref output, .. } if output.starts_with("Read app failed")));
    }
}
