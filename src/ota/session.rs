//! OTA Transfer Session.
//!
//! Runs after the radio is associated with a device AP:
//!
//! 1. wait for the device web server (bounded, polled)
//! 2. work out the upload path and file field from its root page
//! 3. stream the firmware as multipart with the byte length in a header
//! 4. send the configured JSON requests (bind, domain, static follow-ups)
//! 5. request a reboot and wait for it to settle
//!
//! Every step honours the cancellation token. Any non-2xx answer is fatal to
//! the session; the batch loop decides what happens next.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::cancel::{check_cancelled, run_or_cancel, sleep_or_cancel};
use crate::config::{HTTP_BODY_EXCERPT, PROBE_ERROR_EXCERPT, REACHABILITY_POLL_INTERVAL};
use crate::error::{truncate_diagnostic, ProvisionError, ProvisionResult};
use crate::job::WirelessJob;
use crate::reporter::{ProvisionStage, Reporter};
use crate::traits::{HttpReply, ProgressFn, TransferClient, UploadRequest};

use super::form::{detect_upload_form, UploadForm};
use super::template::{build_bind_body, build_domain_body};

/// What a finished session did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OtaReport {
    /// Upload target, when firmware was sent.
    pub form: Option<UploadForm>,
    /// Truncated body of the upload response.
    pub upload_response: Option<String>,
    /// Configuration requests sent after the upload.
    pub requests_sent: usize,
    pub rebooted: bool,
}

/// One device's transfer. Without a firmware path in the job the upload is
/// skipped and only the configuration requests run.
pub struct OtaSession<'a> {
    transfer: &'a dyn TransferClient,
    reporter: Arc<dyn Reporter>,
    job: &'a WirelessJob,
}

impl<'a> OtaSession<'a> {
    pub fn new(
        transfer: &'a dyn TransferClient,
        reporter: Arc<dyn Reporter>,
        job: &'a WirelessJob,
    ) -> Self {
        Self {
            transfer,
            reporter,
            job,
        }
    }

    fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.job.timeouts.http_ms)
    }

    pub async fn run(&self, cancel: &CancellationToken) -> ProvisionResult<OtaReport> {
        let mut report = OtaReport::default();

        self.reporter.stage(&ProvisionStage::WaitingForWeb);
        let root_page = self.wait_for_web(cancel).await?;

        if let Some(firmware) = &self.job.firmware {
            let form = self.resolve_form(&root_page);
            let body = self.upload(firmware, &form, cancel).await?;
            report.form = Some(form);
            report.upload_response = Some(body);
        }

        let requests = self.follow_up_requests()?;
        if !requests.is_empty() {
            if report.form.is_some() {
                // The upload usually restarts the web server.
                self.reporter.stage(&ProvisionStage::WaitingForWeb);
                self.wait_for_web(cancel).await?;
            }
            for (path, body) in &requests {
                self.post(path, body, cancel).await?;
                report.requests_sent += 1;
            }
        }

        if let Some(reboot) = &self.job.reboot {
            self.reporter.stage(&ProvisionStage::Rebooting);
            self.post(&reboot.path, &Value::Object(Map::new()), cancel)
                .await?;
            report.rebooted = true;
            self.settle(reboot.settle_ms, cancel).await?;
        } else if report.form.is_some() {
            self.settle(self.job.timeouts.after_upload_settle_ms, cancel)
                .await?;
        }

        Ok(report)
    }

    /// Poll the device root until it answers 2xx. Returns the page body.
    async fn wait_for_web(&self, cancel: &CancellationToken) -> ProvisionResult<String> {
        let url = self.job.resolve_url("/");
        let bound = Duration::from_millis(self.job.timeouts.reachability_ms);
        let deadline = Instant::now() + bound;
        let mut last_failure = String::from("no response");

        loop {
            check_cancelled(cancel)?;

            let remaining = deadline.saturating_duration_since(Instant::now());
            let timeout = self
                .http_timeout()
                .min(remaining.max(Duration::from_millis(100)));

            match run_or_cancel(self.transfer.get(&url, timeout), cancel).await {
                Ok(reply) if reply.is_success() => return Ok(reply.body),
                Ok(reply) => last_failure = format!("HTTP {}", reply.status),
                Err(ProvisionError::Cancelled) => return Err(ProvisionError::Cancelled),
                Err(e) => last_failure = truncate_diagnostic(&e.to_string(), PROBE_ERROR_EXCERPT),
            }

            if Instant::now() >= deadline {
                return Err(ProvisionError::DeviceUnreachable {
                    url,
                    reason: format!("no answer within {}ms ({})", bound.as_millis(), last_failure),
                });
            }

            sleep_or_cancel(REACHABILITY_POLL_INTERVAL, cancel).await?;
        }
    }

    fn resolve_form(&self, root_page: &str) -> UploadForm {
        let detected = detect_upload_form(root_page);
        let form = UploadForm {
            path: self.job.upload.path.clone().unwrap_or(detected.path),
            field: self.job.upload.field.clone().unwrap_or(detected.field),
        };
        tracing::debug!(path = %form.path, field = %form.field, "upload form");
        form
    }

    async fn upload(
        &self,
        firmware: &std::path::Path,
        form: &UploadForm,
        cancel: &CancellationToken,
    ) -> ProvisionResult<String> {
        let request = UploadRequest {
            url: self.job.resolve_url(&form.path),
            field_name: form.field.clone(),
            file_path: firmware.to_path_buf(),
            size_header: self.job.upload.size_header.clone(),
            timeout: self.http_timeout(),
        };
        self.reporter.stage(&ProvisionStage::Uploading {
            path: form.path.clone(),
        });

        let reporter = Arc::clone(&self.reporter);
        let progress: ProgressFn = Arc::new(move |percent| reporter.progress(percent));

        let reply = run_or_cancel(self.transfer.upload(&request, progress), cancel).await?;
        let body = Self::check(reply)?;
        self.reporter
            .log(&format!("Upload response: {}", body));
        Ok(body)
    }

    fn follow_up_requests(&self) -> ProvisionResult<Vec<(String, Value)>> {
        let mut requests = Vec::new();

        if let Some(bind) = &self.job.bind {
            requests.push((bind.path.clone(), build_bind_body(&bind.template, &bind.uid)?));
        }
        if let Some(domain) = &self.job.domain {
            requests.push((
                domain.path.clone(),
                build_domain_body(&domain.base_body, domain.freq1, domain.freq2),
            ));
        }
        for post in &self.job.follow_up {
            requests.push((post.path.clone(), post.body.clone()));
        }

        Ok(requests)
    }

    async fn post(&self, path: &str, body: &Value, cancel: &CancellationToken) -> ProvisionResult<()> {
        self.reporter.stage(&ProvisionStage::Configuring {
            path: path.to_string(),
        });
        let url = self.job.resolve_url(path);
        let reply = run_or_cancel(
            self.transfer.post_json(&url, body, self.http_timeout()),
            cancel,
        )
        .await?;
        let body = Self::check(reply)?;
        self.reporter.log(&format!("POST {} => {}", path, body));
        Ok(())
    }

    async fn settle(&self, ms: u64, cancel: &CancellationToken) -> ProvisionResult<()> {
        if ms == 0 {
            return Ok(());
        }
        self.reporter.stage(&ProvisionStage::Settling { ms });
        sleep_or_cancel(Duration::from_millis(ms), cancel).await
    }

    /// Non-2xx is fatal; the body is kept short either way.
    fn check(reply: HttpReply) -> ProvisionResult<String> {
        let body = truncate_diagnostic(&reply.body, HTTP_BODY_EXCERPT);
        if reply.is_success() {
            Ok(body)
        } else {
            Err(ProvisionError::HttpStatus {
                status: reply.status,
                body,
            })
        }
    }
}
