//! Connection Session Manager.
//!
//! Drives [`NetworkControl`] from "nothing" to "associated with the device AP
//! and the device answers HTTP":
//!
//! ```text
//! Idle -> Scanning -> ProfileEnsuring -> Connecting -> Verifying -> Connected
//!            |                               |
//!            +--------> TimedOut <-----------+
//! ```
//!
//! A liveness failure is reported as `DeviceUnreachable`, not as a timeout:
//! the radio did its job, the device did not.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::cancel::{check_cancelled, run_or_cancel, sleep_or_cancel};
use crate::config::{ASSOCIATION_POLL_INTERVAL, SCAN_POLL_INTERVAL};
use crate::error::{ProvisionError, ProvisionResult};
use crate::reporter::{ProvisionStage, Reporter};
use crate::ssid::SsidMatcher;
use crate::traits::{NetworkControl, TransferClient};

use super::profile::ProfileDescriptor;

/// Where a connection session currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Scanning,
    ProfileEnsuring,
    Connecting,
    Verifying,
    Connected,
    TimedOut,
}

/// Bounds for one connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionTimeouts {
    pub scan: Duration,
    pub connect: Duration,
    pub liveness: Duration,
}

/// Remove any stored profile for `ssid` and store a fresh one.
///
/// Always recreating makes the configured password authoritative over a stale
/// profile. A failed delete just means there was nothing to delete.
pub async fn ensure_profile(
    network: &dyn NetworkControl,
    ssid: &str,
    password: Option<&str>,
) -> ProvisionResult<()> {
    if let Err(e) = network.delete_profile(ssid).await {
        tracing::debug!("No previous profile for {}: {}", ssid, e);
    }

    let descriptor = ProfileDescriptor::new(ssid, password);
    network.add_profile(ssid, &descriptor).await
}

/// Poll the associated network until it is `ssid` (ignoring case) or
/// `timeout` elapses.
pub async fn wait_for_association(
    network: &dyn NetworkControl,
    ssid: &str,
    timeout: Duration,
    cancel: &CancellationToken,
) -> ProvisionResult<()> {
    let deadline = Instant::now() + timeout;

    loop {
        check_cancelled(cancel)?;

        match run_or_cancel(network.associated_network(), cancel).await {
            Ok(Some(current)) if current.eq_ignore_ascii_case(ssid) => return Ok(()),
            Ok(_) => {}
            Err(ProvisionError::Cancelled) => return Err(ProvisionError::Cancelled),
            Err(e) => tracing::debug!("Association query failed: {}", e),
        }

        if Instant::now() >= deadline {
            return Err(ProvisionError::ConnectTimeout {
                ssid: ssid.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            });
        }

        sleep_or_cancel(ASSOCIATION_POLL_INTERVAL, cancel).await?;
    }
}

/// One discovery-and-connect cycle. Create a fresh session per device.
pub struct ConnectionSession<'a> {
    network: &'a dyn NetworkControl,
    transfer: &'a dyn TransferClient,
    reporter: &'a dyn Reporter,
    matcher: &'a SsidMatcher,
    password: Option<&'a str>,
    liveness_url: String,
    timeouts: ConnectionTimeouts,
    state: ConnectionState,
}

impl<'a> ConnectionSession<'a> {
    pub fn new(
        network: &'a dyn NetworkControl,
        transfer: &'a dyn TransferClient,
        reporter: &'a dyn Reporter,
        matcher: &'a SsidMatcher,
        password: Option<&'a str>,
        liveness_url: String,
        timeouts: ConnectionTimeouts,
    ) -> Self {
        Self {
            network,
            transfer,
            reporter,
            matcher,
            password,
            liveness_url,
            timeouts,
            state: ConnectionState::Idle,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Find, connect to and verify the next device. Returns the network name.
    pub async fn run(&mut self, cancel: &CancellationToken) -> ProvisionResult<String> {
        let result = self.drive(cancel).await;
        if matches!(
            result,
            Err(ProvisionError::ScanTimeout { .. }) | Err(ProvisionError::ConnectTimeout { .. })
        ) {
            self.state = ConnectionState::TimedOut;
        }
        result
    }

    async fn drive(&mut self, cancel: &CancellationToken) -> ProvisionResult<String> {
        self.state = ConnectionState::Scanning;
        self.reporter.stage(&ProvisionStage::Scanning {
            target: self.matcher.describe(),
        });
        let ssid = self.scan(cancel).await?;
        self.reporter
            .stage(&ProvisionStage::DeviceFound { ssid: ssid.clone() });

        self.state = ConnectionState::ProfileEnsuring;
        self.reporter
            .stage(&ProvisionStage::EnsuringProfile { ssid: ssid.clone() });
        run_or_cancel(ensure_profile(self.network, &ssid, self.password), cancel).await?;

        self.state = ConnectionState::Connecting;
        self.reporter
            .stage(&ProvisionStage::Connecting { ssid: ssid.clone() });
        match run_or_cancel(self.network.connect(&ssid), cancel).await {
            Err(ProvisionError::Cancelled) => return Err(ProvisionError::Cancelled),
            // The radio sometimes associates even when the request reports failure.
            Err(e) => self.reporter.log(&format!("Connect request failed: {}", e)),
            Ok(()) => {}
        }
        wait_for_association(self.network, &ssid, self.timeouts.connect, cancel).await?;

        self.state = ConnectionState::Verifying;
        self.reporter.stage(&ProvisionStage::Verifying);
        self.verify(cancel).await?;

        self.state = ConnectionState::Connected;
        tracing::info!("Connected to {}", ssid);
        Ok(ssid)
    }

    async fn scan(&self, cancel: &CancellationToken) -> ProvisionResult<String> {
        let deadline = Instant::now() + self.timeouts.scan;

        loop {
            check_cancelled(cancel)?;

            match run_or_cancel(self.network.list_visible_networks(), cancel).await {
                Ok(visible) => {
                    if let Some(ssid) = self.matcher.pick(&visible) {
                        return Ok(ssid);
                    }
                    tracing::debug!("{} networks visible, none match", visible.len());
                }
                Err(ProvisionError::Cancelled) => return Err(ProvisionError::Cancelled),
                Err(e) => tracing::warn!("Network scan failed: {}", e),
            }

            if Instant::now() >= deadline {
                return Err(ProvisionError::ScanTimeout {
                    target: self.matcher.describe(),
                    timeout_ms: self.timeouts.scan.as_millis() as u64,
                });
            }

            sleep_or_cancel(SCAN_POLL_INTERVAL, cancel).await?;
        }
    }

    async fn verify(&self, cancel: &CancellationToken) -> ProvisionResult<()> {
        let probe = self
            .transfer
            .get(&self.liveness_url, self.timeouts.liveness);

        match run_or_cancel(probe, cancel).await {
            Ok(reply) if reply.is_success() => Ok(()),
            Ok(reply) => Err(ProvisionError::DeviceUnreachable {
                url: self.liveness_url.clone(),
                reason: format!("HTTP {}", reply.status),
            }),
            Err(ProvisionError::Cancelled) => Err(ProvisionError::Cancelled),
            Err(e) => Err(ProvisionError::DeviceUnreachable {
                url: self.liveness_url.clone(),
                reason: e.to_string(),
            }),
        }
    }
}
