//! `NetworkControl` on top of the Windows `netsh wlan` command.

use std::io::Write;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::error::{truncate_diagnostic, ProvisionError, ProvisionResult};
use crate::traits::{NetworkControl, ProcessExecutor, ProcessOutput};

use super::profile::ProfileDescriptor;

const NETSH: &str = "netsh";

/// Upper bound on a single netsh invocation.
const NETSH_TIMEOUT: Duration = Duration::from_secs(15);

static VISIBLE_SSID: OnceLock<Regex> = OnceLock::new();
static ASSOCIATED_SSID: OnceLock<Regex> = OnceLock::new();

/// Network names from `netsh wlan show networks`, in first-seen order,
/// without blanks or duplicates.
pub fn parse_visible_networks(output: &str) -> Vec<String> {
    let regex = VISIBLE_SSID.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*SSID[ \t]+\d+[ \t]*:[ \t]*([^\r\n]*?)[ \t\r]*$")
            .expect("static pattern")
    });

    let mut names: Vec<String> = Vec::new();
    for caps in regex.captures_iter(output) {
        let name = caps[1].trim();
        if !name.is_empty() && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Associated network from `netsh wlan show interfaces`.
pub fn parse_associated_network(output: &str) -> Option<String> {
    let regex = ASSOCIATED_SSID.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*SSID[ \t]*:[ \t]*([^\r\n]*?)[ \t\r]*$").expect("static pattern")
    });

    let name = regex.captures(output)?.get(1)?.as_str().trim();
    if name.is_empty() || name.to_lowercase().contains("not connected") {
        return None;
    }
    Some(name.to_string())
}

/// Radio control through `netsh`. Every call spawns one short-lived process.
pub struct NetshNetworkControl {
    executor: Arc<dyn ProcessExecutor>,
}

impl NetshNetworkControl {
    pub fn new(executor: Arc<dyn ProcessExecutor>) -> Self {
        Self { executor }
    }

    async fn netsh(&self, args: &[&str]) -> ProvisionResult<ProcessOutput> {
        let args = args.iter().map(|a| a.to_string()).collect();
        // Callers cancel by dropping this future; the child dies with it.
        let never = CancellationToken::new();
        self.executor
            .run(NETSH, args, Some(NETSH_TIMEOUT), &never)
            .await
    }

    async fn add_profile_file(&self, file: &str, scope: &str) -> ProvisionResult<ProcessOutput> {
        let filename = format!("filename={}", file);
        let user = format!("user={}", scope);
        self.netsh(&["wlan", "add", "profile", &filename, &user]).await
    }
}

#[async_trait]
impl NetworkControl for NetshNetworkControl {
    async fn list_visible_networks(&self) -> ProvisionResult<Vec<String>> {
        let output = self
            .netsh(&["wlan", "show", "networks", "mode=bssid"])
            .await?;
        Ok(parse_visible_networks(&output.stdout))
    }

    async fn associated_network(&self) -> ProvisionResult<Option<String>> {
        let output = self.netsh(&["wlan", "show", "interfaces"]).await?;
        Ok(parse_associated_network(&output.stdout))
    }

    async fn delete_profile(&self, name: &str) -> ProvisionResult<()> {
        let name = format!("name={}", name);
        let output = self.netsh(&["wlan", "delete", "profile", &name]).await?;
        if output.success() {
            Ok(())
        } else {
            Err(ProvisionError::NetworkControl(format!(
                "delete profile failed: {}",
                truncate_diagnostic(&output.combined(), 200)
            )))
        }
    }

    async fn add_profile(&self, name: &str, descriptor: &ProfileDescriptor) -> ProvisionResult<()> {
        // The key sits unencrypted in this file until it is dropped at the end
        // of this call. Deletion is best effort; nothing overwrites the blocks.
        let mut file = tempfile::Builder::new()
            .prefix("rxb_profile_")
            .suffix(".xml")
            .tempfile()?;
        file.write_all(descriptor.to_xml().as_bytes())?;
        file.flush()?;
        let path = file.path().to_string_lossy().into_owned();

        let current = self.add_profile_file(&path, "current").await?;
        tracing::debug!(
            profile = name,
            exit = ?current.exit_code,
            "netsh add profile (current)"
        );
        if current.success() {
            return Ok(());
        }

        // Group policy sometimes forbids per-user profiles.
        let all = self.add_profile_file(&path, "all").await?;
        tracing::debug!(profile = name, exit = ?all.exit_code, "netsh add profile (all)");
        if all.success() {
            return Ok(());
        }

        Err(ProvisionError::NetworkControl(format!(
            "add profile failed. (current) exit={:?}: {} (all) exit={:?}: {}",
            current.exit_code,
            truncate_diagnostic(&current.combined(), 200),
            all.exit_code,
            truncate_diagnostic(&all.combined(), 200),
        )))
    }

    async fn connect(&self, name: &str) -> ProvisionResult<()> {
        let profile = format!("name={}", name);
        let ssid = format!("ssid={}", name);
        let output = self.netsh(&["wlan", "connect", &profile, &ssid]).await?;
        if output.success() {
            Ok(())
        } else {
            Err(ProvisionError::NetworkControl(format!(
                "connect failed: {}",
                truncate_diagnostic(&output.combined(), 200)
            )))
        }
    }
}
