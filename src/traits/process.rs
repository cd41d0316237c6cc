use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

#[cfg(test)]
use mockall::automock;

use crate::error::{ProvisionError, ProvisionResult};

/// Captured result of one external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Stdout followed by stderr, trimmed.
    pub fn combined(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr).trim().to_string()
    }
}

/// Abstraction over external command execution (flashing tool, netsh, etc.)
/// This allows mocking OS-level commands in tests.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ProcessExecutor: Send + Sync {
    /// Run `program` to completion and capture its output.
    ///
    /// Cancellation or an elapsed `timeout` kills the whole process tree and
    /// returns `Cancelled` / `ProcessTimeout` respectively.
    async fn run(
        &self,
        program: &str,
        args: Vec<String>,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> ProvisionResult<ProcessOutput>;
}

/// Real implementation on top of `tokio::process`.
#[derive(Debug, Default, Clone)]
pub struct TokioProcessExecutor;

enum Finished {
    Exited(std::io::Result<ExitStatus>),
    Cancelled,
    TimedOut,
}

#[async_trait]
impl ProcessExecutor for TokioProcessExecutor {
    async fn run(
        &self,
        program: &str,
        args: Vec<String>,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> ProvisionResult<ProcessOutput> {
        tracing::debug!(program, ?args, "spawning process");

        let mut std_command = std::process::Command::new(program);
        std_command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Own process group so a kill reaches every helper the tool spawns.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            std_command.process_group(0);
        }
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            std_command.creation_flags(CREATE_NO_WINDOW);
        }

        let mut command = Command::from(std_command);
        command.kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| ProvisionError::ProcessSpawn {
            program: program.to_string(),
            reason: e.to_string(),
        })?;

        // Kept from spawn: `Child::id` is gone once the child has been reaped.
        let pid = child.id();
        let mut stdout_task = tokio::spawn(read_to_string(child.stdout.take()));
        let mut stderr_task = tokio::spawn(read_to_string(child.stderr.take()));

        let deadline = async {
            match timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        let finished = tokio::select! {
            status = child.wait() => Finished::Exited(status),
            _ = cancel.cancelled() => Finished::Cancelled,
            _ = &mut deadline => Finished::TimedOut,
        };

        let finished = match finished {
            Finished::Exited(status) => {
                let status = status?;
                // Background helpers of the tool can hold the pipes open after it exits.
                let readers = async {
                    let stdout = (&mut stdout_task).await.unwrap_or_default();
                    let stderr = (&mut stderr_task).await.unwrap_or_default();
                    (stdout, stderr)
                };
                tokio::select! {
                    (stdout, stderr) = readers => {
                        return Ok(ProcessOutput {
                            exit_code: status.code(),
                            stdout,
                            stderr,
                        });
                    }
                    _ = cancel.cancelled() => Finished::Cancelled,
                    _ = &mut deadline => Finished::TimedOut,
                }
            }
            other => other,
        };

        kill_process_tree(pid, &mut child).await;
        stdout_task.abort();
        stderr_task.abort();
        match finished {
            Finished::TimedOut => Err(ProvisionError::ProcessTimeout {
                program: program.to_string(),
                timeout_ms: timeout.map(|t| t.as_millis() as u64).unwrap_or_default(),
            }),
            _ => Err(ProvisionError::Cancelled),
        }
    }
}

async fn read_to_string<R>(reader: Option<R>) -> String
where
    R: AsyncRead + Unpin,
{
    let mut buffer = Vec::new();
    if let Some(mut reader) = reader {
        let _ = reader.read_to_end(&mut buffer).await;
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Kill the child and everything it started. Errors are ignored; the child
/// may already have exited.
async fn kill_process_tree(pid: Option<u32>, child: &mut Child) {
    if let Some(pid) = pid {
        tracing::debug!(pid, "killing process tree");

        #[cfg(unix)]
        {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                tracing::debug!("killpg failed: {}", e);
            }
        }

        #[cfg(windows)]
        {
            let pid = pid.to_string();
            let _ = Command::new("taskkill")
                .args(["/PID", pid.as_str(), "/T", "/F"])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await;
        }
    }

    let _ = child.kill().await;
}
