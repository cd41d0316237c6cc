//! `serial` and `read-clone`: the wired transport.

use std::path::{Path, PathBuf};

use crate::batch::{RunCounters, SerialBatch};
use crate::error::{ProvisionError, ProvisionResult};
use crate::flash::{find_profile, load_profiles};
use crate::job::{BatchJobSpec, SerialJob};
use crate::traits::TokioProcessExecutor;

use super::{load_job, wrong_transport, CommandSession};

/// Command-line values layered over an optional job file.
#[derive(Debug, Clone, Default)]
pub struct SerialOptions {
    pub job: Option<PathBuf>,
    pub port: Option<String>,
    /// Profile name, looked up in `profiles`.
    pub profile: Option<String>,
    pub profiles: PathBuf,
    /// `label=path` pairs.
    pub segments: Vec<String>,
    pub tool: Option<String>,
    pub retries: Option<u32>,
    pub save_job: Option<PathBuf>,
    pub json: bool,
}

/// Split a `label=path` argument.
pub fn parse_segment(arg: &str) -> ProvisionResult<(String, PathBuf)> {
    match arg.split_once('=') {
        Some((label, path)) if !label.trim().is_empty() && !path.trim().is_empty() => {
            Ok((label.trim().to_string(), PathBuf::from(path.trim())))
        }
        _ => Err(ProvisionError::Config(format!(
            "Segment must be label=path, got '{}'",
            arg
        ))),
    }
}

/// Merge the job file (if any) with the command-line overrides.
pub fn build_job(options: &SerialOptions) -> ProvisionResult<SerialJob> {
    let mut job = match &options.job {
        Some(path) => match load_job(path)? {
            BatchJobSpec::Serial(job) => job,
            other => return Err(wrong_transport(path, &other, "serial")),
        },
        None => SerialJob::default(),
    };

    if let Some(name) = &options.profile {
        let profiles = load_profiles(&options.profiles)?;
        let profile = find_profile(&profiles, name).ok_or_else(|| {
            ProvisionError::Config(format!(
                "Unknown profile '{}' in {}",
                name,
                options.profiles.display()
            ))
        })?;
        job.profile = Some(profile.clone());
    }
    if let Some(port) = &options.port {
        job.port = port.clone();
    }
    if let Some(tool) = &options.tool {
        job.tool = tool.clone();
    }
    if let Some(retries) = options.retries {
        job.retry_flash_count = retries;
    }
    for arg in &options.segments {
        let (label, path) = parse_segment(arg)?;
        job.segments.insert(label, path);
    }

    Ok(job)
}

pub async fn run(options: SerialOptions) -> ProvisionResult<RunCounters> {
    let job = build_job(&options)?;
    job.validate()?;
    if let Some(path) = &options.save_job {
        BatchJobSpec::Serial(job.clone()).save(path)?;
        tracing::info!("Saved job to {}", path.display());
    }

    let executor = TokioProcessExecutor;
    let session = CommandSession::start(options.json);
    let result = SerialBatch::new(&executor, session.reporter.as_ref(), &job)
        .run(&session.cancel)
        .await;
    session.finish().await;
    result
}

pub async fn read_clone(options: SerialOptions, dest: &Path) -> ProvisionResult<PathBuf> {
    let job = build_job(&options)?;

    let executor = TokioProcessExecutor;
    let session = CommandSession::start(options.json);
    let result = SerialBatch::new(&executor, session.reporter.as_ref(), &job)
        .read_clone(dest, &session.cancel)
        .await;
    session.finish().await;
    result
}
