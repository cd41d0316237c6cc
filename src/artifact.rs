//! Pre-flight artifact inspection.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{ProvisionError, ProvisionResult};

/// Size and digest of one firmware image, logged once before a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactInfo {
    pub path: PathBuf,
    pub size: u64,
    pub sha256: String,
}

impl std::fmt::Display for ArtifactInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({} bytes, sha256 {})",
            self.path.display(),
            self.size,
            self.sha256
        )
    }
}

/// Calculate the SHA-256 of a file.
pub fn calculate_sha256(path: &Path) -> ProvisionResult<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Inspect an artifact that must exist as a regular file.
pub fn inspect(path: &Path) -> ProvisionResult<ArtifactInfo> {
    if !path.is_file() {
        return Err(ProvisionError::Config(format!(
            "Firmware file not found: {}",
            path.display()
        )));
    }

    let size = fs::metadata(path)?.len();
    let sha256 = calculate_sha256(path)?;
    Ok(ArtifactInfo {
        path: path.to_path_buf(),
        size,
        sha256,
    })
}
