use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::error::ProvisionResult;

/// Upload progress callback, receives a percentage in 0..=100.
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

/// Status and body of a device HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One multipart firmware upload.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub url: String,
    /// Multipart field carrying the file.
    pub field_name: String,
    pub file_path: PathBuf,
    /// Header that carries the exact file length ahead of the body.
    pub size_header: String,
    pub timeout: Duration,
}

/// HTTP operations against a device web server.
///
/// Only transport failures are errors; any status code comes back as an
/// [`HttpReply`] so the session decides what counts as success.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TransferClient: Send + Sync {
    async fn get(&self, url: &str, timeout: Duration) -> ProvisionResult<HttpReply>;

    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
        timeout: Duration,
    ) -> ProvisionResult<HttpReply>;

    /// Stream `request.file_path` as a multipart POST, reporting byte progress.
    async fn upload(&self, request: &UploadRequest, progress: ProgressFn)
        -> ProvisionResult<HttpReply>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_success_range() {
        let ok = HttpReply {
            status: 204,
            body: String::new(),
        };
        let redirect = HttpReply {
            status: 302,
            body: String::new(),
        };
        let error = HttpReply {
            status: 500,
            body: "boom".into(),
        };
        assert!(ok.is_success());
        assert!(!redirect.is_success());
        assert!(!error.is_success());
    }
}
