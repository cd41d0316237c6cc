//! `TransferClient` on top of reqwest.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Response};

use crate::config::FILE_NAME_FIELD;
use crate::error::{ProvisionError, ProvisionResult};
use crate::traits::{HttpReply, ProgressFn, TransferClient, UploadRequest};

use super::progress::ProgressStream;

/// HTTP client for device web servers.
///
/// Proxies are disabled: the device lives on a link-local AP and a system
/// proxy would never reach it.
#[derive(Debug, Clone)]
pub struct ReqwestTransferClient {
    client: Client,
}

impl ReqwestTransferClient {
    pub fn new() -> ProvisionResult<Self> {
        let client = Client::builder().no_proxy().build()?;
        Ok(Self { client })
    }
}

async fn into_reply(response: Response) -> ProvisionResult<HttpReply> {
    let status = response.status().as_u16();
    let body = response.text().await?;
    Ok(HttpReply { status, body })
}

#[async_trait]
impl TransferClient for ReqwestTransferClient {
    async fn get(&self, url: &str, timeout: Duration) -> ProvisionResult<HttpReply> {
        let response = self.client.get(url).timeout(timeout).send().await?;
        into_reply(response).await
    }

    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
        timeout: Duration,
    ) -> ProvisionResult<HttpReply> {
        let response = self
            .client
            .post(url)
            .timeout(timeout)
            .json(body)
            .send()
            .await?;
        into_reply(response).await
    }

    async fn upload(
        &self,
        request: &UploadRequest,
        progress: ProgressFn,
    ) -> ProvisionResult<HttpReply> {
        let file = tokio::fs::File::open(&request.file_path).await?;
        let size = file.metadata().await?.len();
        let file_name = request
            .file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                ProvisionError::Config(format!(
                    "Not a file path: {}",
                    request.file_path.display()
                ))
            })?;

        let stream = ProgressStream::new(file, size, progress);
        let part = Part::stream_with_length(Body::wrap_stream(stream), size)
            .file_name(file_name.clone())
            .mime_str("application/octet-stream")?;

        // Some web updaters look for the file name as a separate field.
        let form = Form::new()
            .text(FILE_NAME_FIELD, file_name)
            .part(request.field_name.clone(), part);

        tracing::debug!(url = %request.url, size, field = %request.field_name, "uploading");

        let response = self
            .client
            .post(&request.url)
            .timeout(request.timeout)
            .header(request.size_header.as_str(), size.to_string())
            .multipart(form)
            .send()
            .await?;
        into_reply(response).await
    }
}
