use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use airq_core::{validate_upload_name, JobId, Msg};
use bytes::Bytes;
use futures_util::{stream, StreamExt};
use reqwest::multipart::{Form, Part};
use tokio::sync::mpsc;

use crate::body;
use crate::{ClientConfig, UploadError, UploadReceipt};

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub url: String,
    pub accepted_extensions: Vec<String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Size of the body chunks progress is reported for.
    pub chunk_size: usize,
}

impl From<&ClientConfig> for UploadSettings {
    fn from(config: &ClientConfig) -> Self {
        Self {
            url: config.endpoint(&config.paths.upload),
            accepted_extensions: config.accepted_extensions.clone(),
            connect_timeout: config.connect_timeout,
            request_timeout: config.request_timeout,
            chunk_size: CHUNK_SIZE,
        }
    }
}

/// Bytes handed to the transport so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadTick {
    pub sent: u64,
    pub total: u64,
}

impl UploadTick {
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        (self.sent.min(self.total) * 100 / self.total) as u8
    }
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, tick: UploadTick);
}

/// Forwards upload ticks into the driver's message queue.
pub struct ChannelProgressSink {
    upload_id: JobId,
    tx: mpsc::UnboundedSender<Msg>,
}

impl ChannelProgressSink {
    pub fn new(upload_id: JobId, tx: mpsc::UnboundedSender<Msg>) -> Self {
        Self { upload_id, tx }
    }
}

impl ProgressSink for ChannelProgressSink {
    fn emit(&self, tick: UploadTick) {
        let _ = self.tx.send(Msg::UploadProgress {
            upload_id: self.upload_id,
            percent: tick.percent(),
        });
    }
}

#[async_trait::async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(
        &self,
        path: &Path,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<UploadReceipt, UploadError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestUploader {
    settings: UploadSettings,
}

impl ReqwestUploader {
    pub fn new(settings: UploadSettings) -> Self {
        Self { settings }
    }

    fn build_client(&self) -> Result<reqwest::Client, UploadError> {
        reqwest::Client::builder()
            .connect_timeout(self.settings.connect_timeout)
            .timeout(self.settings.request_timeout)
            .build()
            .map_err(|err| UploadError::Network(err.to_string()))
    }
}

#[async_trait::async_trait]
impl Uploader for ReqwestUploader {
    async fn upload(
        &self,
        path: &Path,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<UploadReceipt, UploadError> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .ok_or_else(|| {
                UploadError::InvalidInput(format!("`{}` does not name a file", path.display()))
            })?;
        validate_upload_name(&file_name, &self.settings.accepted_extensions)
            .map_err(UploadError::InvalidInput)?;

        let contents = tokio::fs::read(path).await.map_err(|err| {
            UploadError::InvalidInput(format!("cannot read `{}`: {err}", path.display()))
        })?;
        let total = contents.len() as u64;
        sink.emit(UploadTick { sent: 0, total });

        let body = progress_body(Bytes::from(contents), self.settings.chunk_size, sink.clone());
        let part = Part::stream_with_length(body, total).file_name(file_name);
        let form = Form::new().part("file", part);

        let client = self.build_client()?;
        let response = client
            .post(&self.settings.url)
            .multipart(form)
            .send()
            .await
            .map_err(|err| UploadError::Network(err.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| UploadError::Network(err.to_string()))?;
        if !status.is_success() {
            return Err(UploadError::ServerRejected(body::error_message(
                &bytes,
                "Upload failed",
            )));
        }

        sink.emit(UploadTick { sent: total, total });
        Ok(UploadReceipt {
            message: body::message(&bytes).unwrap_or_else(|| "Upload succeeded".to_string()),
            payload: body::parse(&bytes),
        })
    }
}

/// Streams `contents` in chunks, reporting each chunk as it is handed to the transport.
fn progress_body(contents: Bytes, chunk_size: usize, sink: Arc<dyn ProgressSink>) -> reqwest::Body {
    let total = contents.len() as u64;
    let chunk_size = chunk_size.max(1);
    let chunks: Vec<Bytes> = (0..contents.len())
        .step_by(chunk_size)
        .map(|start| contents.slice(start..(start + chunk_size).min(contents.len())))
        .collect();

    let mut sent = 0u64;
    let chunks = stream::iter(chunks).map(move |chunk| {
        sent += chunk.len() as u64;
        sink.emit(UploadTick { sent, total });
        Ok::<Bytes, std::io::Error>(chunk)
    });
    reqwest::Body::wrap_stream(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_percent_is_bounded() {
        assert_eq!(UploadTick { sent: 0, total: 0 }.percent(), 100);
        assert_eq!(UploadTick { sent: 50, total: 200 }.percent(), 25);
        assert_eq!(UploadTick { sent: 300, total: 200 }.percent(), 100);
    }
}
