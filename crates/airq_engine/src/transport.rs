use std::future::Future;

use airq_core::{normalize, JobId, JobKind};
use engine_logging::{engine_debug, engine_info, engine_trace};
use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::body;
use crate::sse::SseDecoder;
use crate::{ClientConfig, TransportError, TransportMode};

const SOURCE_CAPACITY: usize = 64;

/// One item delivered by a job's transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceItem {
    /// A raw event payload, unmodified.
    Raw(String),
    /// The polling fallback advanced its local counter. Not a measurement.
    Estimated(u8),
    /// The job was acknowledged synchronously, with the server's message.
    Acknowledged(Option<String>),
    Failed(TransportError),
    /// No more items will arrive.
    Closed,
}

/// Uniform asynchronous source of raw events for one job.
///
/// Items come from a producer task over a bounded channel. Closing (or
/// dropping) the source aborts the producer, which releases its connection.
#[derive(Debug)]
pub struct EventSource {
    rx: mpsc::Receiver<SourceItem>,
    producer: Option<JoinHandle<()>>,
}

impl EventSource {
    /// Spawns `produce` on the current runtime and wraps its output channel.
    pub fn spawn<F, Fut>(produce: F) -> Self
    where
        F: FnOnce(mpsc::Sender<SourceItem>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(SOURCE_CAPACITY);
        let producer = tokio::spawn(produce(tx));
        Self {
            rx,
            producer: Some(producer),
        }
    }

    /// A source fed directly by the caller, with no producer task.
    pub fn from_receiver(rx: mpsc::Receiver<SourceItem>) -> Self {
        Self { rx, producer: None }
    }

    /// Next item; [`SourceItem::Closed`] once the producer is done. Cancel-safe.
    pub async fn next(&mut self) -> SourceItem {
        self.rx.recv().await.unwrap_or(SourceItem::Closed)
    }

    pub fn close(&mut self) {
        if let Some(producer) = self.producer.take() {
            producer.abort();
        }
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
    }
}

impl Drop for EventSource {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens the transport for a job.
pub trait Transports: Send + Sync {
    fn open(&self, job_id: JobId, kind: JobKind) -> EventSource;
}

/// Picks the delivery mechanism from the job kind and the configured mode.
///
/// * basic: one POST whose response acknowledges the finished job;
/// * advanced + [`TransportMode::Stream`]: a server-sent event stream;
/// * advanced + [`TransportMode::Poll`]: a start request followed by interval
///   polling, with a locally estimated percent while the status carries none.
#[derive(Debug, Clone)]
pub struct TransportSelector {
    mode: TransportMode,
    basic_url: String,
    stream_url: String,
    start_url: String,
    status_url: String,
    poll: PollSettings,
    /// No overall timeout; used for long-lived or long-running requests.
    stream_client: reqwest::Client,
    request_client: reqwest::Client,
}

#[derive(Debug, Clone, Copy)]
struct PollSettings {
    interval: std::time::Duration,
    step: u8,
    ceiling: u8,
}

impl TransportSelector {
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let stream_client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|err| TransportError::Network(err.to_string()))?;
        let request_client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| TransportError::Network(err.to_string()))?;

        Ok(Self {
            mode: config.transport_mode,
            basic_url: config.endpoint(&config.paths.basic),
            stream_url: config.endpoint(&config.paths.advanced_stream),
            start_url: config.endpoint(&config.paths.advanced_start),
            status_url: config.endpoint(&config.paths.advanced_status),
            poll: PollSettings {
                interval: config.poll_interval,
                step: config.poll_step,
                ceiling: config.poll_ceiling.min(99),
            },
            stream_client,
            request_client,
        })
    }
}

impl Transports for TransportSelector {
    fn open(&self, job_id: JobId, kind: JobKind) -> EventSource {
        match (kind, self.mode) {
            (JobKind::Basic, _) => {
                engine_info!("Job {job_id}: requesting basic forecast");
                let client = self.stream_client.clone();
                let url = self.basic_url.clone();
                EventSource::spawn(move |tx| acknowledge(client, url, tx))
            }
            (JobKind::Advanced, TransportMode::Stream) => {
                engine_info!("Job {job_id}: opening progress stream");
                let client = self.stream_client.clone();
                let url = self.stream_url.clone();
                EventSource::spawn(move |tx| stream_events(client, url, tx))
            }
            (JobKind::Advanced, TransportMode::Poll) => {
                engine_info!("Job {job_id}: polling progress");
                let client = self.request_client.clone();
                let start_url = self.start_url.clone();
                let status_url = self.status_url.clone();
                let poll = self.poll;
                EventSource::spawn(move |tx| poll_events(client, start_url, status_url, poll, tx))
            }
        }
    }
}

async fn acknowledge(client: reqwest::Client, url: String, tx: mpsc::Sender<SourceItem>) {
    let item = match request_body(client.post(&url)).await {
        Ok(bytes) => SourceItem::Acknowledged(body::message(&bytes)),
        Err(err) => SourceItem::Failed(err),
    };
    let _ = tx.send(item).await;
}

async fn stream_events(client: reqwest::Client, url: String, tx: mpsc::Sender<SourceItem>) {
    let response = match client
        .get(&url)
        .header(ACCEPT, "text/event-stream")
        .send()
        .await
    {
        Ok(response) => response,
        Err(err) => {
            let _ = tx
                .send(SourceItem::Failed(TransportError::Network(err.to_string())))
                .await;
            return;
        }
    };

    let status = response.status();
    if !status.is_success() {
        let bytes = response.bytes().await.unwrap_or_default();
        let _ = tx
            .send(SourceItem::Failed(TransportError::Rejected {
                status: status.as_u16(),
                message: body::error_message(&bytes, &status.to_string()),
            }))
            .await;
        return;
    }

    let mut decoder = SseDecoder::new();
    let mut chunks = response.bytes_stream();
    while let Some(chunk) = chunks.next().await {
        match chunk {
            Ok(chunk) => {
                for data in decoder.push(&chunk) {
                    if tx.send(SourceItem::Raw(data)).await.is_err() {
                        return;
                    }
                }
            }
            Err(err) => {
                let _ = tx
                    .send(SourceItem::Failed(TransportError::Network(err.to_string())))
                    .await;
                return;
            }
        }
    }
    if decoder.has_partial() {
        engine_debug!("Progress stream ended inside an event; discarding it");
    }
}

async fn poll_events(
    client: reqwest::Client,
    start_url: String,
    status_url: String,
    poll: PollSettings,
    tx: mpsc::Sender<SourceItem>,
) {
    if let Err(err) = request_body(client.post(&start_url)).await {
        let _ = tx.send(SourceItem::Failed(err)).await;
        return;
    }

    let mut ticker = tokio::time::interval(poll.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut estimate: u8 = 0;
    loop {
        ticker.tick().await;
        let bytes = match request_body(client.get(&status_url)).await {
            Ok(bytes) => bytes,
            Err(err) => {
                let _ = tx.send(SourceItem::Failed(err)).await;
                return;
            }
        };
        let raw = String::from_utf8_lossy(&bytes).into_owned();
        engine_trace!("Poll status: {raw}");

        let item = match normalize(&raw) {
            Ok(event) if event.carries_progress() => {
                let terminal = event.is_terminal();
                if tx.send(SourceItem::Raw(raw)).await.is_err() || terminal {
                    return;
                }
                continue;
            }
            Ok(_) => {
                estimate = estimate.saturating_add(poll.step).min(poll.ceiling);
                SourceItem::Estimated(estimate)
            }
            // Let the client record the violation.
            Err(_) => SourceItem::Raw(raw),
        };
        if tx.send(item).await.is_err() {
            return;
        }
    }
}

async fn request_body(request: reqwest::RequestBuilder) -> Result<bytes::Bytes, TransportError> {
    let response = request
        .send()
        .await
        .map_err(|err| TransportError::Network(err.to_string()))?;
    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|err| TransportError::Network(err.to_string()))?;
    if status.is_success() {
        Ok(bytes)
    } else {
        Err(TransportError::Rejected {
            status: status.as_u16(),
            message: body::error_message(&bytes, "Server error"),
        })
    }
}
