//! AirQ engine: transports, uploads, reconciliation and the async job driver.
mod body;
mod client;
mod config;
mod reconcile;
mod sse;
mod transport;
mod types;
mod upload;

pub use client::{ClientParts, DriverSettings, JobClient};
pub use config::{
    ClientConfig, EndpointPaths, TransportMode, DEFAULT_BASE_URL, DEFAULT_POLLUTANTS,
};
pub use reconcile::{HttpReconciler, Reconciler};
pub use sse::SseDecoder;
pub use transport::{EventSource, SourceItem, TransportSelector, Transports};
pub use types::{ClientError, ReconcileError, TransportError, UploadError, UploadReceipt};
pub use upload::{
    ChannelProgressSink, ProgressSink, ReqwestUploader, UploadSettings, UploadTick, Uploader,
};
