use airq_core::{Failure, FailureKind, JobState, Rejection};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    /// Pre-flight validation failed; nothing was sent.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("network error: {0}")]
    Network(String),
    /// The server answered with a non-success status.
    #[error("{0}")]
    ServerRejected(String),
}

impl UploadError {
    pub fn to_failure(&self) -> Failure {
        match self {
            UploadError::Network(message) => Failure::new(FailureKind::Network, message.clone()),
            UploadError::InvalidInput(message) | UploadError::ServerRejected(message) => {
                Failure::new(FailureKind::Backend, message.clone())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },
}

impl From<TransportError> for Failure {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Network(message) => Failure::new(FailureKind::Network, message),
            TransportError::Rejected { message, .. } => Failure::new(FailureKind::Backend, message),
        }
    }
}

/// One of the refresh requests failed. The job's terminal state is unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{endpoint}: {message}")]
pub struct ReconcileError {
    pub endpoint: String,
    pub message: String,
}

impl ReconcileError {
    pub(crate) fn new(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }
}

/// Errors returned by [`crate::JobClient`] control calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("another operation is in progress ({0:?})")]
    Busy(JobState),
    #[error("network error: {0}")]
    Network(String),
    #[error("backend error: {0}")]
    Backend(String),
    /// The driver task is gone; the client can no longer be used.
    #[error("job client has shut down")]
    Closed,
}

impl From<Rejection> for ClientError {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::Busy(state) => ClientError::Busy(state),
            Rejection::InvalidInput(reason) => ClientError::InvalidInput(reason),
        }
    }
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Network(message) => ClientError::Network(message),
            TransportError::Rejected { message, .. } => ClientError::Backend(message),
        }
    }
}

impl From<ReconcileError> for ClientError {
    fn from(err: ReconcileError) -> Self {
        ClientError::Backend(err.to_string())
    }
}

/// Successful upload response.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadReceipt {
    pub message: String,
    /// Parsed response body, when it was JSON.
    pub payload: Option<Value>,
}
