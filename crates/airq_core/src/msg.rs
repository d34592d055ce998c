use chrono::{DateTime, Utc};

use crate::{CanonicalEvent, Failure, JobId, JobKind, ProtocolError, ServerSnapshot};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// Caller asked to upload a dataset file.
    UploadRequested { file_name: String },
    /// Upload transport reported bytes sent.
    UploadProgress { upload_id: JobId, percent: u8 },
    /// Upload finished; `Ok` carries the server's message, if any.
    UploadFinished {
        upload_id: JobId,
        result: Result<Option<String>, Failure>,
    },
    /// Caller asked to start a forecast job.
    StartRequested { kind: JobKind, at: DateTime<Utc> },
    /// Caller asked to cancel whatever is in flight.
    CancelRequested,
    /// A normalized event from the job's transport.
    TransportEvent { job_id: JobId, event: CanonicalEvent },
    /// The polling fallback advanced its local counter.
    EstimatedProgress { job_id: JobId, percent: u8 },
    /// One payload could not be parsed. The job keeps running.
    ProtocolViolation { job_id: JobId, error: ProtocolError },
    /// The transport failed, or the watchdog expired.
    TransportFailed { job_id: JobId, failure: Failure },
    /// The transport is closed; no more events will arrive.
    TransportClosed { job_id: JobId },
    /// The post-terminal display delay elapsed.
    ResetElapsed { job_id: JobId },
    /// Reconciliation finished. `subject` is `None` for a caller-requested refresh.
    /// `request` numbers refreshes in the order they were issued.
    Reconciled {
        subject: Option<JobId>,
        request: u64,
        result: Result<ServerSnapshot, String>,
    },
}
