use crate::{JobId, JobKind, JobState, Notice, ReconcileTrigger};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// A control call was refused; nothing changed.
    Reject(Rejection),
    StartUpload { upload_id: JobId },
    AbortUpload { upload_id: JobId },
    /// Open the job's transport, closing any previous one first.
    OpenTransport { job_id: JobId, kind: JobKind },
    CloseTransport { job_id: JobId },
    Reconcile {
        subject: JobId,
        trigger: ReconcileTrigger,
    },
    /// Return to `Idle` after the display delay.
    ScheduleReset { job_id: JobId },
    Announce(Notice),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Another upload or job is in progress.
    Busy(JobState),
    /// Pre-flight validation failed.
    InvalidInput(String),
}
