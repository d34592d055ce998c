use chrono::{DateTime, Utc};

use crate::{
    Failure, Job, JobId, JobKind, JobState, Notice, ServerSnapshot, SubItemProgress,
    UploadProgress,
};

/// Everything a caller needs to render the client's current state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClientView {
    pub state: JobState,
    pub job: Option<JobView>,
    pub upload: Option<UploadProgress>,
    /// Most recent terminal message.
    pub notice: Option<Notice>,
    pub server: Option<ServerSnapshot>,
    /// Subject of the most recent reconciliation, successful or not.
    pub reconciled_for: Option<JobId>,
    pub reconcile_error: Option<String>,
    pub protocol_errors: u32,
    pub dirty: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobView {
    pub id: JobId,
    pub kind: JobKind,
    pub state: JobState,
    pub started_at: DateTime<Utc>,
    pub items: Vec<SubItemProgress>,
    pub overall_percent: u8,
    /// The overall percent is a local estimate, not a server measurement.
    pub overall_estimated: bool,
    pub message: Option<String>,
    pub failure: Option<Failure>,
}

impl JobView {
    pub(crate) fn from_job(job: &Job, state: JobState) -> Self {
        Self {
            id: job.id,
            kind: job.kind,
            state,
            started_at: job.started_at,
            items: job.tracker.items().to_vec(),
            overall_percent: job.tracker.overall_percent(),
            overall_estimated: job.tracker.is_estimated(),
            message: job.message.clone(),
            failure: job.failure.clone(),
        }
    }

    pub fn item(&self, name: &str) -> Option<&SubItemProgress> {
        self.items.iter().find(|item| item.name == name)
    }
}
