use std::fmt;

use chrono::{DateTime, Utc};

use crate::view_model::{ClientView, JobView};
use crate::{MultiItemTracker, ReconcileGuard, ServerSnapshot, UploadProgress};

pub type JobId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Basic,
    Advanced,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Basic => "basic",
            JobKind::Advanced => "advanced",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of the single logical job owned by a client.
///
/// `Idle` is both the initial state and the state every path returns to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobState {
    #[default]
    Idle,
    Uploading,
    Running,
    Cancelling,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Transport-level failure (connection refused, reset, timeout).
    Network,
    /// The backend reported an error explicitly.
    Backend,
    /// No transport activity within the watchdog window.
    Stalled,
    /// The stream ended before a terminal event arrived.
    StreamEnded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed,
    Cancelled,
    Uploaded,
    UploadFailed,
}

/// The one user-visible terminal message emitted per job or upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub subject: JobId,
    pub outcome: Outcome,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub started_at: DateTime<Utc>,
    pub tracker: MultiItemTracker,
    pub message: Option<String>,
    pub failure: Option<Failure>,
}

impl Job {
    pub fn new(id: JobId, kind: JobKind, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            kind,
            started_at,
            tracker: MultiItemTracker::new(),
            message: None,
            failure: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreSettings {
    /// File extensions accepted for dataset uploads.
    pub accepted_extensions: Vec<String>,
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            accepted_extensions: vec!["csv".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClientState {
    settings: CoreSettings,
    phase: JobState,
    job: Option<Job>,
    upload: Option<UploadProgress>,
    next_id: JobId,
    guard: ReconcileGuard,
    notice: Option<Notice>,
    server: Option<ServerSnapshot>,
    reconciled_for: Option<JobId>,
    reconcile_error: Option<String>,
    /// Highest refresh request applied so far.
    last_refresh: u64,
    protocol_errors: u32,
    dirty: bool,
}

impl ClientState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: CoreSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn settings(&self) -> &CoreSettings {
        &self.settings
    }

    pub fn phase(&self) -> JobState {
        self.phase
    }

    pub fn job(&self) -> Option<&Job> {
        self.job.as_ref()
    }

    pub fn upload(&self) -> Option<&UploadProgress> {
        self.upload.as_ref()
    }

    pub fn guard(&self) -> &ReconcileGuard {
        &self.guard
    }

    pub fn view(&self) -> ClientView {
        ClientView {
            state: self.phase,
            job: self.job.as_ref().map(|job| JobView::from_job(job, self.phase)),
            upload: self.upload.clone(),
            notice: self.notice.clone(),
            server: self.server.clone(),
            reconciled_for: self.reconciled_for,
            reconcile_error: self.reconcile_error.clone(),
            protocol_errors: self.protocol_errors,
            dirty: self.dirty,
        }
    }

    /// Returns whether the state changed since the last call, and clears the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn allocate_id(&mut self) -> JobId {
        self.next_id += 1;
        self.next_id
    }

    pub(crate) fn set_phase(&mut self, phase: JobState) {
        if self.phase != phase {
            self.phase = phase;
            self.mark_dirty();
        }
    }

    pub(crate) fn job_mut(&mut self) -> Option<&mut Job> {
        self.job.as_mut()
    }

    pub(crate) fn set_job(&mut self, job: Option<Job>) {
        self.job = job;
        self.mark_dirty();
    }

    pub(crate) fn upload_mut(&mut self) -> Option<&mut UploadProgress> {
        self.upload.as_mut()
    }

    pub(crate) fn set_upload(&mut self, upload: Option<UploadProgress>) {
        self.upload = upload;
        self.mark_dirty();
    }

    pub(crate) fn guard_mut(&mut self) -> &mut ReconcileGuard {
        &mut self.guard
    }

    pub(crate) fn set_notice(&mut self, notice: Notice) {
        self.notice = Some(notice);
        self.mark_dirty();
    }

    /// Records `request` as applied unless a newer refresh already landed.
    pub(crate) fn accept_refresh(&mut self, request: u64) -> bool {
        if request < self.last_refresh {
            return false;
        }
        self.last_refresh = request;
        true
    }

    /// Caller-requested refreshes (`subject == None`) leave `reconciled_for` alone.
    pub(crate) fn set_server(&mut self, subject: Option<JobId>, server: ServerSnapshot) {
        self.server = Some(server);
        if let Some(subject) = subject {
            self.reconciled_for = Some(subject);
            self.reconcile_error = None;
        }
        self.mark_dirty();
    }

    pub(crate) fn set_reconcile_error(&mut self, subject: JobId, error: String) {
        self.reconciled_for = Some(subject);
        self.reconcile_error = Some(error);
        self.mark_dirty();
    }

    pub(crate) fn record_protocol_error(&mut self) {
        self.protocol_errors = self.protocol_errors.saturating_add(1);
    }

    /// Id of the running job, if `job_id` refers to it and it still accepts events.
    pub(crate) fn is_live_job(&self, job_id: JobId) -> bool {
        self.phase == JobState::Running && self.job.as_ref().is_some_and(|job| job.id == job_id)
    }

    pub(crate) fn is_current_job(&self, job_id: JobId) -> bool {
        self.job.as_ref().is_some_and(|job| job.id == job_id)
    }
}
