use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use airq_core::{
    normalize, update, CanonicalEvent, ClientState, ClientView, CoreSettings, Effect, Failure,
    FailureKind, JobId, JobKind, JobState, Msg, Notice, Rejection, ServerSnapshot,
};
use chrono::Utc;
use engine_logging::{engine_debug, engine_error, engine_info, engine_trace, engine_warn};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::transport::{EventSource, SourceItem, TransportSelector, Transports};
use crate::upload::{ChannelProgressSink, ProgressSink, ReqwestUploader, UploadSettings, Uploader};
use crate::{ClientConfig, ClientError, HttpReconciler, Reconciler};

const NOTICE_CAPACITY: usize = 16;

/// The IO collaborators a [`JobClient`] drives.
pub struct ClientParts {
    pub transports: Arc<dyn Transports>,
    pub uploader: Arc<dyn Uploader>,
    pub reconciler: Arc<dyn Reconciler>,
}

#[derive(Debug, Clone)]
pub struct DriverSettings {
    pub display_delay: Duration,
    /// Watchdog window for advanced jobs, reset by every transport item.
    pub stall_timeout: Duration,
    /// Watchdog window for the basic job's single reply.
    pub basic_timeout: Duration,
    pub accepted_extensions: Vec<String>,
}

impl From<&ClientConfig> for DriverSettings {
    fn from(config: &ClientConfig) -> Self {
        Self {
            display_delay: config.display_delay,
            stall_timeout: config.stall_timeout,
            basic_timeout: config.basic_timeout,
            accepted_extensions: config.accepted_extensions.clone(),
        }
    }
}

enum Command {
    Upload {
        path: PathBuf,
        reply: oneshot::Sender<Result<JobId, ClientError>>,
    },
    Start {
        kind: JobKind,
        reply: oneshot::Sender<Result<JobId, ClientError>>,
    },
    Cancel {
        reply: oneshot::Sender<bool>,
    },
    Refresh {
        reply: oneshot::Sender<Result<ServerSnapshot, ClientError>>,
    },
}

/// Runs at most one upload or forecast job at a time and publishes its state.
///
/// All state lives in a single driver task; control calls are messages to it,
/// so `start`, `cancel` and transport events are applied strictly in order.
/// Observe progress through [`JobClient::watch`] and terminal messages
/// through [`JobClient::notices`].
///
/// Cancellation is cooperative only. [`JobClient::cancel`] closes the
/// transport so no further progress is applied, but the backend is not told
/// to stop, and a training run already in progress may still finish on the
/// server.
pub struct JobClient {
    commands: mpsc::UnboundedSender<Command>,
    view: watch::Receiver<ClientView>,
    notices: broadcast::Sender<Notice>,
    driver: JoinHandle<()>,
}

impl JobClient {
    /// Builds the HTTP collaborators from `config` and starts the driver.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate().map_err(ClientError::InvalidInput)?;
        let transports = TransportSelector::new(&config)?;
        let uploader = ReqwestUploader::new(UploadSettings::from(&config));
        let reconciler = HttpReconciler::new(&config)?;
        let parts = ClientParts {
            transports: Arc::new(transports),
            uploader: Arc::new(uploader),
            reconciler: Arc::new(reconciler),
        };
        Ok(Self::from_parts(parts, DriverSettings::from(&config)))
    }

    /// Starts a driver over caller-supplied collaborators.
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_parts(parts: ClientParts, settings: DriverSettings) -> Self {
        let state = ClientState::with_settings(CoreSettings {
            accepted_extensions: settings.accepted_extensions.clone(),
        });
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(state.view());
        let (notice_tx, _) = broadcast::channel(NOTICE_CAPACITY);

        let driver = Driver {
            state,
            settings,
            parts,
            active: None,
            upload: None,
            pending_path: None,
            refreshes: 0,
            msg_tx,
            view_tx,
            notices: notice_tx.clone(),
        };
        let driver = tokio::spawn(driver.run(command_rx, msg_rx));

        Self {
            commands: command_tx,
            view: view_rx,
            notices: notice_tx,
            driver,
        }
    }

    /// Uploads a dataset file. Returns once the upload has started.
    pub async fn upload(&self, path: impl Into<PathBuf>) -> Result<JobId, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Upload {
            path: path.into(),
            reply,
        })?;
        rx.await.map_err(|_| ClientError::Closed)?
    }

    /// Starts a forecast job. Returns once its transport is open.
    pub async fn start(&self, kind: JobKind) -> Result<JobId, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Start { kind, reply })?;
        rx.await.map_err(|_| ClientError::Closed)?
    }

    /// Cancels the running upload or job. Returns false when there was
    /// nothing to cancel; calling it again is harmless.
    pub async fn cancel(&self) -> bool {
        let (reply, rx) = oneshot::channel();
        if self.send(Command::Cancel { reply }).is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Fetches the server state now, independent of any job.
    pub async fn refresh(&self) -> Result<ServerSnapshot, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Refresh { reply })?;
        rx.await.map_err(|_| ClientError::Closed)?
    }

    pub fn view(&self) -> ClientView {
        self.view.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<ClientView> {
        self.view.clone()
    }

    /// Subscribes to terminal messages, one per job or upload.
    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// Waits until the published view satisfies `ready`.
    pub async fn wait_for(
        &self,
        mut ready: impl FnMut(&ClientView) -> bool,
    ) -> Result<ClientView, ClientError> {
        let mut view = self.view.clone();
        let found = view
            .wait_for(|current| ready(current))
            .await
            .map_err(|_| ClientError::Closed)?;
        Ok(found.clone())
    }

    fn send(&self, command: Command) -> Result<(), ClientError> {
        self.commands.send(command).map_err(|_| ClientError::Closed)
    }
}

impl Drop for JobClient {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

struct ActiveTransport {
    job_id: JobId,
    source: EventSource,
    /// Watchdog window, restarted by every item.
    window: Duration,
    deadline: Instant,
}

struct UploadTask {
    id: JobId,
    handle: JoinHandle<()>,
}

enum Signal {
    Item(SourceItem),
    Stalled,
}

struct Driver {
    state: ClientState,
    settings: DriverSettings,
    parts: ClientParts,
    active: Option<ActiveTransport>,
    upload: Option<UploadTask>,
    /// Path of the upload being requested, consumed by `StartUpload`.
    pending_path: Option<PathBuf>,
    /// Number of refreshes issued, used to order their results.
    refreshes: u64,
    msg_tx: mpsc::UnboundedSender<Msg>,
    view_tx: watch::Sender<ClientView>,
    notices: broadcast::Sender<Notice>,
}

impl Driver {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut msgs: mpsc::UnboundedReceiver<Msg>,
    ) {
        loop {
            tokio::select! {
                biased;
                Some(msg) = msgs.recv() => {
                    self.dispatch(msg);
                }
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                (job_id, signal) = next_signal(&mut self.active) => {
                    self.handle_signal(job_id, signal);
                }
            }
        }
        self.close_transport();
        if let Some(upload) = self.upload.take() {
            upload.handle.abort();
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Upload { path, reply } => {
                let file_name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                self.pending_path = Some(path);
                let accepted = self.dispatch(Msg::UploadRequested { file_name });
                self.pending_path = None;
                let _ = reply.send(self.accepted_id(accepted));
            }
            Command::Start { kind, reply } => {
                let accepted = self.dispatch(Msg::StartRequested {
                    kind,
                    at: Utc::now(),
                });
                let _ = reply.send(self.accepted_id(accepted));
            }
            Command::Cancel { reply } => {
                let before = self.state.phase();
                self.dispatch(Msg::CancelRequested);
                let _ = reply.send(matches!(before, JobState::Uploading | JobState::Running));
            }
            Command::Refresh { reply } => {
                let request = self.next_refresh();
                let reconciler = self.parts.reconciler.clone();
                let tx = self.msg_tx.clone();
                tokio::spawn(async move {
                    let result = reconciler.refresh().await;
                    let _ = tx.send(Msg::Reconciled {
                        subject: None,
                        request,
                        result: result.clone().map_err(|err| err.to_string()),
                    });
                    let _ = reply.send(result.map_err(ClientError::from));
                });
            }
        }
    }

    fn next_refresh(&mut self) -> u64 {
        self.refreshes += 1;
        self.refreshes
    }

    fn accepted_id(&self, accepted: Option<Result<JobId, Rejection>>) -> Result<JobId, ClientError> {
        match accepted {
            Some(Ok(id)) => Ok(id),
            Some(Err(rejection)) => Err(rejection.into()),
            None => Err(ClientError::Busy(self.state.phase())),
        }
    }

    /// Applies `msg`, runs the resulting effects and publishes the view.
    ///
    /// Returns the id of an upload or job the message started, or the reason
    /// it was rejected.
    fn dispatch(&mut self, msg: Msg) -> Option<Result<JobId, Rejection>> {
        let state = std::mem::take(&mut self.state);
        let (state, effects) = update(state, msg);
        self.state = state;

        // Publish before effects run so a notice is never ahead of its view.
        if self.state.consume_dirty() {
            self.view_tx.send_replace(self.state.view());
        }

        let mut accepted = None;
        for effect in effects {
            match &effect {
                Effect::Reject(rejection) => accepted = Some(Err(rejection.clone())),
                Effect::StartUpload { upload_id } => accepted = Some(Ok(*upload_id)),
                Effect::OpenTransport { job_id, .. } => accepted = Some(Ok(*job_id)),
                _ => {}
            }
            self.run_effect(effect);
        }
        accepted
    }

    fn run_effect(&mut self, effect: Effect) {
        match effect {
            Effect::Reject(rejection) => {
                engine_debug!("Request rejected: {rejection:?}");
            }
            Effect::StartUpload { upload_id } => self.start_upload(upload_id),
            Effect::AbortUpload { upload_id } => {
                if let Some(upload) = self.upload.take() {
                    if upload.id == upload_id {
                        engine_info!("Upload {upload_id}: aborted");
                        upload.handle.abort();
                    } else {
                        self.upload = Some(upload);
                    }
                }
            }
            Effect::OpenTransport { job_id, kind } => {
                self.close_transport();
                let source = self.parts.transports.open(job_id, kind);
                let window = match kind {
                    JobKind::Advanced => self.settings.stall_timeout,
                    JobKind::Basic => self.settings.basic_timeout,
                };
                self.active = Some(ActiveTransport {
                    job_id,
                    source,
                    window,
                    deadline: Instant::now() + window,
                });
            }
            Effect::CloseTransport { job_id } => {
                if self.active.as_ref().is_some_and(|active| active.job_id == job_id) {
                    self.close_transport();
                }
                let _ = self.msg_tx.send(Msg::TransportClosed { job_id });
            }
            Effect::Reconcile { subject, trigger } => {
                engine_info!("Refreshing server state after {trigger:?} ({subject})");
                let request = self.next_refresh();
                let reconciler = self.parts.reconciler.clone();
                let tx = self.msg_tx.clone();
                tokio::spawn(async move {
                    let result = reconciler.refresh().await;
                    if let Err(err) = &result {
                        engine_error!("Refresh after {trigger:?} ({subject}) failed: {err}");
                    }
                    let _ = tx.send(Msg::Reconciled {
                        subject: Some(subject),
                        request,
                        result: result.map_err(|err| err.to_string()),
                    });
                });
            }
            Effect::ScheduleReset { job_id } => {
                let delay = self.settings.display_delay;
                let tx = self.msg_tx.clone();
                if delay.is_zero() {
                    let _ = tx.send(Msg::ResetElapsed { job_id });
                } else {
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = tx.send(Msg::ResetElapsed { job_id });
                    });
                }
            }
            Effect::Announce(notice) => {
                engine_info!("{:?} ({}): {}", notice.outcome, notice.subject, notice.message);
                let _ = self.notices.send(notice);
            }
        }
    }

    fn start_upload(&mut self, upload_id: JobId) {
        let Some(path) = self.pending_path.take() else {
            engine_warn!("Upload {upload_id}: no file to send");
            return;
        };
        engine_info!("Upload {upload_id}: sending {}", path.display());
        let uploader = self.parts.uploader.clone();
        let tx = self.msg_tx.clone();
        let sink: Arc<dyn ProgressSink> = Arc::new(ChannelProgressSink::new(upload_id, tx.clone()));
        let handle = tokio::spawn(async move {
            let result = uploader
                .upload(&path, sink)
                .await
                .map(|receipt| Some(receipt.message))
                .map_err(|err| err.to_failure());
            let _ = tx.send(Msg::UploadFinished { upload_id, result });
        });
        self.upload = Some(UploadTask {
            id: upload_id,
            handle,
        });
    }

    fn handle_signal(&mut self, job_id: JobId, signal: Signal) {
        let item = match signal {
            Signal::Item(item) => item,
            Signal::Stalled => {
                let secs = self
                    .active
                    .as_ref()
                    .map_or(self.settings.stall_timeout, |active| active.window)
                    .as_secs_f64();
                engine_warn!("Job {job_id}: no progress for {secs:.1}s");
                self.close_transport();
                self.dispatch(Msg::TransportFailed {
                    job_id,
                    failure: Failure::new(
                        FailureKind::Stalled,
                        format!("No progress received for {secs:.1}s."),
                    ),
                });
                return;
            }
        };

        if let Some(active) = self.active.as_mut() {
            active.deadline = Instant::now() + active.window;
        }

        match item {
            SourceItem::Raw(raw) => {
                engine_trace!("Job {job_id}: {raw}");
                match normalize(&raw) {
                    Ok(event) => {
                        if let CanonicalEvent::Unknown { status } = &event {
                            engine_debug!("Job {job_id}: ignoring status `{status}`");
                        }
                        self.dispatch(Msg::TransportEvent { job_id, event });
                    }
                    Err(error) => {
                        engine_warn!("Job {job_id}: skipping event: {error}");
                        self.dispatch(Msg::ProtocolViolation { job_id, error });
                    }
                }
            }
            SourceItem::Estimated(percent) => {
                self.dispatch(Msg::EstimatedProgress { job_id, percent });
            }
            SourceItem::Acknowledged(message) => {
                self.dispatch(Msg::TransportEvent {
                    job_id,
                    event: CanonicalEvent::JobComplete { message },
                });
            }
            SourceItem::Failed(err) => {
                engine_warn!("Job {job_id}: transport failed: {err}");
                self.close_transport();
                self.dispatch(Msg::TransportFailed {
                    job_id,
                    failure: err.into(),
                });
            }
            SourceItem::Closed => {
                engine_debug!("Job {job_id}: transport closed");
                self.close_transport();
                self.dispatch(Msg::TransportClosed { job_id });
            }
        }
    }

    fn close_transport(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.source.close();
        }
    }
}

/// Next item or watchdog expiry of the active transport; pending when idle.
async fn next_signal(active: &mut Option<ActiveTransport>) -> (JobId, Signal) {
    let Some(active) = active.as_mut() else {
        return std::future::pending().await;
    };
    let job_id = active.job_id;
    tokio::select! {
        item = active.source.next() => (job_id, Signal::Item(item)),
        _ = tokio::time::sleep_until(active.deadline) => (job_id, Signal::Stalled),
    }
}
