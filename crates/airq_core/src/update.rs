use chrono::{DateTime, Utc};

use crate::{
    validate_upload_name, CanonicalEvent, ClientState, Effect, Failure, FailureKind, Job, JobId,
    JobKind, JobState, Msg, Notice, Outcome, ReconcileTrigger, Rejection, UploadProgress,
};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: ClientState, msg: Msg) -> (ClientState, Vec<Effect>) {
    let effects = match msg {
        Msg::UploadRequested { file_name } => request_upload(&mut state, file_name),
        Msg::UploadProgress { upload_id, percent } => {
            let mut changed = false;
            if state.phase() == JobState::Uploading {
                if let Some(upload) = state.upload_mut().filter(|u| u.id == upload_id) {
                    let next = upload.percent.max(percent.min(100));
                    changed = next != upload.percent;
                    upload.percent = next;
                }
            }
            if changed {
                state.mark_dirty();
            }
            Vec::new()
        }
        Msg::UploadFinished { upload_id, result } => finish_upload(&mut state, upload_id, result),
        Msg::StartRequested { kind, at } => start_job(&mut state, kind, at),
        Msg::CancelRequested => cancel(&mut state),
        Msg::TransportEvent { job_id, event } => apply_event(&mut state, job_id, event),
        Msg::EstimatedProgress { job_id, percent } => {
            if state.is_live_job(job_id) {
                if let Some(job) = state.job_mut() {
                    job.tracker.estimate(percent);
                }
                state.mark_dirty();
            }
            Vec::new()
        }
        Msg::ProtocolViolation { job_id, .. } => {
            if state.is_live_job(job_id) {
                state.record_protocol_error();
                state.mark_dirty();
            }
            Vec::new()
        }
        Msg::TransportFailed { job_id, failure } => {
            if state.is_live_job(job_id) {
                fail(&mut state, failure)
            } else if state.phase() == JobState::Cancelling && state.is_current_job(job_id) {
                finish(&mut state, JobState::Cancelled, "Forecast cancelled.".to_string())
            } else {
                Vec::new()
            }
        }
        Msg::TransportClosed { job_id } => {
            if state.phase() == JobState::Cancelling && state.is_current_job(job_id) {
                finish(&mut state, JobState::Cancelled, "Forecast cancelled.".to_string())
            } else if state.is_live_job(job_id) {
                fail(
                    &mut state,
                    Failure::new(
                        FailureKind::StreamEnded,
                        "Connection closed before the job finished.",
                    ),
                )
            } else {
                Vec::new()
            }
        }
        Msg::ResetElapsed { job_id } => {
            if state.phase().is_terminal() && state.is_current_job(job_id) {
                state.set_job(None);
                state.set_phase(JobState::Idle);
            }
            Vec::new()
        }
        Msg::Reconciled {
            subject,
            request,
            result,
        } => {
            // A slower, older refresh must not overwrite a newer snapshot.
            if state.accept_refresh(request) {
                match (subject, result) {
                    (subject, Ok(snapshot)) => state.set_server(subject, snapshot),
                    (Some(subject), Err(error)) => state.set_reconcile_error(subject, error),
                    // The caller already received the error from `refresh`.
                    (None, Err(_)) => {}
                }
            }
            Vec::new()
        }
    };

    (state, effects)
}

fn request_upload(state: &mut ClientState, file_name: String) -> Vec<Effect> {
    if let Err(reason) = validate_upload_name(&file_name, &state.settings().accepted_extensions) {
        return vec![Effect::Reject(Rejection::InvalidInput(reason))];
    }
    if state.phase() != JobState::Idle {
        return vec![Effect::Reject(Rejection::Busy(state.phase()))];
    }

    let upload_id = state.allocate_id();
    state.set_upload(Some(UploadProgress {
        id: upload_id,
        file_name,
        percent: 0,
    }));
    state.set_phase(JobState::Uploading);
    vec![Effect::StartUpload { upload_id }]
}

fn finish_upload(
    state: &mut ClientState,
    upload_id: JobId,
    result: Result<Option<String>, Failure>,
) -> Vec<Effect> {
    let is_current = state.phase() == JobState::Uploading
        && state.upload().is_some_and(|upload| upload.id == upload_id);
    if !is_current {
        return Vec::new();
    }
    state.set_phase(JobState::Idle);

    match result {
        Ok(message) => {
            if let Some(upload) = state.upload_mut() {
                upload.percent = 100;
            }
            let notice = Notice {
                subject: upload_id,
                outcome: Outcome::Uploaded,
                message: message.unwrap_or_else(|| "File uploaded successfully!".to_string()),
            };
            state.set_notice(notice.clone());
            let mut effects = vec![Effect::Announce(notice)];
            if state
                .guard_mut()
                .try_fire(upload_id, ReconcileTrigger::Uploaded)
            {
                effects.push(Effect::Reconcile {
                    subject: upload_id,
                    trigger: ReconcileTrigger::Uploaded,
                });
            }
            effects
        }
        Err(failure) => {
            let notice = Notice {
                subject: upload_id,
                outcome: Outcome::UploadFailed,
                message: failure.message,
            };
            state.set_notice(notice.clone());
            vec![Effect::Announce(notice)]
        }
    }
}

fn start_job(state: &mut ClientState, kind: JobKind, at: DateTime<Utc>) -> Vec<Effect> {
    if state.phase() != JobState::Idle {
        return vec![Effect::Reject(Rejection::Busy(state.phase()))];
    }
    let job_id = state.allocate_id();
    state.set_job(Some(Job::new(job_id, kind, at)));
    state.set_phase(JobState::Running);
    vec![Effect::OpenTransport { job_id, kind }]
}

fn cancel(state: &mut ClientState) -> Vec<Effect> {
    match state.phase() {
        JobState::Uploading => {
            let Some(upload_id) = state.upload().map(|upload| upload.id) else {
                return Vec::new();
            };
            state.set_phase(JobState::Idle);
            let notice = Notice {
                subject: upload_id,
                outcome: Outcome::Cancelled,
                message: "Upload cancelled.".to_string(),
            };
            state.set_notice(notice.clone());
            vec![Effect::AbortUpload { upload_id }, Effect::Announce(notice)]
        }
        JobState::Running => {
            let Some(job_id) = state.job().map(|job| job.id) else {
                return Vec::new();
            };
            state.set_phase(JobState::Cancelling);
            vec![Effect::CloseTransport { job_id }]
        }
        // Cancelling, terminal and idle states: nothing to cancel.
        _ => Vec::new(),
    }
}

fn apply_event(state: &mut ClientState, job_id: JobId, event: CanonicalEvent) -> Vec<Effect> {
    if !state.is_live_job(job_id) {
        return Vec::new();
    }
    let message = event.message().map(str::to_string);

    match event {
        CanonicalEvent::Unknown { .. } => Vec::new(),
        CanonicalEvent::JobComplete { .. } => {
            let kind = match state.job_mut() {
                Some(job) => {
                    job.tracker.complete();
                    if message.is_some() {
                        job.message = message.clone();
                    }
                    job.kind
                }
                None => return Vec::new(),
            };
            let text = message.unwrap_or_else(|| format!("All {kind} forecasts completed."));
            finish(state, JobState::Completed, text)
        }
        CanonicalEvent::JobError { .. } => fail(
            state,
            Failure::new(
                FailureKind::Backend,
                message.unwrap_or_else(|| "The backend reported an error.".to_string()),
            ),
        ),
        progress => {
            if let Some(job) = state.job_mut() {
                apply_progress(job, progress);
                if message.is_some() {
                    job.message = message;
                }
            }
            state.mark_dirty();
            Vec::new()
        }
    }
}

fn apply_progress(job: &mut Job, event: CanonicalEvent) {
    match event {
        CanonicalEvent::ItemBegin {
            pollutant: Some(pollutant),
            ..
        } => job.tracker.begin(&pollutant),
        CanonicalEvent::ItemProgress {
            pollutant,
            percent,
            overall,
            ..
        } => job.tracker.progress(pollutant.as_deref(), percent, overall),
        CanonicalEvent::ItemDone {
            pollutant, overall, ..
        } => job.tracker.done(pollutant.as_deref(), overall),
        _ => {}
    }
}

fn fail(state: &mut ClientState, failure: Failure) -> Vec<Effect> {
    let message = failure.message.clone();
    if let Some(job) = state.job_mut() {
        job.failure = Some(failure);
    }
    finish(state, JobState::Failed, message)
}

fn finish(state: &mut ClientState, terminal: JobState, message: String) -> Vec<Effect> {
    let Some(job_id) = state.job().map(|job| job.id) else {
        return Vec::new();
    };
    let (outcome, trigger) = match terminal {
        JobState::Completed => (Outcome::Completed, ReconcileTrigger::Completed),
        JobState::Failed => (Outcome::Failed, ReconcileTrigger::Failed),
        _ => (Outcome::Cancelled, ReconcileTrigger::Cancelled),
    };
    state.set_phase(terminal);

    let notice = Notice {
        subject: job_id,
        outcome,
        message,
    };
    state.set_notice(notice.clone());

    let mut effects = Vec::with_capacity(4);
    if terminal != JobState::Cancelled {
        effects.push(Effect::CloseTransport { job_id });
    }
    effects.push(Effect::Announce(notice));
    if state.guard_mut().try_fire(job_id, trigger) {
        effects.push(Effect::Reconcile {
            subject: job_id,
            trigger,
        });
    }
    effects.push(Effect::ScheduleReset { job_id });
    effects
}
