//! AirQ core: pure job state machine, progress normalization and view-model helpers.
//!
//! Nothing in this crate performs IO. The engine crate feeds [`Msg`] values
//! into [`update`] and executes the returned [`Effect`]s.
mod effect;
mod event;
mod msg;
mod normalize;
mod reconcile;
mod state;
mod tracker;
mod update;
mod upload;
mod view_model;

pub use effect::{Effect, Rejection};
pub use event::{CanonicalEvent, EventKind};
pub use msg::Msg;
pub use normalize::{normalize, ProtocolError};
pub use reconcile::{
    DatasetInfo, ForecastAvailability, ReconcileGuard, ReconcileTrigger, ServerSnapshot,
};
pub use state::{
    ClientState, CoreSettings, Failure, FailureKind, Job, JobId, JobKind, JobState, Notice,
    Outcome,
};
pub use tracker::{ItemStatus, MultiItemTracker, OverallSource, SubItemProgress};
pub use update::update;
pub use upload::{validate_upload_name, UploadProgress};
pub use view_model::{ClientView, JobView};
