/// Canonical progress event, independent of the backend revision that produced it.
///
/// Optional fields stay `None` when the wire payload did not carry them, so a
/// consumer can tell "no new information" apart from an explicit zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanonicalEvent {
    JobStart {
        message: Option<String>,
    },
    ItemBegin {
        pollutant: Option<String>,
        message: Option<String>,
    },
    ItemProgress {
        pollutant: Option<String>,
        /// Per-item percent, already clamped to `0..=100`.
        percent: Option<u8>,
        /// Job-level percent reported by the backend.
        overall: Option<u8>,
        message: Option<String>,
    },
    ItemDone {
        pollutant: Option<String>,
        overall: Option<u8>,
        message: Option<String>,
    },
    JobComplete {
        message: Option<String>,
    },
    JobError {
        message: Option<String>,
    },
    /// A status this client does not recognise. Applied as a no-op.
    Unknown {
        status: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    JobStart,
    ItemBegin,
    ItemProgress,
    ItemDone,
    JobComplete,
    JobError,
    Unknown,
}

impl CanonicalEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            CanonicalEvent::JobStart { .. } => EventKind::JobStart,
            CanonicalEvent::ItemBegin { .. } => EventKind::ItemBegin,
            CanonicalEvent::ItemProgress { .. } => EventKind::ItemProgress,
            CanonicalEvent::ItemDone { .. } => EventKind::ItemDone,
            CanonicalEvent::JobComplete { .. } => EventKind::JobComplete,
            CanonicalEvent::JobError { .. } => EventKind::JobError,
            CanonicalEvent::Unknown { .. } => EventKind::Unknown,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CanonicalEvent::JobComplete { .. } | CanonicalEvent::JobError { .. }
        )
    }

    /// True when the event carries measured progress (item activity, a
    /// percentage, or a terminal status) rather than only an announcement.
    pub fn carries_progress(&self) -> bool {
        match self {
            CanonicalEvent::JobStart { .. } | CanonicalEvent::Unknown { .. } => false,
            CanonicalEvent::ItemBegin { pollutant, .. } => pollutant.is_some(),
            CanonicalEvent::ItemProgress {
                pollutant,
                percent,
                overall,
                ..
            } => pollutant.is_some() || percent.is_some() || overall.is_some(),
            CanonicalEvent::ItemDone {
                pollutant, overall, ..
            } => pollutant.is_some() || overall.is_some(),
            CanonicalEvent::JobComplete { .. } | CanonicalEvent::JobError { .. } => true,
        }
    }

    /// Human-readable message carried by the event, passed through verbatim.
    pub fn message(&self) -> Option<&str> {
        match self {
            CanonicalEvent::JobStart { message }
            | CanonicalEvent::ItemBegin { message, .. }
            | CanonicalEvent::ItemProgress { message, .. }
            | CanonicalEvent::ItemDone { message, .. }
            | CanonicalEvent::JobComplete { message }
            | CanonicalEvent::JobError { message } => message.as_deref(),
            CanonicalEvent::Unknown { .. } => None,
        }
    }
}
