use crate::JobId;

/// Terminal transition that requested a refresh of server-derived state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReconcileTrigger {
    Completed,
    Failed,
    Cancelled,
    Uploaded,
}

/// Makes sure duplicate terminal signals for the same job never refresh twice.
///
/// Ids are allocated in increasing order and only the newest subject can
/// reach a terminal state, so the last fired key is all that is kept. Keys
/// for older subjects count as already fired.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReconcileGuard {
    last: Option<(JobId, ReconcileTrigger)>,
}

impl ReconcileGuard {
    /// Returns true exactly once per `(subject, trigger)`.
    pub fn try_fire(&mut self, subject: JobId, trigger: ReconcileTrigger) -> bool {
        if self.has_fired(subject, trigger) {
            return false;
        }
        self.last = Some((subject, trigger));
        true
    }

    pub fn has_fired(&self, subject: JobId, trigger: ReconcileTrigger) -> bool {
        match self.last {
            Some((last_subject, last_trigger)) => {
                subject < last_subject || (subject == last_subject && trigger == last_trigger)
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DatasetInfo {
    pub total_data: u64,
    pub outlier_clear: bool,
    pub nan_clear: bool,
    pub outlier_count: Option<u64>,
    pub nan_count: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ForecastAvailability {
    pub basic: bool,
    pub advanced: bool,
}

/// Authoritative server state fetched after a job or upload finishes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServerSnapshot {
    pub dataset_rows: usize,
    pub info: DatasetInfo,
    pub outlier_count: usize,
    pub availability: ForecastAvailability,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_fires_once_per_key() {
        let mut guard = ReconcileGuard::default();
        assert!(!guard.has_fired(1, ReconcileTrigger::Completed));
        assert!(guard.try_fire(1, ReconcileTrigger::Completed));
        assert!(!guard.try_fire(1, ReconcileTrigger::Completed));
        assert!(!guard.has_fired(1, ReconcileTrigger::Failed));
        assert!(guard.try_fire(2, ReconcileTrigger::Uploaded));
        assert!(guard.has_fired(2, ReconcileTrigger::Uploaded));
    }

    #[test]
    fn guard_keeps_only_the_latest_key() {
        let mut guard = ReconcileGuard::default();
        for id in 1..=1_000 {
            assert!(guard.try_fire(id, ReconcileTrigger::Completed));
        }
        assert_eq!(guard.last, Some((1_000, ReconcileTrigger::Completed)));
        assert!(!guard.try_fire(999, ReconcileTrigger::Failed));
        assert!(guard.has_fired(3, ReconcileTrigger::Cancelled));
    }
}
