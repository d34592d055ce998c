#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    Pending,
    Active,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubItemProgress {
    pub name: String,
    pub percent: u8,
    pub status: ItemStatus,
}

/// Where the current overall percent came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverallSource {
    /// Rounded mean of the known item percents.
    #[default]
    Items,
    /// A job-level percent reported by the backend.
    Backend,
    /// Locally synthesized by the polling fallback; not a measurement.
    Estimate,
}

/// Per-pollutant progress for one job, plus the derived job-level percent.
///
/// Items appear lazily as events name them; the tracker never assumes a fixed
/// set of pollutants. Items are kept in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MultiItemTracker {
    items: Vec<SubItemProgress>,
    overall: u8,
    source: OverallSource,
}

impl MultiItemTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[SubItemProgress] {
        &self.items
    }

    pub fn item(&self, name: &str) -> Option<&SubItemProgress> {
        self.items.iter().find(|item| item.name == name)
    }

    pub fn overall_percent(&self) -> u8 {
        self.overall
    }

    pub fn source(&self) -> OverallSource {
        self.source
    }

    pub fn is_estimated(&self) -> bool {
        self.source == OverallSource::Estimate
    }

    pub fn begin(&mut self, name: &str) {
        let item = self.entry(name);
        if item.status == ItemStatus::Pending {
            item.status = ItemStatus::Active;
        }
        self.recompute(None);
    }

    /// Applies an `item_progress` tick. The item's percent never decreases.
    pub fn progress(&mut self, name: Option<&str>, percent: Option<u8>, overall: Option<u8>) {
        if let Some(name) = name {
            let item = self.entry(name);
            if item.status != ItemStatus::Done {
                item.status = ItemStatus::Active;
                if let Some(percent) = percent {
                    item.percent = item.percent.max(percent.min(100));
                }
            }
        }
        self.recompute(overall);
    }

    pub fn done(&mut self, name: Option<&str>, overall: Option<u8>) {
        if let Some(name) = name {
            let item = self.entry(name);
            item.percent = 100;
            item.status = ItemStatus::Done;
        }
        self.recompute(overall);
    }

    /// Job completion is authoritative: every item is done, overall is 100.
    pub fn complete(&mut self) {
        for item in &mut self.items {
            item.percent = 100;
            item.status = ItemStatus::Done;
        }
        self.overall = 100;
        self.source = OverallSource::Backend;
    }

    /// Raises the overall percent from the polling fallback. Ignored once the
    /// backend has reported a real percentage, or when measured items are
    /// already ahead of the estimate.
    pub fn estimate(&mut self, percent: u8) {
        let percent = percent.min(100);
        if self.source == OverallSource::Backend || percent <= self.overall {
            return;
        }
        self.overall = percent;
        self.source = OverallSource::Estimate;
    }

    fn entry(&mut self, name: &str) -> &mut SubItemProgress {
        let index = match self.items.iter().position(|item| item.name == name) {
            Some(index) => index,
            None => {
                self.items.push(SubItemProgress {
                    name: name.to_string(),
                    percent: 0,
                    status: ItemStatus::Pending,
                });
                self.items.len() - 1
            }
        };
        &mut self.items[index]
    }

    fn recompute(&mut self, backend: Option<u8>) {
        if let Some(reported) = backend {
            self.overall = self.overall.max(reported.min(100));
            self.source = OverallSource::Backend;
            return;
        }
        let Some(mean) = self.item_mean() else {
            return;
        };
        match self.source {
            OverallSource::Items => self.overall = mean,
            OverallSource::Backend => self.overall = self.overall.max(mean),
            // A measured mean at or above the estimate replaces it.
            OverallSource::Estimate if mean >= self.overall => {
                self.overall = mean;
                self.source = OverallSource::Items;
            }
            OverallSource::Estimate => {}
        }
    }

    fn item_mean(&self) -> Option<u8> {
        if self.items.is_empty() {
            return None;
        }
        let sum: u32 = self.items.iter().map(|item| u32::from(item.percent)).sum();
        let mean = f64::from(sum) / self.items.len() as f64;
        Some(mean.round().min(100.0) as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items_appear_lazily_in_arrival_order() {
        let mut tracker = MultiItemTracker::new();
        tracker.begin("so2");
        tracker.progress(Some("co"), Some(10), None);

        let names: Vec<_> = tracker.items().iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["so2", "co"]);
        assert_eq!(tracker.item("so2").unwrap().status, ItemStatus::Active);
        assert_eq!(tracker.item("co").unwrap().status, ItemStatus::Active);
    }

    #[test]
    fn item_percent_is_a_monotonic_floor() {
        let mut tracker = MultiItemTracker::new();
        for percent in [10, 40, 25, 40, 0, 55] {
            tracker.progress(Some("pm10"), Some(percent), None);
        }
        assert_eq!(tracker.item("pm10").unwrap().percent, 55);
    }

    #[test]
    fn overall_is_the_rounded_item_mean() {
        let mut tracker = MultiItemTracker::new();
        tracker.progress(Some("pm10"), Some(50), None);
        tracker.progress(Some("pm25"), Some(25), None);
        assert_eq!(tracker.overall_percent(), 38);
        assert_eq!(tracker.source(), OverallSource::Items);
    }

    #[test]
    fn backend_percent_wins_but_never_regresses() {
        let mut tracker = MultiItemTracker::new();
        tracker.progress(Some("pm10"), Some(10), Some(60));
        assert_eq!(tracker.overall_percent(), 60);
        tracker.progress(Some("pm10"), Some(20), Some(30));
        assert_eq!(tracker.overall_percent(), 60);
        tracker.progress(Some("pm10"), Some(30), None);
        assert_eq!(tracker.overall_percent(), 60);
    }

    #[test]
    fn done_items_ignore_late_progress() {
        let mut tracker = MultiItemTracker::new();
        tracker.done(Some("o3"), None);
        tracker.progress(Some("o3"), Some(20), None);
        let item = tracker.item("o3").unwrap();
        assert_eq!(item.percent, 100);
        assert_eq!(item.status, ItemStatus::Done);
    }

    #[test]
    fn complete_overrides_partial_state() {
        let mut tracker = MultiItemTracker::new();
        tracker.progress(Some("pm10"), Some(5), None);
        tracker.begin("hc");
        tracker.complete();
        assert_eq!(tracker.overall_percent(), 100);
        assert!(tracker
            .items()
            .iter()
            .all(|i| i.status == ItemStatus::Done && i.percent == 100));
    }

    #[test]
    fn item_mean_clears_the_estimate_once_it_catches_up() {
        let mut tracker = MultiItemTracker::new();
        tracker.estimate(40);
        tracker.progress(Some("pm10"), Some(20), None);
        assert_eq!(tracker.overall_percent(), 40);
        assert!(tracker.is_estimated());

        tracker.progress(Some("pm10"), Some(70), None);
        assert_eq!(tracker.overall_percent(), 70);
        assert_eq!(tracker.source(), OverallSource::Items);
        assert!(!tracker.is_estimated());

        tracker.estimate(50);
        assert_eq!(tracker.overall_percent(), 70);
        assert!(!tracker.is_estimated());
    }

    #[test]
    fn estimates_never_override_backend_values() {
        let mut tracker = MultiItemTracker::new();
        tracker.estimate(30);
        assert_eq!(tracker.overall_percent(), 30);
        assert!(tracker.is_estimated());

        tracker.progress(None, None, Some(20));
        assert_eq!(tracker.overall_percent(), 30);
        assert_eq!(tracker.source(), OverallSource::Backend);

        tracker.estimate(90);
        assert_eq!(tracker.overall_percent(), 30);
        assert!(!tracker.is_estimated());
    }
}
