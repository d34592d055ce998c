use std::collections::HashMap;

use airq_core::{
    ClientView, ItemStatus, JobView, Notice, Outcome, ServerSnapshot, SubItemProgress,
    UploadProgress,
};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

const OVERALL_TEMPLATE: &str = "{prefix:>8} [{bar:40.cyan/blue}] {pos:>3}% {wide_msg}";
const ITEM_TEMPLATE: &str = "{prefix:>8} [{bar:40.green/white}] {pos:>3}% {msg}";

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

pub fn status_label(status: ItemStatus) -> &'static str {
    match status {
        ItemStatus::Pending => "pending",
        ItemStatus::Active => "active",
        ItemStatus::Done => "done",
    }
}

pub fn item_line(item: &SubItemProgress) -> String {
    format!("{:<6} {:>3}% {}", item.name, item.percent, status_label(item.status))
}

/// Overall percent, marked when it is a local estimate.
pub fn overall_label(job: &JobView) -> String {
    if job.overall_estimated {
        format!("~{}% (estimated)", job.overall_percent)
    } else {
        format!("{}%", job.overall_percent)
    }
}

pub fn notice_line(notice: &Notice) -> String {
    let label = match notice.outcome {
        Outcome::Completed => "completed",
        Outcome::Failed => "failed",
        Outcome::Cancelled => "cancelled",
        Outcome::Uploaded => "uploaded",
        Outcome::UploadFailed => "upload failed",
    };
    format!("{label}: {}", notice.message)
}

pub fn snapshot_lines(snapshot: &ServerSnapshot) -> Vec<String> {
    let yes_no = |flag: bool| if flag { "yes" } else { "no" };
    let info = &snapshot.info;
    let mut lines = vec![
        format!("dataset rows:       {}", snapshot.dataset_rows),
        format!("rows (info):        {}", info.total_data),
        format!(
            "outliers:           {} ({})",
            snapshot.outlier_count,
            if info.outlier_clear { "clear" } else { "pending" }
        ),
        format!(
            "missing values:     {}",
            if info.nan_clear { "clear" } else { "pending" }
        ),
        format!("basic forecast:     {}", yes_no(snapshot.availability.basic)),
        format!("advanced forecast:  {}", yes_no(snapshot.availability.advanced)),
    ];
    if let Some(count) = info.nan_count {
        lines.insert(4, format!("missing count:      {count}"));
    }
    lines
}

/// Terminal progress for one forecast job: an overall bar plus one bar per pollutant.
pub struct JobRenderer {
    bars: MultiProgress,
    overall: ProgressBar,
    items: HashMap<String, ProgressBar>,
    last: Option<JobView>,
}

impl JobRenderer {
    pub fn new(label: &str) -> Self {
        let bars = MultiProgress::new();
        let overall = bars.add(ProgressBar::new(100));
        overall.set_style(style(OVERALL_TEMPLATE));
        overall.set_prefix(label.to_string());
        Self {
            bars,
            overall,
            items: HashMap::new(),
            last: None,
        }
    }

    pub fn update(&mut self, view: &ClientView) {
        let Some(job) = view.job.as_ref() else {
            return;
        };
        self.overall.set_position(u64::from(job.overall_percent));
        let mut message = job.message.clone().unwrap_or_default();
        if job.overall_estimated {
            message = format!("{message} (estimated)").trim().to_string();
        }
        self.overall.set_message(message);

        for item in &job.items {
            let bar = self.items.entry(item.name.clone()).or_insert_with(|| {
                let bar = self.bars.add(ProgressBar::new(100));
                bar.set_style(style(ITEM_TEMPLATE));
                bar.set_prefix(item.name.clone());
                bar
            });
            bar.set_position(u64::from(item.percent));
            bar.set_message(status_label(item.status));
        }
        self.last = Some(job.clone());
    }

    pub fn finish(&self, notice: &Notice) {
        for bar in self.items.values() {
            bar.finish();
        }
        match notice.outcome {
            Outcome::Completed | Outcome::Uploaded => {
                self.overall.finish_with_message(notice.message.clone())
            }
            _ => self.overall.abandon_with_message(notice.message.clone()),
        }
        let _ = self.bars.println(notice_line(notice));
        if let Some(job) = &self.last {
            let _ = self.bars.println(format!("overall {}", overall_label(job)));
            for item in &job.items {
                let _ = self.bars.println(format!("  {}", item_line(item)));
            }
        }
    }
}

pub struct UploadRenderer {
    bar: ProgressBar,
}

impl UploadRenderer {
    pub fn new(file_name: &str) -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(style(OVERALL_TEMPLATE));
        bar.set_prefix("upload");
        bar.set_message(file_name.to_string());
        Self { bar }
    }

    pub fn update(&self, upload: Option<&UploadProgress>) {
        if let Some(upload) = upload {
            self.bar.set_position(u64::from(upload.percent));
        }
    }

    pub fn finish(&self, notice: &Notice) {
        match notice.outcome {
            Outcome::Uploaded => self.bar.finish_with_message(notice_line(notice)),
            _ => self.bar.abandon_with_message(notice_line(notice)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airq_core::{DatasetInfo, ForecastAvailability, JobKind, JobState};
    use pretty_assertions::assert_eq;

    fn job(overall: u8, estimated: bool) -> JobView {
        JobView {
            id: 1,
            kind: JobKind::Advanced,
            state: JobState::Running,
            started_at: Default::default(),
            items: Vec::new(),
            overall_percent: overall,
            overall_estimated: estimated,
            message: None,
            failure: None,
        }
    }

    #[test]
    fn estimated_overall_is_marked() {
        assert_eq!(overall_label(&job(40, false)), "40%");
        assert_eq!(overall_label(&job(40, true)), "~40% (estimated)");
    }

    #[test]
    fn item_line_is_aligned() {
        let item = SubItemProgress {
            name: "so2".to_string(),
            percent: 7,
            status: ItemStatus::Active,
        };
        assert_eq!(item_line(&item), "so2      7% active");
    }

    #[test]
    fn notice_line_names_the_outcome() {
        let notice = Notice {
            subject: 3,
            outcome: Outcome::UploadFailed,
            message: "Missing column pm10".to_string(),
        };
        assert_eq!(notice_line(&notice), "upload failed: Missing column pm10");
    }

    #[test]
    fn snapshot_lines_include_nan_count_when_known() {
        let snapshot = ServerSnapshot {
            dataset_rows: 10,
            info: DatasetInfo {
                total_data: 10,
                outlier_clear: true,
                nan_clear: false,
                outlier_count: None,
                nan_count: Some(2),
            },
            outlier_count: 0,
            availability: ForecastAvailability {
                basic: true,
                advanced: false,
            },
        };
        let lines = snapshot_lines(&snapshot);
        assert_eq!(lines.len(), 7);
        assert_eq!(lines[2], "outliers:           0 (clear)");
        assert_eq!(lines[4], "missing count:      2");
        assert_eq!(lines[6], "advanced forecast:  no");
    }
}
