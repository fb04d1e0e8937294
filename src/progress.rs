//! Progress Tracking
//!
//! Status messages for long-running work, written to stderr. A tracker may
//! carry stages whose completion is decided by filter predicates evaluated
//! against each polled operation. A bar shows the completed fraction of a
//! known amount of work.

use crate::console::Console;
use crate::projection::filter::Filter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};

/// Final state of a tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgressStatus {
    Success,
    Failure,
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Pending,
    Done,
    Failed,
}

impl StageStatus {
    pub fn icon(&self) -> &'static str {
        match self {
            Self::Pending => "◯",
            Self::Done => "✓",
            Self::Failed => "✗",
        }
    }
}

/// Which element produced a [`ProgressEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressKind {
    Tracker,
    Bar,
}

/// Record of a finished tracker or bar, kept for session capture and scenario checks
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub kind: ProgressKind,
    pub message: String,
    pub status: ProgressStatus,
    pub stages: Vec<String>,
    pub duration: Duration,
}

/// A stage and the predicate that marks it complete
#[derive(Debug, Clone)]
pub struct Stage {
    pub key: String,
    pub header: String,
    pub complete_when: Option<Filter>,
}

impl Stage {
    pub fn new(key: &str, header: &str) -> Self {
        Self {
            key: key.to_string(),
            header: header.to_string(),
            complete_when: None,
        }
    }

    pub fn completed_by(mut self, filter: Filter) -> Self {
        self.complete_when = Some(filter);
        self
    }
}

pub struct ProgressTracker {
    console: Console,
    message: String,
    stages: Vec<(Stage, StageStatus)>,
    started: Instant,
}

impl ProgressTracker {
    pub fn start(console: &Console, message: &str, stages: Vec<Stage>) -> Self {
        let header = if stages.is_empty() {
            format!("{message}...")
        } else {
            format!("{message}...\n")
        };
        if let Err(e) = console.write_err(&header) {
            tracing::warn!("Failed to write progress: {}", e);
        }
        Self {
            console: console.clone(),
            message: message.to_string(),
            stages: stages.into_iter().map(|s| (s, StageStatus::Pending)).collect(),
            started: Instant::now(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Complete every pending stage whose predicate holds for `resource`
    pub fn observe(&mut self, resource: &Value) {
        let ready: Vec<String> = self
            .stages
            .iter()
            .filter(|(stage, status)| {
                *status == StageStatus::Pending
                    && stage
                        .complete_when
                        .as_ref()
                        .is_some_and(|f| f.matches(resource))
            })
            .map(|(stage, _)| stage.key.clone())
            .collect();
        for key in ready {
            self.complete_stage(&key);
        }
    }

    pub fn complete_stage(&mut self, key: &str) {
        self.set_stage(key, StageStatus::Done);
    }

    pub fn fail_stage(&mut self, key: &str) {
        self.set_stage(key, StageStatus::Failed);
    }

    fn set_stage(&mut self, key: &str, new_status: StageStatus) {
        let Some((stage, status)) = self.stages.iter_mut().find(|(s, _)| s.key == key) else {
            return;
        };
        if *status != StageStatus::Pending {
            return;
        }
        *status = new_status;
        let suffix = match new_status {
            StageStatus::Done => "done.",
            _ => "failed.",
        };
        self.console
            .status(&format!("  {} {}...{}", new_status.icon(), stage.header, suffix));
    }

    pub fn succeed(mut self) {
        let pending: Vec<String> = self
            .stages
            .iter()
            .filter(|(_, s)| *s == StageStatus::Pending)
            .map(|(s, _)| s.key.clone())
            .collect();
        for key in pending {
            self.complete_stage(&key);
        }
        self.finish(ProgressStatus::Success, "done.");
    }

    pub fn fail(self) {
        self.finish(ProgressStatus::Failure, "failed.");
    }

    pub fn interrupt(self) {
        self.finish(ProgressStatus::Interrupted, "interrupted.");
    }

    fn finish(self, status: ProgressStatus, suffix: &str) {
        if self.stages.is_empty() {
            self.console.status(suffix);
        } else {
            let mut capitalized = suffix.to_string();
            if let Some(first) = capitalized.get_mut(0..1) {
                first.make_ascii_uppercase();
            }
            self.console.status(&capitalized);
        }
        self.console.record_progress(ProgressEvent {
            kind: ProgressKind::Tracker,
            message: self.message,
            status,
            stages: self.stages.into_iter().map(|(s, _)| s.header).collect(),
            duration: self.started.elapsed(),
        });
    }
}

/// Ticks across a progress bar
pub const BAR_WIDTH: usize = 40;

/// Horizontal bar filled left to right as work completes
///
/// ```text
/// +========================================+
/// |= Deleting 3 instances                 =|
/// +==========
/// ```
pub struct ProgressBar {
    console: Console,
    message: String,
    ticks: usize,
    started: Instant,
}

impl ProgressBar {
    pub fn start(console: &Console, message: &str) -> Self {
        let label: String = message.chars().take(BAR_WIDTH - 3).collect();
        let header = format!(
            "+{rule}+\n|= {label:<width$}=|\n+",
            rule = "=".repeat(BAR_WIDTH),
            width = BAR_WIDTH - 3,
        );
        if let Err(e) = console.write_err(&header) {
            tracing::warn!("Failed to write progress: {}", e);
        }
        Self {
            console: console.clone(),
            message: message.to_string(),
            ticks: 0,
            started: Instant::now(),
        }
    }

    /// Advance to `fraction` of the work; the bar never moves backwards
    pub fn set_progress(&mut self, fraction: f64) {
        let target = ((fraction.clamp(0.0, 1.0) * BAR_WIDTH as f64) as usize).min(BAR_WIDTH);
        if target <= self.ticks {
            return;
        }
        if let Err(e) = self.console.write_err(&"=".repeat(target - self.ticks)) {
            tracing::warn!("Failed to write progress: {}", e);
        }
        self.ticks = target;
    }

    pub fn finish(mut self) {
        self.set_progress(1.0);
        self.close(ProgressStatus::Success);
    }

    /// Stop where the bar is, e.g. after an interrupt or failure
    pub fn abandon(self, status: ProgressStatus) {
        self.close(status);
    }

    fn close(self, status: ProgressStatus) {
        if let Err(e) = self.console.write_err("+\n") {
            tracing::warn!("Failed to write progress: {}", e);
        }
        self.console.record_progress(ProgressEvent {
            kind: ProgressKind::Bar,
            message: self.message,
            status,
            stages: Vec::new(),
            duration: self.started.elapsed(),
        });
    }
}

/// Format a duration for display
pub fn duration_display(d: Duration) -> String {
    if d.as_secs() < 1 {
        format!("{}ms", d.as_millis())
    } else if d.as_secs() < 60 {
        format!("{}s", d.as_secs())
    } else {
        format!("{}m{}s", d.as_secs() / 60, d.as_secs() % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_simple_tracker_output() {
        let (console, captured) = Console::captured(&[], false);
        let tracker = ProgressTracker::start(&console, "Creating instance", vec![]);
        tracker.succeed();
        assert_eq!(captured.stderr.contents(), "Creating instance...done.\n");
        let events = console.progress_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, ProgressStatus::Success);
    }

    #[test]
    fn test_stages_complete_from_predicates() {
        let (console, captured) = Console::captured(&[], false);
        let stages = vec![
            Stage::new("provision", "Provisioning")
                .completed_by(Filter::parse("progress>=50").unwrap()),
            Stage::new("boot", "Booting"),
        ];
        let mut tracker = ProgressTracker::start(&console, "Deploying", stages);
        tracker.observe(&json!({"progress": 20}));
        assert!(!captured.stderr.contents().contains("Provisioning"));
        tracker.observe(&json!({"progress": 60}));
        assert!(captured.stderr.contents().contains("Provisioning...done."));
        tracker.fail();
        let err = captured.stderr.contents();
        assert!(err.ends_with("Failed.\n"));
        assert_eq!(console.progress_events()[0].stages, vec!["Provisioning", "Booting"]);
    }

    #[test]
    fn test_bar_fills_monotonically() {
        let (console, captured) = Console::captured(&[], false);
        let mut bar = ProgressBar::start(&console, "Test Action");
        let header = format!(
            "+{}+\n|= Test Action{}=|\n+",
            "=".repeat(40),
            " ".repeat(26)
        );
        assert_eq!(captured.stderr.contents(), header);

        bar.set_progress(0.25);
        assert_eq!(captured.stderr.contents(), format!("{header}{}", "=".repeat(10)));
        bar.set_progress(0.15);
        assert_eq!(captured.stderr.contents(), format!("{header}{}", "=".repeat(10)));
        bar.set_progress(0.49);
        assert_eq!(captured.stderr.contents(), format!("{header}{}", "=".repeat(19)));

        bar.finish();
        assert_eq!(captured.stderr.contents(), format!("{header}{}+\n", "=".repeat(40)));
        let events = console.progress_events();
        assert_eq!(events[0].kind, ProgressKind::Bar);
        assert_eq!(events[0].message, "Test Action");
    }

    #[test]
    fn test_abandoned_bar_records_status() {
        let (console, _) = Console::captured(&[], false);
        let mut bar = ProgressBar::start(&console, "Waiting");
        bar.set_progress(0.5);
        bar.abandon(ProgressStatus::Interrupted);
        assert_eq!(console.progress_events()[0].status, ProgressStatus::Interrupted);
    }

    #[test]
    fn test_duration_display() {
        assert_eq!(duration_display(Duration::from_millis(20)), "20ms");
        assert_eq!(duration_display(Duration::from_secs(75)), "1m15s");
    }
}
