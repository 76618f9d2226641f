//! Progress tracking and reporting

use indicatif::{ProgressBar, ProgressStyle};

/// Task completion bar shared by every worker thread
///
/// Hidden unless `--progress` was given; cloning shares the same bar.
#[derive(Clone)]
pub struct ProgressTracker {
    progress_bar: ProgressBar,
}

impl ProgressTracker {
    /// Create a bar for `total_tasks` tasks, drawn only when `visible`
    #[must_use]
    pub fn new(total_tasks: usize, visible: bool) -> Self {
        let total = u64::try_from(total_tasks).unwrap_or(u64::MAX);
        let progress_bar = if visible {
            ProgressBar::new(total)
        } else {
            ProgressBar::hidden()
        };
        progress_bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} tasks ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );

        Self { progress_bar }
    }

    /// Record one finished task
    pub fn tick(&self) {
        self.progress_bar.inc(1);
    }

    /// Number of tasks recorded so far
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.progress_bar.position()
    }

    /// Finish the bar with a message naming `scenario`
    pub fn finish(&self, scenario: &str) {
        self.progress_bar.finish_with_message(format!("{scenario} completed"));
    }
}
