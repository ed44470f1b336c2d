//! Local terminal progress rendering for the coordinator's fan-in poll loop
//! (spec §4.9 step 9), the file-count counterpart to `kvx`'s byte-oriented
//! `ProgressMetrics`.

use indicatif::{ProgressBar, ProgressStyle};
use uuid::Uuid;

/// Tracks one task's fan-in progress as a terminal bar — position is file
/// units completed or failed out of the total fanned out. No bytes/sec here,
/// just files trickling in one worker ack at a time. Draws to stderr, same
/// as `indicatif`'s default target, so it stays out of anything piping the
/// coordinator's stdout.
pub(crate) struct FanInProgress {
    bar: ProgressBar,
}

impl FanInProgress {
    pub(crate) fn new(task_id: Uuid, total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg} [{bar:40.cyan/blue}] {pos}/{len}")
                .expect("hardcoded template string is valid")
                .progress_chars("=>-"),
        );
        bar.set_message(format!("task {task_id}"));
        FanInProgress { bar }
    }

    pub(crate) fn update(&self, completed: usize, failed: usize) {
        self.bar.set_position((completed + failed) as u64);
    }

    pub(crate) fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
