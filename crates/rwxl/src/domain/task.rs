use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::TranslateError;

/// The task state machine from spec §4.8. Ordering of variants is
/// non-meaningful; transitions are validated explicitly by [`TaskStatus::can_transition_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    Pending,
    Preparing,
    Translating,
    Finalizing,
    Completed,
    Failed,
}

impl TaskStatus {
    /// True for `Completed` and `Failed` — the two states a task never leaves
    /// except via the explicit retry entry point.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Validates a `self -> next` transition against the allowed set in
    /// spec §4.8. Self-transitions are always a no-op allowed.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        if self == next {
            return true;
        }
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Preparing)
                | (Pending, Failed)
                | (Preparing, Translating)
                | (Preparing, Failed)
                | (Translating, Finalizing)
                | (Translating, Failed)
                | (Finalizing, Completed)
                | (Finalizing, Failed)
                | (Failed, Pending)
        )
    }

    /// Validates the transition, producing the typed error the state store
    /// surfaces on rejection.
    pub fn validate_transition(self, next: TaskStatus) -> Result<(), TranslateError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(TranslateError::InvalidTaskStateTransition {
                from: self,
                to: next,
            })
        }
    }
}

/// One row in the task-state store (component E). Mirrors the persisted
/// columns in spec §6 exactly; `progress` is kept as `f64` in `[0,100]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: Uuid,
    pub s3_source_url: String,
    pub s3_dest_bucket: String,
    pub s3_dest_key: String,
    pub target_language: String,
    pub translate_style: String,
    pub status: TaskStatus,
    pub progress: f64,
    pub total_files: i32,
    pub processed_files: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Builds the `Pending` row a submission creates. `created_at`/`updated_at`
    /// are supplied by the caller (state stores stamp these themselves in
    /// production; tests pass fixed clocks).
    pub fn new_pending(
        task_id: Uuid,
        s3_source_url: impl Into<String>,
        s3_dest_bucket: impl Into<String>,
        s3_dest_key: impl Into<String>,
        target_language: impl Into<String>,
        translate_style: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Task {
            task_id,
            s3_source_url: s3_source_url.into(),
            s3_dest_bucket: s3_dest_bucket.into(),
            s3_dest_key: s3_dest_key.into(),
            target_language: target_language.into(),
            translate_style: translate_style.into(),
            status: TaskStatus::Pending,
            progress: 0.0,
            total_files: 0,
            processed_files: 0,
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// `0 ≤ processed_files ≤ total_files` and `status ∈ {Completed, Failed} ⇔ completed_at.is_some()`,
    /// the two row-level invariants from spec §3. Used by tests and by the
    /// state store as a belt-and-suspenders check after every write.
    pub fn check_invariants(&self) -> bool {
        let files_ok = self.processed_files >= 0
            && self.total_files >= 0
            && self.processed_files <= self.total_files;
        let terminal_ok = self.status.is_terminal() == self.completed_at.is_some();
        files_ok && terminal_ok
    }
}
