use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-file status recorded in the Completion Registry (component I), the
/// fan-in rendezvous between the file workers and the owning coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileStatus {
    Pending,
    Translating,
    Completed,
    Failed,
}

impl FileStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, FileStatus::Completed | FileStatus::Failed)
    }
}

/// A unit of fan-out work: one translatable file inside one task's
/// working directory. Transient — minted by the coordinator, carried on the
/// `file_translation_tasks` queue, never persisted beyond the message itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileUnit {
    pub task_id: Uuid,
    pub file_id: Uuid,
    /// Relative path inside the extracted tree, forward-slash separated.
    pub file_path: String,
    /// Absolute path to the task's private working directory.
    pub work_dir: String,
    pub translate_style: String,
    pub target_language: String,
}

impl FileUnit {
    /// Joins `work_dir` and `file_path` into an absolute path, normalizing
    /// the relative path's separators for the host platform (spec §4.10 step 2).
    pub fn absolute_path(&self) -> std::path::PathBuf {
        let mut p = std::path::PathBuf::from(&self.work_dir);
        for segment in self.file_path.split('/') {
            p.push(segment);
        }
        p
    }
}
