//! The janitor (SPEC_FULL §4.15): a periodic sweep with the two
//! responsibilities `original_source/workers/cleanup_worker.py` gives its
//! `CleanupWorker` — `cleanup_old_tasks` (terminal task-row deletion) and
//! `cleanup_orphaned_files` (mtime-based reclaim of the coordinator's
//! working directories, independent of task status). Spec.md only names
//! the janitor in passing ("...leaves a working directory that the
//! janitor reclaims...", §5); both responsibilities are carried here so
//! that claim stays true for a coordinator that crashes mid-run and never
//! reaches its own `remove_dir_all` cleanup.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::capability::StateStore;
use crate::domain::TaskStatus;

#[derive(Debug, Clone)]
pub struct JanitorConfig {
    pub retention: chrono::Duration,
    pub sweep_interval: Duration,
    /// How many rows `list` pages through per sweep iteration.
    pub page_size: i64,
    /// The coordinator's `CoordinatorConfig::work_root` (spec §3's
    /// exclusively-owned `ArchiveSnapshot` directory). `None` skips the
    /// orphaned-directory sweep entirely — useful for state-store-only
    /// deployments that never run a coordinator against this filesystem.
    pub work_root: Option<PathBuf>,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        JanitorConfig {
            retention: chrono::Duration::days(7),
            sweep_interval: Duration::from_secs(3600),
            page_size: 500,
            work_root: None,
        }
    }
}

pub struct Janitor {
    state_store: Arc<dyn StateStore>,
    config: JanitorConfig,
}

impl Janitor {
    pub fn new(state_store: Arc<dyn StateStore>, config: JanitorConfig) -> Self {
        Janitor { state_store, config }
    }

    /// Runs sweeps forever, sleeping `sweep_interval` between them. Intended
    /// to be the body of the `rwxl-cli janitor` subcommand.
    pub async fn run_forever(&self) -> Result<()> {
        loop {
            if let Err(e) = self.sweep_tasks().await {
                warn!(error = %e, "janitor task sweep failed");
            }
            if let Err(e) = self.sweep_orphaned_work_dirs().await {
                warn!(error = %e, "janitor orphaned-directory sweep failed");
            }
            tokio::time::sleep(self.config.sweep_interval).await;
        }
    }

    /// One pass: pages through all tasks (newest first) and deletes every
    /// terminal one whose `completed_at` is older than the retention window.
    /// Never touches a non-terminal task.
    pub async fn sweep_tasks(&self) -> Result<usize> {
        let cutoff = Utc::now() - self.config.retention;
        let mut deleted = 0usize;
        let mut offset = 0i64;
        loop {
            let page = self.state_store.list(self.config.page_size, offset).await?;
            if page.is_empty() {
                break;
            }
            for task in &page {
                let is_terminal = matches!(task.status, TaskStatus::Completed | TaskStatus::Failed);
                let expired = task.completed_at.is_some_and(|at| at < cutoff);
                if is_terminal && expired {
                    self.state_store.delete(task.task_id).await?;
                    info!(task_id = %task.task_id, completed_at = ?task.completed_at, "janitor deleted expired task");
                    deleted += 1;
                } else {
                    debug!(task_id = %task.task_id, "janitor skipped non-expired or non-terminal task");
                }
            }
            offset += page.len() as i64;
        }
        Ok(deleted)
    }

    /// Reclaims entries directly under `work_root` whose mtime is older than
    /// the retention window, regardless of whether any task row still
    /// references them — a coordinator that panics or is killed mid-run
    /// never reaches its own `remove_dir_all`, so this is the only thing
    /// that eventually frees that disk. A no-op if `work_root` is `None` or
    /// does not exist.
    pub async fn sweep_orphaned_work_dirs(&self) -> Result<usize> {
        let Some(work_root) = &self.config.work_root else {
            return Ok(0);
        };
        if tokio::fs::metadata(work_root).await.is_err() {
            return Ok(0);
        }

        let cutoff = SystemTime::now()
            .checked_sub(
                self.config
                    .retention
                    .to_std()
                    .context("janitor retention duration out of range")?,
            )
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let mut deleted = 0usize;
        let mut entries = tokio::fs::read_dir(work_root)
            .await
            .with_context(|| format!("reading work_root {}", work_root.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "janitor could not stat work_root entry, skipping");
                    continue;
                }
            };
            let modified = match metadata.modified() {
                Ok(m) => m,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "janitor could not read mtime, skipping");
                    continue;
                }
            };
            if modified >= cutoff {
                debug!(path = %path.display(), "janitor skipped non-expired work_root entry");
                continue;
            }

            let result = if metadata.is_dir() {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };
            match result {
                Ok(()) => {
                    info!(path = %path.display(), "janitor deleted orphaned work directory");
                    deleted += 1;
                }
                Err(e) => warn!(path = %path.display(), error = %e, "janitor failed to delete orphaned entry"),
            }
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::TaskPatch;
    use crate::domain::Task;
    use crate::state_store::InMemoryStateStore;
    use uuid::Uuid;

    async fn make_terminal_task(store: &InMemoryStateStore, completed_at: chrono::DateTime<Utc>) -> Uuid {
        let task = Task {
            completed_at: Some(completed_at),
            status: TaskStatus::Completed,
            ..Task::new_pending(Uuid::new_v4(), "s3://b/k", "b", "k", "zh", "", completed_at)
        };
        let id = task.task_id;
        store.create(task).await.unwrap();
        id
    }

    #[tokio::test]
    async fn deletes_only_expired_terminal_tasks() {
        let store = Arc::new(InMemoryStateStore::new());
        let old_id = make_terminal_task(&store, Utc::now() - chrono::Duration::days(30)).await;
        let recent_id = make_terminal_task(&store, Utc::now()).await;

        let pending = Task::new_pending(Uuid::new_v4(), "s3://b/k", "b", "k", "zh", "", Utc::now() - chrono::Duration::days(30));
        let pending_id = pending.task_id;
        store.create(pending).await.unwrap();

        let janitor = Janitor::new(store.clone() as Arc<dyn StateStore>, JanitorConfig::default());
        let deleted = janitor.sweep_tasks().await.unwrap();

        assert_eq!(deleted, 1);
        assert!(store.get(old_id).await.unwrap().is_none());
        assert!(store.get(recent_id).await.unwrap().is_some());
        assert!(store.get(pending_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn non_terminal_task_is_never_deleted_regardless_of_age() {
        let store = Arc::new(InMemoryStateStore::new());
        let task = Task::new_pending(Uuid::new_v4(), "s3://b/k", "b", "k", "zh", "", Utc::now() - chrono::Duration::days(365));
        let id = task.task_id;
        store.create(task).await.unwrap();
        store
            .update(id, TaskStatus::Preparing, TaskPatch::default())
            .await
            .unwrap();

        let janitor = Janitor::new(store.clone() as Arc<dyn StateStore>, JanitorConfig::default());
        let deleted = janitor.sweep_tasks().await.unwrap();
        assert_eq!(deleted, 0);
        assert!(store.get(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn orphaned_directory_older_than_retention_is_reclaimed() {
        let root = tempfile::tempdir().unwrap();
        let old_dir = root.path().join("stale-task");
        tokio::fs::create_dir(&old_dir).await.unwrap();
        // Retention shorter than the sleep below, so `old_dir`'s mtime (set
        // at creation) is already past the cutoff by the time we sweep.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let store = Arc::new(InMemoryStateStore::new());
        let janitor = Janitor::new(
            store as Arc<dyn StateStore>,
            JanitorConfig {
                retention: chrono::Duration::milliseconds(1),
                work_root: Some(root.path().to_path_buf()),
                ..JanitorConfig::default()
            },
        );

        let deleted = janitor.sweep_orphaned_work_dirs().await.unwrap();
        assert_eq!(deleted, 1);
        assert!(tokio::fs::metadata(&old_dir).await.is_err());
    }

    #[tokio::test]
    async fn fresh_directory_within_retention_is_kept() {
        let root = tempfile::tempdir().unwrap();
        let fresh_dir = root.path().join("fresh-task");
        tokio::fs::create_dir(&fresh_dir).await.unwrap();

        let store = Arc::new(InMemoryStateStore::new());
        let janitor = Janitor::new(
            store as Arc<dyn StateStore>,
            JanitorConfig {
                work_root: Some(root.path().to_path_buf()),
                ..JanitorConfig::default()
            },
        );

        let deleted = janitor.sweep_orphaned_work_dirs().await.unwrap();
        assert_eq!(deleted, 0);
        assert!(tokio::fs::metadata(&fresh_dir).await.is_ok());
    }

    #[tokio::test]
    async fn missing_work_root_is_a_no_op() {
        let store = Arc::new(InMemoryStateStore::new());
        let janitor = Janitor::new(
            store as Arc<dyn StateStore>,
            JanitorConfig {
                work_root: Some(PathBuf::from("/nonexistent/rwxl-work-root")),
                ..JanitorConfig::default()
            },
        );
        assert_eq!(janitor.sweep_orphaned_work_dirs().await.unwrap(), 0);
    }
}
