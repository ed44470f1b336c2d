//! An in-process `StateStore` fake — a `Mutex<HashMap>` standing in for the
//! row lock, used by coordinator tests to drive the state machine without a
//! database (spec §9: "fakes can drive tests without network").

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::capability::{StateStore, TaskPatch};
use crate::domain::{Task, TaskStatus};

#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    tasks: Mutex<HashMap<Uuid, Task>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        InMemoryStateStore::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn create(&self, task: Task) -> Result<()> {
        let mut tasks = self.tasks.lock().unwrap();
        tasks.entry(task.task_id).or_insert(task);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Task>> {
        Ok(self.tasks.lock().unwrap().get(&id).cloned())
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Task>> {
        let mut tasks: Vec<Task> = self.tasks.lock().unwrap().values().cloned().collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tasks
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.tasks.lock().unwrap().remove(&id);
        Ok(())
    }

    async fn update(&self, id: Uuid, to: TaskStatus, patch: TaskPatch) -> Result<Task> {
        let mut tasks = self.tasks.lock().unwrap();
        let current = tasks.get(&id).with_context(|| format!("unknown task: {id}"))?;
        current.status.validate_transition(to)?;

        let now = Utc::now();
        let progress = patch.progress.unwrap_or(current.progress);
        let total_files = patch.total_files.unwrap_or(current.total_files);
        let processed_files = patch.processed_files.unwrap_or(current.processed_files);
        let error_message = match patch.error_message {
            Some(inner) => inner,
            None => current.error_message.clone(),
        };
        let completed_at = if to.is_terminal() {
            Some(now)
        } else if to == TaskStatus::Pending {
            None
        } else {
            current.completed_at
        };

        let updated = Task {
            status: to,
            progress,
            total_files,
            processed_files,
            error_message,
            updated_at: now,
            completed_at,
            ..current.clone()
        };
        tasks.insert(id, updated.clone());
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_task() -> Task {
        Task::new_pending(
            Uuid::new_v4(),
            "s3://src/a.zip",
            "dest-bucket",
            "dest/a.zip",
            "zh-CN",
            "",
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn illegal_transition_is_rejected() {
        let store = InMemoryStateStore::new();
        let task = fresh_task();
        let id = task.task_id;
        store.create(task).await.unwrap();

        let err = store
            .update(id, TaskStatus::Completed, TaskPatch::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid task state transition"));
    }

    #[tokio::test]
    async fn terminal_transition_sets_completed_at() {
        let store = InMemoryStateStore::new();
        let task = fresh_task();
        let id = task.task_id;
        store.create(task).await.unwrap();

        store.update(id, TaskStatus::Preparing, TaskPatch::default()).await.unwrap();
        store.update(id, TaskStatus::Translating, TaskPatch::default()).await.unwrap();
        store.update(id, TaskStatus::Finalizing, TaskPatch::default()).await.unwrap();
        let completed = store
            .update(id, TaskStatus::Completed, TaskPatch::default())
            .await
            .unwrap();
        assert!(completed.completed_at.is_some());
        assert!(completed.check_invariants());
    }

    #[tokio::test]
    async fn retry_resets_progress_and_clears_error() {
        let store = InMemoryStateStore::new();
        let task = fresh_task();
        let id = task.task_id;
        store.create(task).await.unwrap();
        store.update(id, TaskStatus::Preparing, TaskPatch::default()).await.unwrap();
        store
            .update(
                id,
                TaskStatus::Failed,
                TaskPatch {
                    error_message: Some(Some("boom".into())),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let retried = store
            .update(id, TaskStatus::Pending, TaskPatch::retry_reset())
            .await
            .unwrap();
        assert_eq!(retried.progress, 0.0);
        assert_eq!(retried.processed_files, 0);
        assert!(retried.error_message.is_none());
        assert!(retried.completed_at.is_none());
    }
}
