//! The five capability traits (spec §9: "components are behind small
//! capability interfaces"). Real backends live under their own modules
//! (`translator::http`, `blob::s3`, `bus::amqp`, `state_store::postgres`,
//! `registry::redis`); fakes for tests sit alongside them, the same way the
//! teacher crate keeps `InMemorySource`/`InMemorySink` next to the real
//! `FileSource`/`ElasticsearchSource` rather than off in a separate tree.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::{FileStatus, Task, TaskStatus};

/// Component B. `translate` is the batch text→text contract from spec §4.3;
/// `analyze_style` backs the coordinator's automatic style-hint derivation
/// (spec §4.9 step 6) and is allowed to be considerably looser about its
/// output shape since the coordinator treats any failure as non-fatal.
#[async_trait]
pub trait Translator: fmt::Debug + Send + Sync {
    async fn translate(
        &self,
        batch: &[String],
        style_hint: &str,
        target_language: &str,
    ) -> Result<Vec<String>>;

    async fn analyze_style(&self, samples: &[String], target_language: &str) -> Result<String>;
}

/// Component C. URLs follow the `s3://bucket/key` schema from spec §4.4.
#[async_trait]
pub trait BlobStore: fmt::Debug + Send + Sync {
    async fn download(&self, url: &str, local: &Path) -> Result<()>;
    async fn upload(&self, local: &Path, bucket: &str, key: &str) -> Result<String>;
    async fn presign_put(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
        content_type: &str,
    ) -> Result<String>;
    async fn presign_get(&self, bucket: &str, key: &str, ttl: Duration) -> Result<String>;
}

/// What a [`Bus`] consumer does with one delivered message. The bus
/// implementation is responsible for turning this into the underlying
/// ack/nack call — callers never see a delivery tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    Ack,
    Nack { requeue: bool },
}

/// A queue consumer. One instance is bound to one queue for the lifetime of
/// a `consume` call (spec §4.9/§4.10 run as long-lived consumers).
#[async_trait]
pub trait MessageHandler: fmt::Debug + Send + Sync {
    async fn handle(&self, payload: Value) -> HandlerOutcome;
}

/// Component F. Two named queues (`translation_tasks`, `file_translation_tasks`)
/// are declared over this trait; `consume` runs until the process is asked to
/// stop (spec §5: suspension only at I/O points, no other cancellation).
#[async_trait]
pub trait Bus: fmt::Debug + Send + Sync {
    async fn declare(&self, queue: &str, durable: bool) -> Result<()>;
    async fn publish(&self, queue: &str, payload: Value, priority: Option<u8>) -> Result<()>;
    async fn consume(
        &self,
        queue: &str,
        prefetch: u16,
        handler: std::sync::Arc<dyn MessageHandler>,
    ) -> Result<()>;
    async fn purge(&self, queue: &str) -> Result<()>;
}

/// The subset of `Task` fields a transition is allowed to touch in one
/// `update` call (spec §4.6's `update(id, fields…)`). `None` leaves a field
/// untouched; `error_message: Some(None)` explicitly clears it (the retry
/// transition does this).
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub progress: Option<f64>,
    pub total_files: Option<i32>,
    pub processed_files: Option<i32>,
    pub error_message: Option<Option<String>>,
}

impl TaskPatch {
    /// The patch applied by the explicit retry entry point (spec §4.8:
    /// `FAILED -> PENDING` "resets progress to 0 and `processed_files` to 0
    /// and clears error").
    pub fn retry_reset() -> Self {
        TaskPatch {
            progress: Some(0.0),
            processed_files: Some(0),
            error_message: Some(None),
            ..Default::default()
        }
    }
}

/// Component E. `update` is the single transactional entry point: it loads
/// the row under lock, validates `status -> to` against [`TaskStatus::can_transition_to`],
/// applies `patch`, bumps `updated_at`, and sets `completed_at` iff `to` is
/// terminal — see spec §4.6.
#[async_trait]
pub trait StateStore: fmt::Debug + Send + Sync {
    async fn create(&self, task: Task) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<Task>>;
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Task>>;
    async fn delete(&self, id: Uuid) -> Result<()>;
    async fn update(&self, id: Uuid, to: TaskStatus, patch: TaskPatch) -> Result<Task>;
}

/// Component I, the fan-in rendezvous. Keys are `(task_id, file_id)` per
/// spec §6; `ttl` is applied on every write (workers re-stamp it on each
/// status transition, same as the source's TTL-refresh-on-write behavior).
#[async_trait]
pub trait Registry: fmt::Debug + Send + Sync {
    async fn set_file_status(
        &self,
        task_id: Uuid,
        file_id: Uuid,
        status: FileStatus,
        error: Option<&str>,
        ttl: Duration,
    ) -> Result<()>;

    async fn get_file_status(
        &self,
        task_id: Uuid,
        file_id: Uuid,
    ) -> Result<Option<(FileStatus, Option<String>)>>;
}
