//! Component H — the coordinator 🎬. Consumes one `translation_tasks`
//! message and runs the whole show: unpack → analyze → fan-out → fan-in →
//! repack → upload, narrating every step into the task state machine so
//! anyone polling `status` knows exactly how far the mod archive has
//! gotten. Grounded on the teacher's `Supervisor` (`supervisors.rs`) as
//! "the thing that owns the worker pool and the run lifecycle" — here
//! generalized from a fixed source/sink pipeline into a fan-out/fan-in one.
//! The largest module in the crate, and it knows it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::capability::{Bus, BlobStore, HandlerOutcome, MessageHandler, Registry, StateStore, TaskPatch};
use crate::capability::Translator;
use crate::domain::{FileStatus, FileUnit, Task, TaskStatus};
use crate::grammar::line::{self, Line};
use crate::progress::FanInProgress;

/// The `translation_tasks` message body (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMessage {
    pub task_id: Uuid,
    pub s3_source_url: String,
    pub s3_dest_bucket: String,
    pub s3_dest_key: String,
    pub target_language: String,
    pub translate_style: String,
}

/// Extensions/filenames the file enumerator treats as translatable config
/// (spec §4.9 step 5). `mod-info.txt` is matched on its full (lowercased)
/// file name, not an extension.
fn is_translatable(path: &Path) -> bool {
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        if name.eq_ignore_ascii_case("mod-info.txt") {
            return true;
        }
    }
    matches!(
        path.extension().and_then(|e| e.to_str()).map(str::to_lowercase).as_deref(),
        Some("ini") | Some("template")
    )
}

/// Walks `root` and returns every translatable file's path relative to
/// `root`, forward-slash separated, in a stable (sorted) order.
fn enumerate_translatable_files(root: &Path) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for entry in walkdir::WalkDir::new(root) {
        let entry = entry.context("walking extracted archive tree")?;
        if !entry.file_type().is_file() || !is_translatable(entry.path()) {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .context("walked path escaped its root")?;
        let forward_slash = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        out.push(forward_slash);
    }
    out.sort();
    Ok(out)
}

/// Bounded best-effort scan for the automatic style hint (spec §4.9 step
/// 6b): up to `max_samples` non-empty allow-listed values, capped at
/// `max_chars` total. Imprecise about `"""`-block state — acceptable here
/// since style derivation never fails the task and these are just samples,
/// not a rewrite.
async fn collect_style_samples(
    work_dir: &Path,
    files: &[String],
    max_samples: usize,
    max_chars: usize,
) -> Vec<String> {
    let mut samples = Vec::new();
    let mut chars_used = 0usize;
    'files: for relative in files {
        let mut path = work_dir.to_path_buf();
        for segment in relative.split('/') {
            path.push(segment);
        }
        let Ok(text) = tokio::fs::read_to_string(&path).await else {
            continue;
        };
        for raw in text.lines() {
            if let Line::KeyValue(kv) = line::parse_line(raw) {
                if kv.lang_tag.is_none() && !kv.value.is_empty() {
                    if samples.len() >= max_samples || chars_used >= max_chars {
                        break 'files;
                    }
                    chars_used += kv.value.len();
                    samples.push(kv.value.clone());
                }
            }
        }
    }
    samples
}

/// Runtime knobs the coordinator needs beyond its capability handles
/// (spec §4.9's progress percentages, SPEC_FULL §4.13's `RuntimeConfig`).
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub file_queue: String,
    pub fan_in_poll_interval: Duration,
    pub registry_ttl: Duration,
    pub style_sample_count: usize,
    pub style_sample_chars: usize,
    /// Root directory under which each run's private working directory is
    /// created (spec §3: "ArchiveSnapshot ... owned exclusively by a single
    /// coordinator instance").
    pub work_root: PathBuf,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        CoordinatorConfig {
            file_queue: "file_translation_tasks".to_string(),
            fan_in_poll_interval: Duration::from_secs(2),
            registry_ttl: Duration::from_secs(3600),
            style_sample_count: 30,
            style_sample_chars: 500,
            work_root: std::env::temp_dir().join("rwxl-work"),
        }
    }
}

#[derive(Debug)]
pub struct Coordinator {
    blob: Arc<dyn BlobStore>,
    bus: Arc<dyn Bus>,
    state_store: Arc<dyn StateStore>,
    registry: Arc<dyn Registry>,
    translator: Arc<dyn Translator>,
    config: CoordinatorConfig,
}

impl Coordinator {
    pub fn new(
        blob: Arc<dyn BlobStore>,
        bus: Arc<dyn Bus>,
        state_store: Arc<dyn StateStore>,
        registry: Arc<dyn Registry>,
        translator: Arc<dyn Translator>,
        config: CoordinatorConfig,
    ) -> Self {
        Coordinator {
            blob,
            bus,
            state_store,
            registry,
            translator,
            config,
        }
    }

    /// One full run of spec §4.9 for a single task message. Returns `Ok(())`
    /// on a clean completion *or* a clean `FAILED` transition — both are
    /// terminal outcomes the caller acks. `Err` only escapes for failures
    /// that happen before any task-row mutation (the guard / initial load),
    /// which `handle` maps to a conservative nack+requeue.
    async fn run(&self, msg: TaskMessage) -> Result<()> {
        let task = self
            .state_store
            .get(msg.task_id)
            .await
            .context("loading task row")?;
        let Some(task) = task else {
            warn!(task_id = %msg.task_id, "dropping message for unknown task");
            return Ok(());
        };
        if task.status.is_terminal() || task.status != TaskStatus::Pending {
            debug!(task_id = %msg.task_id, status = ?task.status, "dropping redelivered/non-pending task message");
            return Ok(());
        }

        let work_dir = self.config.work_root.join(msg.task_id.to_string());
        let outcome = self.run_inner(&msg, &work_dir).await;

        if let Err(e) = tokio::fs::remove_dir_all(&work_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(task_id = %msg.task_id, error = %e, "failed to clean up working directory");
            }
        }

        if let Err(e) = outcome {
            warn!(task_id = %msg.task_id, error = %e, "task failed");
            let patch = TaskPatch {
                error_message: Some(Some(e.to_string())),
                ..Default::default()
            };
            // Best-effort: if the current status can no longer reach FAILED
            // (e.g. already terminal via a racing path) this is a no-op we log
            // and move on from — the message is still acked either way.
            if let Err(transition_err) = self.state_store.update(msg.task_id, TaskStatus::Failed, patch).await {
                warn!(task_id = %msg.task_id, error = %transition_err, "could not record task failure");
            }
        }
        Ok(())
    }

    async fn run_inner(&self, msg: &TaskMessage, work_dir: &Path) -> Result<()> {
        tokio::fs::create_dir_all(work_dir)
            .await
            .context("creating working directory")?;

        self.state_store
            .update(
                msg.task_id,
                TaskStatus::Preparing,
                TaskPatch {
                    progress: Some(5.0),
                    ..Default::default()
                },
            )
            .await
            .context("transitioning to PREPARING")?;

        let archive_path = work_dir.join("source.zip");
        self.blob
            .download(&msg.s3_source_url, &archive_path)
            .await
            .context("downloading source blob")?;
        self.state_store
            .update(
                msg.task_id,
                TaskStatus::Preparing,
                TaskPatch {
                    progress: Some(10.0),
                    ..Default::default()
                },
            )
            .await
            .context("recording download progress")?;

        let tree_dir = work_dir.join("tree");
        crate::archive::extract(archive_path, tree_dir.clone())
            .await
            .context("extracting archive")?;

        let files = enumerate_translatable_files(&tree_dir).context("enumerating translatable files")?;
        self.state_store
            .update(
                msg.task_id,
                TaskStatus::Preparing,
                TaskPatch {
                    total_files: Some(files.len() as i32),
                    ..Default::default()
                },
            )
            .await
            .context("recording total_files")?;

        let style_hint = if !msg.translate_style.trim().is_empty() {
            msg.translate_style.clone()
        } else {
            let samples = collect_style_samples(
                &tree_dir,
                &files,
                self.config.style_sample_count,
                self.config.style_sample_chars,
            )
            .await;
            if samples.is_empty() {
                "neutral".to_string()
            } else {
                match self.translator.analyze_style(&samples, &msg.target_language).await {
                    Ok(hint) => hint,
                    Err(e) => {
                        warn!(task_id = %msg.task_id, error = %e, "style analysis failed, using neutral default");
                        "neutral".to_string()
                    }
                }
            }
        };

        self.state_store
            .update(
                msg.task_id,
                TaskStatus::Translating,
                TaskPatch {
                    progress: Some(20.0),
                    ..Default::default()
                },
            )
            .await
            .context("transitioning to TRANSLATING")?;

        if files.is_empty() {
            return self.finalize(msg, work_dir, &tree_dir).await;
        }

        let mut expected: Vec<Uuid> = Vec::with_capacity(files.len());
        for file_path in &files {
            let file_id = Uuid::new_v4();
            expected.push(file_id);
            let unit = FileUnit {
                task_id: msg.task_id,
                file_id,
                file_path: file_path.clone(),
                work_dir: tree_dir.to_string_lossy().into_owned(),
                translate_style: style_hint.clone(),
                target_language: msg.target_language.clone(),
            };
            let payload = serde_json::to_value(&unit).context("serializing file unit")?;
            self.bus
                .publish(&self.config.file_queue, payload, None)
                .await
                .with_context(|| format!("publishing file unit for {file_path}"))?;
        }

        let total = expected.len();
        let progress_bar = FanInProgress::new(msg.task_id, total);
        loop {
            tokio::time::sleep(self.config.fan_in_poll_interval).await;

            let mut completed = 0usize;
            let mut failed = 0usize;
            for file_id in &expected {
                match self.registry.get_file_status(msg.task_id, *file_id).await {
                    Ok(Some((FileStatus::Completed, _))) => completed += 1,
                    Ok(Some((FileStatus::Failed, _))) => failed += 1,
                    _ => {}
                }
            }
            progress_bar.update(completed, failed);

            let done = completed + failed;
            let progress = 20.0 + (done as f64 / total as f64) * 70.0;
            self.state_store
                .update(
                    msg.task_id,
                    TaskStatus::Translating,
                    TaskPatch {
                        progress: Some(progress),
                        processed_files: Some(completed as i32),
                        ..Default::default()
                    },
                )
                .await
                .context("recording fan-in progress")?;

            if done == total {
                progress_bar.finish();
                if failed > 0 {
                    self.state_store
                        .update(
                            msg.task_id,
                            TaskStatus::Failed,
                            TaskPatch {
                                error_message: Some(Some(format!("{failed} of {total} files failed"))),
                                ..Default::default()
                            },
                        )
                        .await
                        .context("transitioning to FAILED after partial completion")?;
                    return Ok(());
                }
                break;
            }
        }

        self.finalize(msg, work_dir, &tree_dir).await
    }

    async fn finalize(&self, msg: &TaskMessage, work_dir: &Path, tree_dir: &Path) -> Result<()> {
        self.state_store
            .update(
                msg.task_id,
                TaskStatus::Finalizing,
                TaskPatch {
                    progress: Some(90.0),
                    ..Default::default()
                },
            )
            .await
            .context("transitioning to FINALIZING")?;

        let out_archive = work_dir.join("dest.zip");
        crate::archive::pack(tree_dir.to_path_buf(), out_archive.clone())
            .await
            .context("repacking translated tree")?;
        self.blob
            .upload(&out_archive, &msg.s3_dest_bucket, &msg.s3_dest_key)
            .await
            .context("uploading destination blob")?;
        self.state_store
            .update(
                msg.task_id,
                TaskStatus::Finalizing,
                TaskPatch {
                    progress: Some(95.0),
                    ..Default::default()
                },
            )
            .await
            .context("recording upload progress")?;

        self.state_store
            .update(
                msg.task_id,
                TaskStatus::Completed,
                TaskPatch {
                    progress: Some(100.0),
                    ..Default::default()
                },
            )
            .await
            .context("transitioning to COMPLETED")?;
        info!(task_id = %msg.task_id, "task completed");
        Ok(())
    }
}

#[async_trait]
impl MessageHandler for Coordinator {
    async fn handle(&self, payload: Value) -> HandlerOutcome {
        let msg: TaskMessage = match serde_json::from_value(payload) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "malformed task message, nacking without requeue");
                return HandlerOutcome::Nack { requeue: false };
            }
        };
        match self.run(msg).await {
            Ok(()) => HandlerOutcome::Ack,
            Err(e) => {
                warn!(error = %e, "coordinator run failed before any state mutation; requeuing");
                HandlerOutcome::Nack { requeue: true }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryBus;
    use crate::domain::Task;
    use crate::registry::InMemoryRegistry;
    use crate::state_store::InMemoryStateStore;
    use crate::worker::FileWorker;
    use chrono::Utc;
    use std::collections::HashMap;
    use tokio::io::AsyncWriteExt;

    #[derive(Debug)]
    struct MapTranslator(HashMap<String, String>);

    #[async_trait]
    impl Translator for MapTranslator {
        async fn translate(&self, batch: &[String], _style_hint: &str, _target_language: &str) -> Result<Vec<String>> {
            Ok(batch.iter().map(|s| self.0.get(s).cloned().unwrap_or_else(|| s.clone())).collect())
        }
        async fn analyze_style(&self, _samples: &[String], _target_language: &str) -> Result<String> {
            Ok("neutral".to_string())
        }
    }

    #[derive(Debug)]
    struct LocalFileBlobStore;

    #[async_trait]
    impl BlobStore for LocalFileBlobStore {
        async fn download(&self, url: &str, local: &Path) -> Result<()> {
            let src = url.strip_prefix("file://").context("expected file:// url")?;
            tokio::fs::copy(src, local).await?;
            Ok(())
        }
        async fn upload(&self, local: &Path, bucket: &str, key: &str) -> Result<String> {
            let dest = PathBuf::from(bucket).join(key);
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::copy(local, &dest).await?;
            Ok(format!("s3://{bucket}/{key}"))
        }
        async fn presign_put(&self, _b: &str, _k: &str, _ttl: Duration, _ct: &str) -> Result<String> {
            unimplemented!()
        }
        async fn presign_get(&self, _b: &str, _k: &str, _ttl: Duration) -> Result<String> {
            unimplemented!()
        }
    }

    async fn make_archive_with_one_file() -> (tempfile::TempDir, PathBuf) {
        let src_dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(src_dir.path().join("CORE")).await.unwrap();
        let mut f = tokio::fs::File::create(src_dir.path().join("CORE/a.ini")).await.unwrap();
        f.write_all(b"[CORE]\ntitle: Hello\ndescription: A red tank.\nspeed: 3\n").await.unwrap();
        drop(f);

        let archive_dir = tempfile::tempdir().unwrap();
        let archive_path = archive_dir.path().join("src.zip");
        crate::archive::pack(src_dir.path().to_path_buf(), archive_path.clone()).await.unwrap();
        (archive_dir, archive_path)
    }

    #[tokio::test]
    async fn happy_path_end_to_end() {
        let (_archive_dir, archive_path) = make_archive_with_one_file().await;
        let dest_root = tempfile::tempdir().unwrap();

        let bus = Arc::new(InMemoryBus::new());
        let state_store = Arc::new(InMemoryStateStore::new());
        let registry = Arc::new(InMemoryRegistry::new());
        let translator = Arc::new(MapTranslator(HashMap::from([
            ("Hello".to_string(), "你好".to_string()),
            ("A red tank.".to_string(), "一辆红色坦克。".to_string()),
        ])));
        let blob = Arc::new(LocalFileBlobStore);

        let work_root = tempfile::tempdir().unwrap();
        let coordinator = Coordinator::new(
            blob.clone(),
            bus.clone() as Arc<dyn Bus>,
            state_store.clone() as Arc<dyn StateStore>,
            registry.clone() as Arc<dyn Registry>,
            translator.clone() as Arc<dyn Translator>,
            CoordinatorConfig {
                work_root: work_root.path().to_path_buf(),
                fan_in_poll_interval: Duration::from_millis(20),
                ..Default::default()
            },
        );

        let worker = FileWorker::new(
            registry.clone() as Arc<dyn Registry>,
            translator.clone() as Arc<dyn Translator>,
            crate::worker::WorkerConfig { registry_ttl: Duration::from_secs(60) },
        );

        bus.declare("translation_tasks", true).await.unwrap();
        bus.declare("file_translation_tasks", true).await.unwrap();

        let task_id = Uuid::new_v4();
        let task = Task::new_pending(
            task_id,
            format!("file://{}", archive_path.display()),
            dest_root.path().to_string_lossy().into_owned(),
            "out.zip".to_string(),
            "zh-CN",
            "",
            Utc::now(),
        );
        state_store.create(task).await.unwrap();

        let worker_bus = bus.clone();
        let worker_handle = tokio::spawn(async move {
            let _ = tokio::time::timeout(
                Duration::from_secs(2),
                worker_bus.consume("file_translation_tasks", 4, Arc::new(worker)),
            )
            .await;
        });

        let msg = TaskMessage {
            task_id,
            s3_source_url: format!("file://{}", archive_path.display()),
            s3_dest_bucket: dest_root.path().to_string_lossy().into_owned(),
            s3_dest_key: "out.zip".to_string(),
            target_language: "zh-CN".to_string(),
            translate_style: String::new(),
        };
        let outcome = tokio::time::timeout(Duration::from_secs(5), coordinator.handle(serde_json::to_value(&msg).unwrap()))
            .await
            .unwrap();
        worker_handle.abort();

        assert_eq!(outcome, HandlerOutcome::Ack);
        let task = state_store.get(task_id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.total_files, 1);
        assert_eq!(task.processed_files, 1);
        assert_eq!(task.progress, 100.0);

        let out_archive = dest_root.path().join("out.zip");
        assert!(out_archive.exists());
    }

    #[tokio::test]
    async fn redelivery_of_non_pending_task_is_a_no_op() {
        let state_store = Arc::new(InMemoryStateStore::new());
        let task = Task::new_pending(Uuid::new_v4(), "s3://b/k", "b", "k", "zh", "", Utc::now());
        let task_id = task.task_id;
        state_store.create(task).await.unwrap();
        state_store
            .update(task_id, TaskStatus::Preparing, TaskPatch::default())
            .await
            .unwrap();

        let coordinator = Coordinator::new(
            Arc::new(LocalFileBlobStore),
            Arc::new(InMemoryBus::new()),
            state_store.clone() as Arc<dyn StateStore>,
            Arc::new(InMemoryRegistry::new()),
            Arc::new(MapTranslator(HashMap::new())),
            CoordinatorConfig::default(),
        );

        let msg = TaskMessage {
            task_id,
            s3_source_url: "s3://b/k".to_string(),
            s3_dest_bucket: "b".to_string(),
            s3_dest_key: "k".to_string(),
            target_language: "zh".to_string(),
            translate_style: String::new(),
        };
        let outcome = coordinator.handle(serde_json::to_value(&msg).unwrap()).await;
        assert_eq!(outcome, HandlerOutcome::Ack);
        // Status untouched: still PREPARING, not re-entered.
        let task = state_store.get(task_id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Preparing);
    }
}
