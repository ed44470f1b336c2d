//! Component G — the file worker 🛠️. Consumes one `file_translation_tasks`
//! message, runs the rewriter (A) via the Translator (B), and reports the
//! result into the Completion Registry (I) so the coordinator eventually
//! notices. Workers are stateless and forgettable by design — a single
//! instance may process multiple file units concurrently up to its
//! configured prefetch (spec §5), and if it dies, nothing downstream
//! cared who it was.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::capability::{HandlerOutcome, MessageHandler, Registry, Translator};
use crate::domain::{FileStatus, FileUnit};
use crate::grammar;
use crate::language;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub registry_ttl: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            registry_ttl: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug)]
pub struct FileWorker {
    registry: Arc<dyn Registry>,
    translator: Arc<dyn Translator>,
    config: WorkerConfig,
}

impl FileWorker {
    pub fn new(registry: Arc<dyn Registry>, translator: Arc<dyn Translator>, config: WorkerConfig) -> Self {
        FileWorker {
            registry,
            translator,
            config,
        }
    }

    /// One `file_translation_tasks` delivery, spec §4.10 steps 1-5.
    async fn process(&self, unit: FileUnit) -> HandlerOutcome {
        if let Err(e) = self
            .registry
            .set_file_status(unit.task_id, unit.file_id, FileStatus::Translating, None, self.config.registry_ttl)
            .await
        {
            warn!(task_id = %unit.task_id, file_id = %unit.file_id, error = %e, "failed to record TRANSLATING status, nacking without requeue");
            return HandlerOutcome::Nack { requeue: false };
        }

        let path = unit.absolute_path();
        let language = language::resolve(&unit.target_language);
        let result = grammar::rewrite_file(&path, self.translator.as_ref(), &unit.translate_style, &language).await;

        match result {
            Ok(()) => {
                debug!(task_id = %unit.task_id, file_id = %unit.file_id, path = %path.display(), "file rewrite completed");
                if let Err(e) = self
                    .registry
                    .set_file_status(unit.task_id, unit.file_id, FileStatus::Completed, None, self.config.registry_ttl)
                    .await
                {
                    warn!(task_id = %unit.task_id, file_id = %unit.file_id, error = %e, "failed to record COMPLETED status");
                    return HandlerOutcome::Nack { requeue: false };
                }
                HandlerOutcome::Ack
            }
            Err(e) => {
                warn!(task_id = %unit.task_id, file_id = %unit.file_id, path = %path.display(), error = %e, "file rewrite failed");
                if let Err(set_err) = self
                    .registry
                    .set_file_status(unit.task_id, unit.file_id, FileStatus::Failed, Some(&e.to_string()), self.config.registry_ttl)
                    .await
                {
                    warn!(task_id = %unit.task_id, file_id = %unit.file_id, error = %set_err, "failed to record FAILED status");
                }
                // Never requeue on an application error (spec §7): at-least-once
                // redelivery can't fix a deterministic rewrite bug, and would
                // only amplify into the dead-letter queue.
                HandlerOutcome::Nack { requeue: false }
            }
        }
    }
}

#[async_trait]
impl MessageHandler for FileWorker {
    async fn handle(&self, payload: Value) -> HandlerOutcome {
        let unit: FileUnit = match serde_json::from_value(payload) {
            Ok(u) => u,
            Err(e) => {
                warn!(error = %e, "malformed file unit message, nacking without requeue");
                return HandlerOutcome::Nack { requeue: false };
            }
        };
        self.process(unit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryRegistry;
    use std::collections::HashMap;
    use uuid::Uuid;

    #[derive(Debug)]
    struct MapTranslator(HashMap<String, String>);

    #[async_trait]
    impl Translator for MapTranslator {
        async fn translate(&self, batch: &[String], _style_hint: &str, _target_language: &str) -> anyhow::Result<Vec<String>> {
            Ok(batch.iter().map(|s| self.0.get(s).cloned().unwrap_or_else(|| s.clone())).collect())
        }
        async fn analyze_style(&self, _samples: &[String], _target_language: &str) -> anyhow::Result<String> {
            Ok("neutral".to_string())
        }
    }

    #[tokio::test]
    async fn successful_rewrite_reports_completed() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.ini"), "[CORE]\ntitle: Hello\n").await.unwrap();

        let registry = Arc::new(InMemoryRegistry::new());
        let translator = Arc::new(MapTranslator(HashMap::from([("Hello".to_string(), "你好".to_string())])));
        let worker = FileWorker::new(registry.clone() as Arc<dyn Registry>, translator.clone() as Arc<dyn Translator>, WorkerConfig::default());

        let task_id = Uuid::new_v4();
        let file_id = Uuid::new_v4();
        let unit = FileUnit {
            task_id,
            file_id,
            file_path: "a.ini".to_string(),
            work_dir: dir.path().to_string_lossy().into_owned(),
            translate_style: String::new(),
            target_language: "zh".to_string(),
        };

        let outcome = worker.handle(serde_json::to_value(&unit).unwrap()).await;
        assert_eq!(outcome, HandlerOutcome::Ack);

        let (status, _) = registry.get_file_status(task_id, file_id).await.unwrap().unwrap();
        assert_eq!(status, FileStatus::Completed);

        let rewritten = tokio::fs::read_to_string(dir.path().join("a.ini")).await.unwrap();
        assert!(rewritten.contains("title_zh: 你好"));
    }

    #[tokio::test]
    async fn missing_file_reports_failed_and_nacks_without_requeue() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(InMemoryRegistry::new());
        let translator = Arc::new(MapTranslator(HashMap::new()));
        let worker = FileWorker::new(registry.clone() as Arc<dyn Registry>, translator.clone() as Arc<dyn Translator>, WorkerConfig::default());

        let task_id = Uuid::new_v4();
        let file_id = Uuid::new_v4();
        let unit = FileUnit {
            task_id,
            file_id,
            file_path: "missing.ini".to_string(),
            work_dir: dir.path().to_string_lossy().into_owned(),
            translate_style: String::new(),
            target_language: "zh".to_string(),
        };

        let outcome = worker.handle(serde_json::to_value(&unit).unwrap()).await;
        assert_eq!(outcome, HandlerOutcome::Nack { requeue: false });

        let (status, error) = registry.get_file_status(task_id, file_id).await.unwrap().unwrap();
        assert_eq!(status, FileStatus::Failed);
        assert!(error.is_some());
    }
}
