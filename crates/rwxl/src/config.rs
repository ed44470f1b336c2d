//! Component-level configuration (SPEC_FULL §4.13), loaded once at process
//! start and passed explicitly to every component constructor — no ambient
//! globals (spec §9). Mirrors `kvx`'s `app_config.rs`: `Figment` merging
//! `RWXL_`-prefixed env vars with an optional TOML file, nested structs per
//! concern the way the teacher splits `RuntimeConfig`/`SourceConfig`/`SinkConfig`.

use std::path::Path;

use anyhow::Context;
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

use crate::translator::DEFAULT_CACHE_TTL;

/// The two named queues from spec §4.7, defaulted to their spec-literal names.
#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    pub amqp_url: String,
    #[serde(default = "default_task_queue")]
    pub task_queue: String,
    #[serde(default = "default_file_queue")]
    pub file_queue: String,
}

fn default_task_queue() -> String {
    "translation_tasks".to_string()
}

fn default_file_queue() -> String {
    "file_translation_tasks".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlobConfig {
    /// S3-compatible endpoint override; `None` uses the ambient AWS config
    /// (env/instance profile), matching `S3BlobStore::from_env`.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_presign_ttl_secs")]
    pub presign_ttl_secs: u64,
}

fn default_presign_ttl_secs() -> u64 {
    3600
}

#[derive(Debug, Clone, Deserialize)]
pub struct StateStoreConfig {
    pub database_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    pub redis_url: String,
    /// TTL applied to every Completion Registry write (spec §4.1/§6: "≥1h recommended").
    #[serde(default = "default_registry_ttl_secs")]
    pub file_status_ttl_secs: u64,
}

fn default_registry_ttl_secs() -> u64 {
    3600
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranslatorConfig {
    #[serde(default = "default_translator_base_url")]
    pub base_url: String,
    /// Absence puts the client into degraded/passthrough mode (spec §4.3).
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_translator_model")]
    pub model: String,
    #[serde(default = "default_retry_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    #[serde(default = "default_retry_cap_ms")]
    pub retry_cap_ms: u64,
    /// `None` disables the translation cache (SPEC_FULL §4.14) entirely.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: Option<u64>,
}

fn default_translator_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_translator_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_base_ms() -> u64 {
    500
}

fn default_retry_cap_ms() -> u64 {
    10_000
}

fn default_cache_ttl_secs() -> Option<u64> {
    Some(DEFAULT_CACHE_TTL.as_secs())
}

/// Runtime knobs governing the coordinator/worker/janitor loops (spec §4.9,
/// §4.10, SPEC_FULL §4.15), mirroring `RuntimeConfig`'s place in the teacher's
/// config tree.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_fan_in_poll_interval_ms")]
    pub fan_in_poll_interval_ms: u64,
    #[serde(default = "default_file_worker_prefetch")]
    pub file_worker_prefetch: u16,
    #[serde(default = "default_coordinator_prefetch")]
    pub coordinator_prefetch: u16,
    #[serde(default = "default_style_sample_count")]
    pub style_sample_count: usize,
    #[serde(default = "default_style_sample_chars")]
    pub style_sample_chars: usize,
    /// The coordinator's private working-directory root (spec §3's
    /// exclusively-owned `ArchiveSnapshot` directory) — also what the
    /// janitor's orphaned-directory sweep reclaims from.
    #[serde(default = "default_work_root_dir")]
    pub work_root_dir: String,
}

fn default_fan_in_poll_interval_ms() -> u64 {
    2000
}

fn default_file_worker_prefetch() -> u16 {
    4
}

fn default_coordinator_prefetch() -> u16 {
    1
}

fn default_style_sample_count() -> usize {
    30
}

fn default_style_sample_chars() -> usize {
    500
}

fn default_work_root_dir() -> String {
    std::env::temp_dir().join("rwxl-work").to_string_lossy().into_owned()
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            fan_in_poll_interval_ms: default_fan_in_poll_interval_ms(),
            file_worker_prefetch: default_file_worker_prefetch(),
            coordinator_prefetch: default_coordinator_prefetch(),
            style_sample_count: default_style_sample_count(),
            style_sample_chars: default_style_sample_chars(),
            work_root_dir: default_work_root_dir(),
        }
    }
}

/// The janitor's retention window (SPEC_FULL §4.15): how long a terminal
/// task row survives before the sweep deletes it, and how often the sweep runs.
#[derive(Debug, Clone, Deserialize)]
pub struct JanitorConfig {
    #[serde(default = "default_retention_secs")]
    pub retention_secs: i64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_retention_secs() -> i64 {
    7 * 24 * 3600
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

impl Default for JanitorConfig {
    fn default() -> Self {
        JanitorConfig {
            retention_secs: default_retention_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// The root config struct every binary loads once and threads through
/// explicitly (spec §9: "no ambient globals").
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub blob: BlobConfig,
    pub bus: BusConfig,
    pub state_store: StateStoreConfig,
    pub registry: RegistryConfig,
    pub translator: TranslatorConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub janitor: JanitorConfig,
}

/// Loads `AppConfig` from `RWXL_`-prefixed env vars, optionally merged with
/// a TOML file (file wins on conflicts, same precedence as `kvx::app_config::load_config`).
pub fn load_config(config_file: Option<&Path>) -> anyhow::Result<AppConfig> {
    let figment = Figment::new().merge(Env::prefixed("RWXL_").split("__"));
    let figment = match config_file {
        Some(path) => figment.merge(Toml::file(path)),
        None => figment,
    };
    let context_msg = match config_file {
        Some(path) => format!("failed to load configuration from '{}' and RWXL_* env vars", path.display()),
        None => "failed to load configuration from RWXL_* env vars".to_string(),
    };
    figment.extract().context(context_msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn loads_required_fields_and_fills_defaults() {
        let path = std::env::temp_dir().join(format!("rwxl_config_{}.toml", uuid::Uuid::new_v4()));
        fs::write(
            &path,
            r#"
            [blob]
            [bus]
            amqp_url = "amqp://localhost"
            [state_store]
            database_url = "postgres://localhost/rwxl"
            [registry]
            redis_url = "redis://localhost"
            [translator]
            "#,
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.bus.task_queue, "translation_tasks");
        assert_eq!(config.bus.file_queue, "file_translation_tasks");
        assert_eq!(config.runtime.fan_in_poll_interval_ms, 2000);
        assert_eq!(config.registry.file_status_ttl_secs, 3600);
        assert!(config.translator.api_key.is_none());

        fs::remove_file(&path).unwrap();
    }
}
