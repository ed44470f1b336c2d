//! rwxl-cli — point it at a `rwxl.toml`, tell it which hat to wear today.
//! `coordinator`/`worker`/`janitor` run the long-lived consumer loops,
//! `status`/`list` just peek at task rows and leave (SPEC_FULL §6.1). Not
//! the spec's HTTP submission API — still out of scope, still somebody
//! else's problem. A thin wrapper around `rwxl`'s library, the same spirit
//! as `kvx-cli` being a thin config-loading wrapper around `kvx::run`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::Table;
use fred::prelude::*;
use tracing::error;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use rwxl::bus::AmqpBus;
use rwxl::blob::S3BlobStore;
use rwxl::capability::{Bus, MessageHandler};
use rwxl::config::{self, AppConfig};
use rwxl::coordinator::{Coordinator, CoordinatorConfig};
use rwxl::janitor::{Janitor, JanitorConfig};
use rwxl::registry::RedisRegistry;
use rwxl::state_store::PostgresStateStore;
use rwxl::translator::{CachingTranslator, HttpTranslator, RedisTranslationCache, RetryPolicy};
use rwxl::worker::{FileWorker, WorkerConfig};
use rwxl::{StateStore, Translator};

#[derive(Parser)]
#[command(name = "rwxl-cli", about = "Mod-archive translation pipeline operator shell")]
struct Cli {
    #[arg(long, global = true, default_value = "rwxl.toml")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the coordinator (component H), consuming `translation_tasks`.
    Coordinator,
    /// Run a file worker (component G), consuming `file_translation_tasks`.
    Worker,
    /// Run the periodic terminal-task sweep (SPEC_FULL §4.15).
    Janitor,
    /// Print one task row.
    Status { task_id: Uuid },
    /// List recent task rows.
    List {
        #[arg(long, default_value_t = 20)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        offset: i64,
    },
}

async fn build_redis_pool(redis_url: &str) -> Result<Pool> {
    let config = Config::from_url(redis_url).context("parsing redis url")?;
    let pool = Builder::from_config(config)
        .build_pool(4)
        .context("building redis pool")?;
    pool.init().await.context("connecting to redis")?;
    Ok(pool)
}

async fn build_translator(app: &AppConfig, redis_pool: Pool) -> Arc<dyn Translator> {
    let retry = RetryPolicy {
        max_attempts: app.translator.max_attempts,
        base_delay: Duration::from_millis(app.translator.retry_base_ms),
        max_delay: Duration::from_millis(app.translator.retry_cap_ms),
    };
    let http = Arc::new(HttpTranslator::new(
        app.translator.base_url.clone(),
        app.translator.api_key.clone(),
        app.translator.model.clone(),
        retry,
    ));
    match app.translator.cache_ttl_secs {
        Some(ttl_secs) => Arc::new(CachingTranslator::new(
            http,
            Arc::new(RedisTranslationCache::new(redis_pool)),
            Duration::from_secs(ttl_secs),
        )),
        None => http,
    }
}

async fn build_state_store(app: &AppConfig) -> Result<Arc<PostgresStateStore>> {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .connect(&app.state_store.database_url)
        .await
        .context("connecting to postgres")?;
    let store = Arc::new(PostgresStateStore::new(pool));
    store.ensure_schema().await?;
    Ok(store)
}

async fn run_coordinator(app: AppConfig) -> Result<()> {
    let redis_pool = build_redis_pool(&app.registry.redis_url).await?;
    let translator = build_translator(&app, redis_pool.clone()).await;
    let state_store = build_state_store(&app).await?;
    let registry = Arc::new(RedisRegistry::new(redis_pool));
    let blob = Arc::new(S3BlobStore::from_env(app.blob.endpoint.as_deref()).await);
    let bus = Arc::new(AmqpBus::connect(&app.bus.amqp_url).await?);
    bus.declare(&app.bus.task_queue, true).await?;
    bus.declare(&app.bus.file_queue, true).await?;

    let coordinator = Arc::new(Coordinator::new(
        blob,
        bus.clone() as Arc<dyn Bus>,
        state_store as Arc<dyn StateStore>,
        registry,
        translator,
        CoordinatorConfig {
            file_queue: app.bus.file_queue.clone(),
            fan_in_poll_interval: Duration::from_millis(app.runtime.fan_in_poll_interval_ms),
            registry_ttl: Duration::from_secs(app.registry.file_status_ttl_secs),
            style_sample_count: app.runtime.style_sample_count,
            style_sample_chars: app.runtime.style_sample_chars,
            work_root: PathBuf::from(&app.runtime.work_root_dir),
            ..Default::default()
        },
    ));

    bus.consume(
        &app.bus.task_queue,
        app.runtime.coordinator_prefetch,
        coordinator as Arc<dyn MessageHandler>,
    )
    .await
}

async fn run_worker(app: AppConfig) -> Result<()> {
    let redis_pool = build_redis_pool(&app.registry.redis_url).await?;
    let translator = build_translator(&app, redis_pool.clone()).await;
    let registry = Arc::new(RedisRegistry::new(redis_pool));
    let bus = Arc::new(AmqpBus::connect(&app.bus.amqp_url).await?);
    bus.declare(&app.bus.file_queue, true).await?;

    let worker = Arc::new(FileWorker::new(
        registry,
        translator,
        WorkerConfig {
            registry_ttl: Duration::from_secs(app.registry.file_status_ttl_secs),
        },
    ));

    bus.consume(
        &app.bus.file_queue,
        app.runtime.file_worker_prefetch,
        worker as Arc<dyn MessageHandler>,
    )
    .await
}

async fn run_janitor(app: AppConfig) -> Result<()> {
    let state_store = build_state_store(&app).await?;
    let janitor = Janitor::new(
        state_store as Arc<dyn StateStore>,
        JanitorConfig {
            retention: chrono::Duration::seconds(app.janitor.retention_secs),
            sweep_interval: Duration::from_secs(app.janitor.sweep_interval_secs),
            work_root: Some(PathBuf::from(&app.runtime.work_root_dir)),
            ..Default::default()
        },
    );
    janitor.run_forever().await
}

fn render_tasks(tasks: &[rwxl::Task]) {
    let mut table = Table::new();
    table.set_header(vec![
        "task_id", "status", "progress", "files", "target_language", "updated_at",
    ]);
    for task in tasks {
        table.add_row(vec![
            task.task_id.to_string(),
            format!("{:?}", task.status),
            format!("{:.0}%", task.progress),
            format!("{}/{}", task.processed_files, task.total_files),
            task.target_language.clone(),
            task.updated_at.to_rfc3339(),
        ]);
    }
    println!("{table}");
}

async fn run_status(app: AppConfig, task_id: Uuid) -> Result<()> {
    let state_store = build_state_store(&app).await?;
    match state_store.get(task_id).await? {
        Some(task) => render_tasks(&[task]),
        None => println!("no such task: {task_id}"),
    }
    Ok(())
}

async fn run_list(app: AppConfig, limit: i64, offset: i64) -> Result<()> {
    let state_store = build_state_store(&app).await?;
    let tasks = state_store.list(limit, offset).await?;
    render_tasks(&tasks);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref().filter(|p| p.exists());
    let app = config::load_config(config_path).context("loading configuration")?;

    let result = match cli.command {
        Command::Coordinator => run_coordinator(app).await,
        Command::Worker => run_worker(app).await,
        Command::Janitor => run_janitor(app).await,
        Command::Status { task_id } => run_status(app, task_id).await,
        Command::List { limit, offset } => run_list(app, limit, offset).await,
    };

    if let Err(err) = result {
        error!("error: {err}");
        for cause in err.chain().skip(1) {
            error!("  caused by: {cause}");
        }
        std::process::exit(1);
    }
    Ok(())
}
