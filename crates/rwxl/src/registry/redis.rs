//! The real `Registry` backend: Redis via `fred`, keyed exactly as spec §6
//! describes (`file_task:{task_id}:{file_id}:status` / `:error`), TTL
//! refreshed on every write so a worker's last status transition is what
//! survives until the coordinator reads it or the slot expires.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use fred::prelude::*;
use uuid::Uuid;

use crate::capability::Registry;
use crate::domain::FileStatus;

#[derive(Debug, Clone)]
pub struct RedisRegistry {
    pool: Pool,
}

impl RedisRegistry {
    pub fn new(pool: Pool) -> Self {
        RedisRegistry { pool }
    }
}

fn status_key(task_id: Uuid, file_id: Uuid) -> String {
    format!("file_task:{task_id}:{file_id}:status")
}

fn error_key(task_id: Uuid, file_id: Uuid) -> String {
    format!("file_task:{task_id}:{file_id}:error")
}

fn status_to_str(status: FileStatus) -> &'static str {
    match status {
        FileStatus::Pending => "PENDING",
        FileStatus::Translating => "TRANSLATING",
        FileStatus::Completed => "COMPLETED",
        FileStatus::Failed => "FAILED",
    }
}

fn status_from_str(s: &str) -> Option<FileStatus> {
    match s {
        "PENDING" => Some(FileStatus::Pending),
        "TRANSLATING" => Some(FileStatus::Translating),
        "COMPLETED" => Some(FileStatus::Completed),
        "FAILED" => Some(FileStatus::Failed),
        _ => None,
    }
}

#[async_trait]
impl Registry for RedisRegistry {
    async fn set_file_status(
        &self,
        task_id: Uuid,
        file_id: Uuid,
        status: FileStatus,
        error: Option<&str>,
        ttl: Duration,
    ) -> Result<()> {
        let expire = Some(Expiration::EX(ttl.as_secs() as i64));
        let _: () = self
            .pool
            .set(status_key(task_id, file_id), status_to_str(status), expire.clone(), None, false)
            .await?;
        if let Some(err) = error {
            let _: () = self
                .pool
                .set(error_key(task_id, file_id), err, expire, None, false)
                .await?;
        }
        Ok(())
    }

    async fn get_file_status(
        &self,
        task_id: Uuid,
        file_id: Uuid,
    ) -> Result<Option<(FileStatus, Option<String>)>> {
        let raw: Option<String> = self.pool.get(status_key(task_id, file_id)).await?;
        let Some(raw) = raw else { return Ok(None) };
        let Some(status) = status_from_str(&raw) else {
            anyhow::bail!("unrecognized file status in registry: {raw}");
        };
        let error: Option<String> = self.pool.get(error_key(task_id, file_id)).await?;
        Ok(Some((status, error)))
    }
}
