//! An in-process `Registry` fake for coordinator/worker tests. TTLs are
//! recorded but not enforced — tests run well inside any reasonable TTL, so
//! expiry is a production-only concern here.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::capability::Registry;
use crate::domain::FileStatus;

#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    slots: Mutex<HashMap<(Uuid, Uuid), (FileStatus, Option<String>)>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        InMemoryRegistry::default()
    }
}

#[async_trait]
impl Registry for InMemoryRegistry {
    async fn set_file_status(
        &self,
        task_id: Uuid,
        file_id: Uuid,
        status: FileStatus,
        error: Option<&str>,
        _ttl: Duration,
    ) -> Result<()> {
        self.slots
            .lock()
            .unwrap()
            .insert((task_id, file_id), (status, error.map(str::to_string)));
        Ok(())
    }

    async fn get_file_status(
        &self,
        task_id: Uuid,
        file_id: Uuid,
    ) -> Result<Option<(FileStatus, Option<String>)>> {
        Ok(self.slots.lock().unwrap().get(&(task_id, file_id)).cloned())
    }
}
