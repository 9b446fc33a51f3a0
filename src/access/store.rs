//! Durable password records behind a narrow read/write interface.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordRecord {
    pub resource_id: String,
    pub password_hash: String,
    pub hint: Option<String>,
    pub updated_at: DateTime<Utc>,
}

pub trait PasswordStore: Send + Sync {
    fn get(
        &self,
        resource_id: &str,
    ) -> impl Future<Output = Result<Option<PasswordRecord>, StoreError>> + Send;

    fn upsert(&self, record: PasswordRecord) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Returns whether a record existed.
    fn delete(&self, resource_id: &str) -> impl Future<Output = Result<bool, StoreError>> + Send;
}

/// Volatile store, for tests and single-process setups.
#[derive(Debug, Default)]
pub struct MemoryPasswordStore {
    records: RwLock<HashMap<String, PasswordRecord>>,
}

impl MemoryPasswordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PasswordStore for MemoryPasswordStore {
    async fn get(&self, resource_id: &str) -> Result<Option<PasswordRecord>, StoreError> {
        Ok(self.records.read().await.get(resource_id).cloned())
    }

    async fn upsert(&self, record: PasswordRecord) -> Result<(), StoreError> {
        self.records.write().await.insert(record.resource_id.clone(), record);
        Ok(())
    }

    async fn delete(&self, resource_id: &str) -> Result<bool, StoreError> {
        Ok(self.records.write().await.remove(resource_id).is_some())
    }
}

/// JSON document on disk, rewritten atomically (tmp file + rename) on every change.
#[derive(Debug)]
pub struct FilePasswordStore {
    path: PathBuf,
    // serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl FilePasswordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<HashMap<String, PasswordRecord>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(HashMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, records: &HashMap<String, PasswordRecord>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(records)?).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).await?;
        }
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), records = records.len(), "password store persisted");
        Ok(())
    }
}

impl PasswordStore for FilePasswordStore {
    async fn get(&self, resource_id: &str) -> Result<Option<PasswordRecord>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.remove(resource_id))
    }

    async fn upsert(&self, record: PasswordRecord) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        info!(resource_id = %record.resource_id, "storing password record");
        records.insert(record.resource_id.clone(), record);
        self.persist(&records).await
    }

    async fn delete(&self, resource_id: &str) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        let existed = records.remove(resource_id).is_some();
        if existed {
            self.persist(&records).await?;
        }
        Ok(existed)
    }
}
