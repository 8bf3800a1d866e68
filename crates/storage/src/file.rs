//! Single-file JSON backend.
//!
//! The whole store lives in one JSON document. Each commit rewrites the file
//! through a temporary sibling and a rename, then publishes the new state in
//! memory. A failed write leaves both the file and the in-memory state as
//! they were.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqtrack_core::{DayPrefix, Directory, Requisition};
use time::OffsetDateTime;

use crate::error::StorageError;
use crate::memory::{MemorySnapshot, MemoryStore, Tables};
use crate::record::{ActivityFilter, ActivityRecord, VersionedRequisition};
use crate::traits::RequisitionStore;

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    inner: MemoryStore,
}

impl JsonFileStore {
    /// Load the store at `path`. A missing file is an empty store; it is
    /// created on the first commit.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let tables = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Tables::default(),
            Ok(bytes) => serde_json::from_slice::<Tables>(&bytes).map_err(|e| {
                StorageError::Backend(format!("cannot parse {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Tables::default(),
            Err(e) => {
                return Err(StorageError::Backend(format!(
                    "cannot read {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        Ok(JsonFileStore {
            path,
            inner: MemoryStore::from_tables(tables),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, tables: &Tables) -> Result<(), StorageError> {
        let io_err = |what: &str, e: std::io::Error| {
            StorageError::Backend(format!("cannot {} {}: {}", what, self.path.display(), e))
        };
        let bytes = serde_json::to_vec_pretty(tables)
            .map_err(|e| StorageError::Backend(format!("cannot serialize store: {}", e)))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_err("create directory for", e))?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| io_err("write", e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| io_err("replace", e))?;
        Ok(())
    }
}

#[async_trait]
impl RequisitionStore for JsonFileStore {
    type Snapshot = MemorySnapshot;

    async fn begin_snapshot(&self) -> Result<MemorySnapshot, StorageError> {
        self.inner.begin_snapshot().await
    }

    async fn commit_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        self.persist(&snapshot.tables).await?;
        self.inner.publish(snapshot)
    }

    async fn abort_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        self.inner.abort_snapshot(snapshot).await
    }

    async fn insert_requisition(
        &self,
        snapshot: &mut MemorySnapshot,
        requisition: Requisition,
        at: OffsetDateTime,
    ) -> Result<VersionedRequisition, StorageError> {
        self.inner
            .insert_requisition(snapshot, requisition, at)
            .await
    }

    async fn get_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        id: &str,
    ) -> Result<VersionedRequisition, StorageError> {
        self.inner.get_for_update(snapshot, id).await
    }

    async fn list_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
    ) -> Result<Vec<VersionedRequisition>, StorageError> {
        self.inner.list_for_update(snapshot).await
    }

    async fn update_requisition(
        &self,
        snapshot: &mut MemorySnapshot,
        requisition: Requisition,
        expected_version: i64,
    ) -> Result<i64, StorageError> {
        self.inner
            .update_requisition(snapshot, requisition, expected_version)
            .await
    }

    async fn put_requisition(
        &self,
        snapshot: &mut MemorySnapshot,
        requisition: Requisition,
    ) -> Result<i64, StorageError> {
        self.inner.put_requisition(snapshot, requisition).await
    }

    async fn delete_requisition(
        &self,
        snapshot: &mut MemorySnapshot,
        id: &str,
        expected_version: Option<i64>,
    ) -> Result<(), StorageError> {
        self.inner
            .delete_requisition(snapshot, id, expected_version)
            .await
    }

    async fn serials_for_day(
        &self,
        snapshot: &mut MemorySnapshot,
        prefix: DayPrefix,
    ) -> Result<Vec<String>, StorageError> {
        self.inner.serials_for_day(snapshot, prefix).await
    }

    async fn append_activity(
        &self,
        snapshot: &mut MemorySnapshot,
        record: ActivityRecord,
    ) -> Result<(), StorageError> {
        self.inner.append_activity(snapshot, record).await
    }

    async fn directory_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
    ) -> Result<Directory, StorageError> {
        self.inner.directory_for_update(snapshot).await
    }

    async fn put_directory(
        &self,
        snapshot: &mut MemorySnapshot,
        directory: Directory,
    ) -> Result<(), StorageError> {
        self.inner.put_directory(snapshot, directory).await
    }

    async fn get_requisition(&self, id: &str) -> Result<VersionedRequisition, StorageError> {
        self.inner.get_requisition(id).await
    }

    async fn list_requisitions(
        &self,
        status_filter: Option<&str>,
    ) -> Result<Vec<VersionedRequisition>, StorageError> {
        self.inner.list_requisitions(status_filter).await
    }

    async fn list_activity(
        &self,
        filter: &ActivityFilter,
    ) -> Result<Vec<ActivityRecord>, StorageError> {
        self.inner.list_activity(filter).await
    }

    async fn get_directory(&self) -> Result<Directory, StorageError> {
        self.inner.get_directory().await
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
