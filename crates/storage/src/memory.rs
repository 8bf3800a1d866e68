//! In-process backend.
//!
//! Snapshots are serialized: `begin_snapshot` takes the single writer lock and
//! works on a private copy of the committed tables, which `commit_snapshot`
//! publishes in one swap. Query methods read the committed tables only, so
//! uncommitted writes are never visible outside their snapshot.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use reqtrack_core::{DayPrefix, Directory, Requisition};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::StorageError;
use crate::record::{ActivityFilter, ActivityRecord, VersionedRequisition};
use crate::traits::RequisitionStore;

/// Everything a backend stores.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Tables {
    #[serde(default)]
    pub(crate) requisitions: BTreeMap<String, VersionedRequisition>,
    /// Append order, oldest first.
    #[serde(default)]
    pub(crate) activity: Vec<ActivityRecord>,
    #[serde(default)]
    pub(crate) directory: Directory,
}

impl Tables {
    fn serial_holder(&self, serial_id: &str) -> Option<&str> {
        if serial_id.is_empty() {
            return None;
        }
        self.requisitions
            .values()
            .find(|r| r.requisition.serial_id == serial_id)
            .map(|r| r.requisition.id.as_str())
    }

    fn serial_held_elsewhere(&self, serial_id: &str, id: &str) -> bool {
        !serial_id.is_empty()
            && self
                .requisitions
                .values()
                .any(|r| r.requisition.serial_id == serial_id && r.requisition.id != id)
    }

    fn insert(
        &mut self,
        mut requisition: Requisition,
        at: OffsetDateTime,
    ) -> Result<VersionedRequisition, StorageError> {
        if requisition.id.trim().is_empty() {
            return Err(StorageError::Backend(
                "requisition id must not be empty".to_string(),
            ));
        }
        if self.requisitions.contains_key(&requisition.id) {
            return Err(StorageError::AlreadyExists { id: requisition.id });
        }
        if self.serial_holder(&requisition.serial_id).is_some() {
            return Err(StorageError::DuplicateSerial {
                serial_id: requisition.serial_id,
            });
        }
        requisition.created_at.get_or_insert(at);
        requisition.updated_at.get_or_insert(at);
        let record = VersionedRequisition {
            requisition,
            version: 0,
        };
        self.requisitions
            .insert(record.requisition.id.clone(), record.clone());
        Ok(record)
    }

    fn get(&self, id: &str) -> Result<VersionedRequisition, StorageError> {
        self.requisitions
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound { id: id.to_string() })
    }

    fn check_version(&self, id: &str, expected_version: i64) -> Result<i64, StorageError> {
        let current = self
            .requisitions
            .get(id)
            .ok_or_else(|| StorageError::NotFound { id: id.to_string() })?;
        if current.version != expected_version {
            return Err(StorageError::ConcurrentConflict {
                id: id.to_string(),
                expected_version,
            });
        }
        Ok(current.version)
    }

    fn update(
        &mut self,
        requisition: Requisition,
        expected_version: i64,
    ) -> Result<i64, StorageError> {
        let version = self.check_version(&requisition.id, expected_version)? + 1;
        // A restore may leave two ids sharing a serial; only a changed serial is checked.
        let serial_changed = self
            .requisitions
            .get(&requisition.id)
            .is_some_and(|stored| stored.requisition.serial_id != requisition.serial_id);
        if serial_changed && self.serial_held_elsewhere(&requisition.serial_id, &requisition.id) {
            return Err(StorageError::DuplicateSerial {
                serial_id: requisition.serial_id,
            });
        }
        self.requisitions.insert(
            requisition.id.clone(),
            VersionedRequisition {
                requisition,
                version,
            },
        );
        Ok(version)
    }

    fn put(&mut self, requisition: Requisition) -> Result<i64, StorageError> {
        if requisition.id.trim().is_empty() {
            return Err(StorageError::Backend(
                "requisition id must not be empty".to_string(),
            ));
        }
        let version = self
            .requisitions
            .get(&requisition.id)
            .map_or(0, |r| r.version + 1);
        self.requisitions.insert(
            requisition.id.clone(),
            VersionedRequisition {
                requisition,
                version,
            },
        );
        Ok(version)
    }

    fn delete(&mut self, id: &str, expected_version: Option<i64>) -> Result<(), StorageError> {
        match expected_version {
            Some(v) => {
                self.check_version(id, v)?;
            }
            None => {
                self.get(id)?;
            }
        }
        self.requisitions.remove(id);
        Ok(())
    }

    fn serials_for_day(&self, prefix: DayPrefix) -> Vec<String> {
        self.requisitions
            .values()
            .filter(|r| {
                r.requisition
                    .parsed_serial()
                    .is_some_and(|s| s.prefix() == prefix)
            })
            .map(|r| r.requisition.serial_id.clone())
            .collect()
    }

    fn list(&self, status_filter: Option<&str>) -> Vec<VersionedRequisition> {
        self.requisitions
            .values()
            .filter(|r| status_filter.map_or(true, |s| r.requisition.status == s))
            .cloned()
            .collect()
    }

    fn list_activity(&self, filter: &ActivityFilter) -> Vec<ActivityRecord> {
        let matching = self.activity.iter().rev().filter(|r| filter.matches(r));
        if filter.limit == 0 {
            matching.cloned().collect()
        } else {
            matching.take(filter.limit).cloned().collect()
        }
    }
}

/// An open transaction on a [`MemoryStore`] (or a store built on one).
///
/// Holds the writer lock until committed, aborted or dropped.
pub struct MemorySnapshot {
    _writer: OwnedMutexGuard<()>,
    pub(crate) tables: Tables,
}

/// Thread-safe in-memory store. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    committed: Arc<RwLock<Tables>>,
    writer: Arc<Mutex<()>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub(crate) fn from_tables(tables: Tables) -> Self {
        MemoryStore {
            committed: Arc::new(RwLock::new(tables)),
            writer: Arc::new(Mutex::new(())),
        }
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> Result<T, StorageError> {
        let guard = self
            .committed
            .read()
            .map_err(|_| StorageError::Backend("store lock poisoned".to_string()))?;
        Ok(f(&guard))
    }

    /// Make the snapshot's tables the committed state and release the writer.
    pub(crate) fn publish(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        let mut guard = self
            .committed
            .write()
            .map_err(|_| StorageError::Backend("store lock poisoned".to_string()))?;
        *guard = snapshot.tables;
        Ok(())
    }
}

#[async_trait]
impl RequisitionStore for MemoryStore {
    type Snapshot = MemorySnapshot;

    async fn begin_snapshot(&self) -> Result<MemorySnapshot, StorageError> {
        let writer = self.writer.clone().lock_owned().await;
        let tables = self.read(Tables::clone)?;
        Ok(MemorySnapshot {
            _writer: writer,
            tables,
        })
    }

    async fn commit_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        self.publish(snapshot)
    }

    async fn abort_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        drop(snapshot);
        Ok(())
    }

    async fn insert_requisition(
        &self,
        snapshot: &mut MemorySnapshot,
        requisition: Requisition,
        at: OffsetDateTime,
    ) -> Result<VersionedRequisition, StorageError> {
        snapshot.tables.insert(requisition, at)
    }

    async fn get_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        id: &str,
    ) -> Result<VersionedRequisition, StorageError> {
        snapshot.tables.get(id)
    }

    async fn list_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
    ) -> Result<Vec<VersionedRequisition>, StorageError> {
        Ok(snapshot.tables.list(None))
    }

    async fn update_requisition(
        &self,
        snapshot: &mut MemorySnapshot,
        requisition: Requisition,
        expected_version: i64,
    ) -> Result<i64, StorageError> {
        snapshot.tables.update(requisition, expected_version)
    }

    async fn put_requisition(
        &self,
        snapshot: &mut MemorySnapshot,
        requisition: Requisition,
    ) -> Result<i64, StorageError> {
        snapshot.tables.put(requisition)
    }

    async fn delete_requisition(
        &self,
        snapshot: &mut MemorySnapshot,
        id: &str,
        expected_version: Option<i64>,
    ) -> Result<(), StorageError> {
        snapshot.tables.delete(id, expected_version)
    }

    async fn serials_for_day(
        &self,
        snapshot: &mut MemorySnapshot,
        prefix: DayPrefix,
    ) -> Result<Vec<String>, StorageError> {
        Ok(snapshot.tables.serials_for_day(prefix))
    }

    async fn append_activity(
        &self,
        snapshot: &mut MemorySnapshot,
        record: ActivityRecord,
    ) -> Result<(), StorageError> {
        snapshot.tables.activity.push(record);
        Ok(())
    }

    async fn directory_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
    ) -> Result<Directory, StorageError> {
        Ok(snapshot.tables.directory.clone())
    }

    async fn put_directory(
        &self,
        snapshot: &mut MemorySnapshot,
        directory: Directory,
    ) -> Result<(), StorageError> {
        snapshot.tables.directory = directory;
        Ok(())
    }

    async fn get_requisition(&self, id: &str) -> Result<VersionedRequisition, StorageError> {
        self.read(|t| t.get(id))?
    }

    async fn list_requisitions(
        &self,
        status_filter: Option<&str>,
    ) -> Result<Vec<VersionedRequisition>, StorageError> {
        self.read(|t| t.list(status_filter))
    }

    async fn list_activity(
        &self,
        filter: &ActivityFilter,
    ) -> Result<Vec<ActivityRecord>, StorageError> {
        self.read(|t| t.list_activity(filter))
    }

    async fn get_directory(&self) -> Result<Directory, StorageError> {
        self.read(|t| t.directory.clone())
    }
}
