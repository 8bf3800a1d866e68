//! Serial allocation under collisions the allocator could not foresee.
//!
//! `BlindStore` wraps a `MemoryStore` but reports no serials for the first
//! `blind_reads` calls of `serials_for_day`, so the allocator proposes a
//! serial that is already taken and the store rejects it at insert time.

use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use reqtrack_core::{
    DayPrefix, Directory, LineItemDraft, Requisition, RequisitionDraft, WorkflowGraph,
};
use reqtrack_executor::{Desk, DeskConfig, DeskError};
use reqtrack_storage::{
    ActivityFilter, ActivityRecord, MemorySnapshot, MemoryStore, RequisitionStore, StorageError,
    VersionedRequisition,
};
use rust_decimal::Decimal;
use time::macros::datetime;
use time::OffsetDateTime;

struct BlindStore {
    inner: MemoryStore,
    blind_reads: usize,
    reads: Arc<AtomicUsize>,
}

#[async_trait]
impl RequisitionStore for BlindStore {
    type Snapshot = MemorySnapshot;

    async fn begin_snapshot(&self) -> Result<MemorySnapshot, StorageError> {
        self.inner.begin_snapshot().await
    }

    async fn commit_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        self.inner.commit_snapshot(snapshot).await
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
        self.inner.insert_requisition(snapshot, requisition, at).await
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
        if self.reads.fetch_add(1, Ordering::SeqCst) < self.blind_reads {
            return Ok(Vec::new());
        }
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

fn march_seventh() -> OffsetDateTime {
    datetime!(2024-03-07 10:00 UTC)
}

fn draft() -> RequisitionDraft {
    RequisitionDraft {
        unit: "Library".into(),
        items: vec![LineItemDraft::new(
            "Paper",
            Decimal::from_str("1").unwrap(),
            Decimal::from_str("4.5").unwrap(),
            "",
        )],
        ..Default::default()
    }
}

/// A store already holding `(03-07-01)`, blind for the next `blind_reads` reads.
async fn seeded(blind_reads: usize, max_attempts: u32) -> Desk<BlindStore> {
    let inner = MemoryStore::new();
    Desk::new(inner.clone(), WorkflowGraph::standard())
        .with_clock(march_seventh)
        .create(draft())
        .await
        .unwrap();

    let store = BlindStore {
        inner,
        blind_reads,
        reads: Arc::new(AtomicUsize::new(0)),
    };
    Desk::new(store, WorkflowGraph::standard())
        .with_clock(march_seventh)
        .with_config(DeskConfig { max_attempts })
}

#[tokio::test]
async fn collision_is_retried_in_a_fresh_snapshot() {
    let desk = seeded(1, 3).await;

    let created = desk.create(draft()).await.unwrap();
    assert_eq!(created.serial_id, "(03-07-02)");
    assert_eq!(desk.store().reads.load(Ordering::SeqCst), 2);

    let log = desk.activity(&ActivityFilter::default()).await.unwrap();
    assert_eq!(log.len(), 2);
}

#[tokio::test]
async fn exhausted_attempts_surface_the_collision() {
    let desk = seeded(10, 3).await;

    let err = desk.create(draft()).await.unwrap_err();
    assert!(matches!(
        err,
        DeskError::Infrastructure(StorageError::DuplicateSerial { .. })
    ));
    assert_eq!(desk.store().reads.load(Ordering::SeqCst), 3);
    assert_eq!(
        desk.store().list_requisitions(None).await.unwrap().len(),
        1
    );
}
