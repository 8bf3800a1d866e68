use async_trait::async_trait;
use reqtrack_core::{DayPrefix, Directory, Requisition};
use time::OffsetDateTime;

use crate::error::StorageError;
use crate::record::{ActivityFilter, ActivityRecord, VersionedRequisition};

/// The storage trait for requisition backends.
///
/// A `RequisitionStore` provides durable, transactional storage for
/// requisitions and the system activity log.
///
/// ## Snapshot Semantics
///
/// All mutating operations take `&mut Self::Snapshot`, a type representing an
/// in-progress transaction. The lifecycle is:
///
/// 1. `begin_snapshot()`: start a transaction, returns a `Snapshot`
/// 2. Call mutating methods with `&mut snapshot`
/// 3. `commit_snapshot(snapshot)`: commit and consume the transaction
///    OR `abort_snapshot(snapshot)`: roll back and consume the transaction
///
/// A `Snapshot` dropped without committing MUST be rolled back. Reads made
/// through the snapshot see its own uncommitted writes; the query methods
/// never do.
///
/// ## OCC Conflict Detection
///
/// `update_requisition` and versioned deletes succeed only when the stored
/// version equals `expected_version`; otherwise they return
/// `Err(StorageError::ConcurrentConflict { .. })`.
///
/// ## Serial uniqueness
///
/// `insert_requisition` rejects a serial already held by another record with
/// `Err(StorageError::DuplicateSerial { .. })`, so callers that allocate from
/// `serials_for_day` inside the same snapshot can retry on collision.
/// `update_requisition` applies the same check only when the serial changes.
/// `put_requisition` never checks, so a restore may leave two ids sharing one
/// serial; both stay writable.
#[async_trait]
pub trait RequisitionStore: Send + Sync + 'static {
    /// The snapshot (transaction) type used by this storage backend.
    type Snapshot: Send;

    // ── Snapshot lifecycle ────────────────────────────────────────────────────

    async fn begin_snapshot(&self) -> Result<Self::Snapshot, StorageError>;

    /// Commit a snapshot, making all mutations durable.
    async fn commit_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    /// Abort (roll back) a snapshot, discarding all mutations.
    async fn abort_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    // ── Requisition operations (within snapshot) ─────────────────────────────

    /// Insert a new requisition at version 0.
    ///
    /// Unset `createdAt`/`updatedAt` are stamped with `at`. Returns
    /// `AlreadyExists` for a taken id and `DuplicateSerial` for a taken serial.
    async fn insert_requisition(
        &self,
        snapshot: &mut Self::Snapshot,
        requisition: Requisition,
        at: OffsetDateTime,
    ) -> Result<VersionedRequisition, StorageError>;

    /// Read a requisition for a later versioned write.
    ///
    /// Returns `Err(StorageError::NotFound)` if it does not exist.
    async fn get_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
        id: &str,
    ) -> Result<VersionedRequisition, StorageError>;

    /// Every requisition as seen by the snapshot.
    async fn list_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
    ) -> Result<Vec<VersionedRequisition>, StorageError>;

    /// Replace a requisition if its stored version is `expected_version`.
    ///
    /// Returns the new version on success.
    async fn update_requisition(
        &self,
        snapshot: &mut Self::Snapshot,
        requisition: Requisition,
        expected_version: i64,
    ) -> Result<i64, StorageError>;

    /// Insert or overwrite without a version check. Used by restores.
    ///
    /// Returns the new version: 0 for a new id, previous + 1 otherwise.
    async fn put_requisition(
        &self,
        snapshot: &mut Self::Snapshot,
        requisition: Requisition,
    ) -> Result<i64, StorageError>;

    /// Delete a requisition. With `Some(version)` the delete is
    /// version-checked like an update.
    async fn delete_requisition(
        &self,
        snapshot: &mut Self::Snapshot,
        id: &str,
        expected_version: Option<i64>,
    ) -> Result<(), StorageError>;

    /// Serials of every requisition minted on `prefix`, as seen by the snapshot.
    async fn serials_for_day(
        &self,
        snapshot: &mut Self::Snapshot,
        prefix: DayPrefix,
    ) -> Result<Vec<String>, StorageError>;

    /// Append to the activity log in the same transaction as the change it describes.
    async fn append_activity(
        &self,
        snapshot: &mut Self::Snapshot,
        record: ActivityRecord,
    ) -> Result<(), StorageError>;

    /// The favourites directory as seen by the snapshot.
    async fn directory_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
    ) -> Result<Directory, StorageError>;

    /// Replace the favourites directory.
    async fn put_directory(
        &self,
        snapshot: &mut Self::Snapshot,
        directory: Directory,
    ) -> Result<(), StorageError>;

    // ── Query operations (committed data only) ───────────────────────────────

    /// Returns `Err(StorageError::NotFound)` if the requisition does not exist.
    async fn get_requisition(&self, id: &str) -> Result<VersionedRequisition, StorageError>;

    /// List all requisitions, optionally filtered by status.
    async fn list_requisitions(
        &self,
        status_filter: Option<&str>,
    ) -> Result<Vec<VersionedRequisition>, StorageError>;

    /// Activity entries matching `filter`, newest first.
    async fn list_activity(
        &self,
        filter: &ActivityFilter,
    ) -> Result<Vec<ActivityRecord>, StorageError>;

    /// The committed favourites directory. Empty for a fresh store.
    async fn get_directory(&self) -> Result<Directory, StorageError>;
}
