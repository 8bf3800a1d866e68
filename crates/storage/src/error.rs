/// All errors that can be returned by a `RequisitionStore` implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Optimistic concurrency conflict: the stored version no longer matches
    /// the version the caller read.
    #[error("concurrent conflict on requisition {id}: expected version {expected_version}")]
    ConcurrentConflict { id: String, expected_version: i64 },

    /// No requisition with the given id.
    #[error("requisition not found: {id}")]
    NotFound { id: String },

    /// A requisition with this id already exists.
    #[error("requisition already exists: {id}")]
    AlreadyExists { id: String },

    /// Another requisition already holds this serial.
    #[error("serial already taken: {serial_id}")]
    DuplicateSerial { serial_id: String },

    /// A backend-specific failure (I/O, serialization, poisoned lock).
    #[error("storage backend error: {0}")]
    Backend(String),
}
