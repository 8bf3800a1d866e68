use reqtrack_core::EngineError;
use reqtrack_storage::StorageError;

/// Errors surfaced by [`crate::Desk`].
///
/// Validation failures and storage failures stay in separate variants so a
/// caller can tell a rejected request from a broken backend.
#[derive(Debug, thiserror::Error)]
pub enum DeskError {
    #[error(transparent)]
    Validation(#[from] EngineError),

    #[error(transparent)]
    Infrastructure(#[from] StorageError),

    /// Neither an id nor a serial matched.
    #[error("no requisition matches '{reference}'")]
    NotFound { reference: String },

    /// A serial shared by several requisitions after a restore.
    #[error("serial '{reference}' is shared by {}; use an id", ids.join(", "))]
    AmbiguousReference { reference: String, ids: Vec<String> },
}

impl DeskError {
    pub fn is_validation(&self) -> bool {
        matches!(self, DeskError::Validation(_))
    }
}
