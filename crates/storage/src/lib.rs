//! reqtrack-storage: the `RequisitionStore` trait, record and error types,
//! an in-memory backend, a JSON-file backend and a backend-agnostic
//! conformance suite.

pub mod conformance;
mod error;
mod file;
mod memory;
mod record;
mod traits;

pub use error::StorageError;
pub use file::JsonFileStore;
pub use memory::{MemorySnapshot, MemoryStore};
pub use record::{ActivityFilter, ActivityKind, ActivityRecord, VersionedRequisition};
pub use traits::RequisitionStore;
