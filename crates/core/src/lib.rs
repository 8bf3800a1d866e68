//! reqtrack-core: the procurement requisition lifecycle engine.
//!
//! Everything here is a pure, synchronous transformation over values.
//! Persistence, identity and clocks are supplied by the caller.
//!
//! # Public API
//!
//! - [`WorkflowGraph`] -- validated, ordered state table
//! - [`advance()`] / [`revert()`] -- single-entity transitions
//! - [`allocate()`] -- next `(MM-DD-NN)` serial for a day
//! - [`apply_batch()`] -- batch transitions with eligibility screening
//! - [`merge()`] -- import-wins reconciliation of a backup
//! - [`RequisitionQuery`], [`ExportScope`], [`closed_by_month()`] -- listings
//! - [`EngineError`] -- validation error taxonomy

pub mod actor;
pub mod archive;
pub mod audit;
pub mod batch;
pub mod directory;
pub mod error;
pub mod query;
pub mod reconcile;
pub mod requisition;
pub mod serial;
pub mod transition;
pub mod workflow;

// ── Convenience re-exports ───────────────────────────────────────────

pub use actor::{operator_name, Identity};
pub use archive::{closed_by_month, ClosedMonth, ExportScope};
pub use audit::{AuditEvent, EventContext, SYSTEM_OPERATOR};
pub use batch::{apply_batch, BatchAction, BatchOutcome, SkippedEntity};
pub use directory::{Directory, DirectoryKind};
pub use error::EngineError;
pub use query::{find_by_serial, sort_newest_first, RequisitionQuery, YearMonth};
pub use reconcile::{merge, MergeFlag, MergeOutcome, MergePolicy, MergedRecord, IMPORT_NOTE};
pub use requisition::{LineItem, LineItemDraft, Requisition, RequisitionDraft};
pub use serial::{allocate, DayPrefix, ParseSerialError, SerialId, MAX_SEQUENCE};
pub use transition::{advance, revert, Transition};
pub use workflow::{StateDef, WorkflowGraph};
