//! reqtrack-executor: the requisition engine bound to a storage backend.
//!
//! [`Desk`] runs each operation inside one storage snapshot so that entity
//! writes and the activity record describing them commit together.

pub mod desk;
pub mod error;

pub use desk::{Desk, DeskConfig, ImportSummary};
pub use error::DeskError;
