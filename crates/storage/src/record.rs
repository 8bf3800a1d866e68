use std::fmt;

use reqtrack_core::Requisition;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A requisition as stored, with its optimistic-concurrency version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedRequisition {
    pub requisition: Requisition,
    /// Starts at 0 on insert and grows by one on every write.
    pub version: i64,
}

/// Category of a system activity entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Login,
    Logout,
    Create,
    Update,
    Delete,
    StatusChange,
    BatchStatusChange,
    Export,
    Import,
    BatchDelete,
}

impl ActivityKind {
    pub const ALL: [ActivityKind; 10] = [
        ActivityKind::Login,
        ActivityKind::Logout,
        ActivityKind::Create,
        ActivityKind::Update,
        ActivityKind::Delete,
        ActivityKind::StatusChange,
        ActivityKind::BatchStatusChange,
        ActivityKind::Export,
        ActivityKind::Import,
        ActivityKind::BatchDelete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActivityKind::Login => "login",
            ActivityKind::Logout => "logout",
            ActivityKind::Create => "create",
            ActivityKind::Update => "update",
            ActivityKind::Delete => "delete",
            ActivityKind::StatusChange => "status_change",
            ActivityKind::BatchStatusChange => "batch_status_change",
            ActivityKind::Export => "export",
            ActivityKind::Import => "import",
            ActivityKind::BatchDelete => "batch_delete",
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActivityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActivityKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown activity kind '{}'", s))
    }
}

/// One entry of the system-wide activity log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Display name, as on audit events.
    pub operator: String,
    /// Stable identity of the actor.
    pub uid: String,
    pub kind: ActivityKind,
    pub detail: String,
}

/// Filters for [`crate::RequisitionStore::list_activity`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityFilter {
    pub kind: Option<ActivityKind>,
    pub operator: Option<String>,
    /// Maximum number of entries, newest first. 0 means no limit.
    pub limit: usize,
}

impl ActivityFilter {
    pub fn matches(&self, record: &ActivityRecord) -> bool {
        self.kind.map_or(true, |k| k == record.kind)
            && self
                .operator
                .as_deref()
                .map_or(true, |op| op == record.operator)
    }
}
