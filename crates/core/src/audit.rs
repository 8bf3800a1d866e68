//! Audit trail entries embedded in every requisition.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Operator name stamped on events the system produces on its own.
pub const SYSTEM_OPERATOR: &str = "system";

/// One immutable entry in a requisition's append-only history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    /// State entered by this event, or the unaffected state for annotations.
    pub status: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub note: String,
    pub operator: String,
}

/// Who is acting and when. Supplied by the caller so the engine stays pure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventContext {
    pub operator: String,
    pub at: OffsetDateTime,
}

impl EventContext {
    pub fn new(operator: impl Into<String>, at: OffsetDateTime) -> Self {
        EventContext {
            operator: operator.into(),
            at,
        }
    }

    /// Context for the given operator at the current UTC instant.
    pub fn now(operator: impl Into<String>) -> Self {
        EventContext::new(operator, OffsetDateTime::now_utc())
    }

    pub fn system(at: OffsetDateTime) -> Self {
        EventContext::new(SYSTEM_OPERATOR, at)
    }

    pub(crate) fn event(&self, status: &str, note: String) -> AuditEvent {
        AuditEvent {
            status: status.to_string(),
            timestamp: self.at,
            note,
            operator: self.operator.clone(),
        }
    }
}

/// Trimmed text, or `None` when absent or whitespace-only.
pub(crate) fn non_blank(text: Option<&str>) -> Option<&str> {
    text.map(str::trim).filter(|t| !t.is_empty())
}
