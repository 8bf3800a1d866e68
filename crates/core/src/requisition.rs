//! The requisition entity and its line items.
//!
//! Field names serialise in camelCase so backups written by earlier
//! versions of the application load without a translation layer.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::audit::{non_blank, AuditEvent, EventContext};
use crate::error::EngineError;
use crate::serial::SerialId;
use crate::workflow::WorkflowGraph;

/// Joins item subjects into the requisition's headline subject.
pub const SUBJECT_SEPARATOR: &str = "、";

/// Measure unit used when an item leaves it blank.
pub const DEFAULT_MEASURE_UNIT: &str = "pcs";

/// Subsidy value meaning "paid from the general fund".
pub const NO_PROJECT: &str = "no project (general fund)";

const CREATION_NOTE: &str = "case opened and received";

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

/// RFC 3339 values keyed by state.
mod timestamp_map {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use time::format_description::well_known::Rfc3339;
    use time::OffsetDateTime;

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<String, OffsetDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut out = BTreeMap::new();
        for (k, v) in map {
            let s = v.format(&Rfc3339).map_err(serde::ser::Error::custom)?;
            out.insert(k.as_str(), s);
        }
        out.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<String, OffsetDateTime>, D::Error> {
        let raw = BTreeMap::<String, String>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(k, v)| {
                OffsetDateTime::parse(&v, &Rfc3339)
                    .map(|t| (k, t))
                    .map_err(serde::de::Error::custom)
            })
            .collect()
    }
}

/// One purchased line. `subtotal` is derived and recomputed, never edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub subject: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    #[serde(default)]
    pub measure_unit: String,
    #[serde(default)]
    pub subtotal: Decimal,
}

impl LineItem {
    fn checked_subtotal(&self) -> Result<Decimal, EngineError> {
        self.quantity.checked_mul(self.unit_price).ok_or_else(|| {
            EngineError::invalid_requisition(format!(
                "subtotal of '{}' overflows",
                self.subject
            ))
        })
    }
}

/// Caller-supplied line item; the subtotal is computed on the way in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemDraft {
    pub subject: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    #[serde(default)]
    pub measure_unit: String,
}

impl LineItemDraft {
    pub fn new(subject: &str, quantity: Decimal, unit_price: Decimal, measure_unit: &str) -> Self {
        LineItemDraft {
            subject: subject.to_string(),
            quantity,
            unit_price,
            measure_unit: measure_unit.to_string(),
        }
    }

    fn into_item(self, position: usize) -> Result<LineItem, EngineError> {
        let subject = self.subject.trim().to_string();
        if subject.is_empty() {
            return Err(EngineError::invalid_requisition(format!(
                "item {} has no subject",
                position + 1
            )));
        }
        if self.quantity <= Decimal::ZERO {
            return Err(EngineError::invalid_requisition(format!(
                "item '{}' must have a positive quantity",
                subject
            )));
        }
        if self.unit_price < Decimal::ZERO {
            return Err(EngineError::invalid_requisition(format!(
                "item '{}' has a negative unit price",
                subject
            )));
        }
        let measure_unit = match self.measure_unit.trim() {
            "" => DEFAULT_MEASURE_UNIT.to_string(),
            unit => unit.to_string(),
        };
        let mut item = LineItem {
            subject,
            quantity: self.quantity,
            unit_price: self.unit_price,
            measure_unit,
            subtotal: Decimal::ZERO,
        };
        item.subtotal = item.checked_subtotal()?;
        Ok(item)
    }
}

/// Header fields and items for creating or editing a requisition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequisitionDraft {
    pub unit: String,
    #[serde(default)]
    pub applicant: String,
    #[serde(default)]
    pub subsidy: Option<String>,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default, with = "iso_date::option")]
    pub application_date: Option<Date>,
    #[serde(default)]
    pub global_remark: String,
    #[serde(default)]
    pub is_urgent: bool,
    pub items: Vec<LineItemDraft>,
}

struct ValidatedDraft {
    unit: String,
    applicant: String,
    subsidy: Option<String>,
    vendor: Option<String>,
    application_date: Option<Date>,
    global_remark: String,
    is_urgent: bool,
    items: Vec<LineItem>,
}

impl RequisitionDraft {
    fn validate(self) -> Result<ValidatedDraft, EngineError> {
        let unit = self.unit.trim().to_string();
        if unit.is_empty() {
            return Err(EngineError::invalid_requisition(
                "a requesting unit is required",
            ));
        }
        if self.items.is_empty() {
            return Err(EngineError::invalid_requisition(
                "at least one line item is required",
            ));
        }
        let items = self
            .items
            .into_iter()
            .enumerate()
            .map(|(i, item)| item.into_item(i))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ValidatedDraft {
            unit,
            applicant: self.applicant.trim().to_string(),
            subsidy: non_blank(self.subsidy.as_deref()).map(str::to_string),
            vendor: non_blank(self.vendor.as_deref()).map(str::to_string),
            application_date: self.application_date,
            global_remark: self.global_remark.trim().to_string(),
            is_urgent: self.is_urgent,
            items,
        })
    }
}

/// The purchase request tracked through the workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requisition {
    /// Opaque identity assigned by the storage layer.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub serial_id: String,
    pub status: String,
    #[serde(default)]
    pub is_urgent: bool,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub applicant: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subsidy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(
        default,
        with = "iso_date::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub application_date: Option<Date>,
    #[serde(default)]
    pub global_remark: String,
    #[serde(default)]
    pub subject: String,
    pub items: Vec<LineItem>,
    #[serde(default)]
    pub total_price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_name: Option<String>,
    /// Oldest first. Appended to, never rewritten.
    #[serde(default)]
    pub logs: Vec<AuditEvent>,
    /// When the requisition last entered each state.
    #[serde(default, with = "timestamp_map")]
    pub status_times: BTreeMap<String, OffsetDateTime>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<OffsetDateTime>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<OffsetDateTime>,
}

impl Requisition {
    /// Open a new requisition in the workflow's initial state.
    ///
    /// The creation event is the first audit entry. `created_at` and
    /// `updated_at` stay unset; the storage layer assigns them.
    pub fn create(
        id: impl Into<String>,
        serial: SerialId,
        draft: RequisitionDraft,
        graph: &WorkflowGraph,
        ctx: &EventContext,
    ) -> Result<Self, EngineError> {
        let draft = draft.validate()?;
        let initial = graph.initial().key.clone();

        let mut requisition = Requisition {
            id: id.into(),
            serial_id: serial.to_string(),
            status: initial.clone(),
            is_urgent: draft.is_urgent,
            unit: draft.unit,
            applicant: draft.applicant,
            subsidy: draft.subsidy,
            vendor: draft.vendor,
            application_date: draft.application_date,
            global_remark: draft.global_remark,
            subject: String::new(),
            items: draft.items,
            total_price: Decimal::ZERO,
            receiver_name: None,
            logs: vec![ctx.event(&initial, CREATION_NOTE.to_string())],
            status_times: BTreeMap::new(),
            created_at: None,
            updated_at: None,
        };
        requisition.status_times.insert(initial, ctx.at);
        requisition.recompute_totals()?;
        Ok(requisition)
    }

    /// Overwrite header fields and items. Status, serial, receiver and logs
    /// are untouched and no audit event is written.
    pub fn apply_edit(&mut self, draft: RequisitionDraft) -> Result<(), EngineError> {
        let draft = draft.validate()?;
        let mut edited = self.clone();
        edited.unit = draft.unit;
        edited.applicant = draft.applicant;
        edited.subsidy = draft.subsidy;
        edited.vendor = draft.vendor;
        edited.application_date = draft.application_date;
        edited.global_remark = draft.global_remark;
        edited.is_urgent = draft.is_urgent;
        edited.items = draft.items;
        edited.recompute_totals()?;
        *self = edited;
        Ok(())
    }

    pub fn set_urgent(&mut self, urgent: bool) {
        self.is_urgent = urgent;
    }

    /// Rebuild each subtotal, the total and the headline subject from the items.
    pub fn recompute_totals(&mut self) -> Result<(), EngineError> {
        let mut total = Decimal::ZERO;
        for item in &mut self.items {
            item.subtotal = item.checked_subtotal()?;
            total = total.checked_add(item.subtotal).ok_or_else(|| {
                EngineError::invalid_requisition("total price overflows")
            })?;
        }
        self.total_price = total;
        self.subject = self
            .items
            .iter()
            .map(|i| i.subject.as_str())
            .collect::<Vec<_>>()
            .join(SUBJECT_SEPARATOR);
        Ok(())
    }

    pub fn parsed_serial(&self) -> Option<SerialId> {
        self.serial_id.parse().ok()
    }

    pub fn last_event(&self) -> Option<&AuditEvent> {
        self.logs.last()
    }

    /// Append an event and record the entry time of its state.
    pub(crate) fn push_event(&mut self, event: AuditEvent) {
        self.status_times
            .insert(event.status.clone(), event.timestamp);
        self.logs.push(event);
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::DayPrefix;
    use std::str::FromStr;
    use time::macros::{date, datetime};

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn ctx() -> EventContext {
        EventContext::new("clerk", datetime!(2024-03-07 09:30 UTC))
    }

    fn draft() -> RequisitionDraft {
        RequisitionDraft {
            unit: " Library ".to_string(),
            applicant: "Chen".to_string(),
            subsidy: Some("   ".to_string()),
            vendor: Some("Paper Co".to_string()),
            application_date: Some(date!(2024 - 03 - 01)),
            global_remark: String::new(),
            is_urgent: false,
            items: vec![
                LineItemDraft::new("A4 paper", dec("10"), dec("120"), "box"),
                LineItemDraft::new("Toner", dec("1.5"), dec("33.30"), ""),
            ],
        }
    }

    fn serial() -> SerialId {
        SerialId::new(DayPrefix::from_date(date!(2024 - 03 - 07)), 1)
    }

    #[test]
    fn create_starts_in_initial_state_with_creation_event() {
        let graph = WorkflowGraph::standard();
        let req = Requisition::create("doc1", serial(), draft(), &graph, &ctx()).unwrap();

        assert_eq!(req.status, "P1_RECEIVED");
        assert_eq!(req.serial_id, "(03-07-01)");
        assert_eq!(req.unit, "Library");
        assert_eq!(req.subsidy, None);
        assert_eq!(req.logs.len(), 1);
        assert_eq!(req.logs[0].status, "P1_RECEIVED");
        assert_eq!(req.logs[0].operator, "clerk");
        assert_eq!(req.status_times.get("P1_RECEIVED"), Some(&ctx().at));
        assert!(req.created_at.is_none());
    }

    #[test]
    fn totals_are_exact_decimal_products() {
        let graph = WorkflowGraph::standard();
        let req = Requisition::create("doc1", serial(), draft(), &graph, &ctx()).unwrap();

        assert_eq!(req.items[0].subtotal, dec("1200"));
        assert_eq!(req.items[1].subtotal, dec("49.950"));
        assert_eq!(req.total_price, dec("1249.950"));
        assert_eq!(req.items[1].measure_unit, DEFAULT_MEASURE_UNIT);
        assert_eq!(req.subject, "A4 paper、Toner");
    }

    #[test]
    fn draft_validation_rejects_bad_input() {
        let graph = WorkflowGraph::standard();
        let cases: Vec<(RequisitionDraft, &str)> = vec![
            (
                RequisitionDraft {
                    unit: " ".to_string(),
                    ..draft()
                },
                "unit",
            ),
            (
                RequisitionDraft {
                    items: vec![],
                    ..draft()
                },
                "at least one",
            ),
            (
                RequisitionDraft {
                    items: vec![LineItemDraft::new("", dec("1"), dec("1"), "")],
                    ..draft()
                },
                "no subject",
            ),
            (
                RequisitionDraft {
                    items: vec![LineItemDraft::new("Pen", dec("0"), dec("1"), "")],
                    ..draft()
                },
                "positive quantity",
            ),
            (
                RequisitionDraft {
                    items: vec![LineItemDraft::new("Pen", dec("1"), dec("-1"), "")],
                    ..draft()
                },
                "negative unit price",
            ),
        ];
        for (bad, needle) in cases {
            let err = Requisition::create("x", serial(), bad, &graph, &ctx()).unwrap_err();
            assert!(
                err.to_string().contains(needle),
                "expected '{}' in '{}'",
                needle,
                err
            );
        }
    }

    #[test]
    fn edit_recomputes_totals_and_keeps_history() {
        let graph = WorkflowGraph::standard();
        let mut req = Requisition::create("doc1", serial(), draft(), &graph, &ctx()).unwrap();
        let before = req.clone();

        let mut edit = draft();
        edit.items = vec![LineItemDraft::new("Stapler", dec("3"), dec("80"), "ea")];
        edit.is_urgent = true;
        req.apply_edit(edit).unwrap();

        assert_eq!(req.total_price, dec("240"));
        assert_eq!(req.subject, "Stapler");
        assert!(req.is_urgent);
        assert_eq!(req.status, before.status);
        assert_eq!(req.serial_id, before.serial_id);
        assert_eq!(req.logs, before.logs);
    }

    #[test]
    fn failed_edit_leaves_entity_unchanged() {
        let graph = WorkflowGraph::standard();
        let mut req = Requisition::create("doc1", serial(), draft(), &graph, &ctx()).unwrap();
        let before = req.clone();

        let mut edit = draft();
        edit.items.clear();
        assert!(req.apply_edit(edit).is_err());
        assert_eq!(req, before);
    }

    #[test]
    fn deserializes_legacy_backup_shape() {
        let json = serde_json::json!({
            "id": "abc",
            "serialId": "(03-07-02)",
            "status": "P1_ACCOUNTING",
            "isUrgent": true,
            "unit": "Office",
            "applicant": "Lin",
            "items": [
                { "subject": "Pen", "quantity": 2, "unitPrice": 15, "measureUnit": "ea", "subtotal": 30 }
            ],
            "totalPrice": 30,
            "logs": [
                { "status": "P1_RECEIVED", "timestamp": "2024-03-07T01:02:03.456Z", "note": "opened", "operator": "clerk" }
            ]
        });
        let req: Requisition = serde_json::from_value(json).unwrap();
        assert_eq!(req.items[0].unit_price, dec("15"));
        assert_eq!(req.total_price, dec("30"));
        assert_eq!(req.logs.len(), 1);
        assert!(req.status_times.is_empty());
    }
}
