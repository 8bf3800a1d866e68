//! Subcommand implementations. Each returns a message on failure; `main`
//! reports it and exits with status 1.

pub(crate) mod activity;
pub(crate) mod archive;
pub(crate) mod backup;
pub(crate) mod batch;
pub(crate) mod directory;
pub(crate) mod requisition;
pub(crate) mod workflow;

use std::str::FromStr;

use reqtrack_core::{LineItemDraft, RequisitionDraft};
use rust_decimal::Decimal;
use time::macros::format_description;
use time::Date;

use crate::DraftArgs;

/// Parse a `YYYY-MM-DD` calendar date.
pub(crate) fn parse_date(s: &str) -> Result<Date, String> {
    Date::parse(s.trim(), format_description!("[year]-[month]-[day]"))
        .map_err(|e| format!("invalid date '{}': {}", s, e))
}

/// Parse `SUBJECT:QUANTITY:UNIT_PRICE[:MEASURE]`.
pub(crate) fn parse_item(s: &str) -> Result<LineItemDraft, String> {
    let parts: Vec<&str> = s.split(':').collect();
    let (subject, quantity, price, measure) = match parts.as_slice() {
        [subject, quantity, price] => (*subject, *quantity, *price, ""),
        [subject, quantity, price, measure] => (*subject, *quantity, *price, *measure),
        _ => {
            return Err(format!(
                "invalid item '{}': expected SUBJECT:QUANTITY:UNIT_PRICE[:MEASURE]",
                s
            ))
        }
    };
    let number = |field: &str, raw: &str| {
        Decimal::from_str(raw.trim()).map_err(|e| format!("invalid {} in item '{}': {}", field, s, e))
    };
    Ok(LineItemDraft::new(
        subject.trim(),
        number("quantity", quantity)?,
        number("unit price", price)?,
        measure.trim(),
    ))
}

pub(crate) fn parse_draft(args: DraftArgs) -> Result<RequisitionDraft, String> {
    let items = args
        .items
        .iter()
        .map(|i| parse_item(i))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(RequisitionDraft {
        unit: args.unit,
        applicant: args.applicant,
        subsidy: args.subsidy,
        vendor: args.vendor,
        application_date: args.date.as_deref().map(parse_date).transpose()?,
        global_remark: args.remark,
        is_urgent: args.urgent,
        items,
    })
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
