//! Text and JSON rendering of desk results.

use reqtrack_core::{Requisition, WorkflowGraph};
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Print any serializable value as pretty JSON on stdout.
pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| format!("cannot serialize output: {}", e))?;
    println!("{}", text);
    Ok(())
}

pub(crate) fn timestamp(at: OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_else(|_| at.to_string())
}

/// One listing line: serial, urgency marker, status, subject, total.
pub(crate) fn summary_line(req: &Requisition) -> String {
    format!(
        "{:<12} {} {:<14} {}  {}",
        req.serial_id,
        if req.is_urgent { "!" } else { " " },
        req.status,
        req.subject,
        req.total_price
    )
}

/// Header, items and the full audit trail of one requisition.
pub(crate) fn detail(graph: &WorkflowGraph, req: &Requisition) -> String {
    let mut out = String::new();
    let label = graph
        .get(&req.status)
        .map(|s| s.label.as_str())
        .unwrap_or(req.status.as_str());
    out.push_str(&format!("{} {}\n", req.serial_id, req.id));
    out.push_str(&format!("  status:    {} ({})\n", req.status, label));
    if let Some(action) = graph.get(&req.status).and_then(|s| s.next_action.as_deref()) {
        out.push_str(&format!("  next:      {}\n", action));
    }
    out.push_str(&format!("  unit:      {}\n", req.unit));
    if !req.applicant.is_empty() {
        out.push_str(&format!("  applicant: {}\n", req.applicant));
    }
    if let Some(vendor) = &req.vendor {
        out.push_str(&format!("  vendor:    {}\n", vendor));
    }
    if let Some(subsidy) = &req.subsidy {
        out.push_str(&format!("  subsidy:   {}\n", subsidy));
    }
    if let Some(name) = &req.receiver_name {
        out.push_str(&format!("  pickup:    {}\n", name));
    }
    if req.is_urgent {
        out.push_str("  urgent\n");
    }
    out.push_str("  items:\n");
    for item in &req.items {
        out.push_str(&format!(
            "    {} x {} {} @ {} = {}\n",
            item.subject, item.quantity, item.measure_unit, item.unit_price, item.subtotal
        ));
    }
    out.push_str(&format!("  total:     {}\n", req.total_price));
    out.push_str("  log:\n");
    for event in &req.logs {
        out.push_str(&format!(
            "    {}  {:<14} {}  ({})\n",
            timestamp(event.timestamp),
            event.status,
            event.note,
            event.operator
        ));
    }
    out
}
