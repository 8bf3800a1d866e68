//! Export selection and the closed-case archive.

use time::{Date, Month};

use crate::query::{serial_desc, YearMonth};
use crate::requisition::Requisition;
use crate::workflow::WorkflowGraph;

/// Which requisitions an export includes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportScope {
    All,
    /// Requisitions in the last phase.
    Closed,
    /// Inclusive range over the serial's `MM-DD`, read in the year of `createdAt`.
    DateRange { from: Date, to: Date },
}

impl ExportScope {
    pub fn includes(&self, graph: &WorkflowGraph, req: &Requisition) -> bool {
        match self {
            ExportScope::All => true,
            ExportScope::Closed => is_closed(graph, req),
            ExportScope::DateRange { from, to } => match serial_date(req) {
                Some(d) => d >= *from && d <= *to,
                None => false,
            },
        }
    }

    /// Selected requisitions, serial descending.
    pub fn select(&self, graph: &WorkflowGraph, items: Vec<Requisition>) -> Vec<Requisition> {
        let mut out: Vec<Requisition> = items
            .into_iter()
            .filter(|r| self.includes(graph, r))
            .collect();
        out.sort_by(serial_desc);
        out
    }
}

fn is_closed(graph: &WorkflowGraph, req: &Requisition) -> bool {
    graph
        .get(&req.status)
        .is_some_and(|s| s.phase == graph.last_phase())
}

/// The calendar date a serial was minted on. Serials carry no year, so the
/// year of `createdAt` is used; undated requisitions have no serial date.
fn serial_date(req: &Requisition) -> Option<Date> {
    let serial = req.parsed_serial()?;
    let year = req.created_at?.year();
    let month = Month::try_from(serial.prefix().month()).ok()?;
    Date::from_calendar_date(year, month, serial.prefix().day()).ok()
}

/// Closed requisitions created in one month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedMonth {
    pub month: YearMonth,
    pub requisitions: Vec<Requisition>,
}

/// Group closed requisitions by the month of `createdAt`, newest month first.
///
/// Requisitions without `createdAt` fall back to the timestamp of their
/// first audit event; those with neither are left out.
pub fn closed_by_month(graph: &WorkflowGraph, items: &[Requisition]) -> Vec<ClosedMonth> {
    let mut groups: std::collections::BTreeMap<YearMonth, Vec<Requisition>> = Default::default();
    for req in items.iter().filter(|r| is_closed(graph, r)) {
        let stamp = req
            .created_at
            .or_else(|| req.logs.first().map(|e| e.timestamp));
        if let Some(at) = stamp {
            groups
                .entry(YearMonth::of(at.date()))
                .or_default()
                .push(req.clone());
        }
    }
    groups
        .into_iter()
        .rev()
        .map(|(month, mut requisitions)| {
            requisitions.sort_by(serial_desc);
            ClosedMonth {
                month,
                requisitions,
            }
        })
        .collect()
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
