//! Listing filters, ordering and serial lookup.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use time::Date;

use crate::requisition::Requisition;
use crate::serial::SerialId;
use crate::workflow::WorkflowGraph;

/// A calendar month, used by the creation-month filter and the closed archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: u8,
}

impl YearMonth {
    pub fn of(date: Date) -> Self {
        YearMonth {
            year: date.year(),
            month: u8::from(date.month()),
        }
    }
}

impl std::fmt::Display for YearMonth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl std::str::FromStr for YearMonth {
    type Err = String;

    /// Parses `YYYY-MM`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (y, m) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| format!("expected YYYY-MM, got '{}'", s))?;
        let year: i32 = y.parse().map_err(|_| format!("bad year in '{}'", s))?;
        let month: u8 = m.parse().map_err(|_| format!("bad month in '{}'", s))?;
        if !(1..=12).contains(&month) {
            return Err(format!("month out of range in '{}'", s));
        }
        Ok(YearMonth { year, month })
    }
}

/// Filters applied to a listing. Every field is optional; the default
/// matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequisitionQuery {
    /// Keep requisitions whose state belongs to this phase. The first phase
    /// excludes returned sub-states; any phase but the last excludes the
    /// terminal state.
    pub phase: Option<u8>,
    pub urgent_only: bool,
    /// Exact vendor match.
    pub vendor: Option<String>,
    /// Case-insensitive substring over serial, subject, unit, applicant,
    /// vendor and remark.
    pub text: Option<String>,
    /// Month of `createdAt`.
    pub created_in: Option<YearMonth>,
    /// Inclusive range over the application date, falling back to the
    /// creation date. Applied only when both ends are set.
    pub applied_between: Option<(Date, Date)>,
}

impl RequisitionQuery {
    pub fn matches(&self, graph: &WorkflowGraph, req: &Requisition) -> bool {
        if let Some(month) = self.created_in {
            match req.created_at {
                Some(at) if YearMonth::of(at.date()) == month => {}
                _ => return false,
            }
        }
        if let Some(vendor) = &self.vendor {
            if req.vendor.as_deref() != Some(vendor.as_str()) {
                return false;
            }
        }
        if let Some((from, to)) = self.applied_between {
            let target = req
                .application_date
                .or_else(|| req.created_at.map(|t| t.date()));
            match target {
                Some(d) if d >= from && d <= to => {}
                _ => return false,
            }
        }
        if self.urgent_only && !req.is_urgent {
            return false;
        }
        if let Some(text) = self.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            if !text_matches(req, &text.to_lowercase()) {
                return false;
            }
        }
        match self.phase {
            None => true,
            Some(phase) => in_phase(graph, &req.status, phase),
        }
    }

    /// Filter `items` and return them newest first.
    pub fn run(&self, graph: &WorkflowGraph, items: Vec<Requisition>) -> Vec<Requisition> {
        let mut out: Vec<Requisition> = items
            .into_iter()
            .filter(|r| self.matches(graph, r))
            .collect();
        sort_newest_first(&mut out);
        out
    }
}

fn text_matches(req: &Requisition, needle: &str) -> bool {
    let fields = [
        Some(req.serial_id.as_str()),
        Some(req.subject.as_str()),
        Some(req.unit.as_str()),
        Some(req.applicant.as_str()),
        req.vendor.as_deref(),
        Some(req.global_remark.as_str()),
    ];
    fields
        .into_iter()
        .flatten()
        .any(|f| f.to_lowercase().contains(needle))
}

/// Phase membership as used by listings.
pub fn in_phase(graph: &WorkflowGraph, status: &str, phase: u8) -> bool {
    let Some(state) = graph.get(status) else {
        return false;
    };
    if state.phase != phase {
        return false;
    }
    if phase == graph.first_phase() && state.returned {
        return false;
    }
    if phase != graph.last_phase() && graph.is_terminal(status) {
        return false;
    }
    true
}

/// Newest `createdAt` first; ties and undated entries fall back to serial
/// descending. Undated entries sort after dated ones.
pub fn sort_newest_first(items: &mut [Requisition]) {
    items.sort_by(|a, b| match (a.created_at, b.created_at) {
        (Some(x), Some(y)) => y.cmp(&x).then_with(|| serial_desc(a, b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => serial_desc(a, b),
    });
}

/// Serial descending, parsed when possible so `(01-02-100)` ranks above `(01-02-99)`.
pub fn serial_desc(a: &Requisition, b: &Requisition) -> Ordering {
    match (a.parsed_serial(), b.parsed_serial()) {
        (Some(x), Some(y)) => y.cmp(&x),
        _ => b.serial_id.cmp(&a.serial_id),
    }
}

/// Every requisition carrying this serial, accepting either `MM-DD-NN` or
/// `(MM-DD-NN)`. More than one match is possible after a restore.
pub fn find_by_serial<'a>(items: &'a [Requisition], reference: &str) -> Vec<&'a Requisition> {
    let reference = reference.trim();
    match reference.parse::<SerialId>() {
        Ok(wanted) => items
            .iter()
            .filter(|r| r.parsed_serial() == Some(wanted))
            .collect(),
        Err(_) => items.iter().filter(|r| r.serial_id == reference).collect(),
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transition::tests::requisition_in;
    use time::macros::{date, datetime};

    fn sample(graph: &WorkflowGraph) -> Vec<Requisition> {
        let mut a = requisition_in(graph, "a", 1, "P1_RECEIVED");
        a.created_at = Some(datetime!(2024-03-07 09:00 UTC));
        a.vendor = Some("Paper Co".into());
        a.is_urgent = true;

        let mut b = requisition_in(graph, "b", 2, "P1_RETURNED");
        b.created_at = Some(datetime!(2024-03-07 09:00 UTC));
        b.global_remark = "Needs BUDGET sign-off".into();

        let mut c = requisition_in(graph, "c", 3, "COMPLETED");
        c.created_at = Some(datetime!(2024-02-28 12:00 UTC));
        c.application_date = Some(date!(2024 - 02 - 20));

        let mut d = requisition_in(graph, "d", 4, "P2_ACCOUNTING");
        d.created_at = None;
        vec![a, b, c, d]
    }

    fn ids(items: &[Requisition]) -> Vec<&str> {
        items.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn phase_filters_follow_returned_and_terminal_rules() {
        let graph = WorkflowGraph::standard();
        let all = sample(&graph);
        let run = |phase| {
            RequisitionQuery {
                phase: Some(phase),
                ..Default::default()
            }
            .run(&graph, all.clone())
        };
        assert_eq!(ids(&run(1)), vec!["a"]);
        assert_eq!(ids(&run(2)), vec!["b", "d"]);
        assert_eq!(ids(&run(3)), vec!["c"]);
    }

    #[test]
    fn phase_one_drops_returned_sub_state_in_same_phase() {
        let graph = crate::transition::tests::review_graph();
        assert!(in_phase(&graph, "Received", 1));
        assert!(in_phase(&graph, "Reviewing", 1));
        assert!(!in_phase(&graph, "Returned", 1));
        assert!(in_phase(&graph, "Returned", 2));
        assert!(!in_phase(&graph, "Limbo", 1));
    }

    #[test]
    fn default_query_sorts_newest_then_serial_desc() {
        let graph = WorkflowGraph::standard();
        let out = RequisitionQuery::default().run(&graph, sample(&graph));
        assert_eq!(ids(&out), vec!["b", "a", "c", "d"]);
    }

    #[test]
    fn text_search_is_case_insensitive_over_fields() {
        let graph = WorkflowGraph::standard();
        let query = |text: &str| RequisitionQuery {
            text: Some(text.to_string()),
            ..Default::default()
        };
        assert_eq!(ids(&query("budget").run(&graph, sample(&graph))), vec!["b"]);
        assert_eq!(ids(&query("paper co").run(&graph, sample(&graph))), vec!["a"]);
        assert_eq!(ids(&query("03-07-03").run(&graph, sample(&graph))), vec!["c"]);
        assert_eq!(query("   ").run(&graph, sample(&graph)).len(), 4);
    }

    #[test]
    fn vendor_urgent_month_and_date_range() {
        let graph = WorkflowGraph::standard();
        let by_vendor = RequisitionQuery {
            vendor: Some("Paper Co".into()),
            ..Default::default()
        };
        assert_eq!(ids(&by_vendor.run(&graph, sample(&graph))), vec!["a"]);

        let urgent = RequisitionQuery {
            urgent_only: true,
            ..Default::default()
        };
        assert_eq!(ids(&urgent.run(&graph, sample(&graph))), vec!["a"]);

        let feb = RequisitionQuery {
            created_in: Some("2024-02".parse().unwrap()),
            ..Default::default()
        };
        assert_eq!(ids(&feb.run(&graph, sample(&graph))), vec!["c"]);

        let range = RequisitionQuery {
            applied_between: Some((date!(2024 - 02 - 15), date!(2024 - 02 - 25))),
            ..Default::default()
        };
        assert_eq!(ids(&range.run(&graph, sample(&graph))), vec!["c"]);

        let march = RequisitionQuery {
            applied_between: Some((date!(2024 - 03 - 01), date!(2024 - 03 - 31))),
            ..Default::default()
        };
        assert_eq!(ids(&march.run(&graph, sample(&graph))), vec!["b", "a"]);
    }

    #[test]
    fn serial_lookup_accepts_both_forms() {
        let graph = WorkflowGraph::standard();
        let all = sample(&graph);
        assert_eq!(find_by_serial(&all, "03-07-02")[0].id, "b");
        assert_eq!(find_by_serial(&all, "(03-07-02)")[0].id, "b");
        assert!(find_by_serial(&all, "03-07-09").is_empty());
        assert!(find_by_serial(&all, "nonsense").is_empty());
    }

    #[test]
    fn serial_lookup_reports_every_holder() {
        let graph = WorkflowGraph::standard();
        let mut all = sample(&graph);
        let mut twin = all[1].clone();
        twin.id = "b-restored".into();
        all.push(twin);

        let ids: Vec<&str> = find_by_serial(&all, "03-07-02")
            .iter()
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(ids, vec!["b", "b-restored"]);
    }

    #[test]
    fn year_month_parsing() {
        let ym: YearMonth = "2024-03".parse().unwrap();
        assert_eq!(ym.to_string(), "2024-03");
        assert!("2024-13".parse::<YearMonth>().is_err());
        assert!("March".parse::<YearMonth>().is_err());
    }
}
