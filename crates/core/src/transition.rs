//! Single-entity transitions: advance one step, revert one step.
//!
//! Both operations validate against the workflow graph, build the audit
//! note, append exactly one event and return a new value. The input entity
//! is never modified, so a rejected call leaves the caller's copy intact.
//! Neither operation deduplicates retries: two calls write two events.

use crate::audit::{non_blank, AuditEvent, EventContext};
use crate::error::EngineError;
use crate::requisition::Requisition;
use crate::workflow::{StateDef, WorkflowGraph};

/// Result of a single applied transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub requisition: Requisition,
    pub event: AuditEvent,
    pub from: String,
    pub to: String,
}

/// Move `entity` to the immediate successor of its current state.
///
/// When the current state requires a pickup name, `pickup_name` must be
/// non-blank; it is stored on `receiver_name` and folded into the note.
/// Outside pickup states a supplied pickup name is ignored.
pub fn advance(
    graph: &WorkflowGraph,
    entity: &Requisition,
    note: Option<&str>,
    pickup_name: Option<&str>,
    ctx: &EventContext,
) -> Result<Transition, EngineError> {
    let current = graph.state(&entity.status)?;
    let target = graph
        .successor(&current.key)?
        .ok_or_else(|| EngineError::NoForwardTransition {
            state: current.key.clone(),
        })?;

    let pickup = if current.requires_pickup {
        Some(
            non_blank(pickup_name).ok_or_else(|| EngineError::PickupNameRequired {
                state: current.key.clone(),
            })?,
        )
    } else {
        None
    };

    let mut text = target.label.clone();
    if let Some(note) = non_blank(note) {
        text.push_str(&format!(" [note: {}]", note));
    }
    if let Some(name) = pickup {
        text.push_str(&format!(" [pickup: {}]", name));
    }

    let mut updated = entity.clone();
    if let Some(name) = pickup {
        updated.receiver_name = Some(name.to_string());
    }
    Ok(apply(updated, current, target, text, ctx))
}

/// Move `entity` back to the immediate predecessor of its current state.
///
/// A blank reason is rejected before anything else is looked at.
pub fn revert(
    graph: &WorkflowGraph,
    entity: &Requisition,
    reason: &str,
    ctx: &EventContext,
) -> Result<Transition, EngineError> {
    let reason = non_blank(Some(reason)).ok_or(EngineError::ReasonRequired)?;
    let current = graph.state(&entity.status)?;
    let target = graph
        .predecessor(&current.key)?
        .ok_or_else(|| EngineError::NoReverseTransition {
            state: current.key.clone(),
        })?;

    let text = format!("reverted to: {} [reason: {}]", target.label, reason);
    Ok(apply(entity.clone(), current, target, text, ctx))
}

/// Jump straight to the terminal state, naming every bypassed state in
/// the note. Eligibility is the caller's responsibility.
pub(crate) fn complete_directly(
    graph: &WorkflowGraph,
    entity: &Requisition,
    note: Option<&str>,
    ctx: &EventContext,
) -> Result<Transition, EngineError> {
    let current = graph.state(&entity.status)?;
    let target = graph.terminal();
    if current.key == target.key {
        return Err(EngineError::NoForwardTransition {
            state: current.key.clone(),
        });
    }

    let bypassed: Vec<&str> = graph
        .between(&current.key, &target.key)
        .iter()
        .map(|s| s.label.as_str())
        .collect();
    let mut text = format!(
        "{} [direct completion, bypassed: {}]",
        target.label,
        if bypassed.is_empty() {
            "none".to_string()
        } else {
            bypassed.join("; ")
        }
    );
    if let Some(note) = non_blank(note) {
        text.push_str(&format!(" [note: {}]", note));
    }
    Ok(apply(entity.clone(), current, target, text, ctx))
}

fn apply(
    mut updated: Requisition,
    from: &StateDef,
    to: &StateDef,
    note: String,
    ctx: &EventContext,
) -> Transition {
    let event = ctx.event(&to.key, note);
    updated.status = to.key.clone();
    updated.updated_at = Some(match updated.updated_at {
        Some(prev) if prev > ctx.at => prev,
        _ => ctx.at,
    });
    updated.push_event(event.clone());
    Transition {
        requisition: updated,
        event,
        from: from.key.clone(),
        to: to.key.clone(),
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::requisition::{LineItemDraft, RequisitionDraft};
    use crate::serial::{DayPrefix, SerialId};
    use rust_decimal::Decimal;
    use time::macros::{date, datetime};

    /// `[Received, Reviewing(pickup), Returned, Closed]`.
    pub(crate) fn review_graph() -> WorkflowGraph {
        WorkflowGraph::new(vec![
            StateDef::new("Received", "Received", 1).with_next_action("Review"),
            StateDef::new("Reviewing", "Reviewing", 1)
                .with_next_action("Hand back")
                .requiring_pickup(),
            StateDef::new("Returned", "Returned", 2)
                .with_next_action("Close")
                .as_returned(),
            StateDef::new("Closed", "Closed", 3),
        ])
        .unwrap()
    }

    pub(crate) fn ctx() -> EventContext {
        EventContext::new("clerk", datetime!(2024-03-07 10:00 UTC))
    }

    pub(crate) fn requisition_in(
        graph: &WorkflowGraph,
        id: &str,
        seq: u32,
        status: &str,
    ) -> Requisition {
        let draft = RequisitionDraft {
            unit: "Office".to_string(),
            applicant: "Chen".to_string(),
            items: vec![LineItemDraft::new("Pen", Decimal::from(2), Decimal::from(15), "ea")],
            ..RequisitionDraft::default()
        };
        let serial = SerialId::new(DayPrefix::from_date(date!(2024 - 03 - 07)), seq);
        let mut req = Requisition::create(id, serial, draft, graph, &ctx()).unwrap();
        req.status = status.to_string();
        req
    }

    #[test]
    fn scenario_advance_pickup_and_revert() {
        let graph = review_graph();
        let req = requisition_in(&graph, "r1", 1, "Received");

        let t1 = advance(&graph, &req, None, None, &ctx()).unwrap();
        assert_eq!(t1.requisition.status, "Reviewing");
        assert_eq!(t1.from, "Received");

        let err = advance(&graph, &t1.requisition, None, None, &ctx()).unwrap_err();
        assert_eq!(
            err,
            EngineError::PickupNameRequired {
                state: "Reviewing".to_string()
            }
        );

        let t2 = advance(&graph, &t1.requisition, None, Some("Lin"), &ctx()).unwrap();
        assert_eq!(t2.requisition.status, "Returned");
        assert_eq!(t2.requisition.receiver_name.as_deref(), Some("Lin"));
        assert!(t2.event.note.contains("Lin"));

        let t3 = revert(&graph, &t2.requisition, "wrong amount", &ctx()).unwrap();
        assert_eq!(t3.requisition.status, "Reviewing");
        assert_eq!(
            t3.event.note,
            "reverted to: Reviewing [reason: wrong amount]"
        );
        assert_eq!(t3.requisition.logs.len(), 4);
    }

    #[test]
    fn advance_note_format() {
        let graph = review_graph();
        let req = requisition_in(&graph, "r1", 1, "Received");

        let plain = advance(&graph, &req, None, None, &ctx()).unwrap();
        assert_eq!(plain.event.note, "Reviewing");

        let noted = advance(&graph, &req, Some("  urgent  "), None, &ctx()).unwrap();
        assert_eq!(noted.event.note, "Reviewing [note: urgent]");

        let blank = advance(&graph, &req, Some("   "), None, &ctx()).unwrap();
        assert_eq!(blank.event.note, "Reviewing");

        let reviewing = requisition_in(&graph, "r2", 2, "Reviewing");
        let both = advance(&graph, &reviewing, Some("ok"), Some(" Lin "), &ctx()).unwrap();
        assert_eq!(both.event.note, "Returned [note: ok] [pickup: Lin]");
        assert_eq!(both.event.operator, "clerk");
        assert_eq!(both.event.status, "Returned");
    }

    #[test]
    fn pickup_name_outside_pickup_state_is_ignored() {
        let graph = review_graph();
        let req = requisition_in(&graph, "r1", 1, "Received");
        let t = advance(&graph, &req, None, Some("Lin"), &ctx()).unwrap();
        assert_eq!(t.requisition.receiver_name, None);
        assert_eq!(t.event.note, "Reviewing");
    }

    #[test]
    fn advance_from_terminal_fails() {
        let graph = review_graph();
        let req = requisition_in(&graph, "r1", 1, "Closed");
        assert_eq!(
            advance(&graph, &req, None, None, &ctx()).unwrap_err(),
            EngineError::NoForwardTransition {
                state: "Closed".to_string()
            }
        );
    }

    #[test]
    fn revert_from_initial_fails() {
        let graph = review_graph();
        let req = requisition_in(&graph, "r1", 1, "Received");
        assert_eq!(
            revert(&graph, &req, "oops", &ctx()).unwrap_err(),
            EngineError::NoReverseTransition {
                state: "Received".to_string()
            }
        );
    }

    #[test]
    fn revert_without_reason_always_fails_first() {
        let graph = review_graph();
        for status in ["Received", "Reviewing", "Returned", "Closed"] {
            let req = requisition_in(&graph, "r1", 1, status);
            for reason in ["", "   ", "\t\n"] {
                assert_eq!(
                    revert(&graph, &req, reason, &ctx()).unwrap_err(),
                    EngineError::ReasonRequired
                );
            }
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        let graph = review_graph();
        let req = requisition_in(&graph, "r1", 1, "Limbo");
        assert!(matches!(
            advance(&graph, &req, None, None, &ctx()),
            Err(EngineError::UnknownState { .. })
        ));
        assert!(matches!(
            revert(&graph, &req, "why", &ctx()),
            Err(EngineError::UnknownState { .. })
        ));
    }

    #[test]
    fn transitions_move_exactly_one_step_and_append_only() {
        let graph = WorkflowGraph::standard();
        let mut req = requisition_in(&graph, "r1", 1, "P1_RECEIVED");
        let mut history = req.logs.clone();

        while !graph.is_terminal(&req.status) {
            let before = graph.position(&req.status).unwrap();
            let t = advance(&graph, &req, None, Some("Lin"), &ctx()).unwrap();
            assert_eq!(graph.position(&t.requisition.status), Some(before + 1));
            assert_eq!(&t.requisition.logs[..history.len()], &history[..]);
            assert_eq!(t.requisition.logs.len(), history.len() + 1);
            req = t.requisition;
            history = req.logs.clone();
        }

        while graph.position(&req.status) != Some(0) {
            let before = graph.position(&req.status).unwrap();
            let t = revert(&graph, &req, "rework", &ctx()).unwrap();
            assert_eq!(graph.position(&t.requisition.status), Some(before - 1));
            assert_eq!(&t.requisition.logs[..history.len()], &history[..]);
            req = t.requisition;
            history = req.logs.clone();
        }
    }

    #[test]
    fn updated_at_never_moves_backwards() {
        let graph = review_graph();
        let mut req = requisition_in(&graph, "r1", 1, "Received");
        let later = datetime!(2024-03-08 10:00 UTC);
        req.updated_at = Some(later);

        let t = advance(&graph, &req, None, None, &ctx()).unwrap();
        assert_eq!(t.requisition.updated_at, Some(later));
        assert_eq!(t.requisition.status_times.get("Reviewing"), Some(&ctx().at));
    }

    #[test]
    fn direct_completion_names_bypassed_states() {
        let graph = WorkflowGraph::standard();
        let req = requisition_in(&graph, "r1", 1, "P1_RECEIVED");
        let t = complete_directly(&graph, &req, Some("paid by card"), &ctx()).unwrap();
        assert_eq!(t.requisition.status, "COMPLETED");
        assert!(t.event.note.starts_with("Round 3: closed [direct completion, bypassed: "));
        assert!(t.event.note.contains("Round 1: under accounting review"));
        assert!(t.event.note.ends_with("[note: paid by card]"));
    }
}
