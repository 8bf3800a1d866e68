//! Batch transitions over a candidate set.
//!
//! Every candidate is screened independently against the action's
//! eligibility predicate. Eligible entities are transformed; the rest are
//! skipped untouched. All screening and validation happens before the first
//! transformation, so an error means nothing was applied.

use serde::{Deserialize, Serialize};

use crate::audit::{non_blank, EventContext};
use crate::error::EngineError;
use crate::requisition::Requisition;
use crate::transition::{advance, complete_directly, revert};
use crate::workflow::WorkflowGraph;

/// The transition applied to every eligible candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BatchAction {
    /// One step forward. Rejected wholesale if any eligible candidate sits
    /// in a pickup-required state.
    Advance { note: Option<String> },
    /// One step back with a shared reason.
    Revert { reason: String },
    /// One step forward out of the pickup-required state, recording the
    /// same pickup name on every entity.
    Receiver {
        pickup_name: String,
        note: Option<String>,
    },
    /// Jump from the first phase straight to the terminal state.
    DirectComplete { note: Option<String> },
}

impl BatchAction {
    pub fn name(&self) -> &'static str {
        match self {
            BatchAction::Advance { .. } => "advance",
            BatchAction::Revert { .. } => "revert",
            BatchAction::Receiver { .. } => "receiver",
            BatchAction::DirectComplete { .. } => "direct_complete",
        }
    }

    /// Whether `entity` can take this action. Unknown states are never eligible.
    pub fn is_eligible(&self, graph: &WorkflowGraph, entity: &Requisition) -> bool {
        let Some(state) = graph.get(&entity.status) else {
            return false;
        };
        match self {
            BatchAction::Advance { .. } => !graph.is_terminal(&state.key),
            BatchAction::Revert { .. } => matches!(graph.predecessor(&state.key), Ok(Some(_))),
            BatchAction::Receiver { .. } => state.requires_pickup,
            BatchAction::DirectComplete { .. } => {
                state.phase == graph.first_phase()
                    && !state.returned
                    && !graph.is_terminal(&state.key)
            }
        }
    }

    fn validate_params(&self, graph: &WorkflowGraph) -> Result<(), EngineError> {
        match self {
            BatchAction::Revert { reason } if non_blank(Some(reason)).is_none() => {
                Err(EngineError::ReasonRequired)
            }
            BatchAction::Receiver { pickup_name, .. }
                if non_blank(Some(pickup_name)).is_none() =>
            {
                let state = graph
                    .states()
                    .iter()
                    .find(|s| s.requires_pickup)
                    .map(|s| s.key.clone())
                    .unwrap_or_default();
                Err(EngineError::PickupNameRequired { state })
            }
            _ => Ok(()),
        }
    }
}

/// A candidate that was left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedEntity {
    pub id: String,
    pub serial_id: String,
    pub status: String,
}

/// Aggregate result of one batch call.
///
/// `applied_count + skipped_count` always equals the number of candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Eligible candidates after the transition, in candidate order.
    pub applied: Vec<Requisition>,
    pub skipped: Vec<SkippedEntity>,
    pub applied_count: usize,
    pub skipped_count: usize,
}

/// Apply `action` to every eligible candidate.
///
/// Check order: action parameters, eligibility partition, the advance
/// pickup pre-check, then the empty-eligible check.
pub fn apply_batch(
    graph: &WorkflowGraph,
    candidates: &[Requisition],
    action: &BatchAction,
    ctx: &EventContext,
) -> Result<BatchOutcome, EngineError> {
    action.validate_params(graph)?;

    let (eligible, ineligible): (Vec<&Requisition>, Vec<&Requisition>) = candidates
        .iter()
        .partition(|entity| action.is_eligible(graph, entity));

    if let BatchAction::Advance { .. } = action {
        let blocked: Vec<&Requisition> = eligible
            .iter()
            .copied()
            .filter(|e| graph.get(&e.status).is_some_and(|s| s.requires_pickup))
            .collect();
        if let Some(first) = blocked.first() {
            return Err(EngineError::BatchPreconditionViolated {
                state: first.status.clone(),
                serial_ids: blocked.iter().map(|e| e.serial_id.clone()).collect(),
            });
        }
    }

    if eligible.is_empty() {
        return Err(EngineError::EmptyEligibleSet {
            action: action.name().to_string(),
            candidates: candidates.len(),
        });
    }

    let applied = eligible
        .into_iter()
        .map(|entity| {
            let transition = match action {
                BatchAction::Advance { note } => {
                    advance(graph, entity, note.as_deref(), None, ctx)
                }
                BatchAction::Revert { reason } => revert(graph, entity, reason, ctx),
                BatchAction::Receiver { pickup_name, note } => {
                    advance(graph, entity, note.as_deref(), Some(pickup_name), ctx)
                }
                BatchAction::DirectComplete { note } => {
                    complete_directly(graph, entity, note.as_deref(), ctx)
                }
            }?;
            Ok(transition.requisition)
        })
        .collect::<Result<Vec<_>, EngineError>>()?;

    let skipped: Vec<SkippedEntity> = ineligible
        .into_iter()
        .map(|e| SkippedEntity {
            id: e.id.clone(),
            serial_id: e.serial_id.clone(),
            status: e.status.clone(),
        })
        .collect();

    Ok(BatchOutcome {
        applied_count: applied.len(),
        skipped_count: skipped.len(),
        applied,
        skipped,
    })
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
