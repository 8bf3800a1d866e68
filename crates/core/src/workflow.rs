//! The workflow graph: an immutable, ordered table of lifecycle states.
//!
//! State *N*'s only forward target is state *N+1* in declaration order and
//! its only reverse target is state *N-1*. The reverse map is derived once
//! at construction and the table is validated before a graph can exist, so
//! every lookup afterwards can rely on a consistent total order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// One row of the workflow table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDef {
    pub key: String,
    pub label: String,
    /// Label of the action that leaves this state. `None` only on the terminal state.
    pub next_action: Option<String>,
    /// Advancing past this state requires a pickup name.
    #[serde(default)]
    pub requires_pickup: bool,
    /// Coarse grouping for filtering and reporting. Not enforced on transitions.
    pub phase: u8,
    /// Marks a "returned" sub-state (handed back to the requester).
    #[serde(default)]
    pub returned: bool,
}

impl StateDef {
    pub fn new(key: &str, label: &str, phase: u8) -> Self {
        StateDef {
            key: key.to_string(),
            label: label.to_string(),
            next_action: None,
            requires_pickup: false,
            phase,
            returned: false,
        }
    }

    pub fn with_next_action(mut self, action: &str) -> Self {
        self.next_action = Some(action.to_string());
        self
    }

    pub fn requiring_pickup(mut self) -> Self {
        self.requires_pickup = true;
        self
    }

    pub fn as_returned(mut self) -> Self {
        self.returned = true;
        self
    }
}

/// Ordered, validated workflow table with its derived reverse map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowGraph {
    states: Vec<StateDef>,
    index: BTreeMap<String, usize>,
    reverse: BTreeMap<String, String>,
}

impl WorkflowGraph {
    /// Build a graph from states in forward order.
    ///
    /// Rejects tables with fewer than two states, blank or duplicate keys,
    /// blank labels, a missing action on a non-terminal state, an action on
    /// the terminal state, a pickup requirement on the terminal state, or
    /// phases that decrease along the forward order.
    pub fn new(states: Vec<StateDef>) -> Result<Self, EngineError> {
        if states.len() < 2 {
            return Err(EngineError::invalid_workflow(
                "a workflow needs at least an initial and a terminal state",
            ));
        }

        let mut index = BTreeMap::new();
        let last = states.len() - 1;
        for (i, state) in states.iter().enumerate() {
            if state.key.trim().is_empty() {
                return Err(EngineError::invalid_workflow(format!(
                    "state #{} has a blank key",
                    i
                )));
            }
            if state.label.trim().is_empty() {
                return Err(EngineError::invalid_workflow(format!(
                    "state '{}' has a blank label",
                    state.key
                )));
            }
            if index.insert(state.key.clone(), i).is_some() {
                return Err(EngineError::invalid_workflow(format!(
                    "duplicate state key '{}'",
                    state.key
                )));
            }

            let has_action = state
                .next_action
                .as_deref()
                .is_some_and(|a| !a.trim().is_empty());
            if i == last {
                if state.next_action.is_some() {
                    return Err(EngineError::invalid_workflow(format!(
                        "terminal state '{}' must not declare a next action",
                        state.key
                    )));
                }
                if state.requires_pickup {
                    return Err(EngineError::invalid_workflow(format!(
                        "terminal state '{}' cannot require a pickup name",
                        state.key
                    )));
                }
            } else if !has_action {
                return Err(EngineError::invalid_workflow(format!(
                    "state '{}' has no next action label",
                    state.key
                )));
            }

            if i > 0 && state.phase < states[i - 1].phase {
                return Err(EngineError::invalid_workflow(format!(
                    "phase decreases from '{}' ({}) to '{}' ({})",
                    states[i - 1].key,
                    states[i - 1].phase,
                    state.key,
                    state.phase
                )));
            }
        }

        Ok(WorkflowGraph::from_checked(states))
    }

    /// Derive the lookup maps for a table that already passed validation.
    fn from_checked(states: Vec<StateDef>) -> Self {
        let index = states
            .iter()
            .enumerate()
            .map(|(i, state)| (state.key.clone(), i))
            .collect();
        let reverse = states
            .windows(2)
            .map(|pair| (pair[1].key.clone(), pair[0].key.clone()))
            .collect();
        WorkflowGraph {
            states,
            index,
            reverse,
        }
    }

    /// The procurement pipeline: receipt, accounting review, pickup,
    /// invoice reconciliation, closure.
    ///
    /// The table is fixed, so it is not re-validated here. The unit test
    /// `standard_table_is_valid_and_ordered` runs it through [`WorkflowGraph::new`].
    pub fn standard() -> Self {
        WorkflowGraph::from_checked(Self::standard_states())
    }

    fn standard_states() -> Vec<StateDef> {
        vec![
            StateDef::new("P1_RECEIVED", "Round 1: received by general affairs", 1)
                .with_next_action("Send to accounting"),
            StateDef::new("P1_ACCOUNTING", "Round 1: under accounting review", 1)
                .with_next_action("Notify for pickup")
                .requiring_pickup(),
            StateDef::new(
                "P1_RETURNED",
                "Round 2: picked up (awaiting reconciliation)",
                2,
            )
            .with_next_action("Invoice received")
            .as_returned(),
            StateDef::new("P2_RECEIVED", "Round 2: invoice and voucher received", 2)
                .with_next_action("Send for reconciliation"),
            StateDef::new("P2_ACCOUNTING", "Round 2: reconciliation in progress", 2)
                .with_next_action("Close case"),
            StateDef::new("COMPLETED", "Round 3: closed", 3),
        ]
    }

    pub fn states(&self) -> &[StateDef] {
        &self.states
    }

    pub fn initial(&self) -> &StateDef {
        &self.states[0]
    }

    pub fn terminal(&self) -> &StateDef {
        &self.states[self.states.len() - 1]
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&StateDef> {
        self.index.get(key).map(|&i| &self.states[i])
    }

    /// Look up a state, failing with `UnknownState` for keys outside the table.
    pub fn state(&self, key: &str) -> Result<&StateDef, EngineError> {
        self.get(key).ok_or_else(|| EngineError::UnknownState {
            state: key.to_string(),
        })
    }

    /// Position of `key` in the forward order.
    pub fn position(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    /// The immediate forward successor, or `None` on the terminal state.
    pub fn successor(&self, key: &str) -> Result<Option<&StateDef>, EngineError> {
        let i = self.position(key).ok_or_else(|| EngineError::UnknownState {
            state: key.to_string(),
        })?;
        Ok(self.states.get(i + 1))
    }

    /// The immediate predecessor from the reverse map, or `None` on the initial state.
    pub fn predecessor(&self, key: &str) -> Result<Option<&StateDef>, EngineError> {
        self.state(key)?;
        Ok(self.reverse.get(key).and_then(|prev| self.get(prev)))
    }

    pub fn is_terminal(&self, key: &str) -> bool {
        self.position(key) == Some(self.states.len() - 1)
    }

    pub fn first_phase(&self) -> u8 {
        self.initial().phase
    }

    pub fn last_phase(&self) -> u8 {
        self.terminal().phase
    }

    /// States strictly between `from` and `to` in forward order.
    pub fn between(&self, from: &str, to: &str) -> Vec<&StateDef> {
        match (self.position(from), self.position(to)) {
            (Some(a), Some(b)) if a + 1 < b => self.states[a + 1..b].iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Reverse lookup from a display label to its state key.
    pub fn key_for_label(&self, label: &str) -> Option<&str> {
        self.states
            .iter()
            .find(|s| s.label == label)
            .map(|s| s.key.as_str())
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn four_state() -> WorkflowGraph {
        WorkflowGraph::new(vec![
            StateDef::new("Received", "Received", 1).with_next_action("Review"),
            StateDef::new("Reviewing", "Reviewing", 1)
                .with_next_action("Return")
                .requiring_pickup(),
            StateDef::new("Returned", "Returned", 2)
                .with_next_action("Close")
                .as_returned(),
            StateDef::new("Closed", "Closed", 3),
        ])
        .unwrap()
    }

    #[test]
    fn standard_table_is_valid_and_ordered() {
        let graph = WorkflowGraph::standard();
        let validated = WorkflowGraph::new(WorkflowGraph::standard_states()).unwrap();
        assert_eq!(graph, validated);
        let keys: Vec<&str> = graph.states().iter().map(|s| s.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "P1_RECEIVED",
                "P1_ACCOUNTING",
                "P1_RETURNED",
                "P2_RECEIVED",
                "P2_ACCOUNTING",
                "COMPLETED"
            ]
        );
        assert_eq!(graph.initial().key, "P1_RECEIVED");
        assert_eq!(graph.terminal().key, "COMPLETED");
        assert!(graph.get("P1_ACCOUNTING").unwrap().requires_pickup);
    }

    #[test]
    fn successor_is_next_in_declaration_order() {
        let graph = four_state();
        assert_eq!(graph.successor("Received").unwrap().unwrap().key, "Reviewing");
        assert_eq!(graph.successor("Returned").unwrap().unwrap().key, "Closed");
        assert!(graph.successor("Closed").unwrap().is_none());
    }

    #[test]
    fn reverse_map_is_exact_inverse_of_forward_order() {
        let graph = four_state();
        assert!(graph.predecessor("Received").unwrap().is_none());
        for pair in graph.states().windows(2) {
            let prev = graph.predecessor(&pair[1].key).unwrap().unwrap();
            assert_eq!(prev.key, pair[0].key);
            let next = graph.successor(&pair[0].key).unwrap().unwrap();
            assert_eq!(next.key, pair[1].key);
        }
    }

    #[test]
    fn unknown_state_lookups_fail() {
        let graph = four_state();
        assert_eq!(
            graph.successor("Nowhere"),
            Err(EngineError::UnknownState {
                state: "Nowhere".to_string()
            })
        );
        assert!(graph.predecessor("Nowhere").is_err());
        assert!(!graph.contains("Nowhere"));
    }

    #[test]
    fn between_lists_bypassed_states() {
        let graph = WorkflowGraph::standard();
        let skipped: Vec<&str> = graph
            .between("P1_RECEIVED", "COMPLETED")
            .iter()
            .map(|s| s.key.as_str())
            .collect();
        assert_eq!(
            skipped,
            vec!["P1_ACCOUNTING", "P1_RETURNED", "P2_RECEIVED", "P2_ACCOUNTING"]
        );
        assert!(graph.between("P2_ACCOUNTING", "COMPLETED").is_empty());
        assert!(graph.between("COMPLETED", "P1_RECEIVED").is_empty());
    }

    #[test]
    fn label_lookup_round_trips() {
        let graph = WorkflowGraph::standard();
        for state in graph.states() {
            assert_eq!(graph.key_for_label(&state.label), Some(state.key.as_str()));
        }
        assert_eq!(graph.key_for_label("no such label"), None);
    }

    // ──────────────────────────────────────
    // Static validation
    // ──────────────────────────────────────

    #[test]
    fn rejects_single_state_table() {
        let err = WorkflowGraph::new(vec![StateDef::new("Only", "Only", 1)]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidWorkflow { .. }));
    }

    #[test]
    fn rejects_duplicate_keys() {
        let err = WorkflowGraph::new(vec![
            StateDef::new("A", "A", 1).with_next_action("go"),
            StateDef::new("A", "Again", 1),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("duplicate state key 'A'"));
    }

    #[test]
    fn rejects_missing_action_on_non_terminal() {
        let err = WorkflowGraph::new(vec![
            StateDef::new("A", "A", 1),
            StateDef::new("B", "B", 1),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("no next action"));
    }

    #[test]
    fn rejects_action_or_pickup_on_terminal() {
        let err = WorkflowGraph::new(vec![
            StateDef::new("A", "A", 1).with_next_action("go"),
            StateDef::new("B", "B", 1).with_next_action("again"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("must not declare a next action"));

        let err = WorkflowGraph::new(vec![
            StateDef::new("A", "A", 1).with_next_action("go"),
            StateDef::new("B", "B", 1).requiring_pickup(),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("cannot require a pickup"));
    }

    #[test]
    fn rejects_decreasing_phase() {
        let err = WorkflowGraph::new(vec![
            StateDef::new("A", "A", 2).with_next_action("go"),
            StateDef::new("B", "B", 1),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("phase decreases"));
    }
}
