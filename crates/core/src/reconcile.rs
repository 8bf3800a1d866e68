//! Merging an imported backup into the live set.
//!
//! The default policy is import-wins: every imported requisition replaces the
//! live one with the same id, annotated with a synthetic restore event. Live
//! edits made after the backup was taken are discarded. Live requisitions the
//! import never mentions are carried over untouched.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::audit::EventContext;
use crate::error::EngineError;
use crate::requisition::Requisition;

/// Note on the event appended to every imported requisition.
pub const IMPORT_NOTE: &str = "batch import (restore)";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Imported copies always replace live ones.
    #[default]
    ImportWins,
    /// Any identity already live aborts the merge.
    Strict,
}

/// How a record ended up in the merged set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeFlag {
    Inserted,
    Replaced,
    Carried,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedRecord {
    pub requisition: Requisition,
    pub flag: MergeFlag,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Imported records first, in import order, then carried live records.
    pub records: Vec<MergedRecord>,
    /// Imported entries without an id. Counted, never staged.
    pub rejected: usize,
}

impl MergeOutcome {
    pub fn count(&self, flag: MergeFlag) -> usize {
        self.records.iter().filter(|r| r.flag == flag).count()
    }

    /// Records that must be written back: everything not carried.
    pub fn staged(&self) -> impl Iterator<Item = &MergedRecord> {
        self.records.iter().filter(|r| r.flag != MergeFlag::Carried)
    }

    pub fn into_requisitions(self) -> Vec<Requisition> {
        self.records.into_iter().map(|r| r.requisition).collect()
    }
}

/// Merge `imported` over `live`.
///
/// When an id occurs more than once in the import, the last occurrence wins.
/// The restore event carries the imported requisition's own status and is
/// appended to the imported log, not the live one.
pub fn merge(
    live: &[Requisition],
    imported: Vec<Requisition>,
    policy: MergePolicy,
    at: OffsetDateTime,
) -> Result<MergeOutcome, EngineError> {
    let live_ids: BTreeSet<&str> = live.iter().map(|r| r.id.as_str()).collect();

    let mut rejected = 0;
    let mut staged: Vec<Requisition> = Vec::new();
    let mut slot: BTreeMap<String, usize> = BTreeMap::new();
    for entity in imported {
        if entity.id.trim().is_empty() {
            rejected += 1;
            continue;
        }
        match slot.get(&entity.id) {
            Some(&i) => staged[i] = entity,
            None => {
                slot.insert(entity.id.clone(), staged.len());
                staged.push(entity);
            }
        }
    }

    if policy == MergePolicy::Strict {
        if let Some(clash) = staged.iter().find(|r| live_ids.contains(r.id.as_str())) {
            return Err(EngineError::MergeIdentityConflict {
                id: clash.id.clone(),
            });
        }
    }

    let system = EventContext::system(at);
    let mut records: Vec<MergedRecord> = staged
        .into_iter()
        .map(|mut requisition| {
            let event = system.event(&requisition.status, IMPORT_NOTE.to_string());
            requisition.logs.push(event);
            let flag = if live_ids.contains(requisition.id.as_str()) {
                MergeFlag::Replaced
            } else {
                MergeFlag::Inserted
            };
            MergedRecord { requisition, flag }
        })
        .collect();

    records.extend(
        live.iter()
            .filter(|r| !slot.contains_key(&r.id))
            .map(|r| MergedRecord {
                requisition: r.clone(),
                flag: MergeFlag::Carried,
            }),
    );

    Ok(MergeOutcome { records, rejected })
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
