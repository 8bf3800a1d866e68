//! The requisition desk: every user-facing operation as one storage snapshot.
//!
//! Each mutating method opens a snapshot, reads what it needs for update,
//! runs the pure engine, writes the results with version checks, appends one
//! activity record and commits. Any error aborts the snapshot, so a failed
//! call leaves the store exactly as it was.

use rand::distributions::Alphanumeric;
use rand::Rng;
use reqtrack_core::{
    advance, allocate, apply_batch, closed_by_month, find_by_serial, merge, operator_name,
    revert, BatchAction, BatchOutcome, ClosedMonth, Directory, DirectoryKind, EventContext,
    ExportScope, Identity, MergeFlag, MergePolicy, Requisition, RequisitionDraft,
    RequisitionQuery, Transition, WorkflowGraph, YearMonth,
};
use reqtrack_storage::{
    ActivityFilter, ActivityKind, ActivityRecord, RequisitionStore, StorageError,
};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::error::DeskError;

const ID_LEN: usize = 20;

/// Tunables for a [`Desk`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeskConfig {
    /// Snapshot attempts for `create` before a serial collision is reported.
    pub max_attempts: u32,
}

impl Default for DeskConfig {
    fn default() -> Self {
        DeskConfig { max_attempts: 5 }
    }
}

/// Counts reported by [`Desk::import`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub inserted: usize,
    pub replaced: usize,
    pub carried: usize,
    pub rejected: usize,
}

/// Binds a [`WorkflowGraph`] and an acting identity to a store.
pub struct Desk<S: RequisitionStore> {
    store: S,
    graph: WorkflowGraph,
    identity: Option<Identity>,
    config: DeskConfig,
    clock: fn() -> OffsetDateTime,
}

impl<S: RequisitionStore> Desk<S> {
    pub fn new(store: S, graph: WorkflowGraph) -> Self {
        Desk {
            store,
            graph,
            identity: None,
            config: DeskConfig::default(),
            clock: OffsetDateTime::now_utc,
        }
    }

    pub fn with_identity(mut self, identity: Option<Identity>) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_config(mut self, config: DeskConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the wall clock. Serials and timestamps are taken from it.
    pub fn with_clock(mut self, clock: fn() -> OffsetDateTime) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    /// Name stamped on audit and activity entries.
    pub fn operator(&self) -> String {
        operator_name(self.identity.as_ref())
    }

    fn ctx(&self, at: OffsetDateTime) -> EventContext {
        EventContext::new(self.operator(), at)
    }

    fn activity_record(
        &self,
        kind: ActivityKind,
        detail: String,
        at: OffsetDateTime,
    ) -> ActivityRecord {
        ActivityRecord {
            timestamp: at,
            operator: self.operator(),
            uid: self
                .identity
                .as_ref()
                .map(|i| i.uid().to_string())
                .unwrap_or_default(),
            kind,
            detail,
        }
    }

    /// Commit on success, abort on failure. The original error wins over an
    /// abort failure.
    async fn finish<T>(
        &self,
        snapshot: S::Snapshot,
        result: Result<T, DeskError>,
    ) -> Result<T, DeskError> {
        match result {
            Ok(value) => {
                self.store.commit_snapshot(snapshot).await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(abort) = self.store.abort_snapshot(snapshot).await {
                    warn!(error = %abort, "failed to abort snapshot");
                }
                Err(e)
            }
        }
    }

    // ── Lookup ───────────────────────────────────────────────────────────

    /// Resolve a storage id or a serial (`MM-DD-NN` or `(MM-DD-NN)`) to an id.
    ///
    /// A serial held by more than one requisition is refused rather than
    /// picking one of them.
    pub async fn resolve(&self, reference: &str) -> Result<String, DeskError> {
        match self.store.get_requisition(reference).await {
            Ok(found) => return Ok(found.requisition.id),
            Err(StorageError::NotFound { .. }) => {}
            Err(e) => return Err(e.into()),
        }
        let all = self.all().await?;
        match find_by_serial(&all, reference).as_slice() {
            [] => Err(DeskError::NotFound {
                reference: reference.to_string(),
            }),
            [only] => Ok(only.id.clone()),
            holders => Err(DeskError::AmbiguousReference {
                reference: reference.to_string(),
                ids: holders.iter().map(|r| r.id.clone()).collect(),
            }),
        }
    }

    pub async fn show(&self, reference: &str) -> Result<Requisition, DeskError> {
        let id = self.resolve(reference).await?;
        Ok(self.store.get_requisition(&id).await?.requisition)
    }

    async fn all(&self) -> Result<Vec<Requisition>, DeskError> {
        Ok(self
            .store
            .list_requisitions(None)
            .await?
            .into_iter()
            .map(|v| v.requisition)
            .collect())
    }

    /// Committed requisitions matching `query`, newest first.
    pub async fn search(&self, query: &RequisitionQuery) -> Result<Vec<Requisition>, DeskError> {
        let all = self.all().await?;
        Ok(query.run(&self.graph, all))
    }

    pub async fn closed_months(&self) -> Result<Vec<ClosedMonth>, DeskError> {
        let all = self.all().await?;
        Ok(closed_by_month(&self.graph, &all))
    }

    pub async fn activity(&self, filter: &ActivityFilter) -> Result<Vec<ActivityRecord>, DeskError> {
        Ok(self.store.list_activity(filter).await?)
    }

    // ── Single-entity operations ─────────────────────────────────────────

    /// Open a new requisition with the next serial of today.
    ///
    /// The serial is allocated inside the snapshot that inserts the record.
    /// A `DuplicateSerial` from the store restarts the whole snapshot, up to
    /// `max_attempts` times.
    pub async fn create(&self, draft: RequisitionDraft) -> Result<Requisition, DeskError> {
        let attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let at = (self.clock)();
            let mut snap = self.store.begin_snapshot().await?;
            let result = self.create_in(&mut snap, draft.clone(), at).await;
            match self.finish(snap, result).await {
                Err(DeskError::Infrastructure(StorageError::DuplicateSerial { serial_id }))
                    if attempt < attempts =>
                {
                    warn!(serial_id = %serial_id, attempt, "serial collision, retrying");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn create_in(
        &self,
        snap: &mut S::Snapshot,
        draft: RequisitionDraft,
        at: OffsetDateTime,
    ) -> Result<Requisition, DeskError> {
        let day = at.date();
        let taken = self
            .store
            .serials_for_day(snap, reqtrack_core::DayPrefix::from_date(day))
            .await?;
        let serial = allocate(taken.iter().map(String::as_str), day)?;
        let requisition = Requisition::create(new_id(), serial, draft, &self.graph, &self.ctx(at))?;
        let stored = self.store.insert_requisition(snap, requisition, at).await?;
        let created = stored.requisition;
        self.store
            .append_activity(
                snap,
                self.activity_record(
                    ActivityKind::Create,
                    format!("created {}", created.serial_id),
                    at,
                ),
            )
            .await?;
        info!(id = %created.id, serial_id = %created.serial_id, "requisition created");
        Ok(created)
    }

    /// Overwrite header fields and items.
    pub async fn edit(
        &self,
        reference: &str,
        draft: RequisitionDraft,
    ) -> Result<Requisition, DeskError> {
        let id = self.resolve(reference).await?;
        let at = (self.clock)();
        let mut snap = self.store.begin_snapshot().await?;
        let result = self
            .modify_in(&mut snap, &id, at, ActivityKind::Update, |req| {
                req.apply_edit(draft)?;
                Ok(format!("edited {}", req.serial_id))
            })
            .await;
        self.finish(snap, result).await
    }

    pub async fn set_urgent(&self, reference: &str, urgent: bool) -> Result<Requisition, DeskError> {
        let id = self.resolve(reference).await?;
        let at = (self.clock)();
        let mut snap = self.store.begin_snapshot().await?;
        let result = self
            .modify_in(&mut snap, &id, at, ActivityKind::Update, |req| {
                req.set_urgent(urgent);
                Ok(format!(
                    "{} marked {}",
                    req.serial_id,
                    if urgent { "urgent" } else { "not urgent" }
                ))
            })
            .await;
        self.finish(snap, result).await
    }

    async fn modify_in<F>(
        &self,
        snap: &mut S::Snapshot,
        id: &str,
        at: OffsetDateTime,
        kind: ActivityKind,
        change: F,
    ) -> Result<Requisition, DeskError>
    where
        F: FnOnce(&mut Requisition) -> Result<String, reqtrack_core::EngineError> + Send,
    {
        let current = self.store.get_for_update(snap, id).await?;
        let mut updated = current.requisition;
        let detail = change(&mut updated)?;
        touch(&mut updated, at);
        self.store
            .update_requisition(snap, updated.clone(), current.version)
            .await?;
        self.store
            .append_activity(snap, self.activity_record(kind, detail, at))
            .await?;
        debug!(id = %updated.id, serial_id = %updated.serial_id, "requisition updated");
        Ok(updated)
    }

    /// Move one requisition to the next state.
    pub async fn advance(
        &self,
        reference: &str,
        note: Option<&str>,
        pickup_name: Option<&str>,
    ) -> Result<Transition, DeskError> {
        let id = self.resolve(reference).await?;
        let at = (self.clock)();
        let ctx = self.ctx(at);
        let mut snap = self.store.begin_snapshot().await?;
        let result = self
            .transition_in(&mut snap, &id, at, |req| {
                advance(&self.graph, req, note, pickup_name, &ctx)
            })
            .await;
        self.finish(snap, result).await
    }

    /// Move one requisition back to the previous state.
    pub async fn revert(&self, reference: &str, reason: &str) -> Result<Transition, DeskError> {
        let id = self.resolve(reference).await?;
        let at = (self.clock)();
        let ctx = self.ctx(at);
        let mut snap = self.store.begin_snapshot().await?;
        let result = self
            .transition_in(&mut snap, &id, at, |req| revert(&self.graph, req, reason, &ctx))
            .await;
        self.finish(snap, result).await
    }

    async fn transition_in<F>(
        &self,
        snap: &mut S::Snapshot,
        id: &str,
        at: OffsetDateTime,
        step: F,
    ) -> Result<Transition, DeskError>
    where
        F: FnOnce(&Requisition) -> Result<Transition, reqtrack_core::EngineError> + Send,
    {
        let current = self.store.get_for_update(snap, id).await?;
        let mut transition = step(&current.requisition)?;
        touch(&mut transition.requisition, at);
        self.store
            .update_requisition(snap, transition.requisition.clone(), current.version)
            .await?;
        let detail = format!(
            "{}: {} -> {}",
            transition.requisition.serial_id, transition.from, transition.to
        );
        self.store
            .append_activity(snap, self.activity_record(ActivityKind::StatusChange, detail, at))
            .await?;
        info!(
            serial_id = %transition.requisition.serial_id,
            from = %transition.from,
            to = %transition.to,
            "status changed"
        );
        Ok(transition)
    }

    pub async fn delete(&self, reference: &str) -> Result<Requisition, DeskError> {
        let id = self.resolve(reference).await?;
        let at = (self.clock)();
        let mut snap = self.store.begin_snapshot().await?;
        let result = self.delete_in(&mut snap, &id, at).await;
        self.finish(snap, result).await
    }

    async fn delete_in(
        &self,
        snap: &mut S::Snapshot,
        id: &str,
        at: OffsetDateTime,
    ) -> Result<Requisition, DeskError> {
        let current = self.store.get_for_update(snap, id).await?;
        self.store
            .delete_requisition(snap, id, Some(current.version))
            .await?;
        let detail = format!("deleted {}", current.requisition.serial_id);
        self.store
            .append_activity(snap, self.activity_record(ActivityKind::Delete, detail, at))
            .await?;
        info!(id = %id, serial_id = %current.requisition.serial_id, "requisition deleted");
        Ok(current.requisition)
    }

    // ── Bulk operations ──────────────────────────────────────────────────

    /// Apply one batch action to the referenced requisitions atomically.
    ///
    /// Every candidate is read in one snapshot; either every eligible
    /// entity is written and one activity record appended, or nothing is.
    pub async fn apply_batch(
        &self,
        references: &[String],
        action: &BatchAction,
    ) -> Result<BatchOutcome, DeskError> {
        let mut ids: Vec<String> = Vec::with_capacity(references.len());
        for reference in references {
            let id = self.resolve(reference).await?;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        let at = (self.clock)();
        let mut snap = self.store.begin_snapshot().await?;
        let result = self.batch_in(&mut snap, &ids, action, at).await;
        self.finish(snap, result).await
    }

    async fn batch_in(
        &self,
        snap: &mut S::Snapshot,
        ids: &[String],
        action: &BatchAction,
        at: OffsetDateTime,
    ) -> Result<BatchOutcome, DeskError> {
        let mut candidates = Vec::with_capacity(ids.len());
        let mut versions = Vec::with_capacity(ids.len());
        for id in ids {
            let current = self.store.get_for_update(snap, id).await?;
            versions.push(current.version);
            candidates.push(current.requisition);
        }

        let mut outcome = apply_batch(&self.graph, &candidates, action, &self.ctx(at))?;
        for req in &mut outcome.applied {
            touch(req, at);
        }
        // `applied` keeps candidate order with the skipped entities left out.
        let mut applied = outcome.applied.iter().peekable();
        for (candidate, version) in candidates.iter().zip(&versions) {
            if let Some(req) = applied.next_if(|r| r.id == candidate.id) {
                self.store
                    .update_requisition(snap, req.clone(), *version)
                    .await?;
            }
        }

        let serials: Vec<&str> = outcome.applied.iter().map(|r| r.serial_id.as_str()).collect();
        let detail = format!(
            "batch {}: {} applied, {} skipped ({})",
            action.name(),
            outcome.applied_count,
            outcome.skipped_count,
            serials.join(", ")
        );
        let record = self.activity_record(ActivityKind::BatchStatusChange, detail, at);
        self.store.append_activity(snap, record).await?;
        info!(
            action = action.name(),
            applied = outcome.applied_count,
            skipped = outcome.skipped_count,
            "batch applied"
        );
        Ok(outcome)
    }

    /// Delete every closed requisition of `month` in one snapshot.
    pub async fn purge_closed_month(&self, month: YearMonth) -> Result<Vec<Requisition>, DeskError> {
        let at = (self.clock)();
        let mut snap = self.store.begin_snapshot().await?;
        let result = self.purge_in(&mut snap, month, at).await;
        self.finish(snap, result).await
    }

    async fn purge_in(
        &self,
        snap: &mut S::Snapshot,
        month: YearMonth,
        at: OffsetDateTime,
    ) -> Result<Vec<Requisition>, DeskError> {
        let live = self.store.list_for_update(snap).await?;
        let plain: Vec<Requisition> = live.iter().map(|v| v.requisition.clone()).collect();
        let group = closed_by_month(&self.graph, &plain)
            .into_iter()
            .find(|g| g.month == month)
            .ok_or_else(|| DeskError::NotFound {
                reference: month.to_string(),
            })?;

        for req in &group.requisitions {
            let version = live
                .iter()
                .find(|v| v.requisition.id == req.id)
                .map(|v| v.version);
            self.store.delete_requisition(snap, &req.id, version).await?;
        }
        let detail = format!("{}: {} closed requisition(s) deleted", month, group.requisitions.len());
        self.store
            .append_activity(snap, self.activity_record(ActivityKind::BatchDelete, detail, at))
            .await?;
        info!(month = %month, deleted = group.requisitions.len(), "closed month purged");
        Ok(group.requisitions)
    }

    /// Restore a backup over the live data.
    ///
    /// Records whose status is not a state of the desk's graph are counted
    /// as rejected and never written, alongside records with a blank id.
    pub async fn import(
        &self,
        imported: Vec<Requisition>,
        policy: MergePolicy,
    ) -> Result<ImportSummary, DeskError> {
        let at = (self.clock)();
        let mut snap = self.store.begin_snapshot().await?;
        let result = self.import_in(&mut snap, imported, policy, at).await;
        self.finish(snap, result).await
    }

    async fn import_in(
        &self,
        snap: &mut S::Snapshot,
        imported: Vec<Requisition>,
        policy: MergePolicy,
        at: OffsetDateTime,
    ) -> Result<ImportSummary, DeskError> {
        let live: Vec<Requisition> = self
            .store
            .list_for_update(snap)
            .await?
            .into_iter()
            .map(|v| v.requisition)
            .collect();
        let (known, unknown): (Vec<Requisition>, Vec<Requisition>) = imported
            .into_iter()
            .partition(|r| self.graph.contains(&r.status));
        for r in &unknown {
            warn!(
                id = %r.id,
                status = %r.status,
                "imported requisition has an unknown status, skipped"
            );
        }
        let outcome = merge(&live, known, policy, at)?;
        for record in outcome.staged() {
            self.store
                .put_requisition(snap, record.requisition.clone())
                .await?;
        }
        let summary = ImportSummary {
            inserted: outcome.count(MergeFlag::Inserted),
            replaced: outcome.count(MergeFlag::Replaced),
            carried: outcome.count(MergeFlag::Carried),
            rejected: outcome.rejected + unknown.len(),
        };
        let detail = format!(
            "imported {} new, {} replaced, {} rejected",
            summary.inserted, summary.replaced, summary.rejected
        );
        self.store
            .append_activity(snap, self.activity_record(ActivityKind::Import, detail, at))
            .await?;
        info!(
            inserted = summary.inserted,
            replaced = summary.replaced,
            rejected = summary.rejected,
            "backup imported"
        );
        Ok(summary)
    }

    /// Requisitions in `scope`, serial descending. The export itself is logged.
    pub async fn export(&self, scope: &ExportScope) -> Result<Vec<Requisition>, DeskError> {
        let at = (self.clock)();
        let mut snap = self.store.begin_snapshot().await?;
        let result = self.export_in(&mut snap, scope, at).await;
        self.finish(snap, result).await
    }

    async fn export_in(
        &self,
        snap: &mut S::Snapshot,
        scope: &ExportScope,
        at: OffsetDateTime,
    ) -> Result<Vec<Requisition>, DeskError> {
        let live: Vec<Requisition> = self
            .store
            .list_for_update(snap)
            .await?
            .into_iter()
            .map(|v| v.requisition)
            .collect();
        let selected = scope.select(&self.graph, live);
        let detail = format!("exported {} requisition(s)", selected.len());
        self.store
            .append_activity(snap, self.activity_record(ActivityKind::Export, detail, at))
            .await?;
        Ok(selected)
    }

    // ── Directory ────────────────────────────────────────────────────────

    /// The committed favourites directory.
    pub async fn directory(&self) -> Result<Directory, DeskError> {
        Ok(self.store.get_directory().await?)
    }

    /// Header values of `draft` the directory does not list yet. Nothing is
    /// written; pass the result to [`Desk::remember`] to keep them.
    pub async fn novel_entries(
        &self,
        draft: &RequisitionDraft,
    ) -> Result<Vec<(DirectoryKind, String)>, DeskError> {
        Ok(self.directory().await?.novel_in(draft))
    }

    /// Add entries to the directory. Returns the ones that were new; when
    /// none are, nothing is written or logged.
    pub async fn remember(
        &self,
        entries: &[(DirectoryKind, String)],
    ) -> Result<Vec<(DirectoryKind, String)>, DeskError> {
        let at = (self.clock)();
        let mut snap = self.store.begin_snapshot().await?;
        let result = self.remember_in(&mut snap, entries, at).await;
        self.finish(snap, result).await
    }

    async fn remember_in(
        &self,
        snap: &mut S::Snapshot,
        entries: &[(DirectoryKind, String)],
        at: OffsetDateTime,
    ) -> Result<Vec<(DirectoryKind, String)>, DeskError> {
        let mut directory = self.store.directory_for_update(snap).await?;
        let added: Vec<(DirectoryKind, String)> = entries
            .iter()
            .filter(|(kind, value)| directory.remember(*kind, value))
            .map(|(kind, value)| (*kind, value.trim().to_string()))
            .collect();
        if added.is_empty() {
            return Ok(added);
        }
        self.store.put_directory(snap, directory).await?;
        let listed: Vec<String> = added
            .iter()
            .map(|(kind, value)| format!("{} {}", kind, value))
            .collect();
        let detail = format!("directory: remembered {}", listed.join(", "));
        self.store
            .append_activity(snap, self.activity_record(ActivityKind::Update, detail, at))
            .await?;
        debug!(added = added.len(), "directory updated");
        Ok(added)
    }

    /// Log a session event such as `Login` or `Logout`.
    pub async fn record(&self, kind: ActivityKind, detail: &str) -> Result<(), DeskError> {
        let at = (self.clock)();
        let mut snap = self.store.begin_snapshot().await?;
        let result = self
            .store
            .append_activity(&mut snap, self.activity_record(kind, detail.to_string(), at))
            .await
            .map_err(DeskError::from);
        self.finish(snap, result).await
    }
}

fn new_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_LEN)
        .map(char::from)
        .collect()
}

/// `updatedAt` never moves backwards.
fn touch(req: &mut Requisition, at: OffsetDateTime) {
    req.updated_at = Some(req.updated_at.map_or(at, |prev| prev.max(at)));
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use reqtrack_core::{EngineError, LineItemDraft, StateDef};
    use reqtrack_storage::MemoryStore;
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use time::macros::{date, datetime};

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn graph() -> WorkflowGraph {
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

    fn march_seventh() -> OffsetDateTime {
        datetime!(2024-03-07 10:00 UTC)
    }

    fn desk() -> Desk<MemoryStore> {
        Desk::new(MemoryStore::new(), graph())
            .with_identity(Identity::from_actor("lin.chen@school.example"))
            .with_clock(march_seventh)
    }

    fn draft(subject: &str) -> RequisitionDraft {
        RequisitionDraft {
            unit: "Library".into(),
            applicant: "Chen".into(),
            vendor: Some("Acme".into()),
            items: vec![LineItemDraft::new(subject, dec("2"), dec("15"), "box")],
            ..Default::default()
        }
    }

    async fn kinds(desk: &Desk<MemoryStore>) -> Vec<ActivityKind> {
        desk.activity(&ActivityFilter::default())
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.kind)
            .collect()
    }

    // ── Create ───────────────────────────────────────

    #[tokio::test]
    async fn create_allocates_consecutive_serials_and_logs() {
        let desk = desk();
        let a = desk.create(draft("Pens")).await.unwrap();
        let b = desk.create(draft("Paper")).await.unwrap();

        assert_eq!(a.serial_id, "(03-07-01)");
        assert_eq!(b.serial_id, "(03-07-02)");
        assert_eq!(a.id.len(), 20);
        assert_ne!(a.id, b.id);
        assert_eq!(a.created_at, Some(march_seventh()));
        assert_eq!(a.logs[0].operator, "lin.chen");
        assert_eq!(kinds(&desk).await, vec![ActivityKind::Create, ActivityKind::Create]);
    }

    #[tokio::test]
    async fn invalid_draft_is_a_validation_error_and_writes_nothing() {
        let desk = desk();
        let mut bad = draft("Pens");
        bad.items.clear();

        let err = desk.create(bad).await.unwrap_err();
        assert!(err.is_validation());
        assert!(desk.search(&RequisitionQuery::default()).await.unwrap().is_empty());
        assert!(kinds(&desk).await.is_empty());
    }

    #[tokio::test]
    async fn allocation_continues_after_imported_serials() {
        let desk = desk();
        let mut held = desk.create(draft("Pens")).await.unwrap();
        held.id = "imported".into();
        held.serial_id = "(03-07-02)".into();
        desk.import(vec![held], MergePolicy::ImportWins).await.unwrap();

        let next = desk.create(draft("Paper")).await.unwrap();
        assert_eq!(next.serial_id, "(03-07-03)");
    }

    #[tokio::test]
    async fn oversized_imported_serial_does_not_break_allocation() {
        let desk = desk();
        let mut planted = desk.create(draft("Pens")).await.unwrap();
        planted.serial_id = "(03-07-4294967295)".into();
        desk.import(vec![planted], MergePolicy::ImportWins).await.unwrap();

        let next = desk.create(draft("Paper")).await.unwrap();
        assert_eq!(next.serial_id, "(03-07-01)");

        let mut full = next.clone();
        full.id = "full-day".into();
        full.serial_id = "(03-07-9999)".into();
        desk.import(vec![full], MergePolicy::ImportWins).await.unwrap();
        let err = desk.create(draft("Ink")).await.unwrap_err();
        assert!(matches!(
            err,
            DeskError::Validation(EngineError::SerialSpaceExhausted { .. })
        ));
    }

    #[tokio::test]
    async fn restored_twin_sharing_a_serial_stays_workable() {
        let desk = desk();
        let live = desk.create(draft("Pens")).await.unwrap();
        let mut twin = live.clone();
        twin.id = "from-backup".into();
        let summary = desk.import(vec![twin], MergePolicy::ImportWins).await.unwrap();
        assert_eq!(summary.inserted, 1);

        assert_eq!(desk.advance(&live.id, None, None).await.unwrap().to, "Reviewing");
        assert_eq!(desk.advance("from-backup", None, None).await.unwrap().to, "Reviewing");
        assert_eq!(desk.revert("from-backup", "wrong desk").await.unwrap().to, "Received");
        desk.edit(&live.id, draft("Markers")).await.unwrap();
        let outcome = desk
            .apply_batch(
                &[live.id.clone(), "from-backup".to_string()],
                &BatchAction::DirectComplete { note: None },
            )
            .await
            .unwrap();
        assert_eq!(outcome.applied_count, 2);

        let err = desk.show(&live.serial_id).await.unwrap_err();
        match err {
            DeskError::AmbiguousReference { ids, .. } => {
                assert_eq!(ids.len(), 2);
                assert!(ids.contains(&"from-backup".to_string()));
            }
            other => panic!("expected an ambiguous reference, got {other:?}"),
        }
    }

    // ── Transitions ──────────────────────────────────

    #[tokio::test]
    async fn advance_by_serial_reference_and_revert() {
        let desk = desk();
        let req = desk.create(draft("Pens")).await.unwrap();

        let t = desk.advance("03-07-01", Some("checked"), None).await.unwrap();
        assert_eq!((t.from.as_str(), t.to.as_str()), ("Received", "Reviewing"));
        assert_eq!(t.event.note, "Reviewing [note: checked]");

        let err = desk.advance(&req.id, None, None).await.unwrap_err();
        assert!(matches!(
            err,
            DeskError::Validation(EngineError::PickupNameRequired { .. })
        ));

        let t = desk.advance(&req.id, None, Some("Lin")).await.unwrap();
        assert_eq!(t.requisition.receiver_name.as_deref(), Some("Lin"));

        let t = desk.revert("(03-07-01)", "wrong vendor").await.unwrap();
        assert_eq!(t.to, "Reviewing");

        let stored = desk.show(&req.id).await.unwrap();
        assert_eq!(stored.status, "Reviewing");
        assert_eq!(stored.logs.len(), 4);
        assert_eq!(
            kinds(&desk).await,
            vec![
                ActivityKind::StatusChange,
                ActivityKind::StatusChange,
                ActivityKind::StatusChange,
                ActivityKind::Create,
            ]
        );
    }

    #[tokio::test]
    async fn revert_without_reason_leaves_store_untouched() {
        let desk = desk();
        let req = desk.create(draft("Pens")).await.unwrap();
        desk.advance(&req.id, None, None).await.unwrap();
        let before = desk.show(&req.id).await.unwrap();

        let err = desk.revert(&req.id, "   ").await.unwrap_err();
        assert!(matches!(err, DeskError::Validation(EngineError::ReasonRequired)));
        assert_eq!(desk.show(&req.id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn unknown_reference_is_not_found() {
        let desk = desk();
        let err = desk.advance("(12-31-09)", None, None).await.unwrap_err();
        assert!(matches!(err, DeskError::NotFound { .. }));
    }

    // ── Edits ────────────────────────────────────────

    #[tokio::test]
    async fn edit_and_urgency_keep_status_and_logs() {
        let desk = desk();
        let req = desk.create(draft("Pens")).await.unwrap();

        let edited = desk.edit(&req.id, draft("Markers")).await.unwrap();
        assert_eq!(edited.subject, "Markers");
        assert_eq!(edited.status, "Received");
        assert_eq!(edited.logs, req.logs);

        let urgent = desk.set_urgent(&req.serial_id, true).await.unwrap();
        assert!(urgent.is_urgent);
        assert_eq!(urgent.logs.len(), 1);
        assert_eq!(
            desk.store().get_requisition(&req.id).await.unwrap().version,
            2
        );
    }

    // ── Batch ────────────────────────────────────────

    #[tokio::test]
    async fn batch_advance_rejected_when_pickup_needed() {
        let desk = desk();
        let mut refs = Vec::new();
        for s in ["A", "B", "C"] {
            refs.push(desk.create(draft(s)).await.unwrap().serial_id);
        }
        desk.advance(&refs[1], None, None).await.unwrap();
        let log_before = kinds(&desk).await.len();

        let err = desk
            .apply_batch(&refs, &BatchAction::Advance { note: None })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DeskError::Validation(EngineError::BatchPreconditionViolated { .. })
        ));
        assert_eq!(desk.show(&refs[0]).await.unwrap().status, "Received");
        assert_eq!(kinds(&desk).await.len(), log_before);
    }

    #[tokio::test]
    async fn batch_receiver_applies_only_to_pickup_state() {
        let desk = desk();
        let mut refs = Vec::new();
        for s in ["A", "B", "C"] {
            refs.push(desk.create(draft(s)).await.unwrap().serial_id);
        }
        desk.advance(&refs[0], None, None).await.unwrap();
        desk.advance(&refs[2], None, None).await.unwrap();

        let action = BatchAction::Receiver {
            pickup_name: "Lin".into(),
            note: None,
        };
        let outcome = desk.apply_batch(&refs, &action).await.unwrap();
        assert_eq!((outcome.applied_count, outcome.skipped_count), (2, 1));
        assert_eq!(desk.show(&refs[0]).await.unwrap().status, "Returned");
        assert_eq!(desk.show(&refs[1]).await.unwrap().status, "Received");
        // The skipped middle entity does not shift the versions of its neighbours.
        let last = desk.show(&refs[2]).await.unwrap();
        assert_eq!(last.status, "Returned");
        assert_eq!(desk.store().get_requisition(&last.id).await.unwrap().version, 2);

        let log = desk.activity(&ActivityFilter::default()).await.unwrap();
        assert_eq!(log[0].kind, ActivityKind::BatchStatusChange);
        assert!(log[0].detail.contains("2 applied, 1 skipped"));
    }

    #[tokio::test]
    async fn duplicate_references_are_applied_once() {
        let desk = desk();
        let req = desk.create(draft("A")).await.unwrap();
        let refs = vec![req.id.clone(), req.serial_id.clone()];

        let outcome = desk
            .apply_batch(&refs, &BatchAction::Advance { note: None })
            .await
            .unwrap();
        assert_eq!(outcome.applied_count, 1);
        assert_eq!(desk.show(&req.id).await.unwrap().logs.len(), 2);
    }

    // ── Directory ────────────────────────────────────

    #[tokio::test]
    async fn novel_values_are_reported_until_remembered() {
        let desk = desk();
        let mut first = draft("Pens");
        first.subsidy = Some("Reading corner".into());

        let novel = desk.novel_entries(&first).await.unwrap();
        assert_eq!(
            novel,
            vec![
                (DirectoryKind::Unit, "Library".to_string()),
                (DirectoryKind::Applicant, "Chen".to_string()),
                (DirectoryKind::Project, "Reading corner".to_string()),
                (DirectoryKind::Vendor, "Acme".to_string()),
            ]
        );
        desk.create(first.clone()).await.unwrap();
        assert_eq!(desk.novel_entries(&first).await.unwrap().len(), 4);

        let added = desk.remember(&novel).await.unwrap();
        assert_eq!(added, novel);
        assert!(desk.novel_entries(&first).await.unwrap().is_empty());
        assert_eq!(desk.directory().await.unwrap().vendors, ["Acme".to_string()]);

        let log = desk.activity(&ActivityFilter::default()).await.unwrap();
        assert_eq!(log[0].kind, ActivityKind::Update);
        assert!(log[0].detail.contains("vendor Acme"));
    }

    #[tokio::test]
    async fn remembering_known_values_writes_nothing() {
        let desk = desk();
        let entries = vec![(DirectoryKind::Vendor, "Acme".to_string())];
        desk.remember(&entries).await.unwrap();
        let logged = kinds(&desk).await.len();

        let added = desk
            .remember(&[(DirectoryKind::Vendor, " Acme ".to_string())])
            .await
            .unwrap();
        assert!(added.is_empty());
        assert_eq!(kinds(&desk).await.len(), logged);
    }

    // ── Import / export ──────────────────────────────

    #[tokio::test]
    async fn import_wins_and_appends_restore_event() {
        let desk = desk();
        let live = desk.create(draft("Pens")).await.unwrap();
        let mut backup = live.clone();
        backup.status = "Closed".into();

        let summary = desk
            .import(vec![backup], MergePolicy::ImportWins)
            .await
            .unwrap();
        assert_eq!(summary.replaced, 1);
        assert_eq!(summary.inserted, 0);

        let restored = desk.show(&live.id).await.unwrap();
        assert_eq!(restored.status, "Closed");
        let last = restored.logs.last().unwrap();
        assert_eq!(last.operator, "system");
        assert_eq!(last.note, reqtrack_core::IMPORT_NOTE);
    }

    #[tokio::test]
    async fn import_rejects_records_in_unknown_states() {
        let desk = desk();
        let live = desk.create(draft("Pens")).await.unwrap();
        let mut stray = live.clone();
        stray.id = "stray".into();
        stray.serial_id = "(03-07-02)".into();
        stray.status = "BOGUS".into();
        let mut hijack = live.clone();
        hijack.status = "BOGUS".into();

        let summary = desk
            .import(vec![stray, hijack], MergePolicy::ImportWins)
            .await
            .unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                inserted: 0,
                replaced: 0,
                carried: 1,
                rejected: 2,
            }
        );
        assert!(matches!(desk.show("stray").await, Err(DeskError::NotFound { .. })));
        assert_eq!(desk.show(&live.id).await.unwrap().status, "Received");
        assert!(desk.advance(&live.id, None, None).await.is_ok());
    }

    #[tokio::test]
    async fn strict_import_conflict_writes_nothing() {
        let desk = desk();
        let live = desk.create(draft("Pens")).await.unwrap();
        let mut backup = live.clone();
        backup.status = "Closed".into();

        let err = desk.import(vec![backup], MergePolicy::Strict).await.unwrap_err();
        assert!(matches!(
            err,
            DeskError::Validation(EngineError::MergeIdentityConflict { .. })
        ));
        assert_eq!(desk.show(&live.id).await.unwrap().status, "Received");
    }

    #[tokio::test]
    async fn export_scopes_and_logging() {
        let desk = desk();
        let a = desk.create(draft("A")).await.unwrap();
        desk.create(draft("B")).await.unwrap();
        let mut closed = a.clone();
        closed.status = "Closed".into();
        desk.import(vec![closed], MergePolicy::ImportWins).await.unwrap();

        let all = desk.export(&ExportScope::All).await.unwrap();
        assert_eq!(
            all.iter().map(|r| r.serial_id.as_str()).collect::<Vec<_>>(),
            vec!["(03-07-02)", "(03-07-01)"]
        );
        let closed = desk.export(&ExportScope::Closed).await.unwrap();
        assert_eq!(closed.len(), 1);
        let ranged = desk
            .export(&ExportScope::DateRange {
                from: date!(2024 - 03 - 08),
                to: date!(2024 - 03 - 31),
            })
            .await
            .unwrap();
        assert!(ranged.is_empty());
        assert_eq!(kinds(&desk).await[0], ActivityKind::Export);
    }

    // ── Archive ──────────────────────────────────────

    #[tokio::test]
    async fn purge_closed_month_deletes_only_that_group() {
        let desk = desk();
        let a = desk.create(draft("A")).await.unwrap();
        let b = desk.create(draft("B")).await.unwrap();
        let mut closed = a.clone();
        closed.status = "Closed".into();
        desk.import(vec![closed], MergePolicy::ImportWins).await.unwrap();

        let months = desk.closed_months().await.unwrap();
        assert_eq!(months.len(), 1);
        assert_eq!(months[0].month.to_string(), "2024-03");

        let purged = desk.purge_closed_month(months[0].month).await.unwrap();
        assert_eq!(purged.len(), 1);
        assert!(matches!(desk.show(&a.id).await, Err(DeskError::NotFound { .. })));
        assert!(desk.show(&b.id).await.is_ok());
        assert_eq!(kinds(&desk).await[0], ActivityKind::BatchDelete);

        let err = desk.purge_closed_month(months[0].month).await.unwrap_err();
        assert!(matches!(err, DeskError::NotFound { .. }));
    }

    #[tokio::test]
    async fn delete_and_session_records() {
        let desk = desk();
        let req = desk.create(draft("A")).await.unwrap();
        desk.record(ActivityKind::Login, "signed in").await.unwrap();
        desk.delete(&req.serial_id).await.unwrap();

        assert!(desk.search(&RequisitionQuery::default()).await.unwrap().is_empty());
        let log = desk.activity(&ActivityFilter::default()).await.unwrap();
        assert_eq!(log[0].kind, ActivityKind::Delete);
        assert_eq!(log[1].kind, ActivityKind::Login);
        assert_eq!(log[1].uid, "lin.chen@school.example");
    }

    #[tokio::test]
    async fn anonymous_operator_is_guest() {
        let desk = Desk::new(MemoryStore::new(), graph())
            .with_identity(Identity::from_actor("guest"))
            .with_clock(march_seventh);
        let req = desk.create(draft("A")).await.unwrap();
        assert_eq!(req.logs[0].operator, "guest");
        assert_eq!(desk.operator(), "guest");
    }
}
