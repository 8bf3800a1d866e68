//! Snapshot isolation conformance tests.
//!
//! Verifies that uncommitted writes are invisible outside a snapshot,
//! committed writes are visible, and aborted or dropped writes are discarded.

use std::future::Future;

use super::{make_requisition, seed, ts, TestResult};
use crate::{RequisitionStore, StorageError};

pub(super) async fn run_snapshot_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: RequisitionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "snapshot",
        "commit_empty_snapshot_succeeds",
        commit_empty_snapshot_succeeds(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "uncommitted_insert_invisible_to_get",
        uncommitted_insert_invisible_to_get(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "uncommitted_insert_invisible_to_list",
        uncommitted_insert_invisible_to_list(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "uncommitted_update_invisible",
        uncommitted_update_invisible(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "abort_discards_insert",
        abort_discards_insert(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "dropped_snapshot_rolls_back",
        dropped_snapshot_rolls_back(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "sequential_snapshots_see_prior_commits",
        sequential_snapshots_see_prior_commits(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "list_with_status_filter",
        list_with_status_filter(factory).await,
    ));

    results
}

async fn commit_empty_snapshot_succeeds<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RequisitionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))
}

async fn uncommitted_insert_invisible_to_get<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RequisitionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .insert_requisition(&mut snap, make_requisition("req-1", "(01-06-01)", "P1_RECEIVED"), ts())
        .await
        .map_err(|e| format!("insert: {e}"))?;
    let outside = storage.get_requisition("req-1").await;
    let _ = storage.abort_snapshot(snap).await;

    match outside {
        Err(StorageError::NotFound { .. }) => Ok(()),
        Err(e) => Err(format!("expected NotFound, got {e}")),
        Ok(_) => Err("uncommitted insert visible outside snapshot".to_string()),
    }
}

async fn uncommitted_insert_invisible_to_list<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RequisitionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .insert_requisition(&mut snap, make_requisition("req-1", "(01-06-01)", "P1_RECEIVED"), ts())
        .await
        .map_err(|e| format!("insert: {e}"))?;
    let listed = storage.list_requisitions(None).await;
    let _ = storage.abort_snapshot(snap).await;

    let listed = listed.map_err(|e| format!("list: {e}"))?;
    if !listed.is_empty() {
        return Err(format!("expected empty list, got {}", listed.len()));
    }
    Ok(())
}

async fn uncommitted_update_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RequisitionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed(&storage, vec![make_requisition("req-1", "(01-06-01)", "P1_RECEIVED")]).await?;

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let mut current = storage
        .get_for_update(&mut snap, "req-1")
        .await
        .map_err(|e| format!("get_for_update: {e}"))?;
    current.requisition.status = "P1_ACCOUNTING".to_string();
    storage
        .update_requisition(&mut snap, current.requisition, current.version)
        .await
        .map_err(|e| format!("update: {e}"))?;
    let outside = storage.get_requisition("req-1").await;
    let _ = storage.abort_snapshot(snap).await;

    let outside = outside.map_err(|e| format!("get: {e}"))?;
    if outside.requisition.status != "P1_RECEIVED" || outside.version != 0 {
        return Err(format!(
            "uncommitted update visible: status {} version {}",
            outside.requisition.status, outside.version
        ));
    }
    Ok(())
}

async fn abort_discards_insert<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RequisitionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .insert_requisition(&mut snap, make_requisition("req-1", "(01-06-01)", "P1_RECEIVED"), ts())
        .await
        .map_err(|e| format!("insert: {e}"))?;
    storage
        .abort_snapshot(snap)
        .await
        .map_err(|e| format!("abort: {e}"))?;

    match storage.get_requisition("req-1").await {
        Err(StorageError::NotFound { .. }) => Ok(()),
        Err(e) => Err(format!("expected NotFound, got {e}")),
        Ok(_) => Err("aborted insert is visible".to_string()),
    }
}

async fn dropped_snapshot_rolls_back<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RequisitionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    {
        let mut snap = storage
            .begin_snapshot()
            .await
            .map_err(|e| format!("begin: {e}"))?;
        storage
            .insert_requisition(&mut snap, make_requisition("req-1", "(01-06-01)", "P1_RECEIVED"), ts())
            .await
            .map_err(|e| format!("insert: {e}"))?;
    }

    // A new snapshot must be obtainable once the old one is gone.
    seed(&storage, vec![make_requisition("req-2", "(01-06-02)", "P1_RECEIVED")]).await?;
    match storage.get_requisition("req-1").await {
        Err(StorageError::NotFound { .. }) => Ok(()),
        Err(e) => Err(format!("expected NotFound, got {e}")),
        Ok(_) => Err("dropped snapshot was committed".to_string()),
    }
}

async fn sequential_snapshots_see_prior_commits<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RequisitionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed(&storage, vec![make_requisition("req-1", "(01-06-01)", "P1_RECEIVED")]).await?;

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let seen = storage.get_for_update(&mut snap, "req-1").await;
    let listed = storage.list_for_update(&mut snap).await;
    let _ = storage.abort_snapshot(snap).await;

    seen.map_err(|e| format!("prior commit invisible to new snapshot: {e}"))?;
    let listed = listed.map_err(|e| format!("list_for_update: {e}"))?;
    if listed.len() != 1 {
        return Err(format!("expected 1 record in snapshot, got {}", listed.len()));
    }
    Ok(())
}

async fn list_with_status_filter<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RequisitionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed(
        &storage,
        vec![
            make_requisition("req-1", "(01-06-01)", "P1_RECEIVED"),
            make_requisition("req-2", "(01-06-02)", "COMPLETED"),
            make_requisition("req-3", "(01-06-03)", "P1_RECEIVED"),
        ],
    )
    .await?;

    let received = storage
        .list_requisitions(Some("P1_RECEIVED"))
        .await
        .map_err(|e| format!("list: {e}"))?;
    let all = storage
        .list_requisitions(None)
        .await
        .map_err(|e| format!("list: {e}"))?;
    if received.len() != 2 || all.len() != 3 {
        return Err(format!(
            "expected 2 filtered / 3 total, got {} / {}",
            received.len(),
            all.len()
        ));
    }
    if received
        .iter()
        .any(|r| r.requisition.status != "P1_RECEIVED")
    {
        return Err("filter returned a record in another status".to_string());
    }
    Ok(())
}
