//! Version validation / OCC conformance tests.

use std::future::Future;

use super::{make_requisition, seed, TestResult};
use crate::{RequisitionStore, StorageError};

pub(super) async fn run_version_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: RequisitionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "version",
        "versions_increment_sequentially",
        versions_increment_sequentially(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "update_with_wrong_version_returns_conflict",
        update_with_wrong_version_returns_conflict(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "stale_version_after_intervening_commit",
        stale_version_after_intervening_commit(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "versioned_delete_checks_version",
        versioned_delete_checks_version(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "conflict_leaves_record_untouched",
        conflict_leaves_record_untouched(factory).await,
    ));

    results
}

/// Set `status` on `id` at `expected_version` in its own snapshot.
async fn update_status<S: RequisitionStore>(
    storage: &S,
    id: &str,
    status: &str,
    expected_version: i64,
) -> Result<Result<i64, StorageError>, String> {
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let mut current = storage
        .get_for_update(&mut snap, id)
        .await
        .map_err(|e| format!("get_for_update: {e}"))?;
    current.requisition.status = status.to_string();
    let result = storage
        .update_requisition(&mut snap, current.requisition, expected_version)
        .await;
    match &result {
        Ok(_) => storage
            .commit_snapshot(snap)
            .await
            .map_err(|e| format!("commit: {e}"))?,
        Err(_) => storage
            .abort_snapshot(snap)
            .await
            .map_err(|e| format!("abort: {e}"))?,
    }
    Ok(result)
}

fn expect_conflict(result: Result<i64, StorageError>, expected_version: i64) -> Result<(), String> {
    match result {
        Err(StorageError::ConcurrentConflict {
            id,
            expected_version: v,
        }) if id == "req-1" && v == expected_version => Ok(()),
        Err(StorageError::ConcurrentConflict { id, expected_version: v }) => Err(format!(
            "conflict carries ({id}, {v}), expected (req-1, {expected_version})"
        )),
        Err(e) => Err(format!("expected ConcurrentConflict, got {e}")),
        Ok(v) => Err(format!("expected ConcurrentConflict, got Ok({v})")),
    }
}

async fn versions_increment_sequentially<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RequisitionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed(&storage, vec![make_requisition("req-1", "(01-06-01)", "P1_RECEIVED")]).await?;

    for (expected, status) in ["P1_ACCOUNTING", "P1_RETURNED", "P2_RECEIVED"]
        .into_iter()
        .enumerate()
    {
        let new_version = update_status(&storage, "req-1", status, expected as i64)
            .await?
            .map_err(|e| format!("update to {status}: {e}"))?;
        if new_version != expected as i64 + 1 {
            return Err(format!(
                "expected version {}, got {new_version}",
                expected + 1
            ));
        }
    }
    let got = storage
        .get_requisition("req-1")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if got.version != 3 || got.requisition.status != "P2_RECEIVED" {
        return Err(format!(
            "expected P2_RECEIVED@3, got {}@{}",
            got.requisition.status, got.version
        ));
    }
    Ok(())
}

async fn update_with_wrong_version_returns_conflict<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RequisitionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed(&storage, vec![make_requisition("req-1", "(01-06-01)", "P1_RECEIVED")]).await?;
    expect_conflict(update_status(&storage, "req-1", "P1_ACCOUNTING", 1).await?, 1)?;
    expect_conflict(update_status(&storage, "req-1", "P1_ACCOUNTING", -1).await?, -1)
}

async fn stale_version_after_intervening_commit<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RequisitionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed(&storage, vec![make_requisition("req-1", "(01-06-01)", "P1_RECEIVED")]).await?;

    // Reader observes version 0, a writer moves it to 1, the reader writes back.
    let observed = storage
        .get_requisition("req-1")
        .await
        .map_err(|e| format!("get: {e}"))?
        .version;
    update_status(&storage, "req-1", "P1_ACCOUNTING", observed)
        .await?
        .map_err(|e| format!("intervening update: {e}"))?;
    expect_conflict(
        update_status(&storage, "req-1", "COMPLETED", observed).await?,
        observed,
    )
}

async fn versioned_delete_checks_version<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let result = storage.delete_requisition(&mut snap, "req-1", Some(5)).await;
    let _ = storage.abort_snapshot(snap).await;

    match result {
        Err(StorageError::ConcurrentConflict { .. }) => Ok(()),
        Err(e) => Err(format!("expected ConcurrentConflict, got {e}")),
        Ok(()) => Err("stale versioned delete succeeded".to_string()),
    }
}

async fn conflict_leaves_record_untouched<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RequisitionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed(&storage, vec![make_requisition("req-1", "(01-06-01)", "P1_RECEIVED")]).await?;
    let _ = update_status(&storage, "req-1", "COMPLETED", 7).await?;

    let got = storage
        .get_requisition("req-1")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if got.version != 0 || got.requisition.status != "P1_RECEIVED" {
        return Err(format!(
            "record changed by a rejected update: {}@{}",
            got.requisition.status, got.version
        ));
    }
    Ok(())
}
