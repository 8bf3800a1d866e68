//! Atomic commit conformance tests.
//!
//! A snapshot that touches several requisitions and the activity log commits
//! all of it or none of it.

use std::future::Future;

use super::{make_activity, make_requisition, seed, TestResult};
use crate::record::ActivityKind;
use crate::{ActivityFilter, RequisitionStore, StorageError};

pub(super) async fn run_commit_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: RequisitionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "commit",
        "multi_record_update_all_visible_after_commit",
        multi_record_update_all_visible_after_commit(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "multi_record_update_none_visible_after_abort",
        multi_record_update_none_visible_after_abort(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "put_inserts_and_overwrites",
        put_inserts_and_overwrites(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "delete_removes_after_commit",
        delete_removes_after_commit(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "multiple_commits_accumulate",
        multiple_commits_accumulate(factory).await,
    ));

    results
}

/// Move every listed requisition to `status` and log one batch entry.
async fn batch_update<S: RequisitionStore>(
    storage: &S,
    ids: &[&str],
    status: &str,
    commit: bool,
) -> Result<(), String> {
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    for id in ids {
        let mut current = storage
            .get_for_update(&mut snap, id)
            .await
            .map_err(|e| format!("get_for_update {id}: {e}"))?;
        current.requisition.status = status.to_string();
        storage
            .update_requisition(&mut snap, current.requisition, current.version)
            .await
            .map_err(|e| format!("update {id}: {e}"))?;
    }
    storage
        .append_activity(
            &mut snap,
            make_activity(ActivityKind::BatchStatusChange, "clerk", "batch"),
        )
        .await
        .map_err(|e| format!("append_activity: {e}"))?;
    if commit {
        storage
            .commit_snapshot(snap)
            .await
            .map_err(|e| format!("commit: {e}"))
    } else {
        storage
            .abort_snapshot(snap)
            .await
            .map_err(|e| format!("abort: {e}"))
    }
}

async fn three_received<S: RequisitionStore>(storage: &S) -> Result<(), String> {
    seed(
        storage,
        vec![
            make_requisition("req-1", "(01-06-01)", "P1_RECEIVED"),
            make_requisition("req-2", "(01-06-02)", "P1_RECEIVED"),
            make_requisition("req-3", "(01-06-03)", "P1_RECEIVED"),
        ],
    )
    .await
}

async fn multi_record_update_all_visible_after_commit<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RequisitionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    three_received(&storage).await?;
    batch_update(&storage, &["req-1", "req-3"], "P1_ACCOUNTING", true).await?;

    for (id, status, version) in [
        ("req-1", "P1_ACCOUNTING", 1),
        ("req-2", "P1_RECEIVED", 0),
        ("req-3", "P1_ACCOUNTING", 1),
    ] {
        let got = storage
            .get_requisition(id)
            .await
            .map_err(|e| format!("get {id}: {e}"))?;
        if got.requisition.status != status || got.version != version {
            return Err(format!(
                "{id}: expected {status}@{version}, got {}@{}",
                got.requisition.status, got.version
            ));
        }
    }
    let log = storage
        .list_activity(&ActivityFilter::default())
        .await
        .map_err(|e| format!("activity: {e}"))?;
    if log.len() != 1 {
        return Err(format!("expected 1 activity entry, got {}", log.len()));
    }
    Ok(())
}

async fn multi_record_update_none_visible_after_abort<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RequisitionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    three_received(&storage).await?;
    batch_update(&storage, &["req-1", "req-2", "req-3"], "P1_ACCOUNTING", false).await?;

    let all = storage
        .list_requisitions(Some("P1_RECEIVED"))
        .await
        .map_err(|e| format!("list: {e}"))?;
    if all.len() != 3 {
        return Err(format!("expected 3 untouched records, got {}", all.len()));
    }
    let log = storage
        .list_activity(&ActivityFilter::default())
        .await
        .map_err(|e| format!("activity: {e}"))?;
    if !log.is_empty() {
        return Err("aborted activity entry is visible".to_string());
    }
    Ok(())
}

async fn put_inserts_and_overwrites<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let replaced = storage
        .put_requisition(&mut snap, make_requisition("req-1", "(01-06-01)", "COMPLETED"))
        .await
        .map_err(|e| format!("put existing: {e}"))?;
    let inserted = storage
        .put_requisition(&mut snap, make_requisition("req-9", "(01-05-09)", "P2_RECEIVED"))
        .await
        .map_err(|e| format!("put new: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    if replaced != 1 || inserted != 0 {
        return Err(format!(
            "expected versions 1 and 0, got {replaced} and {inserted}"
        ));
    }
    let got = storage
        .get_requisition("req-1")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if got.requisition.status != "COMPLETED" {
        return Err(format!("put did not overwrite: {}", got.requisition.status));
    }
    Ok(())
}

async fn delete_removes_after_commit<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RequisitionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    three_received(&storage).await?;

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .delete_requisition(&mut snap, "req-1", None)
        .await
        .map_err(|e| format!("delete req-1: {e}"))?;
    storage
        .delete_requisition(&mut snap, "req-2", Some(0))
        .await
        .map_err(|e| format!("delete req-2: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    for id in ["req-1", "req-2"] {
        match storage.get_requisition(id).await {
            Err(StorageError::NotFound { .. }) => {}
            Err(e) => return Err(format!("{id}: expected NotFound, got {e}")),
            Ok(_) => return Err(format!("{id} still present after delete")),
        }
    }
    storage
        .get_requisition("req-3")
        .await
        .map_err(|e| format!("req-3 should survive: {e}"))?;
    Ok(())
}

async fn multiple_commits_accumulate<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RequisitionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    for i in 1..=4 {
        seed(
            &storage,
            vec![make_requisition(
                &format!("req-{i}"),
                &format!("(01-06-0{i})"),
                "P1_RECEIVED",
            )],
        )
        .await?;
    }
    let all = storage
        .list_requisitions(None)
        .await
        .map_err(|e| format!("list: {e}"))?;
    if all.len() != 4 {
        return Err(format!("expected 4 records, got {}", all.len()));
    }
    Ok(())
}
