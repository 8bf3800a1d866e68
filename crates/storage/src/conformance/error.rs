//! Error-variant conformance tests.

use std::future::Future;

use super::{make_requisition, seed, TestResult};
use crate::{ActivityFilter, RequisitionStore, StorageError};

pub(super) async fn run_error_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: RequisitionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "error",
        "get_nonexistent_is_not_found",
        get_nonexistent_is_not_found(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "get_for_update_nonexistent_is_not_found",
        get_for_update_nonexistent_is_not_found(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "update_nonexistent_is_not_found",
        update_nonexistent_is_not_found(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "delete_nonexistent_is_not_found",
        delete_nonexistent_is_not_found(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "empty_store_lists_nothing",
        empty_store_lists_nothing(factory).await,
    ));

    results
}

fn expect_not_found<T>(result: Result<T, StorageError>, id: &str) -> Result<(), String> {
    match result {
        Err(StorageError::NotFound { id: got }) if got == id => Ok(()),
        Err(StorageError::NotFound { id: got }) => {
            Err(format!("NotFound carries id '{got}', expected '{id}'"))
        }
        Err(e) => Err(format!("expected NotFound, got {e}")),
        Ok(_) => Err("expected NotFound, got Ok".to_string()),
    }
}

async fn get_nonexistent_is_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RequisitionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    expect_not_found(storage.get_requisition("missing").await, "missing")
}

async fn get_for_update_nonexistent_is_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let result = storage.get_for_update(&mut snap, "missing").await;
    let _ = storage.abort_snapshot(snap).await;
    expect_not_found(result, "missing")
}

async fn update_nonexistent_is_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let result = storage
        .update_requisition(&mut snap, make_requisition("ghost", "(01-06-01)", "P1_RECEIVED"), 0)
        .await;
    let _ = storage.abort_snapshot(snap).await;
    expect_not_found(result, "ghost")
}

async fn delete_nonexistent_is_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let unversioned = storage.delete_requisition(&mut snap, "ghost", None).await;
    let versioned = storage.delete_requisition(&mut snap, "ghost", Some(0)).await;
    let _ = storage.abort_snapshot(snap).await;
    expect_not_found(unversioned, "ghost")?;
    expect_not_found(versioned, "ghost")
}

async fn empty_store_lists_nothing<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RequisitionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let all = storage
        .list_requisitions(None)
        .await
        .map_err(|e| format!("list: {e}"))?;
    let log = storage
        .list_activity(&ActivityFilter::default())
        .await
        .map_err(|e| format!("activity: {e}"))?;
    if !all.is_empty() || !log.is_empty() {
        return Err(format!(
            "expected empty store, got {} requisitions and {} activity entries",
            all.len(),
            log.len()
        ));
    }
    Ok(())
}
