//! Insert conformance tests.

use std::future::Future;

use time::macros::datetime;

use super::{make_requisition, seed, ts, TestResult};
use crate::{RequisitionStore, StorageError};

pub(super) async fn run_insert_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: RequisitionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "insert",
        "insert_starts_at_version_0",
        insert_starts_at_version_0(factory).await,
    ));
    results.push(TestResult::from_result(
        "insert",
        "insert_stamps_missing_timestamps",
        insert_stamps_missing_timestamps(factory).await,
    ));
    results.push(TestResult::from_result(
        "insert",
        "insert_keeps_existing_created_at",
        insert_keeps_existing_created_at(factory).await,
    ));
    results.push(TestResult::from_result(
        "insert",
        "inserted_fields_round_trip",
        inserted_fields_round_trip(factory).await,
    ));
    results.push(TestResult::from_result(
        "insert",
        "double_insert_returns_already_exists",
        double_insert_returns_already_exists(factory).await,
    ));
    results.push(TestResult::from_result(
        "insert",
        "double_insert_across_snapshots",
        double_insert_across_snapshots(factory).await,
    ));
    results.push(TestResult::from_result(
        "insert",
        "inserted_readable_via_get_for_update",
        inserted_readable_via_get_for_update(factory).await,
    ));

    results
}

async fn insert_starts_at_version_0<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let record = storage
        .insert_requisition(&mut snap, make_requisition("req-1", "(01-06-01)", "P1_RECEIVED"), ts())
        .await
        .map_err(|e| format!("insert: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    if record.version != 0 {
        return Err(format!("expected version 0, got {}", record.version));
    }
    let stored = storage
        .get_requisition("req-1")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if stored.version != 0 {
        return Err(format!("expected stored version 0, got {}", stored.version));
    }
    Ok(())
}

async fn insert_stamps_missing_timestamps<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RequisitionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed(&storage, vec![make_requisition("req-1", "(01-06-01)", "P1_RECEIVED")]).await?;
    let stored = storage
        .get_requisition("req-1")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if stored.requisition.created_at != Some(ts()) {
        return Err(format!(
            "expected createdAt {:?}, got {:?}",
            ts(),
            stored.requisition.created_at
        ));
    }
    if stored.requisition.updated_at != Some(ts()) {
        return Err(format!(
            "expected updatedAt {:?}, got {:?}",
            ts(),
            stored.requisition.updated_at
        ));
    }
    Ok(())
}

async fn insert_keeps_existing_created_at<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RequisitionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let earlier = datetime!(2024-12-31 23:00 UTC);
    let mut req = make_requisition("req-1", "(12-31-01)", "P1_RECEIVED");
    req.created_at = Some(earlier);
    seed(&storage, vec![req]).await?;

    let stored = storage
        .get_requisition("req-1")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if stored.requisition.created_at != Some(earlier) {
        return Err(format!(
            "createdAt overwritten: {:?}",
            stored.requisition.created_at
        ));
    }
    Ok(())
}

async fn inserted_fields_round_trip<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RequisitionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let mut req = make_requisition("req-1", "(01-06-01)", "P1_ACCOUNTING");
    req.receiver_name = Some("Lin".to_string());
    req.is_urgent = true;
    req.created_at = Some(ts());
    req.updated_at = Some(ts());
    seed(&storage, vec![req.clone()]).await?;

    let stored = storage
        .get_requisition("req-1")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if stored.requisition != req {
        return Err(format!(
            "stored requisition differs: {:?}",
            stored.requisition
        ));
    }
    Ok(())
}

async fn double_insert_returns_already_exists<S, F, Fut>(factory: &F) -> Result<(), String>
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
        .map_err(|e| format!("first insert: {e}"))?;
    let second = storage
        .insert_requisition(&mut snap, make_requisition("req-1", "(01-06-02)", "P1_RECEIVED"), ts())
        .await;
    let _ = storage.abort_snapshot(snap).await;

    match second {
        Err(StorageError::AlreadyExists { id }) if id == "req-1" => Ok(()),
        Err(e) => Err(format!("expected AlreadyExists(req-1), got {e}")),
        Ok(_) => Err("expected AlreadyExists, got Ok".to_string()),
    }
}

async fn double_insert_across_snapshots<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let second = storage
        .insert_requisition(&mut snap, make_requisition("req-1", "(01-06-02)", "P1_RECEIVED"), ts())
        .await;
    let _ = storage.abort_snapshot(snap).await;

    match second {
        Err(StorageError::AlreadyExists { .. }) => Ok(()),
        Err(e) => Err(format!("expected AlreadyExists, got {e}")),
        Ok(_) => Err("expected AlreadyExists, got Ok".to_string()),
    }
}

async fn inserted_readable_via_get_for_update<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let own_write = storage.get_for_update(&mut snap, "req-1").await;
    let _ = storage.abort_snapshot(snap).await;

    match own_write {
        Ok(record) if record.requisition.status == "P1_RECEIVED" => Ok(()),
        Ok(record) => Err(format!("unexpected status {}", record.requisition.status)),
        Err(e) => Err(format!("snapshot should see its own insert: {e}")),
    }
}
