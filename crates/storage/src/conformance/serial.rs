//! Serial listing and uniqueness conformance tests.

use std::future::Future;

use reqtrack_core::{allocate, DayPrefix};
use time::macros::date;

use super::{make_requisition, seed, ts, TestResult};
use crate::{RequisitionStore, StorageError};

pub(super) async fn run_serial_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: RequisitionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "serial",
        "serials_for_day_scoped_to_prefix",
        serials_for_day_scoped_to_prefix(factory).await,
    ));
    results.push(TestResult::from_result(
        "serial",
        "serials_for_day_sees_own_writes",
        serials_for_day_sees_own_writes(factory).await,
    ));
    results.push(TestResult::from_result(
        "serial",
        "duplicate_serial_rejected",
        duplicate_serial_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "serial",
        "allocation_inside_snapshot_is_unique",
        allocation_inside_snapshot_is_unique(factory).await,
    ));
    results.push(TestResult::from_result(
        "serial",
        "restored_serial_twin_stays_updatable",
        restored_serial_twin_stays_updatable(factory).await,
    ));
    results.push(TestResult::from_result(
        "serial",
        "update_to_taken_serial_rejected",
        update_to_taken_serial_rejected(factory).await,
    ));

    results
}

async fn serials_for_day_scoped_to_prefix<S, F, Fut>(factory: &F) -> Result<(), String>
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
            make_requisition("req-3", "(01-07-01)", "P1_RECEIVED"),
            make_requisition("req-4", "", "P1_RECEIVED"),
        ],
    )
    .await?;

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let serials = storage
        .serials_for_day(&mut snap, DayPrefix::from_date(date!(2025 - 01 - 06)))
        .await;
    let _ = storage.abort_snapshot(snap).await;

    let mut serials = serials.map_err(|e| format!("serials_for_day: {e}"))?;
    serials.sort();
    if serials != ["(01-06-01)", "(01-06-02)"] {
        return Err(format!("unexpected serials {serials:?}"));
    }
    Ok(())
}

async fn serials_for_day_sees_own_writes<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let serials = storage
        .serials_for_day(&mut snap, DayPrefix::from_date(date!(2025 - 01 - 06)))
        .await;
    let _ = storage.abort_snapshot(snap).await;

    let serials = serials.map_err(|e| format!("serials_for_day: {e}"))?;
    if serials.len() != 1 {
        return Err(format!("expected own insert in serial list, got {serials:?}"));
    }
    Ok(())
}

async fn duplicate_serial_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let result = storage
        .insert_requisition(&mut snap, make_requisition("req-2", "(01-06-01)", "P1_RECEIVED"), ts())
        .await;
    let _ = storage.abort_snapshot(snap).await;

    match result {
        Err(StorageError::DuplicateSerial { serial_id }) if serial_id == "(01-06-01)" => Ok(()),
        Err(e) => Err(format!("expected DuplicateSerial((01-06-01)), got {e}")),
        Ok(_) => Err("duplicate serial accepted".to_string()),
    }
}

async fn allocation_inside_snapshot_is_unique<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RequisitionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let day = date!(2025 - 01 - 06);
    for i in 0..5 {
        let mut snap = storage
            .begin_snapshot()
            .await
            .map_err(|e| format!("begin: {e}"))?;
        let existing = storage
            .serials_for_day(&mut snap, DayPrefix::from_date(day))
            .await
            .map_err(|e| format!("serials_for_day: {e}"))?;
        let serial = allocate(existing.iter().map(String::as_str), day)
            .map_err(|e| format!("allocate: {e}"))?;
        storage
            .insert_requisition(
                &mut snap,
                make_requisition(&format!("req-{i}"), &serial.to_string(), "P1_RECEIVED"),
                ts(),
            )
            .await
            .map_err(|e| format!("insert {serial}: {e}"))?;
        storage
            .commit_snapshot(snap)
            .await
            .map_err(|e| format!("commit: {e}"))?;
    }

    let mut serials: Vec<String> = storage
        .list_requisitions(None)
        .await
        .map_err(|e| format!("list: {e}"))?
        .into_iter()
        .map(|r| r.requisition.serial_id)
        .collect();
    serials.sort();
    let expected: Vec<String> = (1..=5).map(|n| format!("(01-06-0{n})")).collect();
    if serials != expected {
        return Err(format!("expected {expected:?}, got {serials:?}"));
    }
    Ok(())
}

/// A restore can write a second id under a serial that is already live.
/// Both records must stay writable as long as neither changes its serial.
async fn restored_serial_twin_stays_updatable<S, F, Fut>(factory: &F) -> Result<(), String>
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
    storage
        .put_requisition(&mut snap, make_requisition("req-2", "(01-06-01)", "P1_RECEIVED"))
        .await
        .map_err(|e| format!("put twin: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    for id in ["req-1", "req-2"] {
        let mut snap = storage
            .begin_snapshot()
            .await
            .map_err(|e| format!("begin: {e}"))?;
        let current = storage
            .get_for_update(&mut snap, id)
            .await
            .map_err(|e| format!("get {id}: {e}"))?;
        let mut changed = current.requisition;
        changed.status = "P1_ACCOUNTING".to_string();
        let result = storage
            .update_requisition(&mut snap, changed, current.version)
            .await;
        match result {
            Ok(_) => storage
                .commit_snapshot(snap)
                .await
                .map_err(|e| format!("commit {id}: {e}"))?,
            Err(e) => {
                let _ = storage.abort_snapshot(snap).await;
                return Err(format!("update {id} with unchanged serial failed: {e}"));
            }
        }
    }
    Ok(())
}

async fn update_to_taken_serial_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
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
            make_requisition("req-2", "(01-06-02)", "P1_RECEIVED"),
        ],
    )
    .await?;

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let current = storage
        .get_for_update(&mut snap, "req-2")
        .await
        .map_err(|e| format!("get: {e}"))?;
    let mut moved = current.requisition;
    moved.serial_id = "(01-06-01)".to_string();
    let result = storage
        .update_requisition(&mut snap, moved, current.version)
        .await;
    let _ = storage.abort_snapshot(snap).await;

    match result {
        Err(StorageError::DuplicateSerial { serial_id }) if serial_id == "(01-06-01)" => Ok(()),
        Err(e) => Err(format!("expected DuplicateSerial((01-06-01)), got {e}")),
        Ok(_) => Err("update onto a taken serial accepted".to_string()),
    }
}
