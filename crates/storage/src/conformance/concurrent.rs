//! Concurrency conformance tests.

use std::future::Future;
use std::sync::Arc;

use reqtrack_core::{allocate, DayPrefix};
use time::macros::date;

use super::{make_requisition, seed, ts, TestResult};
use crate::{RequisitionStore, StorageError};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: RequisitionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_updates_exactly_one_wins",
        concurrent_updates_exactly_one_wins(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_inserts_exactly_one_wins",
        concurrent_inserts_exactly_one_wins(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_allocation_never_duplicates",
        concurrent_allocation_never_duplicates(factory).await,
    ));

    results
}

fn tally(outcomes: Vec<bool>) -> Result<(), String> {
    let winners = outcomes.iter().filter(|w| **w).count();
    let losers = outcomes.len() - winners;
    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }
    if losers != N - 1 {
        return Err(format!("expected {} losers, got {losers}", N - 1));
    }
    Ok(())
}

// ── Concurrent update: exactly one wins ─────────────────────────────────────

/// N tasks each open a snapshot and attempt to update the same requisition
/// from version 0. Exactly one commit succeeds; the rest must see
/// ConcurrentConflict, either on update or on commit.
async fn concurrent_updates_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RequisitionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    seed(
        storage.as_ref(),
        vec![make_requisition("req-1", "(01-06-01)", "P1_RECEIVED")],
    )
    .await?;

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            let mut req = make_requisition("req-1", "(01-06-01)", "P1_ACCOUNTING");
            req.global_remark = format!("writer {i}");
            let result = s.update_requisition(&mut snap, req, 0).await;
            match result {
                Ok(_) => match s.commit_snapshot(snap).await {
                    Ok(()) => Ok(true),
                    Err(StorageError::ConcurrentConflict { .. }) => Ok(false),
                    Err(e) => Err(e),
                },
                Err(StorageError::ConcurrentConflict { .. }) => {
                    s.abort_snapshot(snap).await?;
                    Ok(false)
                }
                Err(e) => {
                    let _ = s.abort_snapshot(snap).await;
                    Err(e)
                }
            }
        }));
    }

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(
            handle
                .await
                .map_err(|e| format!("task panic: {e}"))?
                .map_err(|e: StorageError| format!("storage error: {e}"))?,
        );
    }
    tally(outcomes)?;

    let got = storage
        .get_requisition("req-1")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if got.version != 1 {
        return Err(format!("expected final version 1, got {}", got.version));
    }
    Ok(())
}

// ── Concurrent insert: exactly one wins ─────────────────────────────────────

async fn concurrent_inserts_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RequisitionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            let req = make_requisition("req-1", &format!("(01-06-{:02})", i + 1), "P1_RECEIVED");
            let result = s.insert_requisition(&mut snap, req, ts()).await;
            match result {
                Ok(_) => {
                    s.commit_snapshot(snap).await?;
                    Ok(true)
                }
                Err(StorageError::AlreadyExists { .. }) => {
                    s.abort_snapshot(snap).await?;
                    Ok(false)
                }
                Err(e) => {
                    let _ = s.abort_snapshot(snap).await;
                    Err(e)
                }
            }
        }));
    }

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(
            handle
                .await
                .map_err(|e| format!("task panic: {e}"))?
                .map_err(|e: StorageError| format!("storage error: {e}"))?,
        );
    }
    tally(outcomes)
}

// ── Concurrent allocation: serials stay unique ──────────────────────────────

/// N tasks allocate a serial for the same day and insert with it, retrying
/// on DuplicateSerial. Every task must end up with a distinct serial.
async fn concurrent_allocation_never_duplicates<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RequisitionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    let day = date!(2025 - 01 - 06);

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            for _attempt in 0..N {
                let mut snap = s.begin_snapshot().await?;
                let existing = s.serials_for_day(&mut snap, DayPrefix::from_date(day)).await?;
                let serial = allocate(existing.iter().map(String::as_str), day)
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
                let req = make_requisition(&format!("req-{i}"), &serial.to_string(), "P1_RECEIVED");
                let result = s.insert_requisition(&mut snap, req, ts()).await;
            match result {
                    Ok(_) => match s.commit_snapshot(snap).await {
                        Ok(()) => return Ok(()),
                        Err(StorageError::DuplicateSerial { .. }) => continue,
                        Err(e) => return Err(e),
                    },
                    Err(StorageError::DuplicateSerial { .. }) => {
                        s.abort_snapshot(snap).await?;
                    }
                    Err(e) => {
                        let _ = s.abort_snapshot(snap).await;
                        return Err(e);
                    }
                }
            }
            Err(StorageError::Backend(format!("task {i} exhausted retries")))
        }));
    }

    for handle in handles {
        handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
    }

    let mut serials: Vec<String> = storage
        .list_requisitions(None)
        .await
        .map_err(|e| format!("list: {e}"))?
        .into_iter()
        .map(|r| r.requisition.serial_id)
        .collect();
    serials.sort();
    serials.dedup();
    if serials.len() != N {
        return Err(format!("expected {N} distinct serials, got {}", serials.len()));
    }
    Ok(())
}
