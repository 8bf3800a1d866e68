//! Activity log conformance tests.

use std::future::Future;

use super::{make_activity, TestResult};
use crate::record::{ActivityFilter, ActivityKind, ActivityRecord};
use crate::RequisitionStore;

pub(super) async fn run_activity_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: RequisitionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "activity",
        "activity_listed_newest_first",
        activity_listed_newest_first(factory).await,
    ));
    results.push(TestResult::from_result(
        "activity",
        "activity_filter_by_kind_and_operator",
        activity_filter_by_kind_and_operator(factory).await,
    ));
    results.push(TestResult::from_result(
        "activity",
        "activity_limit",
        activity_limit(factory).await,
    ));
    results.push(TestResult::from_result(
        "activity",
        "activity_fields_preserved",
        activity_fields_preserved(factory).await,
    ));

    results
}

async fn append_all<S: RequisitionStore>(
    storage: &S,
    records: Vec<ActivityRecord>,
) -> Result<(), String> {
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    for record in records {
        storage
            .append_activity(&mut snap, record)
            .await
            .map_err(|e| format!("append_activity: {e}"))?;
    }
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))
}

fn sample() -> Vec<ActivityRecord> {
    vec![
        make_activity(ActivityKind::Login, "lin", "signed in"),
        make_activity(ActivityKind::Create, "lin", "(01-06-01)"),
        make_activity(ActivityKind::StatusChange, "chen", "(01-06-01)"),
        make_activity(ActivityKind::Export, "lin", "all"),
    ]
}

async fn activity_listed_newest_first<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RequisitionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    append_all(&storage, sample()).await?;
    let log = storage
        .list_activity(&ActivityFilter::default())
        .await
        .map_err(|e| format!("list: {e}"))?;
    let kinds: Vec<ActivityKind> = log.iter().map(|r| r.kind).collect();
    let expected = [
        ActivityKind::Export,
        ActivityKind::StatusChange,
        ActivityKind::Create,
        ActivityKind::Login,
    ];
    if kinds != expected {
        return Err(format!("expected {expected:?}, got {kinds:?}"));
    }
    Ok(())
}

async fn activity_filter_by_kind_and_operator<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RequisitionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    append_all(&storage, sample()).await?;

    let by_operator = storage
        .list_activity(&ActivityFilter {
            operator: Some("lin".to_string()),
            ..Default::default()
        })
        .await
        .map_err(|e| format!("list: {e}"))?;
    if by_operator.len() != 3 {
        return Err(format!("expected 3 entries for lin, got {}", by_operator.len()));
    }

    let by_kind = storage
        .list_activity(&ActivityFilter {
            kind: Some(ActivityKind::StatusChange),
            ..Default::default()
        })
        .await
        .map_err(|e| format!("list: {e}"))?;
    if by_kind.len() != 1 || by_kind[0].operator != "chen" {
        return Err(format!("unexpected status-change entries {by_kind:?}"));
    }
    Ok(())
}

async fn activity_limit<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RequisitionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    append_all(&storage, sample()).await?;
    let log = storage
        .list_activity(&ActivityFilter {
            limit: 2,
            ..Default::default()
        })
        .await
        .map_err(|e| format!("list: {e}"))?;
    if log.len() != 2 || log[0].kind != ActivityKind::Export {
        return Err(format!("expected the 2 newest entries, got {log:?}"));
    }
    Ok(())
}

async fn activity_fields_preserved<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RequisitionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let record = make_activity(ActivityKind::BatchDelete, "lin", "2024-11: 3 closed");
    append_all(&storage, vec![record.clone()]).await?;
    let log = storage
        .list_activity(&ActivityFilter::default())
        .await
        .map_err(|e| format!("list: {e}"))?;
    if log != [record] {
        return Err(format!("activity entry changed in storage: {log:?}"));
    }
    Ok(())
}
