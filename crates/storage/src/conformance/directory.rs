//! Favourites directory conformance tests.

use std::future::Future;

use reqtrack_core::{Directory, DirectoryKind};

use super::TestResult;
use crate::RequisitionStore;

pub(super) async fn run_directory_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: RequisitionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "directory",
        "directory_starts_empty",
        directory_starts_empty(factory).await,
    ));
    results.push(TestResult::from_result(
        "directory",
        "directory_visible_after_commit",
        directory_visible_after_commit(factory).await,
    ));
    results.push(TestResult::from_result(
        "directory",
        "directory_abort_discarded",
        directory_abort_discarded(factory).await,
    ));

    results
}

fn vendors(names: &[&str]) -> Directory {
    let mut dir = Directory::default();
    for name in names {
        dir.remember(DirectoryKind::Vendor, name);
    }
    dir
}

async fn directory_starts_empty<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RequisitionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let dir = storage
        .get_directory()
        .await
        .map_err(|e| format!("get_directory: {e}"))?;
    if dir != Directory::default() {
        return Err(format!("expected an empty directory, got {dir:?}"));
    }
    Ok(())
}

async fn directory_visible_after_commit<S, F, Fut>(factory: &F) -> Result<(), String>
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
        .put_directory(&mut snap, vendors(&["Paper Co"]))
        .await
        .map_err(|e| format!("put_directory: {e}"))?;
    let own = storage
        .directory_for_update(&mut snap)
        .await
        .map_err(|e| format!("directory_for_update: {e}"))?;
    let outside = storage
        .get_directory()
        .await
        .map_err(|e| format!("get_directory: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    if own.vendors != ["Paper Co"] {
        return Err(format!("snapshot does not see its own write: {own:?}"));
    }
    if !outside.vendors.is_empty() {
        return Err(format!("uncommitted directory leaked: {outside:?}"));
    }
    let committed = storage
        .get_directory()
        .await
        .map_err(|e| format!("get_directory: {e}"))?;
    if committed != vendors(&["Paper Co"]) {
        return Err(format!("committed directory not visible: {committed:?}"));
    }
    Ok(())
}

async fn directory_abort_discarded<S, F, Fut>(factory: &F) -> Result<(), String>
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
        .put_directory(&mut snap, vendors(&["Ink Ltd"]))
        .await
        .map_err(|e| format!("put_directory: {e}"))?;
    storage
        .abort_snapshot(snap)
        .await
        .map_err(|e| format!("abort: {e}"))?;

    let dir = storage
        .get_directory()
        .await
        .map_err(|e| format!("get_directory: {e}"))?;
    if !dir.vendors.is_empty() {
        return Err(format!("aborted directory write survived: {dir:?}"));
    }
    Ok(())
}
