//! Conformance test suite for `RequisitionStore` implementations.
//!
//! This module provides a backend-agnostic test suite that any
//! `RequisitionStore` implementation can run to verify correctness. The
//! suite covers:
//!
//! - **Insert**: creation at version 0, timestamp stamping, duplicate ids
//! - **Snapshot isolation**: uncommitted writes invisible, aborts discarded
//! - **Atomic commit**: all-or-nothing semantics for multi-record snapshots
//! - **Version validation / OCC**: optimistic concurrency conflict detection
//! - **Serials**: per-day serial listing and duplicate rejection
//! - **Activity log**: ordering, filters and limits
//! - **Directory**: favourites follow snapshot isolation
//! - **Errors**: correct error variants for invalid operations
//! - **Concurrency**: racing tasks against the same and different records
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty storage instance for each test:
//!
//! ```ignore
//! use reqtrack_storage::conformance::run_conformance_suite;
//! use reqtrack_storage::MemoryStore;
//!
//! #[tokio::test]
//! async fn memory_conformance() {
//!     let report = run_conformance_suite(|| async { MemoryStore::new() }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```
//!
//! No test holds two snapshots at once from the same task, so backends
//! that serialize snapshots behind one writer lock can run the suite.

mod activity;
mod commit;
mod concurrent;
mod directory;
mod error;
mod insert;
mod serial;
mod snapshot;
mod version;

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;

use reqtrack_core::{AuditEvent, LineItem, Requisition};
use rust_decimal::Decimal;
use time::macros::datetime;
use time::OffsetDateTime;

use crate::record::{ActivityKind, ActivityRecord};
use crate::RequisitionStore;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "insert", "snapshot", "commit").
    pub category: String,
    /// Test name (e.g. "insert_starts_at_version_0").
    pub name: String,
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn pass(category: &str, name: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    fn fail(category: &str, name: &str, msg: String) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: false,
            message: Some(msg),
        }
    }

    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::pass(category, name),
            Err(msg) => Self::fail(category, name, msg),
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// storage instance, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: RequisitionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(insert::run_insert_tests(&factory).await);
    results.extend(error::run_error_tests(&factory).await);
    results.extend(snapshot::run_snapshot_tests(&factory).await);
    results.extend(commit::run_commit_tests(&factory).await);
    results.extend(version::run_version_tests(&factory).await);
    results.extend(serial::run_serial_tests(&factory).await);
    results.extend(activity::run_activity_tests(&factory).await);
    results.extend(directory::run_directory_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers: record constructors with sensible defaults ──────────────────────

fn ts() -> OffsetDateTime {
    datetime!(2025-01-06 09:00 UTC)
}

fn make_requisition(id: &str, serial_id: &str, status: &str) -> Requisition {
    let item = LineItem {
        subject: "Printer paper".to_string(),
        quantity: Decimal::from(4),
        unit_price: Decimal::from(120),
        measure_unit: "box".to_string(),
        subtotal: Decimal::from(480),
    };
    Requisition {
        id: id.to_string(),
        serial_id: serial_id.to_string(),
        status: status.to_string(),
        is_urgent: false,
        unit: "General affairs".to_string(),
        applicant: "test-applicant".to_string(),
        subsidy: None,
        vendor: Some("test-vendor".to_string()),
        application_date: None,
        global_remark: String::new(),
        subject: item.subject.clone(),
        total_price: item.subtotal,
        items: vec![item],
        receiver_name: None,
        logs: vec![AuditEvent {
            status: status.to_string(),
            timestamp: ts(),
            note: "opened".to_string(),
            operator: "test-operator".to_string(),
        }],
        status_times: BTreeMap::new(),
        created_at: None,
        updated_at: None,
    }
}

fn make_activity(kind: ActivityKind, operator: &str, detail: &str) -> ActivityRecord {
    ActivityRecord {
        timestamp: ts(),
        operator: operator.to_string(),
        uid: format!("{operator}@example.test"),
        kind,
        detail: detail.to_string(),
    }
}

/// Insert and commit `requisitions` in one snapshot.
async fn seed<S: RequisitionStore>(storage: &S, requisitions: Vec<Requisition>) -> Result<(), String> {
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    for r in requisitions {
        storage
            .insert_requisition(&mut snap, r, ts())
            .await
            .map_err(|e| format!("seed insert: {e}"))?;
    }
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("seed commit: {e}"))
}
