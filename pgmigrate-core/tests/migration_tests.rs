//! Integration tests for the migration flow
//!
//! Source and target are in-memory databases, so the whole run (enum sync,
//! schema sync, data sync, sequence resync) executes without a server.
//!
//! Run with: cargo test --test migration_tests -- --nocapture

use std::sync::{Arc, Mutex};

use serde_json::json;
use tempfile::TempDir;

use pgmigrate_core::adapters::memory::MemoryDatabase;
use pgmigrate_core::domain::{ColumnInfo, EnumOutcome, Manifest, TableReport};
use pgmigrate_core::ports::Row;
use pgmigrate_core::services::{
    InspectService, MigrationObserver, MigrationPlan, MigrationService, NoopObserver,
};
use pgmigrate_core::Error;

// ============================================================================
// Test Helpers
// ============================================================================

const PAPER_TYPES: &[&str] = &["OTHER", "PROJECT", "ASSIGNMENT", "ENDTERM", "MIDTERM", "QUIZ"];

fn row(value: serde_json::Value) -> Row {
    value.as_object().cloned().expect("row literal must be an object")
}

fn id_column(table: &str) -> ColumnInfo {
    ColumnInfo::new("id", "integer")
        .not_null()
        .with_default(format!("nextval('{}_id_seq'::regclass)", table))
}

/// Portal-shaped source: users, courses, papers (papers -> courses)
fn portal_source() -> MemoryDatabase {
    MemoryDatabase::new()
        .with_enum("paper_type", PAPER_TYPES)
        .with_table(
            "users",
            vec![id_column("users"), ColumnInfo::new("email", "text").not_null()],
            &["id"],
            vec![
                row(json!({"id": 1, "email": "ada@example.com"})),
                row(json!({"id": 2, "email": "alan@example.com"})),
            ],
        )
        .with_table(
            "courses",
            vec![id_column("courses"), ColumnInfo::new("title", "text")],
            &["id"],
            vec![row(json!({"id": 1, "title": "Compilers"}))],
        )
        .with_table(
            "papers",
            vec![
                id_column("papers"),
                ColumnInfo::new("course_id", "integer"),
                ColumnInfo::new("kind", "USER-DEFINED").with_udt_name("paper_type"),
            ],
            &["id"],
            vec![
                row(json!({"id": 3, "course_id": 1, "kind": "QUIZ"})),
                row(json!({"id": 5, "course_id": 1, "kind": "NOT_A_KIND"})),
                row(json!({"id": 7, "course_id": 1, "kind": "MIDTERM"})),
                row(json!({"id": 12, "course_id": 1, "kind": "ENDTERM"})),
            ],
        )
        .with_foreign_key("papers", "courses")
}

/// Inspect the source and build the plan the way `pgmigrate migrate` does
async fn plan_from(source: Arc<MemoryDatabase>, temp_dir: &TempDir) -> MigrationPlan {
    let manifest_path = temp_dir.path().join("ddl.json");
    let enums_path = temp_dir.path().join("enums.json");
    let priority = vec!["users".to_string(), "papers".to_string(), "courses".to_string()];

    InspectService::new(source.clone())
        .inspect_to_files(&priority, &manifest_path, &enums_path)
        .await
        .expect("inspect should succeed");

    MigrationPlan::load(&manifest_path, &enums_path, source.as_ref())
        .await
        .expect("plan should load")
}

fn ids(rows: &[Row]) -> Vec<i64> {
    let mut ids: Vec<i64> = rows.iter().filter_map(|r| r["id"].as_i64()).collect();
    ids.sort_unstable();
    ids
}

// ============================================================================
// Idempotency
// ============================================================================

#[tokio::test]
async fn test_second_run_creates_no_new_tables() {
    let temp_dir = TempDir::new().unwrap();
    let source = Arc::new(portal_source());
    let target = Arc::new(MemoryDatabase::new());
    let plan = plan_from(source.clone(), &temp_dir).await;
    let service = MigrationService::new(source, target.clone());

    service.migrate(&plan, &NoopObserver).await.unwrap();
    let tables_after_first = target.table_names();
    let report = service.migrate(&plan, &NoopObserver).await.unwrap();

    assert_eq!(target.table_names(), tables_after_first);
    assert!(report.tables.iter().all(|t| t.schema_error.is_none()));
    assert!(report
        .enums
        .iter()
        .all(|e| e.outcome == EnumOutcome::Skipped));
}

#[tokio::test]
async fn test_second_run_skips_existing_rows() {
    let temp_dir = TempDir::new().unwrap();
    let source = Arc::new(portal_source());
    let target = Arc::new(MemoryDatabase::new());
    let plan = plan_from(source.clone(), &temp_dir).await;
    let service = MigrationService::new(source, target.clone());

    service.migrate(&plan, &NoopObserver).await.unwrap();
    let report = service.migrate(&plan, &NoopObserver).await.unwrap();

    assert_eq!(target.rows("users").len(), 2);
    let users = report.table("users").unwrap();
    assert_eq!(users.inserted, 0);
    assert_eq!(users.skipped, 2);
}

// ============================================================================
// Enum Sync
// ============================================================================

#[tokio::test]
async fn test_enum_label_order_preserved() {
    let temp_dir = TempDir::new().unwrap();
    let source = Arc::new(portal_source());
    let target = Arc::new(MemoryDatabase::new());
    let plan = plan_from(source.clone(), &temp_dir).await;

    let report = MigrationService::new(source, target.clone())
        .migrate(&plan, &NoopObserver)
        .await
        .unwrap();

    assert_eq!(report.enum_outcome("paper_type"), Some(&EnumOutcome::Created));
    let labels = target.enum_values("paper_type").unwrap();
    assert_eq!(labels, PAPER_TYPES);
    let position = |label: &str| labels.iter().position(|l| l == label).unwrap();
    assert!(position("ENDTERM") < position("QUIZ"));
}

#[tokio::test]
async fn test_enum_with_different_order_is_reported_not_modified() {
    let temp_dir = TempDir::new().unwrap();
    let source = Arc::new(portal_source());
    let target = Arc::new(MemoryDatabase::new().with_enum("paper_type", &["QUIZ", "OTHER"]));
    let plan = plan_from(source.clone(), &temp_dir).await;

    let report = MigrationService::new(source, target.clone())
        .migrate(&plan, &NoopObserver)
        .await
        .unwrap();

    match report.enum_outcome("paper_type") {
        Some(EnumOutcome::Mismatch { expected, actual }) => {
            assert_eq!(expected, PAPER_TYPES);
            assert_eq!(actual, &["QUIZ", "OTHER"]);
        }
        other => panic!("expected mismatch, got {:?}", other),
    }
    assert_eq!(target.enum_values("paper_type").unwrap(), vec!["QUIZ", "OTHER"]);
    assert_eq!(report.enum_mismatches(), 1);
}

// ============================================================================
// Sequences
// ============================================================================

#[tokio::test]
async fn test_sequence_moves_past_copied_ids() {
    let temp_dir = TempDir::new().unwrap();
    let source = Arc::new(portal_source());
    let target = Arc::new(MemoryDatabase::new());
    target.reject_row("papers", "id=5");
    let plan = plan_from(source.clone(), &temp_dir).await;

    let report = MigrationService::new(source, target.clone())
        .migrate(&plan, &NoopObserver)
        .await
        .unwrap();

    assert_eq!(ids(&target.rows("papers")), vec![3, 7, 12]);
    assert_eq!(report.table("papers").unwrap().sequence_synced, Some(true));
    assert!(target.next_value("papers_id_seq").unwrap() >= 13);
}

// ============================================================================
// Partial Failure
// ============================================================================

#[tokio::test]
async fn test_rejected_row_does_not_stop_the_batch() {
    let temp_dir = TempDir::new().unwrap();
    let source = Arc::new(portal_source());
    let target = Arc::new(MemoryDatabase::new());
    target.reject_row("papers", "id=5");
    let plan = plan_from(source.clone(), &temp_dir).await;

    let report = MigrationService::new(source, target.clone())
        .migrate(&plan, &NoopObserver)
        .await
        .unwrap();

    let papers = report.table("papers").unwrap();
    assert_eq!(papers.rows_read, 4);
    assert_eq!(papers.inserted, 3);
    assert_eq!(papers.failed, 1);
    assert_eq!(papers.row_errors.len(), 1);
    assert_eq!(papers.row_errors[0].key, "id=5");
    assert!(report.has_errors());
    assert_eq!(report.total_failed_rows(), 1);
}

// ============================================================================
// End to End
// ============================================================================

#[tokio::test]
async fn test_users_and_courses_into_empty_target() {
    let temp_dir = TempDir::new().unwrap();
    let source = Arc::new(portal_source());
    let target = Arc::new(MemoryDatabase::new());
    target.reject_row("papers", "id=5");
    let plan = plan_from(source.clone(), &temp_dir).await;

    let report = MigrationService::new(source, target.clone())
        .migrate(&plan, &NoopObserver)
        .await
        .unwrap();

    assert_eq!(ids(&target.rows("users")), vec![1, 2]);
    assert_eq!(ids(&target.rows("courses")), vec![1]);
    assert!(target.next_value("users_id_seq").unwrap() >= 3);
    assert!(target.next_value("courses_id_seq").unwrap() >= 2);

    // courses is referenced by papers, so it moves ahead of the priority list
    assert_eq!(report.table_order, vec!["users", "courses", "papers"]);
    assert!(report.finished_at.is_some());
}

#[tokio::test]
async fn test_observer_sees_every_row() {
    #[derive(Default)]
    struct Recorder {
        rows: Mutex<usize>,
        finished: Mutex<Vec<String>>,
    }

    impl MigrationObserver for Recorder {
        fn row_processed(&self, _table: &str) {
            *self.rows.lock().unwrap() += 1;
        }

        fn table_finished(&self, report: &TableReport) {
            self.finished.lock().unwrap().push(report.table.clone());
        }
    }

    let temp_dir = TempDir::new().unwrap();
    let source = Arc::new(portal_source());
    let plan = plan_from(source.clone(), &temp_dir).await;
    let recorder = Recorder::default();

    MigrationService::new(source, Arc::new(MemoryDatabase::new()))
        .migrate(&plan, &recorder)
        .await
        .unwrap();

    assert_eq!(*recorder.rows.lock().unwrap(), 7);
    assert_eq!(
        *recorder.finished.lock().unwrap(),
        vec!["users", "courses", "papers"]
    );
}

// ============================================================================
// Ordering and Dry Runs
// ============================================================================

#[tokio::test]
async fn test_cycle_aborts_before_any_write() {
    let source = Arc::new(
        portal_source()
            .with_foreign_key("courses", "papers")
            .with_foreign_key("users", "users"),
    );
    let target = Arc::new(MemoryDatabase::new());
    let plan = MigrationPlan::new(
        InspectService::new(source.clone()).inspect(&[]).await.unwrap(),
        vec![],
    );

    let err = MigrationService::new(source, target.clone())
        .migrate(&plan, &NoopObserver)
        .await
        .unwrap_err();

    match err {
        Error::DependencyCycle(path) => {
            assert!(path.contains("courses"));
            assert!(path.contains("papers"));
        }
        other => panic!("expected dependency cycle, got {}", other),
    }
    assert!(target.statements().is_empty());
    assert!(target.table_names().is_empty());
}

#[tokio::test]
async fn test_dry_run_leaves_target_untouched() {
    let temp_dir = TempDir::new().unwrap();
    let source = Arc::new(portal_source());
    let target = Arc::new(MemoryDatabase::new());
    let plan = plan_from(source.clone(), &temp_dir).await;

    let report = MigrationService::dry_run(source)
        .migrate(&plan, &NoopObserver)
        .await
        .unwrap();

    assert!(report.dry_run);
    assert_eq!(report.total_inserted(), 7);
    assert!(target.statements().is_empty());
}

#[tokio::test]
async fn test_manifest_on_disk_drives_the_run() {
    let temp_dir = TempDir::new().unwrap();
    let source = Arc::new(portal_source());
    let _ = plan_from(source.clone(), &temp_dir).await;

    // Drop papers from the plan file; only listed tables are migrated
    let manifest_path = temp_dir.path().join("ddl.json");
    let mut manifest = Manifest::load(&manifest_path).unwrap();
    manifest.tables.retain(|t| t.table != "papers");
    manifest.save(&manifest_path).unwrap();

    let enums_path = temp_dir.path().join("enums.json");
    let plan = MigrationPlan::load(&manifest_path, &enums_path, source.as_ref())
        .await
        .unwrap();
    let target = Arc::new(MemoryDatabase::new());
    MigrationService::new(source, target.clone())
        .migrate(&plan, &NoopObserver)
        .await
        .unwrap();

    assert_eq!(target.table_names(), vec!["courses", "users"]);
}
