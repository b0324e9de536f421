//! Migration service - copy enums, schema and rows from source to target
//!
//! A run has three phases over one plan:
//! 1. enum sync: create missing enum types, report label mismatches
//! 2. schema sync: create sequences, then `CREATE TABLE IF NOT EXISTS`
//! 3. data sync: insert every source row with `ON CONFLICT DO NOTHING`,
//!    then move sequences past the copied keys
//!
//! Table order comes from the source's foreign keys and is computed before
//! the target is touched, so a dependency cycle aborts the run cleanly.
//! Everything after that point is recoverable: failures are recorded in
//! the report and the run moves on.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::adapters::memory::MemoryDatabase;
use crate::domain::enum_type::descriptors_from_map;
use crate::domain::manifest::load_enum_map;
use crate::domain::result::Result;
use crate::domain::{
    EnumDescriptor, EnumOutcome, EnumReconciliation, EnumReport, Manifest, MigrationReport,
    RowError, TableDag, TableDescriptor, TableReport,
};
use crate::ports::{row_key, InsertOutcome, SourceCatalog, TargetDatabase};

/// What a run migrates: the manifest plus the enum types it depends on
#[derive(Debug, Clone)]
pub struct MigrationPlan {
    pub manifest: Manifest,
    pub enums: Vec<EnumDescriptor>,
}

impl MigrationPlan {
    pub fn new(manifest: Manifest, enums: Vec<EnumDescriptor>) -> Self {
        Self { manifest, enums }
    }

    /// Read the manifest and enum file. When the enum file does not exist
    /// the enum types are read live from `source`.
    pub async fn load(
        manifest_path: &Path,
        enums_path: &Path,
        source: &dyn SourceCatalog,
    ) -> Result<Self> {
        let manifest = Manifest::load(manifest_path)?;

        let enums = if enums_path.exists() {
            descriptors_from_map(&load_enum_map(enums_path)?)?
        } else {
            info!(
                path = %enums_path.display(),
                "Enum file not found, reading enum types from source"
            );
            source.enum_types().await?
        };

        for issue in manifest.validate() {
            warn!(table = %issue.table, "Manifest entry looks invalid: {}", issue.message);
        }

        Ok(Self { manifest, enums })
    }
}

/// Progress callbacks for the data phase
///
/// All methods default to doing nothing.
pub trait MigrationObserver: Send + Sync {
    fn table_started(&self, _table: &str, _rows: usize) {}
    fn row_processed(&self, _table: &str) {}
    fn table_finished(&self, _report: &TableReport) {}
}

/// Observer that ignores every event
pub struct NoopObserver;

impl MigrationObserver for NoopObserver {}

/// Runs a plan from a source catalog into a target database
pub struct MigrationService {
    source: Arc<dyn SourceCatalog>,
    target: Arc<dyn TargetDatabase>,
    dry_run: bool,
}

impl MigrationService {
    pub fn new(source: Arc<dyn SourceCatalog>, target: Arc<dyn TargetDatabase>) -> Self {
        Self {
            source,
            target,
            dry_run: false,
        }
    }

    /// Same flow against an empty in-memory target
    pub fn dry_run(source: Arc<dyn SourceCatalog>) -> Self {
        Self {
            source,
            target: Arc::new(MemoryDatabase::new()),
            dry_run: true,
        }
    }

    /// Manifest tables with referenced tables first. Ties keep manifest order.
    pub async fn table_order(&self, manifest: &Manifest) -> Result<Vec<String>> {
        let foreign_keys = self.source.foreign_keys().await?;
        TableDag::build(&manifest.table_names(), &foreign_keys)?.ordered()
    }

    /// Run all three phases
    ///
    /// Returns `Err` only for failures that stop the run before the target
    /// is modified (source catalog errors, dependency cycles). Everything
    /// else ends up in the report.
    pub async fn migrate(
        &self,
        plan: &MigrationPlan,
        observer: &dyn MigrationObserver,
    ) -> Result<MigrationReport> {
        let mut report = MigrationReport::new(self.dry_run);
        report.table_order = self.table_order(&plan.manifest).await?;

        info!(
            run_id = %report.run_id,
            target = self.target.db_type(),
            enums = plan.enums.len(),
            tables = report.table_order.len(),
            dry_run = self.dry_run,
            "Starting migration"
        );

        report.enums = self.sync_enums(&plan.enums).await;

        let entries: Vec<&TableDescriptor> = report
            .table_order
            .iter()
            .filter_map(|name| plan.manifest.get(name))
            .collect();

        let mut tables: Vec<TableReport> = Vec::with_capacity(entries.len());
        for entry in &entries {
            tables.push(self.sync_schema(entry).await);
        }

        for (entry, table) in entries.iter().zip(tables.iter_mut()) {
            self.sync_data(entry, table, observer).await;
        }

        report.tables = tables;
        report.finish();

        info!(
            run_id = %report.run_id,
            inserted = report.total_inserted(),
            failed_rows = report.total_failed_rows(),
            enum_mismatches = report.enum_mismatches(),
            "Migration finished"
        );
        Ok(report)
    }

    /// Create missing enum types and reconcile existing ones
    pub async fn sync_enums(&self, enums: &[EnumDescriptor]) -> Vec<EnumReport> {
        let mut reports = Vec::with_capacity(enums.len());
        for descriptor in enums {
            let outcome = self.sync_enum(descriptor).await;
            reports.push(EnumReport {
                name: descriptor.name.clone(),
                outcome,
            });
        }
        reports
    }

    async fn sync_enum(&self, descriptor: &EnumDescriptor) -> EnumOutcome {
        let existing = match self.target.enum_labels(&descriptor.name).await {
            Ok(existing) => existing,
            Err(e) => {
                warn!(enum_type = %descriptor.name, "Could not check enum type: {}", e);
                return EnumOutcome::Failed {
                    error: e.to_string(),
                };
            }
        };

        match existing {
            None => match self.target.create_enum(descriptor).await {
                Ok(()) => {
                    info!(enum_type = %descriptor.name, "Created enum type");
                    EnumOutcome::Created
                }
                Err(e) => {
                    warn!(enum_type = %descriptor.name, "Failed to create enum type: {}", e);
                    EnumOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            },
            Some(actual) => match descriptor.reconcile(&actual) {
                EnumReconciliation::Identical => {
                    debug!(enum_type = %descriptor.name, "Enum type already present");
                    EnumOutcome::Skipped
                }
                EnumReconciliation::Mismatch { missing, unexpected } => {
                    warn!(
                        enum_type = %descriptor.name,
                        missing = ?missing,
                        unexpected = ?unexpected,
                        "Enum type differs in target, leaving it unchanged"
                    );
                    EnumOutcome::Mismatch {
                        expected: descriptor.values.clone(),
                        actual,
                    }
                }
            },
        }
    }

    /// Create the sequences a table's defaults use, then the table
    pub async fn sync_schema(&self, entry: &TableDescriptor) -> TableReport {
        let mut report = TableReport::new(&entry.table);
        let bindings = entry.sequences();
        report.sequences = bindings.iter().map(|b| b.sequence.clone()).collect();

        for binding in &bindings {
            if let Err(e) = self.target.create_sequence(&binding.sequence).await {
                warn!(
                    table = %entry.table,
                    sequence = %binding.sequence,
                    "Failed to create sequence: {}",
                    e
                );
                report.schema_error = Some(format!("sequence {}: {}", binding.sequence, e));
                return report;
            }
        }

        match self.target.execute_ddl(&entry.ddl).await {
            Ok(()) => info!(table = %entry.table, "Table ready"),
            Err(e) => {
                warn!(table = %entry.table, "Failed to create table: {}", e);
                report.schema_error = Some(e.to_string());
            }
        }
        report
    }

    /// Copy every source row of one table, then resync its sequences
    ///
    /// Runs even when the table's DDL failed; the table may already exist.
    pub async fn sync_data(
        &self,
        entry: &TableDescriptor,
        report: &mut TableReport,
        observer: &dyn MigrationObserver,
    ) {
        let rows = match self.source.fetch_rows(&entry.table).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(table = %entry.table, "Failed to read source rows: {}", e);
                report.read_error = Some(e.to_string());
                observer.table_finished(report);
                return;
            }
        };

        report.rows_read = rows.len();
        observer.table_started(&entry.table, rows.len());
        let conflict_columns = entry.conflict_columns();

        for row in &rows {
            match self
                .target
                .insert_row(&entry.table, row, &conflict_columns)
                .await
            {
                Ok(InsertOutcome::Inserted) => report.inserted += 1,
                Ok(InsertOutcome::Skipped) => report.skipped += 1,
                Err(e) => {
                    let key = row_key(row, &conflict_columns);
                    warn!(table = %entry.table, key = %key, "Failed to insert row: {}", e);
                    report.failed += 1;
                    report.row_errors.push(RowError {
                        key,
                        message: e.to_string(),
                    });
                }
            }
            observer.row_processed(&entry.table);
        }

        if report.loaded() > 0 && !report.sequences.is_empty() {
            report.sequence_synced = Some(self.sync_sequences(entry).await);
        }

        info!(
            table = %entry.table,
            read = report.rows_read,
            inserted = report.inserted,
            skipped = report.skipped,
            failed = report.failed,
            "Table loaded"
        );
        observer.table_finished(report);
    }

    /// Move each bound sequence to `MAX(column)`. Failures are not errors.
    async fn sync_sequences(&self, entry: &TableDescriptor) -> bool {
        let mut all_synced = true;
        for binding in entry.sequences() {
            if let Err(e) = self
                .target
                .sync_sequence(&binding.sequence, &entry.table, &binding.column)
                .await
            {
                debug!(
                    table = %entry.table,
                    sequence = %binding.sequence,
                    "Sequence not synced: {}",
                    e
                );
                all_synced = false;
            }
        }
        all_synced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::result::Error;
    use crate::domain::ColumnInfo;
    use crate::ports::Row;
    use serde_json::json;

    fn row(value: serde_json::Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    fn ddl(table: &str) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS \"{t}\" (\n  \"id\" integer NOT NULL DEFAULT nextval('{t}_id_seq'::regclass),\n  PRIMARY KEY (\"id\")\n);",
            t = table
        )
    }

    fn table(name: &str, ids: &[i64]) -> (String, Vec<ColumnInfo>, Vec<Row>) {
        let rows = ids.iter().map(|id| row(json!({ "id": id }))).collect();
        (name.to_string(), vec![ColumnInfo::new("id", "integer")], rows)
    }

    fn source_with(tables: &[(&str, &[i64])]) -> MemoryDatabase {
        tables.iter().fold(MemoryDatabase::new(), |db, (name, ids)| {
            let (name, columns, rows) = table(name, ids);
            db.with_table(&name, columns, &["id"], rows)
        })
    }

    fn manifest(names: &[&str]) -> Manifest {
        Manifest::new(
            names
                .iter()
                .map(|n| TableDescriptor::new(*n, ddl(n), 0))
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_table_order_follows_foreign_keys() {
        let source = source_with(&[("papers", &[]), ("courses", &[])])
            .with_foreign_key("papers", "courses");
        let service = MigrationService::dry_run(Arc::new(source));

        let order = service
            .table_order(&manifest(&["papers", "courses"]))
            .await
            .unwrap();
        assert_eq!(order, vec!["courses", "papers"]);
    }

    #[tokio::test]
    async fn test_cycle_fails_before_target_is_touched() {
        let source = source_with(&[("a", &[1]), ("b", &[1])])
            .with_foreign_key("a", "b")
            .with_foreign_key("b", "a");
        let target = Arc::new(MemoryDatabase::new());
        let service = MigrationService::new(Arc::new(source), target.clone());
        let plan = MigrationPlan::new(
            manifest(&["a", "b"]),
            vec![EnumDescriptor::new("role", vec!["A".to_string()]).unwrap()],
        );

        let err = service.migrate(&plan, &NoopObserver).await.unwrap_err();
        assert!(matches!(err, Error::DependencyCycle(_)));
        assert!(target.statements().is_empty());
    }

    #[tokio::test]
    async fn test_enum_mismatch_left_untouched() {
        let target = Arc::new(MemoryDatabase::new().with_enum("role", &["ADMIN", "STUDENT"]));
        let service = MigrationService::new(Arc::new(MemoryDatabase::new()), target.clone());
        let wanted = EnumDescriptor::new("role", vec!["STUDENT".to_string(), "ADMIN".to_string()])
            .unwrap();

        let reports = service.sync_enums(&[wanted]).await;

        assert!(matches!(reports[0].outcome, EnumOutcome::Mismatch { .. }));
        assert_eq!(target.enum_values("role").unwrap(), vec!["ADMIN", "STUDENT"]);
        assert!(target.statements().is_empty());
    }

    #[tokio::test]
    async fn test_enum_failure_is_recorded() {
        let target = Arc::new(MemoryDatabase::new());
        target.fail_enum("role");
        let service = MigrationService::new(Arc::new(MemoryDatabase::new()), target);
        let enums = vec![
            EnumDescriptor::new("role", vec!["A".to_string()]).unwrap(),
            EnumDescriptor::new("status", vec!["OPEN".to_string()]).unwrap(),
        ];

        let reports = service.sync_enums(&enums).await;

        assert!(matches!(reports[0].outcome, EnumOutcome::Failed { .. }));
        assert_eq!(reports[1].outcome, EnumOutcome::Created);
    }

    #[tokio::test]
    async fn test_schema_failure_does_not_stop_later_tables() {
        let source = source_with(&[("users", &[1]), ("courses", &[1])]);
        let target = Arc::new(MemoryDatabase::new());
        target.fail_table("users");
        let service = MigrationService::new(Arc::new(source), target.clone());
        let plan = MigrationPlan::new(manifest(&["users", "courses"]), vec![]);

        let report = service.migrate(&plan, &NoopObserver).await.unwrap();

        let users = report.table("users").unwrap();
        assert!(users.schema_error.is_some());
        assert_eq!(users.failed, 1);
        assert_eq!(report.table("courses").unwrap().inserted, 1);
        assert!(report.has_errors());
    }

    #[tokio::test]
    async fn test_sequence_sync_failure_is_swallowed() {
        let source = source_with(&[("users", &[1, 2])]);
        let target = Arc::new(MemoryDatabase::new());
        target.fail_sequence_sync("users_id_seq");
        let service = MigrationService::new(Arc::new(source), target);
        let plan = MigrationPlan::new(manifest(&["users"]), vec![]);

        let report = service.migrate(&plan, &NoopObserver).await.unwrap();

        let users = report.table("users").unwrap();
        assert_eq!(users.inserted, 2);
        assert_eq!(users.sequence_synced, Some(false));
        assert!(!report.has_errors());
    }

    #[tokio::test]
    async fn test_empty_table_skips_sequence_sync() {
        let source = source_with(&[("users", &[])]);
        let service = MigrationService::dry_run(Arc::new(source));
        let plan = MigrationPlan::new(manifest(&["users"]), vec![]);

        let report = service.migrate(&plan, &NoopObserver).await.unwrap();

        assert!(report.dry_run);
        assert_eq!(report.table("users").unwrap().sequence_synced, None);
    }

    #[tokio::test]
    async fn test_plan_falls_back_to_source_enums() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = dir.path().join("ddl.json");
        manifest(&["users"]).save(&manifest_path).unwrap();
        let source = MemoryDatabase::new().with_enum("role", &["STUDENT", "ADMIN"]);

        let plan = MigrationPlan::load(&manifest_path, &dir.path().join("enums.json"), &source)
            .await
            .unwrap();

        assert_eq!(plan.manifest.len(), 1);
        assert_eq!(plan.enums[0].name, "role");
        assert_eq!(plan.enums[0].values, vec!["STUDENT", "ADMIN"]);
    }

    #[tokio::test]
    async fn test_plan_requires_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let source = MemoryDatabase::new();

        let err = MigrationPlan::load(
            &dir.path().join("ddl.json"),
            &dir.path().join("enums.json"),
            &source,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
