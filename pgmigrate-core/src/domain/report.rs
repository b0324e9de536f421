//! Migration run report

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// What happened to one enum type during enum sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EnumOutcome {
    Created,
    /// Already present with identical labels
    Skipped,
    /// Already present with different labels; left untouched
    Mismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct EnumReport {
    pub name: String,
    #[serde(flatten)]
    pub outcome: EnumOutcome,
}

/// A row the target rejected
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    /// Conflict-key values of the row, e.g. `id=5`
    pub key: String,
    pub message: String,
}

/// Per-table counters for schema and data sync
#[derive(Debug, Clone, Default, Serialize)]
pub struct TableReport {
    pub table: String,
    /// DDL or sequence creation error, if the table could not be created
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_error: Option<String>,
    pub sequences: Vec<String>,
    /// Error fetching rows from the source
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_error: Option<String>,
    pub rows_read: usize,
    pub inserted: usize,
    /// Rows whose key already existed in the target
    pub skipped: usize,
    pub failed: usize,
    pub row_errors: Vec<RowError>,
    /// `None` when no sync was attempted (no sequence or nothing loaded)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_synced: Option<bool>,
}

impl TableReport {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    /// Rows the target accepted, whether newly inserted or already there
    pub fn loaded(&self) -> usize {
        self.inserted + self.skipped
    }

    pub fn has_errors(&self) -> bool {
        self.schema_error.is_some() || self.read_error.is_some() || self.failed > 0
    }
}

/// Machine-readable result of one migration run
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub run_id: Uuid,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub table_order: Vec<String>,
    pub enums: Vec<EnumReport>,
    pub tables: Vec<TableReport>,
}

impl MigrationReport {
    pub fn new(dry_run: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            dry_run,
            started_at: Utc::now(),
            finished_at: None,
            table_order: Vec::new(),
            enums: Vec::new(),
            tables: Vec::new(),
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn table(&self, name: &str) -> Option<&TableReport> {
        self.tables.iter().find(|t| t.table == name)
    }

    pub fn enum_outcome(&self, name: &str) -> Option<&EnumOutcome> {
        self.enums.iter().find(|e| e.name == name).map(|e| &e.outcome)
    }

    pub fn total_inserted(&self) -> usize {
        self.tables.iter().map(|t| t.inserted).sum()
    }

    pub fn total_failed_rows(&self) -> usize {
        self.tables.iter().map(|t| t.failed).sum()
    }

    pub fn enum_mismatches(&self) -> usize {
        self.enums
            .iter()
            .filter(|e| matches!(e.outcome, EnumOutcome::Mismatch { .. }))
            .count()
    }

    /// Any recoverable error: failed enum, table or row
    pub fn has_errors(&self) -> bool {
        self.enums
            .iter()
            .any(|e| matches!(e.outcome, EnumOutcome::Failed { .. }))
            || self.tables.iter().any(TableReport::has_errors)
    }
}
