//! Database ports - read side and write side of a migration

use async_trait::async_trait;

use crate::domain::result::Result;
use crate::domain::{ColumnInfo, EnumDescriptor, ForeignKey};

/// A table row as a JSON object keyed by column name
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Render a row's key columns for messages, e.g. `id=5`
pub fn row_key(row: &Row, columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| {
            let value = match row.get(c) {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(v) => v.to_string(),
                None => "?".to_string(),
            };
            format!("{}={}", c, value)
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Read-only access to the database being copied
///
/// Implementations look only at the `public` schema.
#[async_trait]
pub trait SourceCatalog: Send + Sync {
    /// All enum types with their labels in declared order, sorted by name
    async fn enum_types(&self) -> Result<Vec<EnumDescriptor>>;

    /// Names of all base tables (views excluded)
    async fn base_tables(&self) -> Result<Vec<String>>;

    /// Column metadata in ordinal order
    async fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>>;

    /// Primary key columns in key order (empty when the table has none)
    async fn primary_key(&self, table: &str) -> Result<Vec<String>>;

    /// Current number of rows
    async fn row_count(&self, table: &str) -> Result<i64>;

    /// Foreign-key dependencies between tables
    async fn foreign_keys(&self) -> Result<Vec<ForeignKey>>;

    /// Every row of a table, in one batch
    async fn fetch_rows(&self, table: &str) -> Result<Vec<Row>>;
}

/// Outcome of inserting one row with `ON CONFLICT DO NOTHING`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A row with the same conflict key already existed
    Skipped,
}

/// Write access to the database receiving the copy
#[async_trait]
pub trait TargetDatabase: Send + Sync {
    /// Labels of an existing enum type, `None` when no such type exists
    async fn enum_labels(&self, name: &str) -> Result<Option<Vec<String>>>;

    /// Create an enum type with the exact label order given
    async fn create_enum(&self, descriptor: &EnumDescriptor) -> Result<()>;

    /// Create a sequence unless it already exists. `sequence` is the text
    /// found inside `nextval('...')` and may be schema-qualified.
    async fn create_sequence(&self, sequence: &str) -> Result<()>;

    /// Execute a `CREATE TABLE IF NOT EXISTS` statement
    async fn execute_ddl(&self, ddl: &str) -> Result<()>;

    /// Insert a row using exactly its column set, ignoring conflicts on
    /// `conflict_columns`
    async fn insert_row(
        &self,
        table: &str,
        row: &Row,
        conflict_columns: &[String],
    ) -> Result<InsertOutcome>;

    /// Move a sequence to `MAX(column)` so new rows do not collide with
    /// copied ones
    async fn sync_sequence(&self, sequence: &str, table: &str, column: &str) -> Result<()>;

    /// Backend identifier for logging
    fn db_type(&self) -> &'static str;
}
