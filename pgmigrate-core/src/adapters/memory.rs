//! In-memory database
//!
//! Implements both ports without a server. Used as the target of dry runs
//! and as source and target in tests. It models the Postgres behaviour the
//! migration relies on: `IF NOT EXISTS` DDL, sequences that must exist
//! before a table default can reference them, `ON CONFLICT DO NOTHING`,
//! and `setval(seq, MAX(col))`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::domain::result::{Error, Result};
use crate::domain::table::{parse_table_name, sequence_bindings};
use crate::domain::{ColumnInfo, EnumDescriptor, ForeignKey};
use crate::ports::{row_key, InsertOutcome, Row, SourceCatalog, TargetDatabase};

#[derive(Debug, Clone, Default)]
struct MemoryTable {
    columns: Vec<ColumnInfo>,
    primary_key: Vec<String>,
    rows: Vec<Row>,
}

#[derive(Debug, Clone, Copy)]
struct SequenceState {
    last_value: i64,
    is_called: bool,
}

impl Default for SequenceState {
    fn default() -> Self {
        Self {
            last_value: 1,
            is_called: false,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    enums: BTreeMap<String, Vec<String>>,
    tables: BTreeMap<String, MemoryTable>,
    foreign_keys: Vec<ForeignKey>,
    sequences: HashMap<String, SequenceState>,
    /// (table, key) pairs whose insert is rejected
    rejected_rows: HashSet<(String, String)>,
    /// Tables whose DDL fails to execute
    failing_tables: HashSet<String>,
    failing_enums: HashSet<String>,
    failing_sequence_syncs: HashSet<String>,
    statements: Vec<String>,
}

/// Database held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    state: Mutex<State>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|e| Error::database(format!("Lock poisoned: {}", e)))
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // Test-facing accessors; a poisoned lock still holds usable data
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // === Seeding ===

    /// Add a table with its columns, primary key and rows
    pub fn with_table(
        self,
        name: &str,
        columns: Vec<ColumnInfo>,
        primary_key: &[&str],
        rows: Vec<Row>,
    ) -> Self {
        self.state().tables.insert(
            name.to_string(),
            MemoryTable {
                columns,
                primary_key: primary_key.iter().map(|s| s.to_string()).collect(),
                rows,
            },
        );
        self
    }

    /// Add an enum type
    pub fn with_enum(self, name: &str, values: &[&str]) -> Self {
        self.state().enums.insert(
            name.to_string(),
            values.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    /// Declare that `table` references `references`
    pub fn with_foreign_key(self, table: &str, references: &str) -> Self {
        self.state()
            .foreign_keys
            .push(ForeignKey::new(table, references));
        self
    }

    /// Add an existing sequence
    pub fn with_sequence(self, name: &str) -> Self {
        self.state()
            .sequences
            .insert(name.to_string(), SequenceState::default());
        self
    }

    // === Fault injection ===

    /// Reject the insert of the row whose key renders as `key` (e.g. `id=5`)
    pub fn reject_row(&self, table: &str, key: &str) {
        self.state()
            .rejected_rows
            .insert((table.to_string(), key.to_string()));
    }

    /// Make the DDL of `table` fail
    pub fn fail_table(&self, table: &str) {
        self.state().failing_tables.insert(table.to_string());
    }

    /// Make creation of enum `name` fail
    pub fn fail_enum(&self, name: &str) {
        self.state().failing_enums.insert(name.to_string());
    }

    /// Make `setval` on `sequence` fail
    pub fn fail_sequence_sync(&self, sequence: &str) {
        self.state()
            .failing_sequence_syncs
            .insert(sequence.to_string());
    }

    // === Inspection ===

    pub fn table_names(&self) -> Vec<String> {
        self.state().tables.keys().cloned().collect()
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.state()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn enum_values(&self, name: &str) -> Option<Vec<String>> {
        self.state().enums.get(name).cloned()
    }

    /// Draw the next value from a sequence, like `nextval`
    pub fn next_value(&self, sequence: &str) -> Option<i64> {
        let mut state = self.state();
        let seq = state.sequences.get_mut(sequence)?;
        if seq.is_called {
            seq.last_value += 1;
        }
        seq.is_called = true;
        Some(seq.last_value)
    }

    /// Every write statement executed, in order
    pub fn statements(&self) -> Vec<String> {
        self.state().statements.clone()
    }
}

#[async_trait]
impl SourceCatalog for MemoryDatabase {
    async fn enum_types(&self) -> Result<Vec<EnumDescriptor>> {
        let state = self.lock()?;
        Ok(state
            .enums
            .iter()
            .map(|(name, values)| EnumDescriptor {
                name: name.clone(),
                values: values.clone(),
            })
            .collect())
    }

    async fn base_tables(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.tables.keys().cloned().collect())
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let state = self.lock()?;
        state
            .tables
            .get(table)
            .map(|t| t.columns.clone())
            .ok_or_else(|| Error::not_found(format!("table '{}'", table)))
    }

    async fn primary_key(&self, table: &str) -> Result<Vec<String>> {
        let state = self.lock()?;
        state
            .tables
            .get(table)
            .map(|t| t.primary_key.clone())
            .ok_or_else(|| Error::not_found(format!("table '{}'", table)))
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        let state = self.lock()?;
        state
            .tables
            .get(table)
            .map(|t| t.rows.len() as i64)
            .ok_or_else(|| Error::database(format!("relation \"{}\" does not exist", table)))
    }

    async fn foreign_keys(&self) -> Result<Vec<ForeignKey>> {
        Ok(self.lock()?.foreign_keys.clone())
    }

    async fn fetch_rows(&self, table: &str) -> Result<Vec<Row>> {
        let state = self.lock()?;
        state
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .ok_or_else(|| Error::database(format!("relation \"{}\" does not exist", table)))
    }
}

#[async_trait]
impl TargetDatabase for MemoryDatabase {
    async fn enum_labels(&self, name: &str) -> Result<Option<Vec<String>>> {
        Ok(self.lock()?.enums.get(name).cloned())
    }

    async fn create_enum(&self, descriptor: &EnumDescriptor) -> Result<()> {
        let mut state = self.lock()?;
        state.statements.push(descriptor.create_sql());
        if state.failing_enums.contains(&descriptor.name) {
            return Err(Error::database(format!(
                "could not create type \"{}\"",
                descriptor.name
            )));
        }
        if state.enums.contains_key(&descriptor.name) {
            return Err(Error::database(format!(
                "type \"{}\" already exists",
                descriptor.name
            )));
        }
        state
            .enums
            .insert(descriptor.name.clone(), descriptor.values.clone());
        Ok(())
    }

    async fn create_sequence(&self, sequence: &str) -> Result<()> {
        let mut state = self.lock()?;
        state
            .statements
            .push(format!("CREATE SEQUENCE IF NOT EXISTS {}", sequence));
        state.sequences.entry(sequence.to_string()).or_default();
        Ok(())
    }

    async fn execute_ddl(&self, ddl: &str) -> Result<()> {
        let mut state = self.lock()?;
        state.statements.push(ddl.to_string());

        let table = parse_table_name(ddl)
            .ok_or_else(|| Error::database(format!("syntax error in \"{}\"", ddl)))?;
        if state.failing_tables.contains(&table) {
            return Err(Error::database(format!(
                "could not create table \"{}\"",
                table
            )));
        }
        if state.tables.contains_key(&table) {
            // CREATE TABLE IF NOT EXISTS
            return Ok(());
        }
        for binding in sequence_bindings(ddl) {
            if !state.sequences.contains_key(&binding.sequence) {
                return Err(Error::database(format!(
                    "relation \"{}\" does not exist",
                    binding.sequence
                )));
            }
        }
        state.tables.insert(table, MemoryTable::default());
        Ok(())
    }

    async fn insert_row(
        &self,
        table: &str,
        row: &Row,
        conflict_columns: &[String],
    ) -> Result<InsertOutcome> {
        let mut state = self.lock()?;
        let key = row_key(row, conflict_columns);
        if state
            .rejected_rows
            .contains(&(table.to_string(), key.clone()))
        {
            return Err(Error::database(format!(
                "invalid input value for row {} of \"{}\"",
                key, table
            )));
        }

        let target = state
            .tables
            .get_mut(table)
            .ok_or_else(|| Error::database(format!("relation \"{}\" does not exist", table)))?;

        let conflict = target.rows.iter().any(|existing| {
            conflict_columns
                .iter()
                .all(|c| existing.get(c) == row.get(c))
        });
        if conflict {
            return Ok(InsertOutcome::Skipped);
        }

        target.rows.push(row.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn sync_sequence(&self, sequence: &str, table: &str, column: &str) -> Result<()> {
        let mut state = self.lock()?;
        if state.failing_sequence_syncs.contains(sequence) {
            return Err(Error::database(format!(
                "permission denied for sequence {}",
                sequence
            )));
        }

        let max = state
            .tables
            .get(table)
            .ok_or_else(|| Error::database(format!("relation \"{}\" does not exist", table)))?
            .rows
            .iter()
            .filter_map(|r| r.get(column).and_then(|v| v.as_i64()))
            .max();

        let seq = state
            .sequences
            .get_mut(sequence)
            .ok_or_else(|| Error::database(format!("relation \"{}\" does not exist", sequence)))?;
        if let Some(max) = max {
            seq.last_value = max;
            seq.is_called = true;
        }
        Ok(())
    }

    fn db_type(&self) -> &'static str {
        "memory"
    }
}
