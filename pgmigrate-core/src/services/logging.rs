//! Logging service - run journal stored in DuckDB
//!
//! Every command and every migration run leaves structured events in
//! `logs.duckdb` inside the pgmigrate directory, so a partial migration can
//! be audited after the console output is gone. Connection strings and row
//! contents are never journaled; row failures are recorded by key only.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use chrono::Utc;
use duckdb::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::domain::{EnumOutcome, MigrationReport};
use crate::log_migrations::{BOOTSTRAP_MIGRATION, LOG_MIGRATIONS};

/// Journal file name inside the pgmigrate directory
pub const LOG_DB_FILE: &str = "logs.duckdb";

/// Counter for generating unique IDs within the same millisecond
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a unique ID based on timestamp + counter
fn generate_id() -> u64 {
    // Lower 16 bits hold the counter (65536 unique IDs per millisecond)
    let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed) & 0xFFFF;
    ((now_ms() as u64) << 16) | counter
}

/// Current unix timestamp in milliseconds
fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn detect_platform() -> &'static str {
    if cfg!(target_os = "macos") {
        "macos"
    } else if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "linux") {
        "linux"
    } else {
        "unknown"
    }
}

/// An event to be recorded
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogEvent {
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Table or enum the event is about
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl LogEvent {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            ..Default::default()
        }
    }

    pub fn with_run(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

/// A journal entry as stored in the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: u64,
    pub timestamp: i64,
    pub app_version: String,
    pub platform: String,
    pub run_id: Option<String>,
    pub event: String,
    pub command: Option<String>,
    pub subject: Option<String>,
    pub detail: Option<String>,
    pub error_message: Option<String>,
}

const SELECT_ENTRIES: &str = r#"
    SELECT id, timestamp, app_version, platform, run_id,
           event, command, subject, detail, error_message
    FROM sys_logs
"#;

fn row_to_entry(row: &duckdb::Row<'_>) -> duckdb::Result<LogEntry> {
    Ok(LogEntry {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        app_version: row.get(2)?,
        platform: row.get(3)?,
        run_id: row.get(4)?,
        event: row.get(5)?,
        command: row.get(6)?,
        subject: row.get(7)?,
        detail: row.get(8)?,
        error_message: row.get(9)?,
    })
}

/// Service for the run journal
pub struct LoggingService {
    conn: Mutex<Connection>,
    db_path: PathBuf,
    app_version: String,
    platform: &'static str,
}

impl LoggingService {
    /// Open or create `logs.duckdb` in `dir` and apply pending migrations
    pub fn new(dir: &Path, app_version: impl Into<String>) -> Result<Self> {
        let db_path = dir.join(LOG_DB_FILE);
        let conn = Connection::open(&db_path)?;

        let service = Self {
            conn: Mutex::new(conn),
            db_path,
            app_version: app_version.into(),
            platform: detect_platform(),
        };

        service.run_migrations()?;

        Ok(service)
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))?;

        let table_exists: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM information_schema.tables WHERE table_name = 'sys_migrations'",
                [],
                |row| row.get(0),
            )
            .unwrap_or(false);

        if !table_exists {
            if let Some((name, sql)) = LOG_MIGRATIONS.iter().find(|(n, _)| *n == BOOTSTRAP_MIGRATION) {
                conn.execute_batch(sql)?;
                conn.execute(
                    "INSERT INTO sys_migrations (migration_name) VALUES (?)",
                    [name],
                )?;
            }
        }

        let mut stmt = conn.prepare("SELECT migration_name FROM sys_migrations")?;
        let applied: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();

        for (name, sql) in LOG_MIGRATIONS.iter() {
            if *name == BOOTSTRAP_MIGRATION || applied.iter().any(|a| a == name) {
                continue;
            }
            conn.execute_batch(sql)?;
            conn.execute(
                "INSERT INTO sys_migrations (migration_name) VALUES (?)",
                [name],
            )?;
        }

        Ok(())
    }

    /// Record an event; version and platform are added automatically
    pub fn log(&self, event: LogEvent) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))?;

        conn.execute(
            r#"
            INSERT INTO sys_logs (
                id, timestamp, app_version, platform, run_id,
                event, command, subject, detail, error_message
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                generate_id(),
                now_ms(),
                &self.app_version,
                self.platform,
                &event.run_id,
                &event.event,
                &event.command,
                &event.subject,
                &event.detail,
                &event.error_message,
            ],
        )?;

        Ok(())
    }

    /// Log a CLI command execution
    pub fn log_command(&self, command: &str) -> Result<()> {
        self.log(LogEvent::new("command_executed").with_command(command))
    }

    /// Log a failed CLI command
    pub fn log_error(&self, command: &str, message: &str) -> Result<()> {
        self.log(
            LogEvent::new("command_failed")
                .with_command(command)
                .with_error(message),
        )
    }

    /// Journal the outcome of a migration run: one event per enum and
    /// table, one per failed row, and a closing summary
    pub fn record_report(&self, report: &MigrationReport) -> Result<()> {
        let run_id = report.run_id.to_string();
        let event = |name: &str| LogEvent::new(name).with_run(run_id.clone()).with_command("migrate");

        self.log(event("run_started").with_detail(format!(
            "dry_run={} tables={}",
            report.dry_run,
            report.table_order.join(",")
        )))?;

        for e in &report.enums {
            let entry = match &e.outcome {
                EnumOutcome::Created => event("enum_created"),
                EnumOutcome::Skipped => event("enum_skipped"),
                EnumOutcome::Mismatch { expected, actual } => event("enum_mismatch").with_detail(
                    format!("expected [{}] found [{}]", expected.join(","), actual.join(",")),
                ),
                EnumOutcome::Failed { error } => event("enum_failed").with_error(error.clone()),
            };
            self.log(entry.with_subject(e.name.clone()))?;
        }

        for table in &report.tables {
            if let Some(err) = &table.schema_error {
                self.log(event("table_failed").with_subject(table.table.clone()).with_error(err.clone()))?;
            }
            if let Some(err) = &table.read_error {
                self.log(event("table_read_failed").with_subject(table.table.clone()).with_error(err.clone()))?;
            }
            for row_error in &table.row_errors {
                self.log(
                    event("row_failed")
                        .with_subject(table.table.clone())
                        .with_detail(row_error.key.clone())
                        .with_error(row_error.message.clone()),
                )?;
            }
            self.log(event("table_loaded").with_subject(table.table.clone()).with_detail(format!(
                "read={} inserted={} skipped={} failed={}",
                table.rows_read, table.inserted, table.skipped, table.failed
            )))?;
        }

        self.log(event("run_finished").with_detail(format!(
            "inserted={} failed_rows={} errors={}",
            report.total_inserted(),
            report.total_failed_rows(),
            report.has_errors()
        )))
    }

    /// Most recent entries, newest first
    pub fn get_recent(&self, limit: usize) -> Result<Vec<LogEntry>> {
        self.query_entries("ORDER BY timestamp DESC, id DESC LIMIT ?", params![limit as i64])
    }

    /// Most recent entries carrying an error
    pub fn get_errors(&self, limit: usize) -> Result<Vec<LogEntry>> {
        self.query_entries(
            "WHERE error_message IS NOT NULL ORDER BY timestamp DESC, id DESC LIMIT ?",
            params![limit as i64],
        )
    }

    /// All entries of one run, in the order they were written
    pub fn get_run(&self, run_id: &str) -> Result<Vec<LogEntry>> {
        self.query_entries("WHERE run_id = ? ORDER BY id", params![run_id])
    }

    fn query_entries(&self, clause: &str, params: &[&dyn duckdb::ToSql]) -> Result<Vec<LogEntry>> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))?;
        let mut stmt = conn.prepare(&format!("{} {}", SELECT_ENTRIES, clause))?;
        let entries = stmt
            .query_map(params, row_to_entry)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(entries)
    }

    /// Total number of entries
    pub fn count(&self) -> Result<u64> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))?;
        let count: u64 = conn.query_row("SELECT COUNT(*) FROM sys_logs", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Number of entries carrying an error
    pub fn count_errors(&self) -> Result<u64> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))?;
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM sys_logs WHERE error_message IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Delete entries older than the given unix timestamp (ms)
    pub fn delete_before(&self, timestamp_ms: i64) -> Result<u64> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))?;
        let deleted = conn.execute("DELETE FROM sys_logs WHERE timestamp < ?", [timestamp_ms])?;
        Ok(deleted as u64)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}
