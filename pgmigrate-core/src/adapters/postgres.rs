//! Postgres adapter (sqlx)
//!
//! One connection per database: the pool is capped at a single connection
//! so every statement of a run goes through the same session, in order.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use tracing::{debug, warn};

use crate::config::redact_url;
use crate::domain::enum_type::{descriptors_from_map, group_labels};
use crate::domain::result::{Error, Result};
use crate::domain::sql::{quote_ident, quote_ident_list};
use crate::domain::{ColumnInfo, EnumDescriptor, ForeignKey};
use crate::ports::{InsertOutcome, Row, SourceCatalog, TargetDatabase};

/// Maximum number of attempts when the server is not accepting connections
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 200, 400, 800, 1600ms)
const INITIAL_RETRY_DELAY_MS: u64 = 200;

/// Check if a connection error is worth retrying
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    lower.contains("connection refused")
        || lower.contains("the database system is starting up")
        || lower.contains("connection reset")
        || lower.contains("timed out")
        || lower.contains("too many connections")
}

const ENUM_LABELS_SQL: &str = r#"
SELECT t.typname::text, e.enumlabel::text
FROM pg_type t
JOIN pg_enum e ON t.oid = e.enumtypid
JOIN pg_namespace n ON n.oid = t.typnamespace
WHERE n.nspname = 'public'
ORDER BY t.typname, e.enumsortorder
"#;

const BASE_TABLES_SQL: &str = r#"
SELECT table_name::text
FROM information_schema.tables
WHERE table_schema = 'public' AND table_type = 'BASE TABLE'
ORDER BY table_name
"#;

const COLUMNS_SQL: &str = r#"
SELECT column_name::text, data_type::text, udt_name::text, is_nullable::text,
       column_default::text, character_maximum_length::int4
FROM information_schema.columns
WHERE table_schema = 'public' AND table_name = $1
ORDER BY ordinal_position
"#;

const PRIMARY_KEY_SQL: &str = r#"
SELECT kcu.column_name::text
FROM information_schema.table_constraints tc
JOIN information_schema.key_column_usage kcu
  ON tc.constraint_name = kcu.constraint_name
 AND tc.table_schema = kcu.table_schema
 AND tc.table_name = kcu.table_name
WHERE tc.constraint_type = 'PRIMARY KEY'
  AND tc.table_schema = 'public'
  AND tc.table_name = $1
ORDER BY kcu.ordinal_position
"#;

const FOREIGN_KEYS_SQL: &str = r#"
SELECT child.table_name::text, parent.table_name::text
FROM information_schema.referential_constraints rc
JOIN information_schema.table_constraints child
  ON child.constraint_name = rc.constraint_name
 AND child.constraint_schema = rc.constraint_schema
JOIN information_schema.table_constraints parent
  ON parent.constraint_name = rc.unique_constraint_name
 AND parent.constraint_schema = rc.unique_constraint_schema
WHERE rc.constraint_schema = 'public'
ORDER BY child.table_name, parent.table_name
"#;

const TARGET_ENUM_EXISTS_SQL: &str = r#"
SELECT EXISTS (
  SELECT 1 FROM pg_type t
  JOIN pg_namespace n ON n.oid = t.typnamespace
  WHERE n.nspname = 'public' AND t.typname = $1 AND t.typtype = 'e'
)
"#;

const TARGET_ENUM_LABELS_SQL: &str = r#"
SELECT e.enumlabel::text
FROM pg_type t
JOIN pg_enum e ON t.oid = e.enumtypid
JOIN pg_namespace n ON n.oid = t.typnamespace
WHERE n.nspname = 'public' AND t.typname = $1
ORDER BY e.enumsortorder
"#;

/// A Postgres database reached through a single-connection pool
pub struct PgDatabase {
    pool: PgPool,
    label: String,
}

impl PgDatabase {
    /// Connect to a database
    ///
    /// Retries with exponential backoff while the server refuses
    /// connections or is still starting up.
    pub async fn connect(url: &str) -> Result<Self> {
        let label = redact_url(url);
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_connect(url).await {
                Ok(pool) => {
                    debug!(database = %label, "connected");
                    return Ok(Self { pool, label });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        warn!(
                            database = %label,
                            "Database unavailable, retrying in {}ms (attempt {}/{}): {}",
                            delay.as_millis(),
                            attempt + 1,
                            MAX_RETRIES,
                            err_msg
                        );
                        tokio::time::sleep(delay).await;
                        last_error = Some(e);
                        continue;
                    }
                    return Err(Error::database(format!(
                        "failed to connect to {}: {}",
                        label, err_msg
                    )));
                }
            }
        }

        Err(Error::database(format!(
            "failed to connect to {} after {} attempts: {}",
            label,
            MAX_RETRIES,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    async fn try_connect(url: &str) -> std::result::Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .connect(url)
            .await
    }

    /// Connection string with the password removed
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Release the connection
    pub async fn close(&self) {
        self.pool.close().await;
        debug!(database = %self.label, "connection closed");
    }
}

#[async_trait]
impl SourceCatalog for PgDatabase {
    async fn enum_types(&self) -> Result<Vec<EnumDescriptor>> {
        let rows: Vec<(String, String)> = sqlx::query_as(ENUM_LABELS_SQL)
            .fetch_all(&self.pool)
            .await?;
        descriptors_from_map(&group_labels(rows))
    }

    async fn base_tables(&self) -> Result<Vec<String>> {
        let tables: Vec<String> = sqlx::query_scalar(BASE_TABLES_SQL)
            .fetch_all(&self.pool)
            .await?;
        Ok(tables)
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let rows: Vec<(String, String, String, String, Option<String>, Option<i32>)> =
            sqlx::query_as(COLUMNS_SQL)
                .bind(table)
                .fetch_all(&self.pool)
                .await?;

        if rows.is_empty() {
            return Err(Error::not_found(format!("table '{}'", table)));
        }

        Ok(rows
            .into_iter()
            .map(
                |(name, data_type, udt_name, is_nullable, default, max_length)| ColumnInfo {
                    name,
                    data_type,
                    udt_name,
                    is_nullable: is_nullable == "YES",
                    default,
                    max_length,
                },
            )
            .collect())
    }

    async fn primary_key(&self, table: &str) -> Result<Vec<String>> {
        let columns: Vec<String> = sqlx::query_scalar(PRIMARY_KEY_SQL)
            .bind(table)
            .fetch_all(&self.pool)
            .await?;
        Ok(columns)
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count)
    }

    async fn foreign_keys(&self) -> Result<Vec<ForeignKey>> {
        let rows: Vec<(String, String)> = sqlx::query_as(FOREIGN_KEYS_SQL)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(table, references)| ForeignKey { table, references })
            .collect())
    }

    async fn fetch_rows(&self, table: &str) -> Result<Vec<Row>> {
        let sql = format!("SELECT row_to_json(t)::jsonb FROM {} AS t", quote_ident(table));
        let rows: Vec<Json<Row>> = sqlx::query_scalar(&sql).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|Json(row)| row).collect())
    }
}

#[async_trait]
impl TargetDatabase for PgDatabase {
    async fn enum_labels(&self, name: &str) -> Result<Option<Vec<String>>> {
        let exists: bool = sqlx::query_scalar(TARGET_ENUM_EXISTS_SQL)
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        if !exists {
            return Ok(None);
        }

        let labels: Vec<String> = sqlx::query_scalar(TARGET_ENUM_LABELS_SQL)
            .bind(name)
            .fetch_all(&self.pool)
            .await?;
        Ok(Some(labels))
    }

    async fn create_enum(&self, descriptor: &EnumDescriptor) -> Result<()> {
        let sql = descriptor.create_sql();
        sqlx::raw_sql(&sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn create_sequence(&self, sequence: &str) -> Result<()> {
        let sql = format!("CREATE SEQUENCE IF NOT EXISTS {}", sequence);
        sqlx::raw_sql(&sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn execute_ddl(&self, ddl: &str) -> Result<()> {
        sqlx::raw_sql(ddl).execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_row(
        &self,
        table: &str,
        row: &Row,
        conflict_columns: &[String],
    ) -> Result<InsertOutcome> {
        if row.is_empty() {
            return Err(Error::validation(format!("row for '{}' has no columns", table)));
        }

        // jsonb_populate_record casts each JSON value back to the column type
        let columns: Vec<&String> = row.keys().collect();
        let column_list = quote_ident_list(&columns);
        let sql = format!(
            "INSERT INTO {table} ({cols}) SELECT {cols} FROM jsonb_populate_record(NULL::{table}, $1) ON CONFLICT ({conflict}) DO NOTHING",
            table = quote_ident(table),
            cols = column_list,
            conflict = quote_ident_list(conflict_columns),
        );

        let result = sqlx::query(&sql)
            .bind(Json(row))
            .execute(&self.pool)
            .await?;

        Ok(if result.rows_affected() > 0 {
            InsertOutcome::Inserted
        } else {
            InsertOutcome::Skipped
        })
    }

    async fn sync_sequence(&self, sequence: &str, table: &str, column: &str) -> Result<()> {
        let sql = format!(
            "SELECT setval($1::regclass, (SELECT MAX({}) FROM {}))",
            quote_ident(column),
            quote_ident(table)
        );
        sqlx::query(&sql).bind(sequence).execute(&self.pool).await?;
        Ok(())
    }

    fn db_type(&self) -> &'static str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(is_retryable_error("Connection refused (os error 111)"));
        assert!(is_retryable_error("FATAL: the database system is starting up"));
        assert!(!is_retryable_error("password authentication failed for user \"app\""));
        assert!(!is_retryable_error("database \"papers\" does not exist"));
    }
}
