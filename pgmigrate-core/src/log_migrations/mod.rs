//! Schema of the run journal (`logs.duckdb`)
//!
//! SQL files are embedded with include_str! and applied in name order by
//! `LoggingService` the first time a journal is opened.

/// (file name, SQL) pairs. `000_migrations.sql` bootstraps `sys_migrations`
/// and must stay first; append new files as `NNN_description.sql`.
pub const LOG_MIGRATIONS: &[(&str, &str)] = &[
    ("000_migrations.sql", include_str!("000_migrations.sql")),
    ("001_initial_schema.sql", include_str!("001_initial_schema.sql")),
];

/// Name of the bootstrap migration
pub const BOOTSTRAP_MIGRATION: &str = "000_migrations.sql";
