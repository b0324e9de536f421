//! CLI command implementations

pub mod enums;
pub mod inspect;
pub mod logs;
pub mod migrate;
pub mod show;

use std::path::PathBuf;

use anyhow::{Context, Result};
use pgmigrate_core::config::Config;
use pgmigrate_core::services::LoggingService;

/// Environment variable overriding the pgmigrate directory
pub const DIR_ENV: &str = "PGMIGRATE_DIR";

/// Open the run journal once per process and pass it down; a second
/// DuckDB instance on the same file would overwrite this one's writes.
///
/// Returns None if logging fails to initialize (shouldn't block operations)
pub fn get_logger() -> Option<LoggingService> {
    let dir = get_pgmigrate_dir().ok()?;
    std::fs::create_dir_all(&dir).ok()?;
    LoggingService::new(&dir, env!("CARGO_PKG_VERSION")).ok()
}

/// Journal a command, ignoring any errors (logging should never break the app)
pub fn log_command(logger: &Option<LoggingService>, command: &str) {
    if let Some(l) = logger {
        let _ = l.log_command(command);
    }
}

pub fn log_failure(logger: &Option<LoggingService>, command: &str, error: &anyhow::Error) {
    if let Some(l) = logger {
        let _ = l.log_error(command, &format!("{:#}", error));
    }
}

/// Get the pgmigrate directory from environment or default
pub fn get_pgmigrate_dir() -> Result<PathBuf> {
    match std::env::var(DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => Ok(PathBuf::from(dir)),
        _ => dirs::home_dir()
            .map(|home| home.join(".pgmigrate"))
            .context("Could not find home directory; set PGMIGRATE_DIR"),
    }
}

/// Load configuration from the working directory and environment
pub fn load_config() -> Result<Config> {
    let work_dir = std::env::current_dir().context("Failed to read working directory")?;
    Config::load(&work_dir).context("Failed to load configuration")
}
