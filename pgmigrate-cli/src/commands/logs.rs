//! Logs command - view and manage the run journal

use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::{Duration, TimeZone, Utc};
use clap::Subcommand;
use colored::Colorize;
use dialoguer::Confirm;

use super::get_pgmigrate_dir;
use crate::output;
use pgmigrate_core::services::{LogEntry, LoggingService};

#[derive(Subcommand)]
pub enum LogsCommands {
    /// Show recent journal entries
    List {
        /// Number of entries to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
        /// Show only errors
        #[arg(long)]
        errors: bool,
        /// Show every entry of one migration run
        #[arg(long)]
        run: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Clear old journal entries
    Clear {
        /// Delete entries older than N days
        #[arg(long, default_value = "30")]
        older_than_days: u64,
        /// Skip confirmation prompt
        #[arg(long, short = 'f')]
        force: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show journal statistics and database path
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn journal(logger: &Option<LoggingService>) -> Result<&LoggingService> {
    let dir = get_pgmigrate_dir()?;
    logger
        .as_ref()
        .with_context(|| format!("Could not open the run journal in {}", dir.display()))
}

fn format_timestamp(timestamp_ms: i64) -> String {
    Utc.timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp_ms.to_string())
}

fn short_run(run_id: &Option<String>) -> String {
    run_id
        .as_deref()
        .map(|id| id.chars().take(8).collect())
        .unwrap_or_default()
}

fn print_entries(entries: &[LogEntry]) {
    let mut table = output::create_table();
    table.set_header(vec!["Time", "Run", "Event", "Context", "Error"]);

    for entry in entries {
        let context = [
            entry.command.as_deref(),
            entry.subject.as_deref(),
            entry.detail.as_deref(),
        ]
        .iter()
        .filter_map(|&s| s)
        .collect::<Vec<_>>()
        .join(", ");

        let error = entry
            .error_message
            .as_deref()
            .map(|e| e.red().to_string())
            .unwrap_or_default();

        table.add_row(vec![
            format_timestamp(entry.timestamp),
            short_run(&entry.run_id),
            entry.event.clone(),
            context,
            error,
        ]);
    }

    println!("{}", table);
}

pub fn run(logger: &Option<LoggingService>, command: LogsCommands) -> Result<ExitCode> {
    match command {
        LogsCommands::List {
            limit,
            errors,
            run,
            json,
        } => {
            let service = journal(logger)?;
            let entries = match (&run, errors) {
                (Some(run_id), _) => service.get_run(run_id)?,
                (None, true) => service.get_errors(limit)?,
                (None, false) => service.get_recent(limit)?,
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
                return Ok(ExitCode::SUCCESS);
            }

            if entries.is_empty() {
                println!("No log entries found.");
                return Ok(ExitCode::SUCCESS);
            }

            print_entries(&entries);

            if run.is_none() && !errors {
                let recent_errors = service.get_errors(3)?;
                if !recent_errors.is_empty() {
                    println!();
                    println!("{}", "Recent Errors:".red().bold());
                    for err in &recent_errors {
                        println!(
                            "  {} [{}]: {}",
                            format_timestamp(err.timestamp).dimmed(),
                            err.event,
                            err.error_message.as_deref().unwrap_or("Unknown error")
                        );
                    }
                }
            }
        }
        LogsCommands::Clear {
            older_than_days,
            force,
            json,
        } => {
            let service = journal(logger)?;
            let cutoff_ms = (Utc::now() - Duration::days(older_than_days as i64)).timestamp_millis();

            if !force && !json {
                let confirmed = Confirm::new()
                    .with_prompt(format!("Delete log entries older than {} days?", older_than_days))
                    .default(false)
                    .interact()?;
                if !confirmed {
                    println!("Cancelled.");
                    return Ok(ExitCode::SUCCESS);
                }
            }

            let deleted = service.delete_before(cutoff_ms)?;

            if json {
                println!("{}", serde_json::json!({ "deleted": deleted }));
            } else {
                output::success(&format!("Deleted {} log entries", deleted));
            }
        }
        LogsCommands::Stats { json } => {
            let service = journal(logger)?;
            let total = service.count()?;
            let errors = service.count_errors()?;
            let db_path = service.db_path().to_path_buf();
            let size_bytes = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "total_entries": total,
                        "error_count": errors,
                        "database_path": db_path.to_string_lossy(),
                        "database_size_bytes": size_bytes
                    })
                );
            } else {
                println!("{}", "Journal Statistics".bold());
                println!("  Total entries: {}", total);
                println!("  Errors: {}", errors);
                println!("  Database: {}", db_path.display());
                println!("  Size: {} bytes", size_bytes);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
