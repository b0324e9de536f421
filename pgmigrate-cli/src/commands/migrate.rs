//! Migrate command - copy enums, tables and rows into the target

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};

use super::load_config;
use crate::output;
use pgmigrate_core::config::redact_url;
use pgmigrate_core::services::{LoggingService, MigrationObserver, MigrationPlan, NoopObserver};
use pgmigrate_core::{MigrateContext, MigrationReport, TableReport};

/// Exit status of a run that finished with recoverable errors
const PARTIAL_EXIT: u8 = 2;

/// Progress bar over the rows of the table being copied
struct ProgressObserver {
    bar: ProgressBar,
}

impl ProgressObserver {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} {msg:20} [{bar:40.cyan/blue}] {pos}/{len}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        Self { bar }
    }
}

impl MigrationObserver for ProgressObserver {
    fn table_started(&self, table: &str, rows: usize) {
        self.bar.reset();
        self.bar.set_length(rows as u64);
        self.bar.set_message(table.to_string());
    }

    fn row_processed(&self, _table: &str) {
        self.bar.inc(1);
    }

    fn table_finished(&self, report: &TableReport) {
        self.bar.println(format!(
            "{}: {} inserted, {} skipped, {} failed",
            report.table, report.inserted, report.skipped, report.failed
        ));
    }
}

pub async fn run(
    logger: &Option<LoggingService>,
    manifest_path: Option<PathBuf>,
    enums_path: Option<PathBuf>,
    dry_run: bool,
    yes: bool,
    json: bool,
) -> Result<ExitCode> {
    let mut config = load_config()?;
    if let Some(path) = manifest_path {
        config.manifest_path = path;
    }
    if let Some(path) = enums_path {
        config.enums_path = path;
    }

    // Check both connection strings before dialing either
    config.require_source()?;
    let target_label = if dry_run {
        None
    } else {
        Some(redact_url(config.require_target()?))
    };

    if let Some(label) = &target_label {
        if needs_confirmation(yes) && !confirm_target(label, &config.manifest_path)? {
            println!("Cancelled.");
            return Ok(ExitCode::SUCCESS);
        }
    }

    let ctx = if dry_run {
        MigrateContext::connect_source(config).await?
    } else {
        MigrateContext::connect(config).await?
    };
    let result = execute(&ctx, dry_run, json).await;
    ctx.close().await;
    let report = result?;

    if let Some(logger) = logger {
        let _ = logger.record_report(&report);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        output::print_report(&report);
    }

    Ok(if report.has_errors() {
        ExitCode::from(PARTIAL_EXIT)
    } else {
        ExitCode::SUCCESS
    })
}

async fn execute(ctx: &MigrateContext, dry_run: bool, json: bool) -> Result<MigrationReport> {
    let plan = MigrationPlan::load(
        &ctx.config.manifest_path,
        &ctx.config.enums_path,
        ctx.source().as_ref(),
    )
    .await
    .context("Failed to load migration plan")?;

    let service = ctx.migration_service(dry_run)?;

    let report = if !show_progress(json, atty::is(atty::Stream::Stderr)) {
        service.migrate(&plan, &NoopObserver).await?
    } else {
        let observer = ProgressObserver::new();
        let report = service.migrate(&plan, &observer).await;
        observer.bar.finish_and_clear();
        report?
    };
    Ok(report)
}

/// Writes to a real target are confirmed unless `--yes` was given
fn needs_confirmation(yes: bool) -> bool {
    !yes
}

/// indicatif draws on stderr
fn show_progress(json: bool, stderr_is_tty: bool) -> bool {
    !json && stderr_is_tty
}

fn confirm_target(target: &str, manifest: &std::path::Path) -> Result<bool> {
    if atty::isnt(atty::Stream::Stdin) {
        anyhow::bail!("Refusing to write to {} without --yes (stdin is not a terminal)", target);
    }

    let confirmed = Confirm::new()
        .with_prompt(format!(
            "Migrate {} into {}?",
            manifest.display(),
            target
        ))
        .default(false)
        .interact()?;
    Ok(confirmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_yes_skips_confirmation() {
        assert!(needs_confirmation(false));
        assert!(!needs_confirmation(true));
    }

    #[test]
    fn test_progress_needs_terminal_stderr() {
        assert!(show_progress(false, true));
        assert!(!show_progress(false, false));
        assert!(!show_progress(true, true));
    }
}
