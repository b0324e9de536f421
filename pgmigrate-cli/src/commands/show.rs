//! Show command - print the tables of a manifest file

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use colored::Colorize;

use super::load_config;
use crate::output;
use pgmigrate_core::Manifest;

pub fn run(manifest_path: Option<PathBuf>, json: bool) -> Result<ExitCode> {
    let path = match manifest_path {
        Some(path) => path,
        None => load_config()?.manifest_path,
    };
    let manifest = Manifest::load(&path)
        .with_context(|| format!("Failed to read manifest {}", path.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&manifest)?);
        return Ok(ExitCode::SUCCESS);
    }

    if manifest.is_empty() {
        println!("Manifest {} lists no tables.", path.display());
        return Ok(ExitCode::SUCCESS);
    }

    for entry in &manifest.tables {
        println!(
            "{} {}",
            entry.table.bold(),
            format!("({} rows at inspection)", entry.count).dimmed()
        );
        println!("{}", entry.ddl);
        println!();
    }

    for issue in manifest.validate() {
        output::warning(&format!("{}: {}", issue.table, issue.message));
    }
    output::info(&format!("{} table(s) in {}", manifest.len(), path.display()));
    Ok(ExitCode::SUCCESS)
}
