//! Enums command - list enum types of the source database

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use colored::Colorize;

use super::load_config;
use crate::output;
use pgmigrate_core::domain::manifest::save_enum_map;
use pgmigrate_core::MigrateContext;

pub async fn run(output_path: Option<PathBuf>, json: bool) -> Result<ExitCode> {
    let config = load_config()?;
    let ctx = MigrateContext::connect_source(config).await?;
    let result = ctx.inspect_service().enumerate_enum_types().await;
    ctx.close().await;
    let enums = result.context("Failed to read enum types")?;

    if let Some(path) = &output_path {
        save_enum_map(&enums, path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&enums)?);
        return Ok(ExitCode::SUCCESS);
    }

    if enums.is_empty() {
        println!("No enum types found in schema public.");
    } else {
        let mut table = output::create_table();
        table.set_header(vec!["Enum", "Labels"]);
        for (name, labels) in &enums {
            table.add_row(vec![name.clone(), labels.join(", ")]);
        }
        println!("{}", table);
        println!("{} enum type(s)", enums.len().to_string().bold());
    }

    if let Some(path) = output_path {
        output::success(&format!("Wrote {}", path.display()));
    }
    Ok(ExitCode::SUCCESS)
}
