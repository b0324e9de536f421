//! Inspect command - write the manifest and enum file from the source

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};

use super::load_config;
use crate::output;
use pgmigrate_core::MigrateContext;

pub async fn run(
    output_path: Option<PathBuf>,
    enums_output: Option<PathBuf>,
    json: bool,
) -> Result<ExitCode> {
    let mut config = load_config()?;
    if let Some(path) = output_path {
        config.manifest_path = path;
    }
    if let Some(path) = enums_output {
        config.enums_path = path;
    }

    let ctx = MigrateContext::connect_source(config).await?;
    let result = ctx
        .inspect_service()
        .inspect_to_files(
            &ctx.config.table_priority,
            &ctx.config.manifest_path,
            &ctx.config.enums_path,
        )
        .await;
    ctx.close().await;
    let result = result.context("Failed to inspect source database")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(ExitCode::SUCCESS);
    }

    if result.tables.is_empty() {
        output::warning("No base tables found in schema public.");
    } else {
        let mut table = output::create_table();
        table.set_header(vec!["Table", "Rows", "Sequences"]);
        for entry in &result.tables {
            let sequences: Vec<String> =
                entry.sequences().into_iter().map(|s| s.sequence).collect();
            table.add_row(vec![
                entry.table.clone(),
                entry.count.to_string(),
                sequences.join(", "),
            ]);
        }
        println!("{}", table);
    }

    output::success(&format!(
        "Wrote {} table(s) to {}",
        result.tables.len(),
        result.manifest_path
    ));
    output::success(&format!(
        "Wrote {} enum type(s) to {}",
        result.enums.len(),
        result.enums_path
    ));
    Ok(ExitCode::SUCCESS)
}
