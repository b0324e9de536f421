//! pgmigrate CLI - copy a Postgres schema and its data between databases

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use pgmigrate_core::services::LoggingService;

mod commands;
mod output;

use commands::{enums, inspect, logs, migrate, show};

/// pgmigrate - Postgres schema and data migration
#[derive(Parser)]
#[command(name = "pgmigrate", version, about, long_about = None)]
struct Cli {
    /// Diagnostic log format (stderr); filter with RUST_LOG
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// List enum types in the source database
    Enums {
        /// Also write them to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Read the source schema and write the manifest
    Inspect {
        /// Manifest path (default: ddl.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Enum file path (default: enums.json)
        #[arg(long)]
        enums_output: Option<PathBuf>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the tables of a manifest
    Show {
        /// Manifest path (default: ddl.json)
        #[arg(short, long)]
        manifest: Option<PathBuf>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Copy enums, tables and rows from source to target
    Migrate {
        /// Manifest path (default: ddl.json)
        #[arg(short, long)]
        manifest: Option<PathBuf>,
        /// Enum file path (default: enums.json)
        #[arg(long)]
        enums: Option<PathBuf>,
        /// Run against an in-memory target and report what would happen
        #[arg(long)]
        dry_run: bool,
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
        /// Output the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// View and manage the run journal
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Enums { .. } => "enums",
            Commands::Inspect { .. } => "inspect",
            Commands::Show { .. } => "show",
            Commands::Migrate { .. } => "migrate",
            Commands::Logs { .. } => "logs",
        }
    }
}

fn setup_logging(format: LogFormat) {
    let env_filter = std::env::var("RUST_LOG").unwrap_or("info,sqlx=warn".to_string());
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    setup_logging(cli.log_format);

    let logger = commands::get_logger();
    let name = cli.command.name();
    commands::log_command(&logger, name);

    match run(cli, &logger).await {
        Ok(code) => code,
        Err(e) => {
            commands::log_failure(&logger, name, &e);
            output::error(&format!("Error: {:#}", e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, logger: &Option<LoggingService>) -> Result<ExitCode> {
    match cli.command {
        Commands::Enums { output, json } => enums::run(output, json).await,
        Commands::Inspect {
            output,
            enums_output,
            json,
        } => inspect::run(output, enums_output, json).await,
        Commands::Show { manifest, json } => show::run(manifest, json),
        Commands::Migrate {
            manifest,
            enums,
            dry_run,
            yes,
            json,
        } => migrate::run(logger, manifest, enums, dry_run, yes, json).await,
        Commands::Logs { command } => logs::run(logger, command),
    }
}
