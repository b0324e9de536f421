//! pgmigrate Core - copy a Postgres schema and its data into another database
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Enum and table descriptors, the manifest, dependency ordering, run reports
//! - **ports**: Trait definitions for the source catalog and the target database
//! - **services**: Inspection, migration and the run journal
//! - **adapters**: Concrete implementations (Postgres via sqlx, in-memory)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod ports;
pub mod services;

use std::future::Future;
use std::sync::Arc;

use tracing::info;

use adapters::postgres::PgDatabase;
use config::Config;
use services::{InspectService, MigrationService};

// Re-export commonly used types at crate root
pub use domain::result::{Error, Result};
pub use domain::{
    EnumDescriptor, EnumMap, EnumOutcome, Manifest, MigrationReport, TableDescriptor,
    TableReport,
};

/// Open connections for one command
///
/// Holds the configuration and the source connection, plus the target
/// connection for commands that write. Required connection strings are
/// checked before anything is dialed.
pub struct MigrateContext {
    pub config: Config,
    source: Arc<PgDatabase>,
    target: Option<Arc<PgDatabase>>,
}

impl MigrateContext {
    /// Connect to the source only
    pub async fn connect_source(config: Config) -> Result<Self> {
        let source_url = config.require_source()?.to_string();
        let source = Arc::new(PgDatabase::connect(&source_url).await?);
        info!(source = %source.label(), "Connected to source");

        Ok(Self {
            config,
            source,
            target: None,
        })
    }

    /// Connect to the source and the target
    pub async fn connect(config: Config) -> Result<Self> {
        let (source, target) = open_pair(
            &config,
            |url| async move { PgDatabase::connect(&url).await },
            |db: PgDatabase| async move { db.close().await },
        )
        .await?;
        info!(source = %source.label(), target = %target.label(), "Connected to source and target");

        Ok(Self {
            config,
            source: Arc::new(source),
            target: Some(Arc::new(target)),
        })
    }

    pub fn source(&self) -> Arc<PgDatabase> {
        Arc::clone(&self.source)
    }

    pub fn inspect_service(&self) -> InspectService {
        InspectService::new(self.source.clone())
    }

    /// Migration service writing to the target, or to memory when
    /// `dry_run` is set
    pub fn migration_service(&self, dry_run: bool) -> Result<MigrationService> {
        if dry_run {
            return Ok(MigrationService::dry_run(self.source.clone()));
        }
        let target = self
            .target
            .as_ref()
            .ok_or_else(|| Error::config(format!("{} is not set", config::TARGET_DB_URL)))?;
        Ok(MigrationService::new(self.source.clone(), target.clone()))
    }

    /// Close every connection
    pub async fn close(&self) {
        self.source.close().await;
        if let Some(target) = &self.target {
            target.close().await;
        }
    }
}

/// Check both connection strings, then dial the source and the target in
/// that order. The source is closed again when the target cannot be reached.
async fn open_pair<C, Dial, DialFut, Close, CloseFut>(
    config: &Config,
    dial: Dial,
    close: Close,
) -> Result<(C, C)>
where
    Dial: Fn(String) -> DialFut,
    DialFut: Future<Output = Result<C>>,
    Close: FnOnce(C) -> CloseFut,
    CloseFut: Future<Output = ()>,
{
    let source_url = config.require_source()?.to_string();
    let target_url = config.require_target()?.to_string();

    let source = dial(source_url).await?;
    match dial(target_url).await {
        Ok(target) => Ok((source, target)),
        Err(e) => {
            close(source).await;
            Err(e)
        }
    }
}
