//! Inspect service - read the source catalog into a manifest

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::domain::enum_type::group_labels;
use crate::domain::manifest::save_enum_map;
use crate::domain::result::Result;
use crate::domain::table::render_create_table;
use crate::domain::{EnumMap, Manifest, TableDescriptor};
use crate::ports::SourceCatalog;

/// Summary of an inspection written to disk
#[derive(Debug, Clone, Serialize)]
pub struct InspectResult {
    pub manifest_path: String,
    pub enums_path: String,
    pub tables: Vec<TableDescriptor>,
    pub enums: EnumMap,
}

/// Reads enum types and table definitions from a source database
pub struct InspectService {
    source: Arc<dyn SourceCatalog>,
}

impl InspectService {
    pub fn new(source: Arc<dyn SourceCatalog>) -> Self {
        Self { source }
    }

    /// Every enum type in `public` with labels in declared order
    pub async fn enumerate_enum_types(&self) -> Result<EnumMap> {
        let enums = self.source.enum_types().await?;
        Ok(group_labels(enums.into_iter().flat_map(|e| {
            let name = e.name;
            e.values.into_iter().map(move |v| (name.clone(), v))
        })))
    }

    /// `CREATE TABLE IF NOT EXISTS` statement for one table
    pub async fn describe_table(&self, table: &str) -> Result<String> {
        let columns = self.source.columns(table).await?;
        let primary_key = self.source.primary_key(table).await?;
        Ok(render_create_table(table, &columns, &primary_key))
    }

    /// Describe every base table and count its rows. Tables named in
    /// `priority` come first, in that order.
    pub async fn inspect(&self, priority: &[String]) -> Result<Manifest> {
        let tables = self.source.base_tables().await?;
        info!(tables = tables.len(), "Inspecting source tables");

        let mut descriptors = Vec::with_capacity(tables.len());
        for table in tables {
            let ddl = self.describe_table(&table).await?;
            let count = self.source.row_count(&table).await?;
            debug!(table = %table, rows = count, "Described table");
            descriptors.push(TableDescriptor::new(table, ddl, count));
        }

        let mut manifest = Manifest::new(descriptors);
        manifest.order_by_priority(priority);
        Ok(manifest)
    }

    /// Inspect the source and write the manifest and enum file
    pub async fn inspect_to_files(
        &self,
        priority: &[String],
        manifest_path: &Path,
        enums_path: &Path,
    ) -> Result<InspectResult> {
        let enums = self.enumerate_enum_types().await?;
        let manifest = self.inspect(priority).await?;

        for path in [manifest_path, enums_path] {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
        }
        manifest.save(manifest_path)?;
        save_enum_map(&enums, enums_path)?;
        info!(
            path = %manifest_path.display(),
            tables = manifest.len(),
            enums = enums.len(),
            "Wrote manifest"
        );

        Ok(InspectResult {
            manifest_path: manifest_path.display().to_string(),
            enums_path: enums_path.display().to_string(),
            tables: manifest.tables,
            enums,
        })
    }
}
