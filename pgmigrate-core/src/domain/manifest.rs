//! Migration manifest - the `ddl.json` inspection artifact
//!
//! A manifest is an ordered list of table descriptors. `inspect` writes it,
//! `migrate` reads it back as the single description of what to copy.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

use super::enum_type::EnumMap;
use super::result::{Error, Result};
use super::table::{parse_table_name, TableDescriptor};

/// Default file name for the table manifest
pub const MANIFEST_FILE: &str = "ddl.json";

/// Default file name for the enum definitions written next to the manifest
pub const ENUMS_FILE: &str = "enums.json";

/// Ordered set of tables to migrate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    pub tables: Vec<TableDescriptor>,
}

/// A problem found while validating a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestIssue {
    pub table: String,
    pub message: String,
}

impl Manifest {
    pub fn new(tables: Vec<TableDescriptor>) -> Self {
        Self { tables }
    }

    /// Load a manifest from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::not_found(format!(
                "manifest file {} (run `pgmigrate inspect` first)",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        let manifest: Manifest = serde_json::from_str(&content)?;
        manifest.check_unique()?;
        Ok(manifest)
    }

    /// Write the manifest as a pretty-printed JSON array
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.table.clone()).collect()
    }

    pub fn get(&self, table: &str) -> Option<&TableDescriptor> {
        self.tables.iter().find(|t| t.table == table)
    }

    /// Reorder tables: names listed in `priority` first, in that order,
    /// then the rest alphabetically
    pub fn order_by_priority(&mut self, priority: &[String]) {
        self.tables.sort_by(|a, b| {
            let pa = priority.iter().position(|p| *p == a.table);
            let pb = priority.iter().position(|p| *p == b.table);
            match (pa, pb) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => a.table.cmp(&b.table),
            }
        });
    }

    /// Check every DDL parses as Postgres and creates the table it is
    /// listed under. Issues are advisory; execution errors are still
    /// handled per table during a migration.
    pub fn validate(&self) -> Vec<ManifestIssue> {
        let dialect = PostgreSqlDialect {};
        let mut issues = Vec::new();

        for entry in &self.tables {
            if let Err(e) = Parser::parse_sql(&dialect, &entry.ddl) {
                let msg = e.to_string();
                issues.push(ManifestIssue {
                    table: entry.table.clone(),
                    message: msg.trim_start_matches("sql parser error: ").to_string(),
                });
                continue;
            }

            match parse_table_name(&entry.ddl) {
                Some(name) if name == entry.table => {}
                Some(name) => issues.push(ManifestIssue {
                    table: entry.table.clone(),
                    message: format!("DDL creates table '{}'", name),
                }),
                None => issues.push(ManifestIssue {
                    table: entry.table.clone(),
                    message: "DDL is not a CREATE TABLE statement".to_string(),
                }),
            }
        }

        issues
    }

    fn check_unique(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for entry in &self.tables {
            if !seen.insert(entry.table.as_str()) {
                return Err(Error::validation(format!(
                    "table '{}' is listed more than once in the manifest",
                    entry.table
                )));
            }
        }
        Ok(())
    }
}

/// Load enum definitions (`{ "name": ["A", "B"] }`) from a JSON file
pub fn load_enum_map(path: &Path) -> Result<EnumMap> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Write enum definitions as pretty-printed JSON
pub fn save_enum_map(map: &EnumMap, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(map)?;
    std::fs::write(path, content)?;
    Ok(())
}
