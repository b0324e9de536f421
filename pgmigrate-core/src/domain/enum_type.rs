//! Postgres ENUM type descriptors

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use super::result::{Error, Result};
use super::sql::{quote_ident, quote_literal};

/// Enum name -> ordered labels, as read from `pg_enum`
pub type EnumMap = BTreeMap<String, Vec<String>>;

/// A Postgres ENUM type
///
/// Label order is significant: Postgres compares enum values by their
/// declared position, so re-creating a type must keep the exact order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumDescriptor {
    pub name: String,
    pub values: Vec<String>,
}

impl EnumDescriptor {
    /// Create a descriptor, rejecting empty names and duplicate labels
    pub fn new(name: impl Into<String>, values: Vec<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::validation("enum type name cannot be empty"));
        }

        let mut seen = HashSet::new();
        for value in &values {
            if !seen.insert(value.as_str()) {
                return Err(Error::validation(format!(
                    "enum type '{}' has duplicate label '{}'",
                    name, value
                )));
            }
        }

        Ok(Self { name, values })
    }

    /// `CREATE TYPE "name" AS ENUM ('a', 'b', ...)`
    pub fn create_sql(&self) -> String {
        let labels: Vec<String> = self.values.iter().map(|v| quote_literal(v)).collect();
        format!(
            "CREATE TYPE {} AS ENUM ({})",
            quote_ident(&self.name),
            labels.join(", ")
        )
    }

    /// Compare against the labels an existing type carries in the target
    pub fn reconcile(&self, existing: &[String]) -> EnumReconciliation {
        if existing == self.values.as_slice() {
            EnumReconciliation::Identical
        } else {
            EnumReconciliation::Mismatch {
                missing: self
                    .values
                    .iter()
                    .filter(|v| !existing.contains(v))
                    .cloned()
                    .collect(),
                unexpected: existing
                    .iter()
                    .filter(|v| !self.values.contains(v))
                    .cloned()
                    .collect(),
            }
        }
    }
}

/// Outcome of comparing two ordered label sets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnumReconciliation {
    Identical,
    /// Labels differ in content or order. Both lists empty means same
    /// labels in a different order.
    Mismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },
}

/// Convert a name -> labels map into validated descriptors (sorted by name)
pub fn descriptors_from_map(map: &EnumMap) -> Result<Vec<EnumDescriptor>> {
    map.iter()
        .map(|(name, values)| EnumDescriptor::new(name.clone(), values.clone()))
        .collect()
}

/// Group `(type name, label)` catalog rows into a map, keeping label order
pub fn group_labels<I>(rows: I) -> EnumMap
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut map = EnumMap::new();
    for (name, label) in rows {
        map.entry(name).or_default().push(label);
    }
    map
}
