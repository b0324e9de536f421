//! Table descriptors and DDL derivation
//!
//! DDL produced here is a structural approximation of a table: columns,
//! types, nullability, defaults and the primary key. Foreign keys, checks,
//! indexes and triggers are not captured.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::sql::{quote_ident, quote_ident_list};

/// Column used for conflict detection when a DDL declares no primary key
pub const DEFAULT_CONFLICT_COLUMN: &str = "id";

/// Column metadata as reported by `information_schema.columns`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub udt_name: String,
    pub is_nullable: bool,
    pub default: Option<String>,
    pub max_length: Option<i32>,
}

impl ColumnInfo {
    /// Convenience constructor for a nullable column without default
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        let data_type = data_type.into();
        Self {
            name: name.into(),
            udt_name: data_type.clone(),
            data_type,
            is_nullable: true,
            default: None,
            max_length: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.is_nullable = false;
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_max_length(mut self, len: i32) -> Self {
        self.max_length = Some(len);
        self
    }

    pub fn with_udt_name(mut self, udt_name: impl Into<String>) -> Self {
        self.udt_name = udt_name.into();
        self
    }

    /// SQL type as it should appear in a column definition
    pub fn sql_type(&self) -> String {
        match self.data_type.as_str() {
            "USER-DEFINED" => quote_ident(&self.udt_name),
            "ARRAY" => {
                let element = self.udt_name.strip_prefix('_').unwrap_or(&self.udt_name);
                format!("{}[]", element)
            }
            "character varying" | "character" => match self.max_length {
                Some(len) => format!("{}({})", self.data_type, len),
                None => self.data_type.clone(),
            },
            _ => self.data_type.clone(),
        }
    }

    /// Full column definition line (without trailing comma)
    pub fn definition(&self) -> String {
        let mut def = format!("{} {}", quote_ident(&self.name), self.sql_type());
        if !self.is_nullable {
            def.push_str(" NOT NULL");
        }
        if let Some(default) = &self.default {
            def.push_str(" DEFAULT ");
            def.push_str(default);
        }
        def
    }
}

/// Build a `CREATE TABLE IF NOT EXISTS` statement from column metadata
pub fn render_create_table(table: &str, columns: &[ColumnInfo], primary_key: &[String]) -> String {
    let mut lines: Vec<String> = columns.iter().map(|c| format!("  {}", c.definition())).collect();
    if !primary_key.is_empty() {
        lines.push(format!("  PRIMARY KEY ({})", quote_ident_list(primary_key)));
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n);",
        quote_ident(table),
        lines.join(",\n")
    )
}

/// One table of a migration manifest
///
/// Serialized as `{ "table": ..., "ddl": ..., "count": ... }`. The count is
/// the row count observed at inspection time and is never re-validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub table: String,
    pub ddl: String,
    pub count: i64,
}

/// A column whose default draws from a sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceBinding {
    pub column: String,
    pub sequence: String,
}

impl TableDescriptor {
    pub fn new(table: impl Into<String>, ddl: impl Into<String>, count: i64) -> Self {
        Self {
            table: table.into(),
            ddl: ddl.into(),
            count,
        }
    }

    /// Sequences referenced via `nextval('<seq>'::regclass)` defaults
    pub fn sequences(&self) -> Vec<SequenceBinding> {
        sequence_bindings(&self.ddl)
    }

    /// Primary key columns declared in the DDL
    pub fn primary_key(&self) -> Vec<String> {
        primary_key_columns(&self.ddl)
    }

    /// Columns for `ON CONFLICT (...)`; the primary key, or `id` when none
    pub fn conflict_columns(&self) -> Vec<String> {
        let pk = self.primary_key();
        if pk.is_empty() {
            vec![DEFAULT_CONFLICT_COLUMN.to_string()]
        } else {
            pk
        }
    }
}

fn nextval_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)nextval\(\s*'([^']+)'(?:::regclass)?\s*\)").expect("static regex")
    })
}

fn table_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)CREATE\s+TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?("(?:[^"]|"")+"|[^\s(]+)"#)
            .expect("static regex")
    })
}

/// Table name a `CREATE TABLE` statement creates, unquoted
pub fn parse_table_name(ddl: &str) -> Option<String> {
    table_name_re()
        .captures(ddl)
        .map(|caps| unquote_ident(&caps[1]))
}

/// Sequence/column pairs from `nextval(...)` column defaults
pub fn sequence_bindings(ddl: &str) -> Vec<SequenceBinding> {
    let mut bindings = Vec::new();
    for def in column_definitions(ddl) {
        if is_table_constraint(def) {
            continue;
        }
        if let Some(caps) = nextval_re().captures(def) {
            if let Some(column) = leading_ident(def) {
                bindings.push(SequenceBinding {
                    column,
                    sequence: caps[1].to_string(),
                });
            }
        }
    }
    bindings
}

/// Primary key columns from a table-level `PRIMARY KEY (...)` clause or a
/// column-level `PRIMARY KEY` marker
pub fn primary_key_columns(ddl: &str) -> Vec<String> {
    for def in column_definitions(ddl) {
        let upper = def.to_uppercase();
        if is_table_constraint(def) {
            if let Some(pos) = upper.find("PRIMARY KEY") {
                let rest = &def[pos + "PRIMARY KEY".len()..];
                if let (Some(open), Some(close)) = (rest.find('('), rest.rfind(')')) {
                    return split_top_level(&rest[open + 1..close])
                        .into_iter()
                        .map(|c| unquote_ident(c.trim()))
                        .filter(|c| !c.is_empty())
                        .collect();
                }
            }
        } else if upper.contains("PRIMARY KEY") {
            if let Some(column) = leading_ident(def) {
                return vec![column];
            }
        }
    }
    Vec::new()
}

fn is_table_constraint(def: &str) -> bool {
    let upper = def.trim_start().to_uppercase();
    upper.starts_with("PRIMARY KEY")
        || upper.starts_with("CONSTRAINT")
        || upper.starts_with("FOREIGN KEY")
        || upper.starts_with("UNIQUE")
        || upper.starts_with("CHECK")
}

/// Column and constraint definitions between the outer parentheses
fn column_definitions(ddl: &str) -> Vec<&str> {
    let Some(open) = body_start(ddl) else {
        return Vec::new();
    };

    let mut depth = 0usize;
    let mut in_single = false;
    let mut in_double = false;
    for (i, ch) in ddl[open..].char_indices() {
        match ch {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            '(' if !in_single && !in_double => depth += 1,
            ')' if !in_single && !in_double => {
                depth -= 1;
                if depth == 0 {
                    return split_top_level(&ddl[open + 1..open + i])
                        .into_iter()
                        .map(str::trim)
                        .filter(|d| !d.is_empty())
                        .collect();
                }
            }
            _ => {}
        }
    }
    Vec::new()
}

/// Byte offset of the `(` opening the column list
fn body_start(ddl: &str) -> Option<usize> {
    let caps = table_name_re().captures(ddl)?;
    let after_name = caps.get(0)?.end();
    ddl[after_name..].find('(').map(|p| after_name + p)
}

/// Split on commas that are not nested in parentheses or quotes
fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_single = false;
    let mut in_double = false;
    let mut start = 0;
    for (i, ch) in s.char_indices() {
        match ch {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            '(' if !in_single && !in_double => depth += 1,
            ')' if !in_single && !in_double => depth -= 1,
            ',' if depth == 0 && !in_single && !in_double => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

/// First identifier of a column definition, unquoted
fn leading_ident(def: &str) -> Option<String> {
    let def = def.trim_start();
    if let Some(rest) = def.strip_prefix('"') {
        let mut name = String::new();
        let mut chars = rest.chars().peekable();
        while let Some(ch) = chars.next() {
            if ch == '"' {
                if chars.peek() == Some(&'"') {
                    name.push('"');
                    chars.next();
                } else {
                    return Some(name);
                }
            } else {
                name.push(ch);
            }
        }
        None
    } else {
        def.split_whitespace().next().map(|s| s.to_string())
    }
}

fn unquote_ident(ident: &str) -> String {
    let ident = ident.trim();
    match ident.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        Some(inner) => inner.replace("\"\"", "\""),
        None => ident.to_string(),
    }
}
