//! Core domain entities
//!
//! Descriptors for enum types and tables, the manifest that lists them, the
//! dependency graph that orders them, and the report a run produces. Pure
//! data and parsing - no I/O beyond reading and writing manifest files.

pub mod dependency;
pub mod enum_type;
pub mod manifest;
pub mod report;
pub mod result;
pub mod sql;
pub mod table;

pub use dependency::{ForeignKey, TableDag};
pub use enum_type::{EnumDescriptor, EnumMap, EnumReconciliation};
pub use manifest::{Manifest, ManifestIssue};
pub use report::{EnumOutcome, EnumReport, MigrationReport, RowError, TableReport};
pub use table::{ColumnInfo, SequenceBinding, TableDescriptor};
