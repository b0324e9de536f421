//! Port definitions (hexagonal architecture)
//!
//! Services depend only on these traits. The Postgres adapter implements
//! both sides for real runs; the in-memory adapter backs tests and dry runs.

mod database;

pub use database::{row_key, InsertOutcome, Row, SourceCatalog, TargetDatabase};
