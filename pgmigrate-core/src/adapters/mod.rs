//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - Postgres (sqlx) for both the source and the target of a run
//! - an in-memory database for dry runs and tests

pub mod memory;
pub mod postgres;
