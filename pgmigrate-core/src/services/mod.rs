//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. Each service
//! focuses on one command: inspecting a source, migrating into a target,
//! or journaling what happened.

mod inspect;
pub mod logging;
pub mod migration;

pub use inspect::{InspectResult, InspectService};
pub use logging::{LogEntry, LogEvent, LoggingService};
pub use migration::{MigrationObserver, MigrationPlan, MigrationService, NoopObserver};
