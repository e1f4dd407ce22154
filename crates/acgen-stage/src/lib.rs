//! # acgen-stage
//!
//! Incremental compilation for acgen.
//!
//! This crate provides functionality to:
//! - Persist what was generated per table in `stage.json`
//! - Classify template changes as metadata-only (1), SQL-only (4) or both (5)
//! - Run a batch over every service and write migrations, metadata and stage
//! - Roll generated artifacts back using the stage history alone
//!
//! Compiling two batches against the same control root at the same time is
//! not supported: the stage file and the metadata are read once and written
//! back whole, and migration numbers come from scanning existing files.

pub mod classify;
pub mod compiler;
pub mod error;
pub mod migration;
pub mod rollback;
pub mod store;

pub use classify::{ChangeCode, classify};
pub use compiler::{
    CompileOptions, CompileReport, Compiler, EntryChange, SkippedUnit, UnitReport,
};
pub use error::{ErrorCategory, StageError};
pub use migration::{next_migration_number, write_migration};
pub use rollback::{RollbackPlan, RollbackReport, ServiceRollback, plan_rollback};
pub use store::StageStore;
