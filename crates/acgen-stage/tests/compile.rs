//! Batch compilation tests against an in-memory file tree.
//!
//! Test modules are organized by behaviour:
//! - `scenarios` - template switches and one-sided changes
//! - `idempotence` - unchanged specs leave every artifact alone
//! - `round_trip` - rollback followed by a fresh run reproduces the first run
//! - `batch` - skipped tables, aborted batches, dry runs, removed specs
//!
//! Run with:
//!   cargo test -p acgen-stage --test compile

#[path = "compile/common/mod.rs"]
mod common;

#[path = "compile/batch.rs"]
mod batch;

#[path = "compile/idempotence.rs"]
mod idempotence;

#[path = "compile/round_trip.rs"]
mod round_trip;

#[path = "compile/scenarios.rs"]
mod scenarios;
