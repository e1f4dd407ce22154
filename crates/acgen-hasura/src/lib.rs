//! # acgen-hasura
//!
//! Hasura metadata synthesis for acgen.
//!
//! This crate provides functionality to:
//! - Find the relationship path from a table to its access-path table
//! - Build and merge permission filters
//! - Rewrite a table's permissions and relationships for a template
//! - Load and save metadata in the single-file and per-table layouts
//!
//! ## Generated filters
//!
//! | Template | Filter |
//! |----------|--------|
//! | `1`, `1.1` | relationship path down to `<table>_location_permission` on `granted_permissions` |
//! | `3` | `_exists` on `granted_permissions` |
//! | `4` | `{owner: {_eq: X-Hasura-User-Id}}` |

pub mod error;
pub mod filter;
pub mod prune;
pub mod resolver;
pub mod store;
pub mod synthesizer;

pub use error::HasuraError;
pub use filter::{CheckBuilder, dedupe, merge};
pub use prune::MetadataDrop;
pub use resolver::{MAX_DEPTH, RelationshipPath, RelationshipResolver, shortest};
pub use store::MetadataStore;
pub use synthesizer::{HasuraOutcome, HasuraSynthesizer};
