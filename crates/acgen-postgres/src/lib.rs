//! # acgen-postgres
//!
//! Postgres Row-Level Security policy synthesis for acgen.
//!
//! Turns one template of a table spec into permissive RLS policies checked
//! against the `granted_permissions` view, and renders the migration SQL
//! that (re)creates them. Hand-written policy clauses are parsed with
//! `sqlparser` before they are accepted.
//!
//! ## Example
//!
//! ```ignore
//! use acgen_postgres::PolicySynthesizer;
//!
//! let synthesizer = PolicySynthesizer::new(&config.postgres);
//! let synthesis = synthesizer.synthesize(&ctx)?;
//! println!("{}", synthesis.sql());
//! ```

pub mod error;
pub mod policy;
pub mod synthesizer;
pub mod validate;

pub use error::PolicyError;
pub use policy::{PolicyStatement, drop_policy_sql, legacy_policy_name};
pub use synthesizer::{PolicySynthesis, PolicySynthesizer, baseline_policy, drop_policies_sql};
pub use validate::SqlValidator;
