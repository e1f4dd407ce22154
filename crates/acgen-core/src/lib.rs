//! Shared model for the acgen access-control compiler.
//!
//! - [`template`]: per-table access-control specs
//! - [`metadata`]: the Hasura metadata graph
//! - [`condition`]: Hasura boolean expressions
//! - [`stage`]: persisted records of what was generated
//! - [`files`]: the file-access capability every component writes through

pub mod condition;
pub mod config;
pub mod context;
pub mod error;
pub mod files;
pub mod metadata;
pub mod stage;
pub mod template;

pub use condition::Condition;
pub use config::{AcgenConfig, ConfigError, HasuraConfig, MetadataVersion, PostgresConfig};
pub use context::{GRANTED_TABLE, TemplateContext};
pub use error::{FileAccessError, SpecError};
pub use files::{FileAccess, LocalFiles, MemoryFiles};
pub use metadata::{
    DeletePermission, HasuraTable, InsertPermission, MetadataGraph, Relationship,
    RelationshipKind, RolePermission, SelectPermission, TableName, UpdatePermission,
};
pub use stage::{FileStage, HasuraStage, PolicyStage, PostgresStage, TemplateStage};
pub use template::{
    AccessPathTable, CustomHasuraPolicies, CustomPostgresPolicy, CustomRelationship,
    CustomRoleCondition, Operation, PolicyCommand, TableSpec, TargetPermissions, Template,
    TemplateVersion,
};
