//! Table access-control specs.
//!
//! One YAML document per table, stored under `<control_root>/<service>/`.
//! A spec names the table and lists one [`Template`] per policy strategy
//! applied to it.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::condition::Condition;
use crate::error::SpecError;

/// Column used for location scoping when a template does not override it.
pub const DEFAULT_LOCATION_COLUMN: &str = "location_id";

/// Policy strategy applied by a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum TemplateVersion {
    /// Single ALL policy scoped through the location/access path.
    #[default]
    #[serde(rename = "1")]
    Location,
    /// One policy per command; inserts are unconditionally allowed.
    #[serde(rename = "1.1")]
    LocationPerCommand,
    /// Existence of the permission, without per-row scoping.
    #[serde(rename = "3")]
    Permission,
    /// Direct ownership through an owner column.
    #[serde(rename = "4")]
    Owner,
}

impl TemplateVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateVersion::Location => "1",
            TemplateVersion::LocationPerCommand => "1.1",
            TemplateVersion::Permission => "3",
            TemplateVersion::Owner => "4",
        }
    }

    /// Whether checks are scoped through location relationships.
    pub fn is_location_scoped(&self) -> bool {
        matches!(
            self,
            TemplateVersion::Location | TemplateVersion::LocationPerCommand
        )
    }
}

impl fmt::Display for TemplateVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A data operation a permission can be granted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Select,
    Insert,
    Update,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::Select,
        Operation::Insert,
        Operation::Update,
        Operation::Delete,
    ];

    /// Whether the operation reads rows rather than writing them.
    pub fn is_read(&self) -> bool {
        matches!(self, Operation::Select)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Select => "SELECT",
            Operation::Insert => "INSERT",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `FOR` clause of a Postgres policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PolicyCommand {
    #[default]
    All,
    Select,
    Insert,
    Update,
    Delete,
}

impl PolicyCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyCommand::All => "ALL",
            PolicyCommand::Select => "SELECT",
            PolicyCommand::Insert => "INSERT",
            PolicyCommand::Update => "UPDATE",
            PolicyCommand::Delete => "DELETE",
        }
    }
}

impl From<Operation> for PolicyCommand {
    fn from(op: Operation) -> Self {
        match op {
            Operation::Select => PolicyCommand::Select,
            Operation::Insert => PolicyCommand::Insert,
            Operation::Update => PolicyCommand::Update,
            Operation::Delete => PolicyCommand::Delete,
        }
    }
}

impl fmt::Display for PolicyCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Join table linking rows to the location they are scoped by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPathTable {
    pub name: String,
    /// Local column -> access-path column.
    #[serde(rename = "columnMapping", default)]
    pub column_mapping: BTreeMap<String, String>,
}

/// Which operations each target gets generated for.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TargetPermissions {
    #[serde(default)]
    pub postgres: Vec<Operation>,
    #[serde(default)]
    pub hasura: Vec<Operation>,
}

/// A hand-written Postgres policy used instead of the template SQL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomPostgresPolicy {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub using: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with_check: Option<String>,
    #[serde(rename = "for", default)]
    pub command: PolicyCommand,
}

/// Extra conditions for one role, merged into the generated permission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomRoleCondition {
    /// Role name.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<Condition>,
}

/// A relationship added to the metadata verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomRelationship {
    pub table_name: String,
    pub name: String,
    pub remote_table: String,
    #[serde(default)]
    pub column_mapping: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CustomHasuraPolicies {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub select_permission: Vec<CustomRoleCondition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub insert_permission: Vec<CustomRoleCondition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub update_permission: Vec<CustomRoleCondition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub delete_permission: Vec<CustomRoleCondition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub object_relationships: Vec<CustomRelationship>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub array_relationships: Vec<CustomRelationship>,
}

impl CustomHasuraPolicies {
    pub fn for_operation(&self, op: Operation) -> &[CustomRoleCondition] {
        match op {
            Operation::Select => &self.select_permission,
            Operation::Insert => &self.insert_permission,
            Operation::Update => &self.update_permission,
            Operation::Delete => &self.delete_permission,
        }
    }
}

/// One policy strategy applied to a table.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Template {
    #[serde(default)]
    pub template: TemplateVersion,

    #[serde(rename = "accessPathTable", default, skip_serializing_if = "Option::is_none")]
    pub access_path_table: Option<AccessPathTable>,

    #[serde(rename = "locationCol", default, skip_serializing_if = "Option::is_none")]
    pub location_col: Option<String>,

    #[serde(rename = "permissionPrefix", default, skip_serializing_if = "Option::is_none")]
    pub permission_prefix: Option<String>,

    #[serde(rename = "ownerCol", default, skip_serializing_if = "Option::is_none")]
    pub owner_col: Option<String>,

    #[serde(default)]
    pub permissions: TargetPermissions,

    /// Bumped by hand to force SQL regeneration.
    #[serde(default)]
    pub postgres_policy_version: u32,

    #[serde(default)]
    pub use_custom_policy: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub postgres_policies: Vec<CustomPostgresPolicy>,

    #[serde(default)]
    pub use_custom_hasura_policy: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hasura_policies: Option<CustomHasuraPolicies>,

    /// Apply the generated check to every role present on the table.
    #[serde(default)]
    pub all_roles: bool,

    /// Link the table to its access path with manual relationships instead of a graph search.
    #[serde(default)]
    pub map_directly: bool,
}

impl Template {
    /// Whether anything is generated for Postgres.
    pub fn postgres_enabled(&self) -> bool {
        !self.permissions.postgres.is_empty()
            || (self.use_custom_policy && !self.postgres_policies.is_empty())
    }

    /// Whether anything is generated for Hasura.
    pub fn hasura_enabled(&self) -> bool {
        !self.permissions.hasura.is_empty() || self.use_custom_hasura_policy
    }

    pub fn location_col(&self) -> &str {
        self.location_col
            .as_deref()
            .unwrap_or(DEFAULT_LOCATION_COLUMN)
    }

    pub fn access_path_name(&self) -> Option<&str> {
        self.access_path_table.as_ref().map(|ap| ap.name.as_str())
    }

    /// Custom Hasura overrides, when enabled.
    pub fn custom_hasura(&self) -> Option<&CustomHasuraPolicies> {
        if self.use_custom_hasura_policy {
            self.hasura_policies.as_ref()
        } else {
            None
        }
    }
}

/// Access-control spec of one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSpec {
    pub table_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pkey: Option<String>,

    #[serde(default)]
    pub templates: Vec<Template>,

    /// Owning service; taken from the directory the spec was read from.
    #[serde(skip)]
    pub service: String,

    /// File name the spec was read from.
    #[serde(skip)]
    pub filename: String,
}

impl TableSpec {
    /// Parse a spec document belonging to `service`.
    pub fn from_yaml(
        service: impl Into<String>,
        filename: impl Into<String>,
        content: &str,
    ) -> Result<Self, SpecError> {
        let filename = filename.into();
        let mut spec: TableSpec =
            serde_yaml::from_str(content).map_err(|e| SpecError::Parse {
                file: filename.clone(),
                message: e.to_string(),
            })?;
        spec.service = service.into();
        spec.filename = filename;
        Ok(spec)
    }

    /// Stage key of this table.
    pub fn key(&self) -> String {
        stage_key(&self.service, &self.table_name)
    }

    pub fn template(&self, version: TemplateVersion) -> Option<&Template> {
        self.templates.iter().find(|t| t.template == version)
    }

    /// Primary key for `template`; owner-scoped templates fall back to the owner column.
    pub fn pkey_for<'a>(&'a self, template: &'a Template) -> Option<&'a str> {
        match (self.pkey.as_deref(), template.template) {
            (Some(pkey), _) if !pkey.is_empty() => Some(pkey),
            (_, TemplateVersion::Owner) => template.owner_col.as_deref(),
            _ => None,
        }
    }

    /// Check every template for the inputs its strategy requires.
    pub fn validate(&self) -> Result<(), SpecError> {
        let mut seen = Vec::new();
        for template in &self.templates {
            if seen.contains(&template.template) {
                return Err(SpecError::DuplicateTemplate {
                    table: self.table_name.clone(),
                    version: template.template,
                });
            }
            seen.push(template.template);
            self.validate_template(template)?;
        }
        Ok(())
    }

    pub fn validate_template(&self, template: &Template) -> Result<(), SpecError> {
        let mut missing = Vec::new();
        if self.table_name.trim().is_empty() {
            missing.push("table");
        }
        if self.service.trim().is_empty() {
            missing.push("databaseName");
        }
        if template.template != TemplateVersion::Permission
            && self.pkey_for(template).is_none_or(str::is_empty)
        {
            missing.push("pkey");
        }
        if template.template != TemplateVersion::Owner
            && template.permission_prefix.as_deref().is_none_or(str::is_empty)
        {
            missing.push("permissionPrefix");
        }
        if template.template == TemplateVersion::Owner
            && template.owner_col.as_deref().is_none_or(str::is_empty)
        {
            missing.push("ownerCol");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(SpecError::MissingFields {
                table: self.table_name.clone(),
                version: template.template,
                fields: missing,
            })
        }
    }
}

/// Key of a (service, table) pair in the stage store.
pub fn stage_key(service: &str, table: &str) -> String {
    format!("{service}:{table}")
}
