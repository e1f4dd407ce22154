//! Hasura table metadata.
//!
//! These types mirror the `tables.yaml` layout used by both metadata
//! versions. Fields the compiler does not manage are carried through
//! untouched in [`HasuraTable::extra`].

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::condition::Condition;

pub const PUBLIC_SCHEMA: &str = "public";

/// A schema-qualified table reference.
///
/// Accepts both the bare `students` form and the `{schema, name}` form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "TableNameRepr")]
pub struct TableName {
    pub schema: String,
    pub name: String,
}

impl TableName {
    pub fn public(name: impl Into<String>) -> Self {
        Self {
            schema: PUBLIC_SCHEMA.to_string(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for TableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TableNameRepr {
    Bare(String),
    Qualified {
        #[serde(default = "default_schema")]
        schema: String,
        name: String,
    },
}

impl From<TableNameRepr> for TableName {
    fn from(repr: TableNameRepr) -> Self {
        match repr {
            TableNameRepr::Bare(name) => TableName::public(name),
            TableNameRepr::Qualified { schema, name } => TableName { schema, name },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationshipKind {
    Object,
    Array,
}

impl RelationshipKind {
    /// Short tag used when printing relationship paths.
    pub fn tag(&self) -> &'static str {
        match self {
            RelationshipKind::Object => "o",
            RelationshipKind::Array => "a",
        }
    }
}

/// `foreign_key_constraint_on` accepts a column, a column list, or a remote reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ForeignKeyConstraint {
    Column(String),
    Columns(Vec<String>),
    Remote {
        table: TableName,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        column: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        columns: Option<Vec<String>>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualConfiguration {
    pub remote_table: TableName,
    #[serde(default)]
    pub column_mapping: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RelationshipUsing {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key_constraint_on: Option<ForeignKeyConstraint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_configuration: Option<ManualConfiguration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub name: String,
    pub using: RelationshipUsing,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Relationship {
    /// A manually configured relationship to `remote_table`.
    pub fn manual(
        name: impl Into<String>,
        remote_table: &str,
        column_mapping: BTreeMap<String, String>,
    ) -> Self {
        Self {
            name: name.into(),
            using: RelationshipUsing {
                foreign_key_constraint_on: None,
                manual_configuration: Some(ManualConfiguration {
                    remote_table: TableName::public(remote_table),
                    column_mapping,
                }),
            },
            comment: None,
        }
    }

    /// Name of the table on the far side of this relationship.
    ///
    /// An object relationship declared only by a local foreign-key column
    /// carries no table name; the remote table is then taken to be the
    /// plural of the relationship name.
    pub fn remote_table(&self, kind: RelationshipKind) -> Option<String> {
        if let Some(manual) = &self.using.manual_configuration {
            return Some(manual.remote_table.name.clone());
        }
        match &self.using.foreign_key_constraint_on {
            Some(ForeignKeyConstraint::Remote { table, .. }) => Some(table.name.clone()),
            Some(ForeignKeyConstraint::Column(_) | ForeignKeyConstraint::Columns(_))
                if kind == RelationshipKind::Object =>
            {
                Some(format!("{}s", self.name))
            }
            _ => None,
        }
    }
}

/// A role-scoped permission entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolePermission<P> {
    pub role: String,
    pub permission: P,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl<P> RolePermission<P> {
    pub fn new(role: impl Into<String>, permission: P) -> Self {
        Self {
            role: role.into(),
            permission,
            comment: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SelectPermission {
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub filter: Condition,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub allow_aggregations: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InsertPermission {
    #[serde(default)]
    pub check: Condition,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub set: BTreeMap<String, Value>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_only: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UpdatePermission {
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub filter: Condition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<Condition>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub set: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeletePermission {
    #[serde(default)]
    pub filter: Condition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_only: Option<bool>,
}

/// One entry of `tables.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HasuraTable {
    pub table: TableName,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub object_relationships: Vec<Relationship>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub array_relationships: Vec<Relationship>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub insert_permissions: Vec<RolePermission<InsertPermission>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub select_permissions: Vec<RolePermission<SelectPermission>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub update_permissions: Vec<RolePermission<UpdatePermission>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub delete_permissions: Vec<RolePermission<DeletePermission>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl HasuraTable {
    pub fn new(table: TableName) -> Self {
        Self {
            table,
            object_relationships: Vec::new(),
            array_relationships: Vec::new(),
            insert_permissions: Vec::new(),
            select_permissions: Vec::new(),
            update_permissions: Vec::new(),
            delete_permissions: Vec::new(),
            extra: BTreeMap::new(),
        }
    }

    pub fn relationships(&self, kind: RelationshipKind) -> &[Relationship] {
        match kind {
            RelationshipKind::Object => &self.object_relationships,
            RelationshipKind::Array => &self.array_relationships,
        }
    }

    /// Insert `relationship`, replacing any relationship of the same kind and name.
    pub fn upsert_relationship(&mut self, kind: RelationshipKind, relationship: Relationship) {
        let list = match kind {
            RelationshipKind::Object => &mut self.object_relationships,
            RelationshipKind::Array => &mut self.array_relationships,
        };
        match list.iter_mut().find(|r| r.name == relationship.name) {
            Some(existing) => *existing = relationship,
            None => list.push(relationship),
        }
    }

    /// Remove object and array relationships called `name`.
    pub fn remove_relationship(&mut self, name: &str) -> bool {
        let before = self.object_relationships.len() + self.array_relationships.len();
        self.object_relationships.retain(|r| r.name != name);
        self.array_relationships.retain(|r| r.name != name);
        before != self.object_relationships.len() + self.array_relationships.len()
    }

    /// Every role that has a permission of any kind on this table, sorted.
    pub fn roles(&self) -> BTreeSet<String> {
        self.insert_permissions
            .iter()
            .map(|p| p.role.clone())
            .chain(self.select_permissions.iter().map(|p| p.role.clone()))
            .chain(self.update_permissions.iter().map(|p| p.role.clone()))
            .chain(self.delete_permissions.iter().map(|p| p.role.clone()))
            .collect()
    }
}

/// All tables of one service's metadata, in file order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataGraph {
    pub tables: Vec<HasuraTable>,
}

impl MetadataGraph {
    pub fn new(tables: Vec<HasuraTable>) -> Self {
        Self { tables }
    }

    pub fn table(&self, name: &str) -> Option<&HasuraTable> {
        self.tables.iter().find(|t| t.table.name == name)
    }

    pub fn table_mut(&mut self, name: &str) -> Option<&mut HasuraTable> {
        self.tables.iter_mut().find(|t| t.table.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table(name).is_some()
    }

    pub fn push(&mut self, table: HasuraTable) {
        self.tables.push(table);
    }
}

fn default_schema() -> String {
    PUBLIC_SCHEMA.to_string()
}
