//! Persisted stage records.
//!
//! A stage captures what was generated for one (service, table) so the
//! next run can tell what changed and a rollback can tear it down again
//! without the current spec.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::template::{
    AccessPathTable, CustomHasuraPolicies, CustomPostgresPolicy, CustomRelationship, Operation,
    TableSpec, TargetPermissions, Template, TemplateVersion, stage_key,
};

/// Stage of one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileStage {
    pub filename: String,
    pub service: String,
    pub revision: u64,
    pub table_name: String,
    pub created_at: DateTime<FixedOffset>,
    pub updated_at: DateTime<FixedOffset>,
    #[serde(default)]
    pub stages: Vec<TemplateStage>,
}

impl FileStage {
    pub fn new(spec: &TableSpec, now: DateTime<FixedOffset>) -> Self {
        Self {
            filename: spec.filename.clone(),
            service: spec.service.clone(),
            revision: 0,
            table_name: spec.table_name.clone(),
            created_at: now,
            updated_at: now,
            stages: Vec::new(),
        }
    }

    pub fn key(&self) -> String {
        stage_key(&self.service, &self.table_name)
    }

    pub fn entry(&self, version: TemplateVersion) -> Option<&TemplateStage> {
        self.stages.iter().find(|s| s.template == version)
    }

    /// Entries that generated Hasura metadata.
    pub fn hasura_entries(&self) -> impl Iterator<Item = &TemplateStage> {
        self.stages.iter().filter(|s| s.hasura.is_some())
    }
}

/// Hasura side of a stage entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HasuraStage {
    /// Where the metadata for this entry was written.
    pub stage_dir: String,
    pub permissions: Vec<Operation>,
    /// Location relationship added for this entry, empty if none.
    #[serde(default)]
    pub relationship: String,
    /// Top-level key of the generated filter.
    pub first_level_query: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_relationships: Vec<CustomRelationship>,
}

/// One emitted Postgres policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyStage {
    pub name: String,
    pub content: String,
}

/// Postgres side of a stage entry.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PostgresStage {
    pub policies: Vec<PolicyStage>,
}

impl PostgresStage {
    pub fn policy_names(&self) -> impl Iterator<Item = &str> {
        self.policies.iter().map(|p| p.name.as_str())
    }
}

/// What was generated for one template version, plus the inputs that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateStage {
    pub template: TemplateVersion,

    #[serde(default)]
    pub hasura: Option<HasuraStage>,

    #[serde(default)]
    pub postgres: Option<PostgresStage>,

    #[serde(rename = "accessPathTable", default)]
    pub access_path_table: Option<AccessPathTable>,

    #[serde(rename = "locationCol", default)]
    pub location_col: Option<String>,

    #[serde(rename = "permissionPrefix", default)]
    pub permission_prefix: Option<String>,

    #[serde(default)]
    pub permissions: Option<TargetPermissions>,

    #[serde(rename = "ownerCol", default)]
    pub owner_col: Option<String>,

    #[serde(default)]
    pub use_custom_policy: bool,

    #[serde(default)]
    pub use_custom_hasura_policy: bool,

    #[serde(default)]
    pub hasura_policies: Option<CustomHasuraPolicies>,

    #[serde(default)]
    pub postgres_policies: Option<Vec<CustomPostgresPolicy>>,

    #[serde(default)]
    pub postgres_policy_version: u32,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub all_roles: bool,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub map_directly: bool,
}

impl TemplateStage {
    /// Record the inputs of `template` together with what was generated for it.
    pub fn record(
        template: &Template,
        hasura: Option<HasuraStage>,
        postgres: Option<PostgresStage>,
    ) -> Self {
        Self {
            template: template.template,
            hasura,
            postgres,
            access_path_table: template.access_path_table.clone(),
            location_col: template.location_col.clone(),
            permission_prefix: template.permission_prefix.clone(),
            permissions: Some(template.permissions.clone()),
            owner_col: template.owner_col.clone(),
            use_custom_policy: template.use_custom_policy,
            use_custom_hasura_policy: template.use_custom_hasura_policy,
            hasura_policies: template.hasura_policies.clone(),
            postgres_policies: if template.postgres_policies.is_empty() {
                None
            } else {
                Some(template.postgres_policies.clone())
            },
            postgres_policy_version: template.postgres_policy_version,
            all_roles: template.all_roles,
            map_directly: template.map_directly,
        }
    }

    pub fn policy_names(&self) -> Vec<String> {
        self.postgres
            .as_ref()
            .map(|p| p.policy_names().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn hasura_permissions(&self) -> &[Operation] {
        self.permissions
            .as_ref()
            .map(|p| p.hasura.as_slice())
            .unwrap_or_default()
    }

    pub fn postgres_permissions(&self) -> &[Operation] {
        self.permissions
            .as_ref()
            .map(|p| p.postgres.as_slice())
            .unwrap_or_default()
    }

    pub fn custom_postgres_policies(&self) -> &[CustomPostgresPolicy] {
        self.postgres_policies.as_deref().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAGE: &str = r#"{
  "filename": "students.yaml",
  "service": "bob",
  "revision": 3,
  "table_name": "students",
  "created_at": "2023-05-04T10:00:00+07:00",
  "updated_at": "2023-06-01T08:30:00+07:00",
  "stages": [
    {
      "template": "1",
      "hasura": {
        "stage_dir": "deployments/bob/tables.yaml",
        "permissions": ["SELECT", "UPDATE"],
        "relationship": "students_location_permission",
        "first_level_query": "students_location_permission"
      },
      "postgres": {
        "policies": [{"name": "rls_students_location", "content": "CREATE POLICY ..."}]
      },
      "accessPathTable": null,
      "locationCol": null,
      "permissionPrefix": "user.student",
      "permissions": {"postgres": ["SELECT"], "hasura": ["SELECT", "UPDATE"]},
      "ownerCol": null,
      "use_custom_policy": false,
      "hasura_policies": null,
      "postgres_policies": null
    }
  ]
}"#;

    #[test]
    fn test_parse_stage_record() {
        let stage: FileStage = serde_json::from_str(STAGE).unwrap();
        assert_eq!(stage.key(), "bob:students");
        assert_eq!(stage.revision, 3);

        let entry = stage.entry(TemplateVersion::Location).unwrap();
        assert_eq!(entry.policy_names(), vec!["rls_students_location"]);
        assert_eq!(
            entry.hasura_permissions(),
            &[Operation::Select, Operation::Update]
        );
        assert!(!entry.use_custom_hasura_policy);
        assert_eq!(stage.hasura_entries().count(), 1);
    }

    #[test]
    fn test_record_copies_template_inputs() {
        let template = Template {
            template: TemplateVersion::Owner,
            owner_col: Some("owners".to_string()),
            postgres_policy_version: 2,
            ..Template::default()
        };
        let entry = TemplateStage::record(&template, None, Some(PostgresStage::default()));
        assert_eq!(entry.owner_col.as_deref(), Some("owners"));
        assert_eq!(entry.postgres_policy_version, 2);
        assert!(entry.postgres_policies.is_none());
        assert!(entry.policy_names().is_empty());
    }
}
