//! Removal of previously generated metadata.

use acgen_core::{Condition, GRANTED_TABLE, HasuraTable, MetadataGraph, TemplateStage};

/// Relationships and conditions one stage entry added to the metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataDrop {
    pub table: String,
    pub access_path_table: Option<String>,
    pub relationship: String,
    pub first_level_query: String,
    /// (table, relationship) pairs added besides the location relationship.
    pub extra_relationships: Vec<(String, String)>,
}

impl MetadataDrop {
    /// What `entry` added for `table`, or `None` if it generated no metadata.
    pub fn for_entry(table: &str, entry: &TemplateStage) -> Option<Self> {
        let hasura = entry.hasura.as_ref()?;
        Some(Self {
            table: table.to_string(),
            access_path_table: entry.access_path_table.as_ref().map(|ap| ap.name.clone()),
            relationship: hasura.relationship.clone(),
            first_level_query: hasura.first_level_query.clone(),
            extra_relationships: hasura
                .extra_relationships
                .iter()
                .map(|r| (r.table_name.clone(), r.name.clone()))
                .collect(),
        })
    }

    /// Remove the relationships and conditions from `graph`.
    pub fn apply(&self, graph: &mut MetadataGraph) {
        if !self.relationship.is_empty() {
            let mut tables = vec![self.table.as_str(), GRANTED_TABLE];
            if let Some(ap) = &self.access_path_table {
                tables.push(ap);
            }
            for name in tables {
                if let Some(table) = graph.table_mut(name) {
                    table.remove_relationship(&self.relationship);
                }
            }
        }

        for (table, name) in &self.extra_relationships {
            if let Some(table) = graph.table_mut(table) {
                table.remove_relationship(name);
            }
        }

        if !self.first_level_query.is_empty() {
            if let Some(table) = graph.table_mut(&self.table) {
                remove_conditions(table, &self.first_level_query);
            }
        }

        tracing::debug!(
            table = self.table,
            relationship = self.relationship,
            first_level_query = self.first_level_query,
            "dropped generated metadata"
        );
    }
}

/// Remove the generated condition keyed by `key` from every role's permissions.
///
/// An `_or` group containing the key is the combination of several
/// templates and goes with it.
pub fn remove_conditions(table: &mut HasuraTable, key: &str) {
    for p in &mut table.select_permissions {
        remove_from(&mut p.permission.filter, key);
    }
    for p in &mut table.insert_permissions {
        remove_from(&mut p.permission.check, key);
    }
    for p in &mut table.update_permissions {
        remove_from(&mut p.permission.filter, key);
        if let Some(check) = &mut p.permission.check {
            remove_from(check, key);
        }
    }
    for p in &mut table.delete_permissions {
        remove_from(&mut p.permission.filter, key);
    }
}

fn remove_from(condition: &mut Condition, key: &str) {
    let matches = |c: &Condition| match c {
        Condition::Or(alternatives) => alternatives.iter().any(|a| a.key() == key),
        other => other.key() == key,
    };

    match condition {
        Condition::And(conjuncts) | Condition::Fields(conjuncts) => {
            conjuncts.retain(|c| !matches(c))
        }
        other if matches(other) => *other = Condition::default(),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const GRAPH: &str = r#"
- table: students
  object_relationships:
  - name: students_location_permission
    using:
      manual_configuration:
        remote_table: granted_permissions
        column_mapping:
          location_id: location_id
  select_permissions:
  - role: MANABIE
    permission:
      columns: [student_id]
      filter:
        _and:
        - _or:
          - students_location_permission:
              user_id:
                _eq: X-Hasura-User-Id
          - owners:
              _eq: X-Hasura-User-Id
        - resource_path:
            _eq: X-Hasura-Resource-Path
  update_permissions:
  - role: MANABIE
    permission:
      columns: [student_id]
      filter:
        _and:
        - owners:
            _eq: X-Hasura-User-Id
      check:
        _and:
        - owners:
            _eq: X-Hasura-User-Id
- table: granted_permissions
  object_relationships:
  - name: students_location_permission
    using:
      manual_configuration:
        remote_table: students
        column_mapping:
          location_id: location_id
"#;

    #[test]
    fn test_drop_removes_relationships_and_combined_filter() {
        let mut graph: MetadataGraph = serde_yaml::from_str(GRAPH).unwrap();
        let drop = MetadataDrop {
            table: "students".to_string(),
            access_path_table: None,
            relationship: "students_location_permission".to_string(),
            first_level_query: "students_location_permission".to_string(),
            extra_relationships: Vec::new(),
        };
        drop.apply(&mut graph);

        let students = graph.table("students").unwrap();
        assert!(students.object_relationships.is_empty());
        assert!(graph.table(GRANTED_TABLE).unwrap().object_relationships.is_empty());
        assert_eq!(
            students.select_permissions[0].permission.filter.conjuncts(),
            vec![Condition::eq("resource_path", "X-Hasura-Resource-Path")]
        );
    }

    #[test]
    fn test_remove_conditions_covers_update_check() {
        let mut graph: MetadataGraph = serde_yaml::from_str(GRAPH).unwrap();
        let students = graph.table_mut("students").unwrap();
        remove_conditions(students, "owners");

        let update = &students.update_permissions[0].permission;
        assert!(update.filter.conjuncts().is_empty());
        assert!(update.check.as_ref().unwrap().conjuncts().is_empty());
    }
}
