//! Permission filter construction and merging.

use acgen_core::{Condition, GRANTED_TABLE, HasuraConfig, TableName, TemplateContext, TemplateVersion};

use crate::resolver::RelationshipPath;

/// Column checked against `_is_null` on the innermost access-path hop.
pub const SOFT_DELETE_COLUMN: &str = "deleted_at";

/// Add `condition` to `conditions`, collapsing conditions with the same identity.
///
/// When two conditions collide, the one with more text is kept; on a tie
/// the one already present stays.
pub fn push_unique(conditions: &mut Vec<Condition>, condition: Condition) {
    let identity = condition.identity();
    match conditions.iter_mut().find(|c| c.identity() == identity) {
        Some(existing) => {
            if condition.text_weight() > existing.text_weight() {
                *existing = condition;
            }
        }
        None => conditions.push(condition),
    }
}

/// Collapse duplicate conditions, keeping first-occurrence order.
pub fn dedupe(conditions: Vec<Condition>) -> Vec<Condition> {
    let mut result = Vec::with_capacity(conditions.len());
    for condition in conditions {
        push_unique(&mut result, condition);
    }
    result
}

/// Put `new` in front of `existing` and dedupe.
pub fn merge(existing: Vec<Condition>, new: Condition) -> Vec<Condition> {
    let mut all = Vec::with_capacity(existing.len() + 1);
    all.push(new);
    all.extend(existing);
    dedupe(all)
}

/// Combine `check` with an earlier template's condition on the same table.
///
/// The first conjunct keyed by one of `earlier_keys` is taken out of
/// `existing` and or-ed with `check`, so a row passes if either template
/// grants it.
pub fn combine_with_earlier(
    existing: &mut Vec<Condition>,
    check: Condition,
    earlier_keys: &[String],
) -> Condition {
    let position = existing
        .iter()
        .position(|c| earlier_keys.iter().any(|k| k == c.key()));
    match position {
        Some(index) => {
            let earlier = existing.remove(index);
            Condition::Or(vec![earlier, check])
        }
        None => check,
    }
}

/// Builds the permission check of one template.
pub struct CheckBuilder<'a> {
    ctx: &'a TemplateContext<'a>,
    config: &'a HasuraConfig,
}

impl<'a> CheckBuilder<'a> {
    pub fn new(ctx: &'a TemplateContext<'a>, config: &'a HasuraConfig) -> Self {
        Self { ctx, config }
    }

    /// Check for `permission`, nested along `path` where the template scopes by location.
    pub fn permission_check(&self, path: &RelationshipPath, permission: &str) -> Condition {
        let check = self.grant_check(permission);
        if !self.ctx.version().is_location_scoped() || path.is_empty() {
            return check;
        }

        let mut hops = path.hops.iter().rev();
        let Some(innermost) = hops.next() else {
            return check;
        };
        let guarded = Condition::And(vec![check, Condition::is_null(SOFT_DELETE_COLUMN)]);
        hops.fold(
            Condition::relation(innermost.name.clone(), guarded),
            |inner, hop| Condition::relation(hop.name.clone(), inner),
        )
    }

    /// Check that the caller holds `permission`, before any path nesting.
    pub fn grant_check(&self, permission: &str) -> Condition {
        let user = self.config.user_id_session_variable.as_str();
        match self.ctx.version() {
            TemplateVersion::Owner => {
                Condition::eq(self.ctx.owner_col().unwrap_or_default(), user)
            }
            TemplateVersion::Permission => Condition::exists(
                TableName::public(GRANTED_TABLE),
                self.granted_by(permission),
            ),
            TemplateVersion::Location | TemplateVersion::LocationPerCommand => {
                Condition::relation(self.ctx.location_relationship(), self.granted_by(permission))
            }
        }
    }

    fn granted_by(&self, permission: &str) -> Condition {
        Condition::And(vec![
            Condition::eq("user_id", self.config.user_id_session_variable.as_str()),
            Condition::eq("permission_name", permission),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::Hop;
    use acgen_core::{RelationshipKind, TableSpec};
    use pretty_assertions::assert_eq;

    fn spec(template: &str) -> TableSpec {
        let yaml = format!(
            "table_name: lessons\npkey: lesson_id\ntemplates:\n  - template: \"{template}\"\n    permissionPrefix: lesson.lesson\n    ownerCol: owners\n"
        );
        TableSpec::from_yaml("bob", "lessons.yaml", &yaml).unwrap()
    }

    fn path() -> RelationshipPath {
        let mut path = RelationshipPath::direct("course", "courses");
        path.hops.push(Hop {
            kind: RelationshipKind::Array,
            name: "course_access_paths".to_string(),
            remote_table: "course_access_paths".to_string(),
        });
        path
    }

    #[test]
    fn test_location_check_nests_along_path() {
        let spec = spec("1");
        let ctx = TemplateContext::new(&spec, &spec.templates[0]).unwrap();
        let config = HasuraConfig::default();
        let check = CheckBuilder::new(&ctx, &config).permission_check(&path(), "lesson.lesson.read");

        let expected = r#"course:
  course_access_paths:
    _and:
    - lessons_location_permission:
        _and:
        - user_id:
            _eq: X-Hasura-User-Id
        - permission_name:
            _eq: lesson.lesson.read
    - deleted_at:
        _is_null: true
"#;
        assert_eq!(serde_yaml::to_string(&check).unwrap(), expected);
    }

    #[test]
    fn test_location_check_without_path_is_flat() {
        let spec = spec("1.1");
        let ctx = TemplateContext::new(&spec, &spec.templates[0]).unwrap();
        let config = HasuraConfig::default();
        let check = CheckBuilder::new(&ctx, &config)
            .permission_check(&RelationshipPath::default(), "lesson.lesson.write");
        assert_eq!(check.key(), "lessons_location_permission");
    }

    #[test]
    fn test_merge_keeps_superset_regardless_of_order() {
        let small = Condition::eq("owners", "X-Hasura-User-Id");
        let large = Condition::Compare {
            column: "owners".to_string(),
            ops: [
                ("_eq".to_string(), "X-Hasura-User-Id".into()),
                ("_neq".to_string(), "".into()),
            ]
            .into_iter()
            .collect(),
        };

        assert_eq!(merge(vec![small.clone()], large.clone()), vec![large.clone()]);
        assert_eq!(merge(vec![large.clone()], small.clone()), vec![large]);
    }

    #[test]
    fn test_merge_preserves_unrelated_conditions() {
        let resource = Condition::eq("resource_path", "X-Hasura-Resource-Path");
        let owner = Condition::eq("owners", "X-Hasura-User-Id");
        assert_eq!(
            merge(vec![resource.clone()], owner.clone()),
            vec![owner, resource]
        );
    }

    #[test]
    fn test_combine_with_earlier_template() {
        let location = Condition::relation("lessons_location_permission", Condition::default());
        let resource = Condition::eq("resource_path", "X-Hasura-Resource-Path");
        let mut existing = vec![location.clone(), resource.clone()];

        let owner = Condition::eq("owners", "X-Hasura-User-Id");
        let combined = combine_with_earlier(
            &mut existing,
            owner.clone(),
            &["lessons_location_permission".to_string()],
        );

        assert_eq!(combined, Condition::Or(vec![location, owner]));
        assert_eq!(existing, vec![resource]);
    }

    #[test]
    fn test_owner_check() {
        let spec = spec("4");
        let ctx = TemplateContext::new(&spec, &spec.templates[0]).unwrap();
        let config = HasuraConfig::default();
        let check = CheckBuilder::new(&ctx, &config).permission_check(&path(), "ignored");
        assert_eq!(check, Condition::eq("owners", "X-Hasura-User-Id"));
    }

    #[test]
    fn test_permission_check_uses_exists() {
        let spec = spec("3");
        let ctx = TemplateContext::new(&spec, &spec.templates[0]).unwrap();
        let config = HasuraConfig::default();
        let check = CheckBuilder::new(&ctx, &config).permission_check(&path(), "lesson.lesson.read");
        assert_eq!(check.key(), "_exists");
    }
}
