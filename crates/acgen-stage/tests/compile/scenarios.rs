//! Template switches and one-sided changes.

use super::common::*;
use acgen_core::{Condition, TemplateVersion};
use acgen_stage::ChangeCode;
use pretty_assertions::assert_eq;

#[test]
fn test_location_template_emits_single_policy() {
    let config = config();
    let files = workspace(&config, &default_spec());

    let report = compile(&files, &config);
    assert_eq!(report.units.len(), 1);
    assert_eq!(
        report.units[0].code(TemplateVersion::Location),
        Some(ChangeCode::BOTH)
    );
    assert_eq!(report.units[0].revision, 1);

    let sql = latest_migration(&files);
    assert_eq!(sql.matches("CREATE POLICY").count(), 1);
    assert!(sql.contains(
        "CREATE POLICY rls_students_location ON \"students\" AS PERMISSIVE FOR ALL TO PUBLIC"
    ));
    assert!(sql.contains("join user_access_paths usp on"));

    let using = &sql[sql.find("using (").unwrap()..sql.find("with check (").unwrap()];
    let check = &sql[sql.find("with check (").unwrap()..];
    assert!(using.contains("p.permission_name = 'user.student.read'"));
    assert!(check.contains("p.permission_name = 'user.student.write'"));

    let stage = stage(&files, &config);
    let record = stage.get("bob:students").unwrap();
    let entry = record.entry(TemplateVersion::Location).unwrap();
    assert_eq!(entry.policy_names(), vec!["rls_students_location"]);
    let hasura = entry.hasura.as_ref().unwrap();
    assert_eq!(hasura.relationship, "students_location_permission");
    assert_eq!(hasura.first_level_query, "user_access_paths");
}

#[test]
fn test_switch_to_owner_template_regenerates_both_sides() {
    let config = config();
    let files = workspace(&config, &default_spec());
    compile(&files, &config);

    set_spec(&files, STUDENTS_SPEC, &owner_spec());
    let report = compile(&files, &config);

    let unit = &report.units[0];
    assert_eq!(unit.code(TemplateVersion::Owner), Some(ChangeCode::BOTH));
    assert_eq!(unit.deleted, vec![TemplateVersion::Location]);
    assert_eq!(unit.revision, 2);
    assert_eq!(migrations(&files).len(), 2);

    let sql = latest_migration(&files);
    let drop = sql
        .find("DROP POLICY IF EXISTS rls_students_location on \"students\";")
        .unwrap();
    let create = sql.find("CREATE POLICY rls_students_permission_v4").unwrap();
    assert!(drop < create);
    assert_eq!(
        sql.matches("current_setting('app.user_id') = owners").count(),
        2
    );
    assert!(!sql.contains("CREATE POLICY rls_students_location"));

    let graph = graph(&files, &config);
    let students = graph.table("students").unwrap();
    assert!(
        students
            .object_relationships
            .iter()
            .all(|r| r.name != "students_location_permission")
    );
    let manabie = students
        .select_permissions
        .iter()
        .find(|p| p.role == "MANABIE")
        .unwrap();
    assert_eq!(
        manabie.permission.filter.conjuncts(),
        vec![Condition::eq("owners", "X-Hasura-User-Id")]
    );
    assert!(
        graph
            .table("user_access_paths")
            .unwrap()
            .object_relationships
            .is_empty()
    );
}

#[test]
fn test_metadata_only_change_writes_no_migration() {
    let config = config();
    let files = workspace(&config, &default_spec());
    compile(&files, &config);
    let metadata_before = read(&files, &config.hasura.v1_path_for(SERVICE));

    set_spec(
        &files,
        STUDENTS_SPEC,
        &location_spec("[SELECT, INSERT, UPDATE, DELETE]", "[SELECT, UPDATE]"),
    );
    let report = compile(&files, &config);

    assert_eq!(
        report.units[0].code(TemplateVersion::Location),
        Some(ChangeCode::METADATA)
    );
    assert_eq!(migrations(&files).len(), 1);
    assert!(report.written.contains(&config.hasura.v1_path_for(SERVICE)));
    assert!(report.written.iter().all(|p| !p.starts_with(MIGRATIONS)));
    assert_ne!(read(&files, &config.hasura.v1_path_for(SERVICE)), metadata_before);

    let graph = graph(&files, &config);
    let students = graph.table("students").unwrap();
    assert_eq!(students.update_permissions.len(), 1);
    assert_eq!(students.update_permissions[0].role, "MANABIE");

    let record = stage(&files, &config);
    let entry = record
        .get("bob:students")
        .unwrap()
        .entry(TemplateVersion::Location)
        .unwrap();
    assert_eq!(entry.policy_names(), vec!["rls_students_location"]);
}

#[test]
fn test_policy_version_bump_writes_sql_only() {
    let config = config();
    let files = workspace(&config, &default_spec());
    compile(&files, &config);
    let metadata_before = read(&files, &config.hasura.v1_path_for(SERVICE));

    let bumped = default_spec().replace(
        "    permissionPrefix: user.student\n",
        "    permissionPrefix: user.student\n    postgres_policy_version: 2\n",
    );
    set_spec(&files, STUDENTS_SPEC, &bumped);
    let report = compile(&files, &config);

    assert_eq!(
        report.units[0].code(TemplateVersion::Location),
        Some(ChangeCode::SQL)
    );
    assert_eq!(migrations(&files).len(), 2);
    assert_eq!(read(&files, &config.hasura.v1_path_for(SERVICE)), metadata_before);
    assert!(latest_migration(&files).contains("CREATE POLICY rls_students_location"));
}
