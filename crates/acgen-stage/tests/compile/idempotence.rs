//! Unchanged specs leave every artifact alone.

use super::common::*;
use pretty_assertions::assert_eq;

#[test]
fn test_second_run_changes_nothing() {
    let config = config();
    let files = workspace(&config, &default_spec());
    compile(&files, &config);
    let before = snapshot(&files);

    let report = compile(&files, &config);

    assert!(report.units.iter().all(|u| u.is_unchanged()));
    assert_eq!(report.units[0].revision, 1);
    assert!(report.written.is_empty());
    assert_eq!(snapshot(&files), before);
}

#[test]
fn test_two_templates_rerun_is_stable() {
    let config = config();
    let spec = format!(
        "{}{}",
        default_spec(),
        r#"  - template: "4"
    ownerCol: owners
    permissions:
      postgres: [SELECT]
      hasura: [SELECT]
"#
    );
    let files = workspace(&config, &spec);
    compile(&files, &config);
    let first = graph(&files, &config);

    let students = first.table("students").unwrap();
    let manabie = students
        .select_permissions
        .iter()
        .find(|p| p.role == "MANABIE")
        .unwrap();
    let conjuncts = manabie.permission.filter.conjuncts();
    assert_eq!(conjuncts.len(), 1);
    assert_eq!(conjuncts[0].key(), "_or");

    // A metadata change on the second template re-applies both.
    let changed = spec.replace(
        "      postgres: [SELECT]\n      hasura: [SELECT]\n",
        "      postgres: [SELECT]\n      hasura: [SELECT, DELETE]\n",
    );
    set_spec(&files, STUDENTS_SPEC, &changed);
    compile(&files, &config);

    let second = graph(&files, &config);
    assert_eq!(
        second.table("students").unwrap().select_permissions,
        first.table("students").unwrap().select_permissions
    );

    let before = snapshot(&files);
    let report = compile(&files, &config);
    assert!(report.units[0].is_unchanged());
    assert_eq!(snapshot(&files), before);
}

#[test]
fn test_unmanaged_roles_keep_their_shape() {
    let config = config();
    let files = workspace(&config, &default_spec());
    compile(&files, &config);

    // Metadata-only change forces the tables file to be rewritten.
    set_spec(
        &files,
        STUDENTS_SPEC,
        &location_spec("[SELECT, INSERT, UPDATE, DELETE]", "[SELECT, DELETE]"),
    );
    let report = compile(&files, &config);
    assert!(
        report
            .written
            .contains(&config.hasura.v1_path_for(SERVICE))
    );

    let written = read(&files, &config.hasura.v1_path_for(SERVICE));
    let tables: serde_yaml::Value = serde_yaml::from_str(&written).unwrap();
    let students = tables
        .as_sequence()
        .unwrap()
        .iter()
        .find(|t| t["table"]["name"].as_str() == Some("students"))
        .unwrap();
    let admin = students["select_permissions"]
        .as_sequence()
        .unwrap()
        .iter()
        .find(|p| p["role"].as_str() == Some("USER_GROUP_SCHOOL_ADMIN"))
        .unwrap();

    assert_eq!(
        admin["permission"]["filter"],
        serde_yaml::Value::Mapping(serde_yaml::Mapping::new())
    );
    let columns: Vec<&str> = admin["permission"]["columns"]
        .as_sequence()
        .unwrap()
        .iter()
        .filter_map(|c| c.as_str())
        .collect();
    assert_eq!(columns, vec!["student_id", "name", "owners"]);
}
