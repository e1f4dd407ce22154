//! Rollback followed by a fresh run reproduces the first run.

use super::common::*;
use acgen_core::GRANTED_TABLE;
use acgen_stage::Compiler;
use pretty_assertions::assert_eq;

#[test]
fn test_rollback_then_rerun_reproduces_first_run() {
    let config = config();
    let files = workspace(&config, &default_spec());

    compile(&files, &config);
    let first_sql = latest_migration(&files);
    let first_graph = graph(&files, &config);

    // More history: an SQL-only change and back.
    let bumped = default_spec().replace(
        "    permissionPrefix: user.student\n",
        "    permissionPrefix: user.student\n    postgres_policy_version: 3\n",
    );
    set_spec(&files, STUDENTS_SPEC, &bumped);
    compile(&files, &config);
    set_spec(&files, STUDENTS_SPEC, &default_spec());
    compile(&files, &config);

    let report = Compiler::new(&files, &config)
        .rollback(None, None, false)
        .unwrap();
    assert_eq!(report.plan["bob"].keys, vec!["bob:students"]);

    let rollback_sql = latest_migration(&files);
    assert!(rollback_sql.starts_with(
        "DROP POLICY IF EXISTS rls_students_location on \"students\";"
    ));
    assert!(rollback_sql.contains("permission_check(resource_path, 'students')"));
    assert!(stage(&files, &config).is_empty());

    let rolled_back = graph(&files, &config);
    assert!(
        rolled_back
            .table(GRANTED_TABLE)
            .unwrap()
            .object_relationships
            .is_empty()
    );

    compile(&files, &config);
    assert_eq!(latest_migration(&files), first_sql);
    assert_eq!(graph(&files, &config), first_graph);
}

#[test]
fn test_rollback_dry_run_writes_nothing() {
    let config = config();
    let files = workspace(&config, &default_spec());
    compile(&files, &config);
    let before = snapshot(&files);

    let report = Compiler::new(&files, &config)
        .rollback(Some("bob"), Some("students"), true)
        .unwrap();

    assert!(report.written.is_empty());
    assert_eq!(report.plan["bob"].drops.len(), 1);
    assert_eq!(snapshot(&files), before);
}
