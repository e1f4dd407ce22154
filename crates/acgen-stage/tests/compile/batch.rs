//! Skipped tables, aborted batches, dry runs and removed specs.

use super::common::*;
use acgen_core::{FileAccess, TemplateVersion};
use acgen_stage::{ChangeCode, Compiler, ErrorCategory};
use pretty_assertions::assert_eq;
use std::path::Path;

const LESSONS_SPEC: &str = "accesscontrol/bob/lessons.yaml";
const REPORTS_SPEC: &str = "accesscontrol/bob/reports.yaml";

#[test]
fn test_invalid_table_is_skipped_and_others_proceed() {
    let config = config();
    let files = workspace(&config, &default_spec());
    set_spec(
        &files,
        LESSONS_SPEC,
        "table_name: lessons\ntemplates:\n  - template: \"1\"\n    permissions:\n      postgres: [SELECT]\n",
    );

    let report = compile(&files, &config);

    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].file, "lessons.yaml");
    assert_eq!(report.skipped[0].category, ErrorCategory::InputValidation);
    assert!(report.skipped[0].reason.contains("pkey"));
    assert!(report.skipped[0].reason.contains("permissionPrefix"));

    let stage = stage(&files, &config);
    assert!(stage.get("bob:students").is_some());
    assert!(stage.get("bob:lessons").is_none());
}

#[test]
fn test_missing_access_path_table_is_skipped() {
    let config = config();
    let files = workspace(&config, &default_spec());
    set_spec(
        &files,
        LESSONS_SPEC,
        r#"table_name: lessons
pkey: lesson_id
templates:
  - accessPathTable:
      name: lesson_access_paths
    permissionPrefix: lesson.lesson
    permissions:
      postgres: [SELECT]
      hasura: [SELECT]
"#,
    );

    let report = compile(&files, &config);

    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].category, ErrorCategory::GraphLookup);
    assert_eq!(report.units.len(), 1);
    assert!(!latest_migration(&files).contains("lessons"));
}

#[test]
fn test_malformed_metadata_aborts_batch() {
    let config = config();
    let files = workspace(&config, &default_spec());
    files
        .write_file(&config.hasura.v1_path_for(SERVICE), b"- table: [")
        .unwrap();

    let err = Compiler::new(&files, &config).run(&options()).unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Persistence);
    assert!(migrations(&files).is_empty());
    assert!(!files.exists(&config.stage_path()));
}

#[test]
fn test_plan_writes_nothing() {
    let config = config();
    let files = workspace(&config, &default_spec());
    let before = snapshot(&files);

    let report = Compiler::new(&files, &config).plan(&options()).unwrap();

    assert_eq!(
        report.units[0].code(TemplateVersion::Location),
        Some(ChangeCode::BOTH)
    );
    assert!(report.written.is_empty());
    assert_eq!(snapshot(&files), before);
}

#[test]
fn test_removed_spec_drops_everything() {
    let config = config();
    let files = workspace(&config, &default_spec());
    set_spec(
        &files,
        REPORTS_SPEC,
        "table_name: reports\ntemplates:\n  - template: \"3\"\n    permissionPrefix: report\n    permissions:\n      postgres: [SELECT]\n",
    );
    compile(&files, &config);
    assert!(stage(&files, &config).get("bob:reports").is_some());

    let remaining = snapshot(&files)
        .into_iter()
        .filter(|(p, _)| p != Path::new(REPORTS_SPEC))
        .fold(acgen_core::MemoryFiles::new(), |files, (p, content)| {
            files.with_file(p, content)
        });
    let report = compile(&remaining, &config);

    let unit = report.units.iter().find(|u| u.table == "reports").unwrap();
    assert_eq!(unit.deleted, vec![TemplateVersion::Permission]);
    assert_eq!(
        latest_migration(&remaining),
        "DROP POLICY IF EXISTS rls_reports_permission_v3 on \"reports\";\n"
    );
    assert!(stage(&remaining, &config).get("bob:reports").is_none());
    assert!(stage(&remaining, &config).get("bob:students").is_some());
}

#[test]
fn test_service_filter() {
    let config = config();
    let files = workspace(&config, &default_spec());
    let mut options = options();
    options.service = Some("eureka".to_string());

    let report = Compiler::new(&files, &config).run(&options).unwrap();

    assert!(report.units.is_empty());
    assert!(migrations(&files).is_empty());
}

#[test]
fn test_renamed_table_drops_old_record() {
    let config = config();
    let files = workspace(&config, &default_spec());
    compile(&files, &config);

    let renamed = location_spec("[SELECT]", "[]").replace("table_name: students", "table_name: pupils");
    set_spec(&files, STUDENTS_SPEC, &renamed);
    let report = compile(&files, &config);

    let old = report.units.iter().find(|u| u.table == "students").unwrap();
    assert_eq!(old.deleted, vec![TemplateVersion::Location]);
    assert!(old.changes.is_empty());

    let sql = latest_migration(&files);
    assert!(sql.contains("CREATE POLICY rls_pupils_location ON \"pupils\""));
    assert!(sql.contains("DROP POLICY IF EXISTS rls_students_location on \"students\";"));

    let stage = stage(&files, &config);
    assert!(stage.get("bob:students").is_none());
    assert_eq!(stage.get("bob:pupils").unwrap().filename, "students.yaml");
}
