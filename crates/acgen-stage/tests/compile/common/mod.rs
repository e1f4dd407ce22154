//! Shared fixtures for the compilation tests.
//!
//! This module provides:
//! - A `bob` service with `students` metadata and an access-path table
//! - Spec builders for the students table
//! - Helpers to inspect migrations, metadata and the stage file

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use acgen_core::{AcgenConfig, FileAccess, MemoryFiles, MetadataGraph};
use acgen_hasura::MetadataStore;
use acgen_stage::{CompileOptions, CompileReport, Compiler, StageStore};
use chrono::{DateTime, FixedOffset};

// =============================================================================
// FIXTURES
// =============================================================================

pub const SERVICE: &str = "bob";
pub const STUDENTS_SPEC: &str = "accesscontrol/bob/students.yaml";
pub const MIGRATIONS: &str = "migrations/bob";

pub const METADATA: &str = r#"
- table:
    schema: public
    name: students
  array_relationships:
  - name: user_access_paths
    using:
      manual_configuration:
        remote_table:
          schema: public
          name: user_access_paths
        column_mapping:
          student_id: user_id
  select_permissions:
  - role: USER_GROUP_SCHOOL_ADMIN
    permission:
      columns:
      - student_id
      - name
      - owners
      filter: {}
- table:
    schema: public
    name: user_access_paths
"#;

/// Students spec for template `1` with the given operation lists.
pub fn location_spec(postgres: &str, hasura: &str) -> String {
    format!(
        r#"table_name: students
pkey: student_id
templates:
  - template: "1"
    accessPathTable:
      name: user_access_paths
      columnMapping:
        student_id: user_id
    permissionPrefix: user.student
    permissions:
      postgres: {postgres}
      hasura: {hasura}
"#
    )
}

/// Students spec for template `4` owned by `owners`.
pub fn owner_spec() -> String {
    r#"table_name: students
pkey: student_id
templates:
  - template: "4"
    ownerCol: owners
    permissions:
      postgres: [SELECT, INSERT, UPDATE, DELETE]
      hasura: [SELECT]
"#
    .to_string()
}

pub fn default_spec() -> String {
    location_spec("[SELECT, INSERT, UPDATE, DELETE]", "[SELECT]")
}

pub fn config() -> AcgenConfig {
    AcgenConfig::default()
}

pub fn now() -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339("2024-03-01T09:00:00+07:00").unwrap()
}

pub fn options() -> CompileOptions {
    CompileOptions::new(now())
}

/// A file tree with the bob metadata and `spec` as the students spec.
pub fn workspace(config: &AcgenConfig, spec: &str) -> MemoryFiles {
    MemoryFiles::new()
        .with_file(STUDENTS_SPEC, spec)
        .with_file(config.hasura.v1_path_for(SERVICE), METADATA)
}

// =============================================================================
// HELPERS
// =============================================================================

pub fn compile(files: &MemoryFiles, config: &AcgenConfig) -> CompileReport {
    Compiler::new(files, config).run(&options()).unwrap()
}

pub fn set_spec(files: &MemoryFiles, path: &str, spec: &str) {
    files.write_file(Path::new(path), spec.as_bytes()).unwrap();
}

/// Migration files of bob, oldest first.
pub fn migrations(files: &MemoryFiles) -> Vec<PathBuf> {
    files
        .paths()
        .into_iter()
        .filter(|p| p.starts_with(MIGRATIONS))
        .collect()
}

pub fn read(files: &MemoryFiles, path: &Path) -> String {
    files.read_to_string(path).unwrap()
}

pub fn latest_migration(files: &MemoryFiles) -> String {
    let path = migrations(files).pop().expect("no migration written");
    read(files, &path)
}

pub fn graph(files: &MemoryFiles, config: &AcgenConfig) -> MetadataGraph {
    MetadataStore::new(files, &config.hasura).load(SERVICE).unwrap()
}

pub fn stage(files: &MemoryFiles, config: &AcgenConfig) -> StageStore {
    StageStore::load(files, &config.stage_path()).unwrap()
}

/// Every path with its content.
pub fn snapshot(files: &MemoryFiles) -> Vec<(PathBuf, String)> {
    files
        .paths()
        .into_iter()
        .map(|p| {
            let content = read(files, &p);
            (p, content)
        })
        .collect()
}
