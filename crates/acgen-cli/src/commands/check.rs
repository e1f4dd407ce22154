//! `acgen check` command implementation.
//!
//! Validates every spec file under the control root:
//! - JSON Schema validation against `schemas/TableSpec.schema.json`
//! - Required inputs of each template (table, pkey, permissionPrefix, ownerCol)
//! - Custom Postgres policy clauses parse as Postgres expressions

use std::path::{Path, PathBuf};

use acgen_core::{AcgenConfig, FileAccess, TableSpec, TemplateContext};
use acgen_postgres::PolicySynthesizer;
use anyhow::{Context, Result};
use serde_json::Value as JsonValue;

// ============================================================================
// Embedded JSON Schema
// ============================================================================

/// Compiled into the binary so validation works without external files.
const TABLE_SPEC_SCHEMA: &str = include_str!("../../../../schemas/TableSpec.schema.json");

// ============================================================================
// Check Result Types
// ============================================================================

/// A single check finding.
#[derive(Debug, Clone)]
pub struct CheckFinding {
    /// Check that produced this finding.
    pub category: &'static str,
    pub message: String,
    pub file: PathBuf,
    /// Location within the file, e.g. `/templates/0/permissions`.
    pub location: Option<String>,
}

impl CheckFinding {
    fn new(category: &'static str, file: &Path, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            file: file.to_path_buf(),
            location: None,
        }
    }

    fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

#[derive(Debug, Default)]
pub struct CheckResults {
    pub files_checked: usize,
    pub findings: Vec<CheckFinding>,
}

impl CheckResults {
    pub fn has_errors(&self) -> bool {
        !self.findings.is_empty()
    }

    pub fn print_summary(&self) {
        for finding in &self.findings {
            let location = finding
                .location
                .as_deref()
                .map(|l| format!(":{l}"))
                .unwrap_or_default();
            println!(
                "  ✗ [{}] {}{}: {}",
                finding.category,
                finding.file.display(),
                location,
                finding.message
            );
        }
        println!();
        if self.findings.is_empty() {
            println!("✅ {} spec file(s) checked, all valid", self.files_checked);
        } else {
            println!(
                "❌ {} error(s) in {} spec file(s)",
                self.findings.len(),
                self.files_checked
            );
        }
    }
}

// ============================================================================
// Entry Point
// ============================================================================

pub fn run<F: FileAccess + ?Sized>(
    files: &F,
    config: &AcgenConfig,
    service: Option<&str>,
) -> Result<CheckResults> {
    let schema: JsonValue =
        serde_json::from_str(TABLE_SPEC_SCHEMA).context("embedded TableSpec schema is invalid")?;
    let validator = jsonschema::validator_for(&schema)
        .map_err(|e| anyhow::anyhow!("failed to compile TableSpec schema: {e}"))?;
    let policies = PolicySynthesizer::new(&config.postgres);

    let mut results = CheckResults::default();
    let services = files
        .list_directories(&config.control_root)
        .with_context(|| format!("failed to list {}", config.control_root.display()))?;

    for svc in services.iter().filter(|s| service.is_none_or(|wanted| wanted == s.as_str())) {
        let dir = config.service_dir(svc);
        let names = files
            .list_files(&dir)
            .with_context(|| format!("failed to list {}", dir.display()))?;

        for name in names.iter().filter(|n| n.ends_with(".yaml") || n.ends_with(".yml")) {
            let path = dir.join(name);
            let content = files
                .read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            results.files_checked += 1;
            results
                .findings
                .extend(check_file(svc, name, &path, &content, &validator, &policies));
        }
    }

    tracing::debug!(
        files = results.files_checked,
        findings = results.findings.len(),
        "check finished"
    );
    Ok(results)
}

fn check_file(
    service: &str,
    name: &str,
    path: &Path,
    content: &str,
    validator: &jsonschema::Validator,
    policies: &PolicySynthesizer,
) -> Vec<CheckFinding> {
    let value: JsonValue = match serde_yaml::from_str(content) {
        Ok(v) => v,
        Err(e) => {
            return vec![CheckFinding::new("yaml", path, format!("failed to parse YAML: {e}"))];
        }
    };

    let schema_findings: Vec<CheckFinding> = validator
        .iter_errors(&value)
        .map(|error| {
            let location = error.instance_path().to_string();
            let location = if location.is_empty() {
                "(root)".to_string()
            } else {
                location
            };
            CheckFinding::new("json-schema", path, error.to_string()).with_location(location)
        })
        .collect();
    if !schema_findings.is_empty() {
        return schema_findings;
    }

    let spec = match TableSpec::from_yaml(service, name, content) {
        Ok(spec) => spec,
        Err(e) => return vec![CheckFinding::new("spec", path, e.to_string())],
    };

    let mut findings = Vec::new();
    if let Err(e) = spec.validate() {
        findings.push(CheckFinding::new("spec", path, e.to_string()));
        return findings;
    }
    for (index, template) in spec.templates.iter().enumerate() {
        let result = TemplateContext::new(&spec, template)
            .map_err(acgen_postgres::PolicyError::from)
            .and_then(|ctx| policies.synthesize(&ctx));
        if let Err(e) = result {
            findings.push(
                CheckFinding::new("postgres", path, e.to_string())
                    .with_location(format!("/templates/{index}")),
            );
        }
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use acgen_core::LocalFiles;
    use std::fs;

    fn project(specs: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in specs {
            let path = dir.path().join("accesscontrol/bob").join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        dir
    }

    #[test]
    fn test_valid_spec_passes() {
        let dir = project(&[(
            "students.yaml",
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
      postgres: [SELECT, INSERT]
      hasura: [SELECT]
"#,
        )]);
        let results = run(&LocalFiles::new(dir.path()), &AcgenConfig::default(), None).unwrap();
        assert_eq!(results.files_checked, 1);
        assert!(!results.has_errors(), "{:?}", results.findings);
    }

    #[test]
    fn test_schema_violations_are_located() {
        let dir = project(&[(
            "notes.yaml",
            "table_name: notes\ntemplates:\n  - template: \"2\"\n    permissionPrefix: note\n",
        )]);
        let results = run(&LocalFiles::new(dir.path()), &AcgenConfig::default(), None).unwrap();
        assert!(results.has_errors());
        assert_eq!(results.findings[0].category, "json-schema");
        assert_eq!(results.findings[0].location.as_deref(), Some("/templates/0/template"));
    }

    #[test]
    fn test_missing_pkey_and_bad_custom_policy() {
        let dir = project(&[
            (
                "lessons.yaml",
                "table_name: lessons\ntemplates:\n  - permissionPrefix: lesson\n",
            ),
            (
                "notes.yaml",
                r#"table_name: notes
pkey: note_id
templates:
  - permissionPrefix: note
    use_custom_policy: true
    postgres_policies:
      - name: rls_notes_custom
        using: "owners = "
"#,
            ),
        ]);
        let results = run(&LocalFiles::new(dir.path()), &AcgenConfig::default(), None).unwrap();
        assert_eq!(results.files_checked, 2);
        assert_eq!(results.findings.len(), 2);
        assert_eq!(results.findings[0].category, "spec");
        assert!(results.findings[0].message.contains("pkey"));
        assert_eq!(results.findings[1].category, "postgres");
        assert!(results.findings[1].message.contains("rls_notes_custom"));
    }

    #[test]
    fn test_service_filter() {
        let dir = project(&[("notes.yaml", "table_name: notes\n")]);
        let results =
            run(&LocalFiles::new(dir.path()), &AcgenConfig::default(), Some("eureka")).unwrap();
        assert_eq!(results.files_checked, 0);
    }
}
