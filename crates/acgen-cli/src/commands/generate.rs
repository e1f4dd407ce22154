//! `acgen generate` command implementation.
//!
//! Compiles every selected spec, writes what changed and reports per-table
//! change codes. Tables that were skipped make the command fail after the
//! rest of the batch has been persisted.

use acgen_core::{AcgenConfig, FileAccess};
use acgen_stage::Compiler;
use anyhow::{Context, Result, bail};

use super::{compile_options, print_skipped, unit_line};
use crate::Selection;

pub fn run<F: FileAccess + ?Sized>(files: &F, config: &AcgenConfig, selection: &Selection) -> Result<()> {
    let options = compile_options(selection);
    let report = Compiler::new(files, config)
        .run(&options)
        .context("compilation aborted")?;

    for unit in report.units.iter().filter(|u| !u.is_unchanged()) {
        println!("{}  (revision {})", unit_line(unit), unit.revision);
    }
    for path in &report.written {
        println!("wrote {}", path.display());
    }
    if report.written.is_empty() {
        println!("nothing to do");
    }

    print_skipped(&report);
    if !report.skipped.is_empty() {
        bail!("{} table(s) skipped", report.skipped.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use acgen_core::LocalFiles;
    use std::fs;

    const SPEC: &str = r#"table_name: notes
templates:
  - template: "4"
    ownerCol: owners
    permissions:
      postgres: [SELECT]
"#;

    #[test]
    fn test_generate_writes_migration_and_stage() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("accesscontrol/bob")).unwrap();
        fs::write(dir.path().join("accesscontrol/bob/notes.yaml"), SPEC).unwrap();

        let files = LocalFiles::new(dir.path());
        let config = AcgenConfig::default();
        run(&files, &config, &Selection::default()).unwrap();

        let sql = fs::read_to_string(dir.path().join("migrations/bob/0001_migrate.up.sql")).unwrap();
        assert!(sql.contains("CREATE POLICY rls_notes_permission_v4"));
        assert!(dir.path().join("accesscontrol/stage.json").exists());

        // Unchanged rerun writes nothing new.
        run(&files, &config, &Selection::default()).unwrap();
        assert!(!dir.path().join("migrations/bob/0002_migrate.up.sql").exists());
    }

    #[test]
    fn test_generate_fails_on_skipped_table() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("accesscontrol/bob")).unwrap();
        fs::write(
            dir.path().join("accesscontrol/bob/notes.yaml"),
            "table_name: notes\ntemplates:\n  - template: \"4\"\n",
        )
        .unwrap();

        let files = LocalFiles::new(dir.path());
        let err = run(&files, &AcgenConfig::default(), &Selection::default()).unwrap_err();
        assert!(err.to_string().contains("1 table(s) skipped"));
    }
}
