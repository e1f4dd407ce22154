//! CLI command implementations for acgen.

pub mod check;
pub mod generate;
pub mod plan;
pub mod rollback;

use acgen_stage::{CompileOptions, CompileReport, UnitReport};
use chrono::Local;

use crate::Selection;

/// Options for a run over `selection`, stamped with the local time.
pub(crate) fn compile_options(selection: &Selection) -> CompileOptions {
    let mut options = CompileOptions::new(Local::now().fixed_offset());
    options.service = selection.service.clone();
    options.table = selection.table.clone();
    options
}

/// `service:table  1=5 4=0` style line for one unit.
pub(crate) fn unit_line(unit: &UnitReport) -> String {
    let mut line = format!("{}:{}", unit.service, unit.table);
    for change in &unit.changes {
        line.push_str(&format!("  {}={}", change.template, change.code));
    }
    for deleted in &unit.deleted {
        line.push_str(&format!("  {deleted}=removed"));
    }
    line
}

pub(crate) fn print_skipped(report: &CompileReport) {
    for skipped in &report.skipped {
        eprintln!(
            "skipped {}/{} ({}): {}",
            skipped.service, skipped.file, skipped.category, skipped.reason
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acgen_core::TemplateVersion;
    use acgen_stage::{ChangeCode, EntryChange};

    #[test]
    fn test_unit_line() {
        let unit = UnitReport {
            service: "bob".to_string(),
            table: "students".to_string(),
            changes: vec![EntryChange {
                template: TemplateVersion::Owner,
                code: ChangeCode::BOTH,
            }],
            deleted: vec![TemplateVersion::Location],
            revision: 2,
        };
        assert_eq!(unit_line(&unit), "bob:students  4=5  1=removed");
    }

    #[test]
    fn test_compile_options_from_selection() {
        let selection = Selection {
            service: Some("bob".to_string()),
            table: None,
        };
        let options = compile_options(&selection);
        assert_eq!(options.service.as_deref(), Some("bob"));
        assert!(options.table.is_none());
        assert!(!options.dry_run);
    }
}
