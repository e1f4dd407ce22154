//! `acgen rollback` command implementation.

use acgen_core::{AcgenConfig, FileAccess};
use acgen_stage::Compiler;
use anyhow::{Context, Result};

use crate::Selection;

pub fn run<F: FileAccess + ?Sized>(
    files: &F,
    config: &AcgenConfig,
    selection: &Selection,
    dry_run: bool,
) -> Result<()> {
    let report = Compiler::new(files, config)
        .rollback(selection.service.as_deref(), selection.table.as_deref(), dry_run)
        .context("rollback aborted")?;

    if report.plan.is_empty() {
        println!("nothing to roll back");
        return Ok(());
    }

    for (service, rollback) in &report.plan {
        if dry_run {
            println!("-- {service}");
            print!("{}", rollback.sql);
        } else {
            println!("{service}: rolled back {}", rollback.keys.join(", "));
        }
    }
    for path in &report.written {
        println!("wrote {}", path.display());
    }
    Ok(())
}
