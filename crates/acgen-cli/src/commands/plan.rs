//! `acgen plan` command implementation.

use acgen_core::{AcgenConfig, FileAccess};
use acgen_stage::Compiler;
use anyhow::{Context, Result};

use super::{compile_options, print_skipped, unit_line};
use crate::Selection;

/// Print the change code of every selected template; writes nothing.
pub fn run<F: FileAccess + ?Sized>(files: &F, config: &AcgenConfig, selection: &Selection) -> Result<()> {
    let options = compile_options(selection);
    let report = Compiler::new(files, config)
        .plan(&options)
        .context("planning aborted")?;

    for unit in &report.units {
        println!("{}", unit_line(unit));
    }
    print_skipped(&report);
    Ok(())
}
