use std::path::PathBuf;

use acgen_core::{AcgenConfig, LocalFiles};
use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "acgen", version, about = "Access-control generator for Postgres RLS and Hasura")]
struct Cli {
    /// Project root; every configured path is relative to it.
    #[arg(long, global = true, default_value = ".", env = "ACGEN_ROOT")]
    root: PathBuf,

    /// Configuration file, relative to the root. Defaults apply when it is missing.
    #[arg(long, global = true, default_value = "acgen.yaml")]
    config: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

/// Restricts a command to one service or table.
#[derive(Args, Debug, Clone, Default)]
pub struct Selection {
    /// Only this service.
    #[arg(long)]
    pub service: Option<String>,

    /// Only this table.
    #[arg(long)]
    pub table: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile the specs and write migrations, metadata and the stage file.
    Generate {
        #[command(flatten)]
        selection: Selection,
    },

    /// Show the change code of every template without writing anything.
    Plan {
        #[command(flatten)]
        selection: Selection,
    },

    /// Drop generated policies and metadata using the stage history.
    Rollback {
        #[command(flatten)]
        selection: Selection,

        /// Print the rollback SQL instead of writing it.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },

    /// Validate every spec file without touching any artifact.
    Check {
        /// Only this service.
        #[arg(long)]
        service: Option<String>,
    },
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = if verbose > 0 {
        EnvFilter::new(level)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config_path = cli.root.join(&cli.config);
    let config = AcgenConfig::load_or_default(&config_path)
        .with_context(|| format!("failed to load config {}", config_path.display()))?;
    let files = LocalFiles::new(&cli.root);

    match cli.cmd {
        Command::Generate { selection } => commands::generate::run(&files, &config, &selection),
        Command::Plan { selection } => commands::plan::run(&files, &config, &selection),
        Command::Rollback { selection, dry_run } => {
            commands::rollback::run(&files, &config, &selection, dry_run)
        }
        Command::Check { service } => {
            let results = commands::check::run(&files, &config, service.as_deref())?;
            results.print_summary();
            if results.has_errors() {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}
