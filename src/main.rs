#![deny(clippy::mod_module_files)]
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod archive;
mod manifest;
mod orchestrator;
mod process;
mod project;
mod scan;
mod staleness;
mod state;

use archive::JarTool;
use orchestrator::{Packager, PackagingConfig};
use process::SystemRunner;
use project::Project;

/// Incremental jar packaging for projects laid out as sources/, tests/, outputs/.
///
/// Rebuilds only the archives whose inputs changed since the last run, as
/// recorded in the project's staleness document.
#[derive(Parser, Debug)]
#[command(name = "jarpack", version, about)]
struct Cli {
    /// Project root containing project.json
    #[arg(default_value = ".")]
    project_root: PathBuf,

    /// Rebuild every archive and leave the staleness document untouched
    #[arg(long)]
    no_cache: bool,

    /// Create archives one after another instead of concurrently
    #[arg(long)]
    serial: bool,

    /// Echo tool command lines and per-archive results
    #[arg(short, long)]
    verbose: bool,

    /// Exit status of the preceding compile/test steps; a non-zero value
    /// skips packaging and is propagated unchanged
    #[arg(long, default_value_t = 0)]
    upstream_status: i32,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(status) => std::process::exit(status),
        Err(err) => {
            eprintln!("jarpack: {:#}", err);
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let project = Project::load(cli.project_root)?;
    let config = PackagingConfig {
        use_cache: !cli.no_cache,
        parallel: !cli.serial,
        verbose: cli.verbose,
    };

    let packager = Packager::new(project, config, Arc::new(JarTool), Arc::new(SystemRunner))?;
    packager.run(cli.upstream_status, &mut io::stdout(), &mut io::stderr())
}
