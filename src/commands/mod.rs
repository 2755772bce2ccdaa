//! The `shipmate` command.
//!
//! Turns parsed CLI options into an [`Orchestrator`], runs it, prints the
//! summary and maps the outcome onto the process exit status.
//!
//! # Example
//!
//! ```no_run
//! use shipmate::cli::Cli;
//! use shipmate::commands;
//!
//! let cli = Cli::parse_args();
//! if let Err(e) = commands::execute(&cli) {
//!     eprintln!("Error: {e:?}");
//! }
//! ```

use std::path::{Path, PathBuf};

use crate::build::{ConsoleSink, OutputSink};
use crate::cli::Cli;
use crate::error::{Result, ShipError};
use crate::logging::Logger;
use crate::orchestrator::{Orchestrator, RunReport};
use crate::process::{CommandRunner, SystemRunner};


/// Run shipmate as configured on the command line.
pub fn execute(cli: &Cli) -> Result<()> {
    execute_with_dir(cli, None)
}

/// Run with an explicit working directory for resolving relative paths.
pub fn execute_with_dir(cli: &Cli, working_dir: Option<&Path>) -> Result<()> {
    let runner = SystemRunner;
    let sink = ConsoleSink::new(cli.jobs() > 1);
    execute_with(cli, working_dir, &runner, &sink).map(|_| ())
}

/// Run with explicit process and output plumbing.
///
/// Returns the report when every context built (or was planned), and
/// [`ShipError::BuildsFailed`] after printing the summary otherwise.
pub fn execute_with(
    cli: &Cli,
    working_dir: Option<&Path>,
    runner: &dyn CommandRunner,
    sink: &dyn OutputSink,
) -> Result<RunReport> {
    let quiet = cli.quiet();
    let verbose = if quiet { 0 } else { cli.verbose() };

    let current_dir = match working_dir {
        Some(dir) => dir.to_path_buf(),
        None => std::env::current_dir().map_err(|source| ShipError::Io {
            path: PathBuf::from("."),
            source,
        })?,
    };

    let orchestrator = Orchestrator::builder()
        .remote(cli.remote())
        .revision(Some(cli.rev()))
        .cache_path(cli.cache_path(Some(&current_dir)))
        .root(cli.scan_root(Some(&current_dir)))
        .prefix(cli.prefix())
        .descriptor(cli.descriptor())
        .strategy(cli.strategy())
        .jobs(cli.jobs())
        .git_program(cli.git())
        .engine(cli.engine())
        .keep_workspaces(cli.keep_workspaces())
        .dry_run(cli.dry_run())
        .runner(runner)
        .sink(sink)
        .verbose(verbose)
        .quiet(quiet)
        .build()?;

    let report = orchestrator.run()?;
    report.print_summary(&Logger::new(verbose, quiet));

    if !report.is_success() {
        return Err(ShipError::BuildsFailed {
            failed: report.failed(),
            attempted: report.attempted(),
        });
    }
    Ok(report)
}
