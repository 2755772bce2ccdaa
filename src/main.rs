//! # shipmate CLI
//!
//! Builds container images for every `Dockerfile` in a tree from a clean
//! extraction of one revision of a remote repository.
//!
//! ## Quick Start
//!
//! ```bash
//! # Build every context under the current directory from tag v1
//! shipmate --remote https://github.com/example/myapp.git \
//!     --name /var/cache/shipmate/myapp.git --rev v1
//!
//! # Only the services tree, four builds at a time
//! shipmate --remote https://github.com/example/myapp.git \
//!     --name /var/cache/shipmate/myapp.git --prefix services -j 4
//! ```
//!
//! ## Environment Variables
//!
//! Every flag has a `SHIPMATE_*` counterpart, e.g. `SHIPMATE_REMOTE`,
//! `SHIPMATE_NAME`, `SHIPMATE_REV`, `SHIPMATE_PREFIX` and `SHIPMATE_JOBS`.
//!
//! ## Exit Status
//!
//! 0 when every discovered context built, 1 on usage errors, cache failures
//! or any failed context.

use std::io::IsTerminal;

use shipmate::cli::Cli;

fn main() -> miette::Result<()> {
    miette::set_panic_hook();

    if std::io::stderr().is_terminal() {
        miette::set_hook(Box::new(|_| {
            Box::new(
                miette::GraphicalReportHandler::new()
                    .with_theme(miette::GraphicalTheme::unicode_nocolor())
                    .with_context_lines(3),
            )
        }))?;
    } else {
        // CI logs
        miette::set_hook(Box::new(|_| {
            Box::new(
                miette::GraphicalReportHandler::new()
                    .with_theme(miette::GraphicalTheme::none())
                    .with_context_lines(0),
            )
        }))?;
    }

    let cli = Cli::parse_args();

    shipmate::commands::execute(&cli).map_err(Into::into)
}
