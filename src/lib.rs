//! # shipmate
//!
//! Builds a container image for every build context in a directory tree,
//! each from a clean copy of one revision of a remote repository.
//!
//! ## Overview
//!
//! shipmate keeps a bare mirror of the remote on local disk and brings it up
//! to date once per run. It then walks the scan root looking for directories
//! that contain a `Dockerfile`, extracts the requested revision into a
//! private workspace for each one, and runs `docker build` there. Images are
//! tagged `<repo>:<rev>-<path>` so every context gets a distinct name.
//!
//! ## Key Features
//!
//! - **Bare cache**: the mirror has no working tree and is never built from
//! - **Clean workspaces**: each context is extracted fresh, stale files are
//!   wiped first
//! - **Path-derived tags**: with collision detection between contexts
//! - **Failure isolation**: one broken context never stops its siblings
//! - **Parallel builds**: optional rayon worker pool (`--jobs`)
//!
//! ## Architecture
//!
//! - [`cli`]: Command-line interface definitions using clap
//! - [`commands`]: Wires the CLI to the orchestrator
//! - [`orchestrator`]: Runs sync, discovery, materialization and builds
//! - [`cache`]: The bare repository mirror
//! - [`discovery`]: Finding build contexts under the scan root
//! - [`workspace`]: Per-context extraction
//! - [`tag`]: Image tag derivation and collision tracking
//! - [`build`]: Build engine invocation and output routing
//! - [`process`]: The external process seam
//! - [`error`]: Error types and handling with thiserror + miette
//!
//! ## Library Usage
//!
//! ```no_run
//! use shipmate::cli::Cli;
//! use shipmate::commands;
//!
//! let cli = Cli::builder()
//!     .remote("https://github.com/example/myapp.git")
//!     .name("/var/cache/shipmate/myapp.git")
//!     .rev("v1.4.0")
//!     .jobs(4)
//!     .build()?;
//!
//! commands::execute(&cli)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Error Handling
//!
//! The crate uses a combination of:
//! - `thiserror` for strongly-typed errors
//! - `miette` for rich diagnostic output in CLI
//!
//! Per-context failures are collected in a
//! [`RunReport`](orchestrator::RunReport); only cache failures abort a run.

pub mod build;
pub mod cache;
pub mod cli;
pub mod commands;
pub mod discovery;
pub mod error;
pub mod orchestrator;
pub mod process;
pub mod tag;
pub mod workspace;

// Internal modules
mod hashing;
mod logging;
mod paths;

#[cfg(test)]
mod testing;
