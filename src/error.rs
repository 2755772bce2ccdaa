//! Error types for shipmate.
//!
//! This module defines all error types used throughout shipmate, using
//! a combination of `thiserror` for ergonomic error definitions and `miette`
//! for rich diagnostic output.
//!
//! # Error Handling Strategy
//!
//! - All errors derive from [`ShipError`]
//! - Cache errors (`Clone`, `Sync`, `CacheInvalid`) are fatal and abort the
//!   run before any build context is touched
//! - Extraction, tagging and build errors are scoped to a single build context;
//!   the orchestrator records them and moves on (see [`ShipError::is_fatal`])
//! - Errors are automatically converted to `miette::Result` for CLI output
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use shipmate::error::{Result, ShipError};
//!
//! fn check_cache(path: &Path) -> Result<()> {
//!     if !path.join("HEAD").exists() {
//!         return Err(ShipError::Config(format!(
//!             "'{}' does not look like a bare repository",
//!             path.display()
//!         )));
//!     }
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::process::CommandStatus;

/// Error types that can occur in shipmate operations
#[derive(Error, Debug, Diagnostic)]
pub enum ShipError {
    /// The initial bare clone of the remote repository failed.
    ///
    /// Without a cache there is nothing to build from, so this aborts the
    /// whole run.
    #[error("Failed to clone '{url}' into '{path}' ({status})")]
    #[diagnostic(
        code(shipmate::cache::clone_error),
        help("Check that the remote URL is correct and reachable with your git credentials.")
    )]
    Clone {
        /// Remote repository URL
        url: String,
        /// Cache path the clone was written to
        path: PathBuf,
        /// Exit status of the VCS client
        status: CommandStatus,
        /// Captured standard error of the VCS client
        stderr: String,
    },

    /// Fetching the latest refs into the cache failed.
    ///
    /// A stale or partially updated cache could produce images from the
    /// wrong source, so this is fatal.
    #[error("Failed to sync cache '{path}' with '{url}' ({status})")]
    #[diagnostic(
        code(shipmate::cache::sync_error),
        help("Check network access to the remote, or delete the cache directory to re-clone.")
    )]
    Sync {
        /// Remote repository URL
        url: String,
        /// Cache path being refreshed
        path: PathBuf,
        /// Exit status of the VCS client
        status: CommandStatus,
        /// Captured standard error of the VCS client
        stderr: String,
    },

    /// The cache path exists but is not a bare repository.
    #[error("Cache at '{path}' is not a bare repository")]
    #[diagnostic(
        code(shipmate::cache::invalid),
        help("Point --name at an empty location or an existing bare clone.")
    )]
    CacheInvalid {
        /// Cache path that failed to open
        path: PathBuf,
        /// The underlying git error
        #[source]
        source: git2::Error,
    },

    /// The requested revision does not exist in the cache.
    #[error("Revision '{revision}' not found in cache '{cache}'")]
    #[diagnostic(
        code(shipmate::extract::revision_not_found),
        help("Check --rev; branches and tags are refreshed on every run.")
    )]
    RevisionNotFound {
        /// Revision that failed to resolve
        revision: String,
        /// Cache that was searched
        cache: PathBuf,
        /// The underlying git error
        #[source]
        source: git2::Error,
    },

    /// Materializing a revision into a workspace failed.
    #[error("Failed to extract '{revision}' into '{destination}': `{command}` ({status})")]
    #[diagnostic(code(shipmate::extract::error))]
    Extract {
        /// Revision being extracted
        revision: String,
        /// Workspace directory being populated
        destination: PathBuf,
        /// The command line that failed
        command: String,
        /// Exit status of the failing command
        status: CommandStatus,
        /// Captured standard error of the failing command
        stderr: String,
    },

    /// The build engine exited unsuccessfully.
    #[error("Build of '{tag}' failed ({status})")]
    #[diagnostic(code(shipmate::build::failure))]
    BuildFailure {
        /// Rendered image tag
        tag: String,
        /// Exit status of the build engine
        status: CommandStatus,
    },

    /// Two build contexts derived the same image tag in one run.
    ///
    /// Building both would silently overwrite the first image with the
    /// second, so the later context is rejected.
    #[error("Tag '{tag}' derived by '{second}' is already claimed by '{first}'")]
    #[diagnostic(
        code(shipmate::tag::collision),
        help("Rename one of the directories so their flattened paths differ.")
    )]
    TagCollision {
        /// Rendered image tag
        tag: String,
        /// Context that claimed the tag first
        first: PathBuf,
        /// Context rejected for reusing it
        second: PathBuf,
    },

    /// A derived tag is not a valid image reference.
    #[error("Invalid image reference '{tag}': {reason}")]
    #[diagnostic(
        code(shipmate::tag::invalid),
        help(
            "Repository names must be lowercase; tags may only contain letters, digits, '_', '.' \
             and '-' (max 128 characters)."
        )
    )]
    InvalidTag {
        /// Rendered image reference
        tag: String,
        /// Which rule it breaks
        reason: String,
    },

    /// A context's workspace would land on top of the cache.
    #[error("Workspace '{workspace}' would overwrite the cache at '{cache}'")]
    #[diagnostic(
        code(shipmate::workspace::conflict),
        help("Keep the cache outside the scan root, or give it a name no context directory uses.")
    )]
    WorkspaceConflict {
        /// Workspace path derived for the context
        workspace: PathBuf,
        /// Repository cache path
        cache: PathBuf,
    },

    /// The shallow-clone strategy was given something other than a branch or
    /// tag.
    #[error("Revision '{revision}' ({oid}) is not a branch or tag; shallow clones need a named ref")]
    #[diagnostic(
        code(shipmate::extract::shallow_clone_needs_ref),
        help("Pass a branch or tag to --rev, or use --strategy archive to build a commit id.")
    )]
    ShallowCloneNeedsRef {
        /// Revision as given
        revision: String,
        /// Commit it resolved to
        oid: String,
    },

    /// The directory walk hit an unreadable entry.
    #[error("Failed to walk '{path}'")]
    #[diagnostic(code(shipmate::discovery::walk_error))]
    Walk {
        /// Path being visited
        path: PathBuf,
        /// The underlying walkdir error
        #[source]
        source: walkdir::Error,
    },

    /// File system I/O error during shipmate operations.
    #[error("I/O error accessing '{path}'")]
    #[diagnostic(code(shipmate::io_error))]
    Io {
        /// The path that caused the I/O error
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// An external program could not be started at all.
    #[error("Failed to run '{program}'")]
    #[diagnostic(
        code(shipmate::process::spawn_error),
        help("Ensure the program is installed and on PATH, or override it with --git / --engine.")
    )]
    Spawn {
        /// Program that failed to start
        program: String,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Required configuration is missing or inconsistent.
    #[error("Configuration error: {0}")]
    #[diagnostic(
        code(shipmate::config::error),
        help("Check the required configuration parameters.")
    )]
    Config(
        /// Description of the configuration error
        String,
    ),

    /// One or more build contexts failed.
    #[error("{failed} of {attempted} build context(s) failed")]
    #[diagnostic(
        code(shipmate::run::builds_failed),
        help("See the summary above for the failing tags.")
    )]
    BuildsFailed {
        /// Number of contexts with a recorded failure
        failed: usize,
        /// Number of contexts attempted
        attempted: usize,
    },
}

impl ShipError {
    /// Whether this error must abort the whole run.
    ///
    /// Everything else is attached to the build context that produced it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ShipError::Clone { .. } | ShipError::Sync { .. } | ShipError::CacheInvalid { .. }
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ShipError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Type alias for Results in this crate
pub type Result<T> = std::result::Result<T, ShipError>;
