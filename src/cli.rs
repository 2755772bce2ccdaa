//! Command-line interface definitions for shipmate.
//!
//! Every option can also be supplied through a `SHIPMATE_*` environment
//! variable, which is how CI pipelines usually configure the tool.
//!
//! # Example
//!
//! ```no_run
//! use shipmate::cli::Cli;
//!
//! let cli = Cli::parse_args();
//! println!("building {} at {}", cli.remote(), cli.rev());
//! ```

use std::path::{Path, PathBuf};

use clap::Parser;

use crate::build::DEFAULT_ENGINE;
use crate::cache::{DEFAULT_REVISION, ExtractStrategy};
use crate::discovery::DEFAULT_DESCRIPTOR;
use crate::error::{Result, ShipError};
use crate::paths::normalize_path;


/// Build container images for every Dockerfile in a tree from one revision
/// of a remote repository.
#[derive(Debug, Parser)]
#[command(
    name = "shipmate",
    bin_name = "shipmate",
    author,
    version,
    about = "Build container images for every Dockerfile in a tree from one revision of a remote repository",
    long_about = None
)]
pub struct Cli {
    /// URL of the remote repository
    #[arg(long, env = "SHIPMATE_REMOTE")]
    remote: String,

    /// Path of the local bare cache; its last segment names the images
    #[arg(long, env = "SHIPMATE_NAME")]
    name: PathBuf,

    /// Branch, tag or commit to build
    #[arg(long, default_value = DEFAULT_REVISION, env = "SHIPMATE_REV")]
    rev: String,

    /// Only build contexts under this path (relative to the scan root)
    #[arg(long, env = "SHIPMATE_PREFIX")]
    prefix: Option<String>,

    /// Directory to scan for build contexts (defaults to the current directory)
    #[arg(long, env = "SHIPMATE_ROOT")]
    root: Option<PathBuf>,

    /// File name that marks a directory as a build context
    #[arg(long, default_value = DEFAULT_DESCRIPTOR, env = "SHIPMATE_DESCRIPTOR")]
    descriptor: String,

    /// How each workspace is populated from the cache
    #[arg(long, value_enum, default_value_t = ExtractStrategy::Archive, env = "SHIPMATE_STRATEGY")]
    strategy: ExtractStrategy,

    /// Number of builds to run at once
    #[arg(
        short,
        long,
        default_value = "1",
        value_parser = clap::value_parser!(u16).range(1..),
        env = "SHIPMATE_JOBS"
    )]
    jobs: u16,

    /// Container build engine to invoke
    #[arg(long, default_value = DEFAULT_ENGINE, env = "SHIPMATE_ENGINE")]
    engine: String,

    /// Git executable
    #[arg(long, default_value = "git", env = "SHIPMATE_GIT")]
    git: String,

    /// Leave workspaces in place after building
    #[arg(long, env = "SHIPMATE_KEEP_WORKSPACES")]
    keep_workspaces: bool,

    /// Discover contexts and print the tags that would be built
    #[arg(long, env = "SHIPMATE_DRY_RUN")]
    dry_run: bool,

    /// Enable verbose output (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count, env = "SHIPMATE_VERBOSE")]
    verbose: u8,

    /// Silence all output except for errors and build output
    #[arg(short, long, conflicts_with = "verbose", env = "SHIPMATE_QUIET")]
    quiet: bool,
}

impl Cli {
    /// Parse the process arguments.
    ///
    /// Help and version requests exit 0. Any other parse error prints usage
    /// to stderr and exits 1.
    pub fn parse_args() -> Self {
        match Self::try_parse() {
            Ok(cli) => cli,
            Err(err) if !err.use_stderr() => err.exit(),
            Err(err) => {
                let _ = err.print();
                std::process::exit(1);
            }
        }
    }

    /// Create a builder for programmatic construction
    pub fn builder() -> CliBuilder {
        CliBuilder::default()
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    /// Cache path as given on the command line
    pub fn name(&self) -> &Path {
        &self.name
    }

    pub fn rev(&self) -> &str {
        &self.rev
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Absolute cache path, resolved against `working_dir` when relative.
    pub fn cache_path(&self, working_dir: Option<&Path>) -> PathBuf {
        resolve_against(&self.name, working_dir)
    }

    /// Absolute scan root: `--root` if given, otherwise the working directory.
    pub fn scan_root(&self, working_dir: Option<&Path>) -> PathBuf {
        match &self.root {
            Some(root) => resolve_against(root, working_dir),
            None => normalize_path(working_dir.unwrap_or_else(|| Path::new("."))),
        }
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn strategy(&self) -> ExtractStrategy {
        self.strategy
    }

    pub fn jobs(&self) -> usize {
        usize::from(self.jobs)
    }

    pub fn engine(&self) -> &str {
        &self.engine
    }

    pub fn git(&self) -> &str {
        &self.git
    }

    pub fn keep_workspaces(&self) -> bool {
        self.keep_workspaces
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn verbose(&self) -> u8 {
        self.verbose
    }

    pub fn quiet(&self) -> bool {
        self.quiet
    }
}

fn resolve_against(path: &Path, working_dir: Option<&Path>) -> PathBuf {
    match working_dir {
        Some(dir) if path.is_relative() => normalize_path(dir.join(path)),
        _ => normalize_path(path),
    }
}

/// Builder for [`Cli`]
#[derive(Debug)]
pub struct CliBuilder {
    remote: Option<String>,
    name: Option<PathBuf>,
    rev: String,
    prefix: Option<String>,
    root: Option<PathBuf>,
    descriptor: String,
    strategy: ExtractStrategy,
    jobs: u16,
    engine: String,
    git: String,
    keep_workspaces: bool,
    dry_run: bool,
    verbose: u8,
    quiet: bool,
}

impl Default for CliBuilder {
    fn default() -> Self {
        Self {
            remote: None,
            name: None,
            rev: DEFAULT_REVISION.to_string(),
            prefix: None,
            root: None,
            descriptor: DEFAULT_DESCRIPTOR.to_string(),
            strategy: ExtractStrategy::default(),
            jobs: 1,
            engine: DEFAULT_ENGINE.to_string(),
            git: "git".to_string(),
            keep_workspaces: false,
            dry_run: false,
            verbose: 0,
            quiet: false,
        }
    }
}

impl CliBuilder {
    /// Set the remote URL
    pub fn remote(mut self, url: impl Into<String>) -> Self {
        self.remote = Some(url.into());
        self
    }

    /// Set the cache path
    pub fn name(mut self, path: impl Into<PathBuf>) -> Self {
        self.name = Some(path.into());
        self
    }

    /// Set the revision
    pub fn rev(mut self, rev: impl Into<String>) -> Self {
        self.rev = rev.into();
        self
    }

    /// Restrict builds to a path prefix
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Set the scan root
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn descriptor(mut self, name: impl Into<String>) -> Self {
        self.descriptor = name.into();
        self
    }

    pub fn strategy(mut self, strategy: ExtractStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn jobs(mut self, jobs: u16) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = engine.into();
        self
    }

    pub fn git(mut self, git: impl Into<String>) -> Self {
        self.git = git.into();
        self
    }

    pub fn keep_workspaces(mut self, keep: bool) -> Self {
        self.keep_workspaces = keep;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Set the verbose level
    pub fn verbose(mut self, level: u8) -> Self {
        self.verbose = level;
        self
    }

    /// Enable quiet mode
    pub fn quiet(mut self, enabled: bool) -> Self {
        self.quiet = enabled;
        self
    }

    /// Build the Cli instance
    pub fn build(self) -> Result<Cli> {
        let remote = self
            .remote
            .ok_or_else(|| ShipError::Config("--remote is required".to_string()))?;
        let name = self
            .name
            .ok_or_else(|| ShipError::Config("--name is required".to_string()))?;
        if self.jobs == 0 {
            return Err(ShipError::Config("--jobs must be at least 1".to_string()));
        }

        Ok(Cli {
            remote,
            name,
            rev: self.rev,
            prefix: self.prefix,
            root: self.root,
            descriptor: self.descriptor,
            strategy: self.strategy,
            jobs: self.jobs,
            engine: self.engine,
            git: self.git,
            keep_workspaces: self.keep_workspaces,
            dry_run: self.dry_run,
            verbose: self.verbose,
            quiet: self.quiet,
        })
    }
}
