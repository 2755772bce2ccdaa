//! The local repository cache.
//!
//! The cache is a bare mirror of the remote: it has no working tree, so it is
//! never built from directly and concurrent extractions cannot race on shared
//! checkout state. Every build context gets its own fresh extraction through
//! [`RepositoryCache::extract_revision`].
//!
//! All operations address the mirror with `--git-dir <path>`; the process
//! working directory is never changed.

use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};

use git2::{Oid, Repository};

use crate::error::{Result, ShipError};
use crate::logging::Logger;
use crate::paths::normalize_path;
use crate::process::{CommandRunner, CommandSpec};

/// Revision built when none is given.
pub const DEFAULT_REVISION: &str = "master";

const TAR_PROGRAM: &str = "tar";

/// What to fetch and which snapshot of it to build.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteSpec {
    url: String,
    revision: String,
}

impl RemoteSpec {
    pub fn new(url: impl Into<String>, revision: Option<String>) -> Self {
        Self {
            url: url.into(),
            revision: revision
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| DEFAULT_REVISION.to_string()),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn revision(&self) -> &str {
        &self.revision
    }
}

/// How a revision is materialized out of the bare mirror.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ExtractStrategy {
    /// `git archive` piped through `tar`; the workspace has no `.git`.
    #[default]
    Archive,
    /// `git clone --depth 1` from the mirror.
    ShallowClone,
}

/// A bare local mirror of a remote repository.
pub struct RepositoryCache<'r> {
    path: PathBuf,
    git: OsString,
    runner: &'r dyn CommandRunner,
    log: Logger,
    synced: bool,
}

impl<'r> RepositoryCache<'r> {
    pub fn new(path: impl AsRef<Path>, runner: &'r dyn CommandRunner) -> Self {
        Self {
            path: normalize_path(path),
            git: OsString::from("git"),
            runner,
            log: Logger::new(0, true),
            synced: false,
        }
    }

    /// Use a different VCS client binary.
    pub fn git_program(mut self, git: impl AsRef<OsStr>) -> Self {
        self.git = git.as_ref().to_os_string();
        self
    }

    pub fn logger(mut self, log: Logger) -> Self {
        self.log = log;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Final path segment of the cache, e.g. `myapp.git`.
    pub fn dir_name(&self) -> OsString {
        self.path
            .file_name()
            .map(OsStr::to_os_string)
            .unwrap_or_else(|| OsString::from("source"))
    }

    /// Repository name used for image tags: the cache directory name without
    /// a trailing `.git`.
    pub fn repo_name(&self) -> String {
        let name = self.dir_name().to_string_lossy().into_owned();
        match name.strip_suffix(".git") {
            Some(stripped) if !stripped.is_empty() => stripped.to_string(),
            _ => name,
        }
    }

    /// Clone the remote into the cache if the cache does not exist yet.
    ///
    /// Returns `true` when a clone was performed. An existing cache must open
    /// as a bare repository.
    pub fn ensure_cloned(&self, remote: &RemoteSpec) -> Result<bool> {
        if self.path.exists() {
            self.open()?;
            return Ok(false);
        }

        self.log.info(format!(
            "No cache at {}. Cloning {}",
            self.path.display(),
            remote.url()
        ));

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| ShipError::io(parent, source))?;
        }

        let clone = CommandSpec::new(&self.git)
            .args(["clone", "--bare"])
            .arg(remote.url())
            .arg(&self.path);
        let output = self.runner.run(&clone)?;
        if !output.success() {
            return Err(ShipError::Clone {
                url: remote.url().to_string(),
                path: self.path.clone(),
                status: output.status,
                stderr: output.stderr,
            });
        }

        Ok(true)
    }

    /// Bring the cache up to date with the remote, cloning it first if needed.
    ///
    /// Branches are mirrored into `refs/heads/*` so that a branch revision
    /// resolves to the fetched tip rather than the state at clone time.
    pub fn sync(&mut self, remote: &RemoteSpec) -> Result<()> {
        self.ensure_cloned(remote)?;

        self.log
            .verbose(1, format!("Fetching {} into {}", remote.url(), self.path.display()));

        let fetch = self
            .git_dir_command()
            .args(["fetch", "--prune", "--tags"])
            .arg(remote.url())
            .arg("+refs/heads/*:refs/heads/*");
        let output = self.runner.run(&fetch)?;
        if !output.success() {
            return Err(ShipError::Sync {
                url: remote.url().to_string(),
                path: self.path.clone(),
                status: output.status,
                stderr: output.stderr,
            });
        }

        self.synced = true;
        Ok(())
    }

    /// Resolve `revision` against the mirror.
    pub fn resolve(&self, revision: &str) -> Result<Oid> {
        let repo = self.open()?;
        let object = repo
            .revparse_single(revision)
            .map_err(|source| ShipError::RevisionNotFound {
                revision: revision.to_string(),
                cache: self.path.clone(),
                source,
            })?;
        Ok(object.id())
    }

    /// Write the full tree of `revision` into `destination`.
    ///
    /// `destination` is removed and recreated first, so repeating the call
    /// with the same inputs yields the same tree.
    pub fn extract_revision(
        &self,
        revision: &str,
        destination: &Path,
        strategy: ExtractStrategy,
    ) -> Result<()> {
        let oid = self.resolve(revision)?;
        if strategy == ExtractStrategy::ShallowClone && !self.is_named_ref(revision)? {
            return Err(ShipError::ShallowCloneNeedsRef {
                revision: revision.to_string(),
                oid: oid.to_string(),
            });
        }
        self.log.verbose(
            2,
            format!("Extracting {revision} ({oid}) into {}", destination.display()),
        );

        reset_dir(destination)?;

        match strategy {
            ExtractStrategy::Archive => self.extract_archive(revision, destination),
            ExtractStrategy::ShallowClone => self.extract_shallow(revision, destination),
        }
    }

    fn extract_archive(&self, revision: &str, destination: &Path) -> Result<()> {
        let archive = tempfile::Builder::new()
            .prefix("shipmate-")
            .suffix(".tar")
            .tempfile()
            .map_err(|source| ShipError::io(std::env::temp_dir(), source))?
            .into_temp_path();

        let export = self
            .git_dir_command()
            .args(["archive", "--format=tar", "--output"])
            .arg(&*archive)
            .arg(revision);
        self.run_extract_step(&export, revision, destination)?;

        let unpack = CommandSpec::new(TAR_PROGRAM)
            .args(["-x", "-f"])
            .arg(&*archive)
            .arg("-C")
            .arg(destination);
        self.run_extract_step(&unpack, revision, destination)
    }

    fn extract_shallow(&self, revision: &str, destination: &Path) -> Result<()> {
        let source = format!("file://{}", self.path.display());
        let clone = CommandSpec::new(&self.git)
            .args(["clone", "--quiet", "--depth", "1", "--branch"])
            .arg(revision)
            .arg(source)
            .arg(destination);
        self.run_extract_step(&clone, revision, destination)
    }

    fn run_extract_step(
        &self,
        command: &CommandSpec,
        revision: &str,
        destination: &Path,
    ) -> Result<()> {
        let output = self.runner.run(command)?;
        if !output.success() {
            return Err(ShipError::Extract {
                revision: revision.to_string(),
                destination: destination.to_path_buf(),
                command: command.to_string(),
                status: output.status,
                stderr: output.stderr,
            });
        }
        Ok(())
    }

    fn git_dir_command(&self) -> CommandSpec {
        CommandSpec::new(&self.git).arg("--git-dir").arg(&self.path)
    }

    /// Whether `revision` names a branch or tag, which is all
    /// `git clone --branch` accepts.
    fn is_named_ref(&self, revision: &str) -> Result<bool> {
        let repo = self.open()?;
        Ok(["refs/heads/", "refs/tags/"]
            .iter()
            .any(|namespace| repo.find_reference(&format!("{namespace}{revision}")).is_ok()))
    }

    fn open(&self) -> Result<Repository> {
        let repo = Repository::open_bare(&self.path).map_err(|source| ShipError::CacheInvalid {
            path: self.path.clone(),
            source,
        })?;
        if !repo.is_bare() {
            return Err(ShipError::CacheInvalid {
                path: self.path.clone(),
                source: git2::Error::from_str("repository has a working tree"),
            });
        }
        Ok(repo)
    }
}

/// Remove `dir` if present and recreate it empty.
pub(crate) fn reset_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir).map_err(|source| ShipError::io(dir, source))?;
    }
    fs::create_dir_all(dir).map_err(|source| ShipError::io(dir, source))
}
