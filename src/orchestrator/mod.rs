//! The build run: sync the cache once, then discover, materialize and build
//! every context under the scan root.
//!
//! A run moves through `Syncing → Discovering → (Materializing → Building)*`.
//! Cache failures abort it; anything that goes wrong for one context is
//! recorded in the [`RunReport`] and the run carries on with the next one.

use std::ffi::OsString;
use std::path::PathBuf;

use rayon::prelude::*;

use crate::build::{BuildExecutor, DEFAULT_ENGINE, OutputSink};
use crate::cache::{ExtractStrategy, RemoteSpec, RepositoryCache};
use crate::discovery::{BuildContext, ContextDiscoverer, DEFAULT_DESCRIPTOR, PrefixFilter};
use crate::error::{Result, ShipError};
use crate::logging::Logger;
use crate::paths::normalize_path;
use crate::process::CommandRunner;
use crate::tag::{Tag, TagRegistry, derive_tag, validate_repo_name};
use crate::workspace::WorkspaceMaterializer;

mod report;

pub use report::{ContextResult, Outcome, RunReport};

pub struct Orchestrator<'a> {
    remote: RemoteSpec,
    cache_path: PathBuf,
    root: PathBuf,
    prefix: Option<PrefixFilter>,
    descriptor: String,
    strategy: ExtractStrategy,
    jobs: usize,
    git: OsString,
    engine: OsString,
    keep_workspaces: bool,
    dry_run: bool,
    runner: &'a dyn CommandRunner,
    sink: &'a dyn OutputSink,
    log: Logger,
}

pub struct OrchestratorBuilder<'a> {
    remote_url: Option<String>,
    revision: Option<String>,
    cache_path: Option<PathBuf>,
    root: Option<PathBuf>,
    prefix: Option<String>,
    descriptor: String,
    strategy: ExtractStrategy,
    jobs: usize,
    git: OsString,
    engine: OsString,
    keep_workspaces: bool,
    dry_run: bool,
    runner: Option<&'a dyn CommandRunner>,
    sink: Option<&'a dyn OutputSink>,
    verbose: u8,
    quiet: bool,
}

impl Default for OrchestratorBuilder<'_> {
    fn default() -> Self {
        Self {
            remote_url: None,
            revision: None,
            cache_path: None,
            root: None,
            prefix: None,
            descriptor: DEFAULT_DESCRIPTOR.to_string(),
            strategy: ExtractStrategy::default(),
            jobs: 1,
            git: OsString::from("git"),
            engine: OsString::from(DEFAULT_ENGINE),
            keep_workspaces: false,
            dry_run: false,
            runner: None,
            sink: None,
            verbose: 0,
            quiet: false,
        }
    }
}

impl<'a> OrchestratorBuilder<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remote(mut self, url: impl Into<String>) -> Self {
        self.remote_url = Some(url.into());
        self
    }

    pub fn revision(mut self, revision: Option<impl Into<String>>) -> Self {
        self.revision = revision.map(Into::into);
        self
    }

    pub fn cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    pub fn root(mut self, path: impl Into<PathBuf>) -> Self {
        self.root = Some(path.into());
        self
    }

    pub fn prefix(mut self, prefix: Option<impl Into<String>>) -> Self {
        self.prefix = prefix.map(Into::into);
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

    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn git_program(mut self, git: impl Into<OsString>) -> Self {
        self.git = git.into();
        self
    }

    pub fn engine(mut self, engine: impl Into<OsString>) -> Self {
        self.engine = engine.into();
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

    pub fn runner(mut self, runner: &'a dyn CommandRunner) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn sink(mut self, sink: &'a dyn OutputSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn verbose(mut self, verbose: u8) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn build(self) -> Result<Orchestrator<'a>> {
        let url = self
            .remote_url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ShipError::Config("remote URL is required".to_string()))?;
        let cache_path = self
            .cache_path
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| ShipError::Config("cache path is required".to_string()))?;
        let root = self
            .root
            .ok_or_else(|| ShipError::Config("scan root is required".to_string()))?;
        if self.jobs == 0 {
            return Err(ShipError::Config("jobs must be at least 1".to_string()));
        }
        if self.descriptor.is_empty() {
            return Err(ShipError::Config(
                "descriptor file name must not be empty".to_string(),
            ));
        }

        Ok(Orchestrator {
            remote: RemoteSpec::new(url, self.revision),
            cache_path: normalize_path(cache_path),
            root: normalize_path(root),
            prefix: self.prefix.as_deref().and_then(PrefixFilter::new),
            descriptor: self.descriptor,
            strategy: self.strategy,
            jobs: self.jobs,
            git: self.git,
            engine: self.engine,
            keep_workspaces: self.keep_workspaces,
            dry_run: self.dry_run,
            runner: self
                .runner
                .ok_or_else(|| ShipError::Config("command runner is required".to_string()))?,
            sink: self
                .sink
                .ok_or_else(|| ShipError::Config("output sink is required".to_string()))?,
            log: Logger::new(self.verbose, self.quiet),
        })
    }
}

impl<'a> Orchestrator<'a> {
    pub fn builder() -> OrchestratorBuilder<'a> {
        OrchestratorBuilder::new()
    }

    pub fn remote(&self) -> &RemoteSpec {
        &self.remote
    }

    /// Execute the run.
    ///
    /// Returns `Err` only for fatal errors (invalid repository name, cache
    /// clone or sync failure). Per-context failures are in the report.
    pub fn run(&self) -> Result<RunReport> {
        let mut cache = RepositoryCache::new(&self.cache_path, self.runner)
            .git_program(&self.git)
            .logger(self.log);

        let repo_name = cache.repo_name();
        validate_repo_name(&repo_name).map_err(|err| {
            ShipError::Config(format!(
                "cannot derive image names from cache '{}': {err}",
                self.cache_path.display()
            ))
        })?;

        if !self.root.is_dir() {
            return Err(ShipError::Config(format!(
                "scan root '{}' is not a directory",
                self.root.display()
            )));
        }

        if self.dry_run {
            self.log.info("Dry run: skipping cache sync, extraction and builds");
        } else {
            self.log.info(format!(
                "Syncing {} with {}",
                cache.path().display(),
                self.remote.url()
            ));
            cache.sync(&self.remote)?;
        }

        let discoverer = ContextDiscoverer::new(&self.root, cache.path())
            .descriptor(&self.descriptor)
            .workspace_name(cache.dir_name())
            .prefix(self.prefix.clone());
        let materializer = WorkspaceMaterializer::new(&cache, self.strategy).logger(self.log);
        let executor = BuildExecutor::new(self.runner)
            .engine(&self.engine)
            .descriptor(&self.descriptor);

        self.log.verbose(
            1,
            format!("Discovering build contexts under {}", discoverer.root().display()),
        );

        let contexts = discoverer.discover().filter_map(|item| match item {
            Ok(context) => Some(context),
            Err(err) => {
                self.log.warn(format!("{err}; skipping"));
                None
            }
        });

        let mut registry = TagRegistry::new();
        let mut report = RunReport::default();

        if self.jobs <= 1 {
            for context in contexts {
                let tag = self.claim_tag(&repo_name, &context, &mut registry);
                report.record(self.process(context, tag, &materializer, &executor));
            }
        } else {
            // Tags are claimed in discovery order before any build starts so
            // collision handling does not depend on worker scheduling.
            let planned: Vec<(BuildContext, Result<Tag>)> = contexts
                .map(|context| {
                    let tag = self.claim_tag(&repo_name, &context, &mut registry);
                    (context, tag)
                })
                .collect();

            self.log.verbose(
                1,
                format!("Building {} context(s) with {} workers", planned.len(), self.jobs),
            );

            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.jobs)
                .build()
                .map_err(|err| ShipError::Config(format!("failed to start worker pool: {err}")))?;

            let results: Vec<ContextResult> = pool.install(|| {
                planned
                    .into_par_iter()
                    .map(|(context, tag)| self.process(context, tag, &materializer, &executor))
                    .collect()
            });

            for result in results {
                report.record(result);
            }
        }

        Ok(report)
    }

    fn claim_tag(
        &self,
        repo_name: &str,
        context: &BuildContext,
        registry: &mut TagRegistry,
    ) -> Result<Tag> {
        let tag = derive_tag(repo_name, self.remote.revision(), context.root_relative_path());
        tag.validate()?;
        registry.claim(&tag, context)?;
        Ok(tag)
    }

    /// Materialize and build one context.
    fn process(
        &self,
        context: BuildContext,
        tag: Result<Tag>,
        materializer: &WorkspaceMaterializer<'_, '_>,
        executor: &BuildExecutor<'_>,
    ) -> ContextResult {
        let tag = match tag {
            Ok(tag) => tag,
            Err(err) => {
                self.log.warn(format!("Skipping {}: {err}", context.display_name()));
                return ContextResult::failed(context, None, None, err);
            }
        };

        if self.dry_run {
            self.log
                .info(format!("Would build {tag} from {}", context.display_name()));
            return ContextResult::planned(context, tag);
        }

        self.log
            .info(format!("Building {tag} from {}", context.display_name()));

        let workspace = match materializer.materialize(self.remote.revision(), &context) {
            Ok(workspace) => workspace,
            Err(err) => {
                self.log.warn(format!("Could not prepare {tag}: {err}"));
                return ContextResult::failed(context, Some(tag), None, err);
            }
        };

        let outcome = executor.build(&workspace, &tag, self.sink);
        let digest = workspace.digest().to_string();

        if self.keep_workspaces {
            self.log
                .verbose(1, format!("Keeping workspace {}", workspace.path().display()));
        } else if let Err(err) = workspace.dispose() {
            self.log.warn(format!("Failed to remove workspace: {err}"));
        }

        match outcome {
            Ok(()) => ContextResult::built(context, tag, digest),
            Err(err) => {
                self.log.warn(format!("{err}"));
                ContextResult::failed(context, Some(tag), Some(digest), err)
            }
        }
    }
}
