//! Per-context workspaces.
//!
//! Each build context gets a private directory, `<context>/<cache dir name>`,
//! holding a fresh extraction of the revision. The directory is wiped before
//! extraction and removed after the build, so no state leaks from one run to
//! the next.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::cache::{ExtractStrategy, RepositoryCache, reset_dir};
use crate::discovery::BuildContext;
use crate::error::{Result, ShipError};
use crate::hashing::tree_digest;
use crate::logging::Logger;
use crate::paths::resolve_path;

/// A materialized copy of the revision for one build context.
#[derive(Debug)]
pub struct Workspace {
    context: BuildContext,
    materialized_path: PathBuf,
    digest: String,
}

impl Workspace {
    pub fn context(&self) -> &BuildContext {
        &self.context
    }

    pub fn path(&self) -> &Path {
        &self.materialized_path
    }

    /// BLAKE3 digest of the extracted tree.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Remove the workspace directory.
    pub fn dispose(self) -> Result<()> {
        if self.materialized_path.exists() {
            fs::remove_dir_all(&self.materialized_path)
                .map_err(|source| ShipError::io(&self.materialized_path, source))?;
        }
        Ok(())
    }
}

/// Populates workspaces from the repository cache.
pub struct WorkspaceMaterializer<'c, 'r> {
    cache: &'c RepositoryCache<'r>,
    strategy: ExtractStrategy,
    log: Logger,
}

impl<'c, 'r> WorkspaceMaterializer<'c, 'r> {
    pub fn new(cache: &'c RepositoryCache<'r>, strategy: ExtractStrategy) -> Self {
        Self {
            cache,
            strategy,
            log: Logger::new(0, true),
        }
    }

    pub fn logger(mut self, log: Logger) -> Self {
        self.log = log;
        self
    }

    /// Where the workspace for `context` lives.
    pub fn workspace_path(&self, context: &BuildContext) -> PathBuf {
        context.absolute_path().join(self.cache.dir_name())
    }

    /// Clear the context's workspace directory and extract `revision` into it.
    ///
    /// On failure the partially populated directory is removed before the
    /// error is returned. A workspace that would land on the cache, or
    /// contain it, is refused before anything is deleted.
    pub fn materialize(&self, revision: &str, context: &BuildContext) -> Result<Workspace> {
        let path = self.workspace_path(context);
        let cache = resolve_path(self.cache.path());
        let workspace = resolve_path(&path);
        if workspace.starts_with(&cache) || cache.starts_with(&workspace) {
            return Err(ShipError::WorkspaceConflict {
                workspace: path,
                cache: self.cache.path().to_path_buf(),
            });
        }
        reset_dir(&path)?;

        let digest = self
            .cache
            .extract_revision(revision, &path, self.strategy)
            .and_then(|()| tree_digest(&path));

        match digest {
            Ok(digest) => {
                self.log.verbose(
                    1,
                    format!("Materialized {} (digest {})", path.display(), &digest[..12]),
                );
                Ok(Workspace {
                    context: context.clone(),
                    materialized_path: path,
                    digest,
                })
            }
            Err(err) => {
                if let Err(cleanup) = fs::remove_dir_all(&path)
                    && cleanup.kind() != io::ErrorKind::NotFound
                {
                    self.log.warn(format!(
                        "Could not remove partial workspace {}: {cleanup}",
                        path.display()
                    ));
                }
                Err(err)
            }
        }
    }
}
