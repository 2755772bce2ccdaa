//! Build context discovery.
//!
//! A build context is any directory under the scan root that directly
//! contains a build descriptor (a `Dockerfile` by default). Discovery is a
//! lazy walk: contexts are yielded as the walk reaches them, so callers can
//! start building before the tree is fully scanned or collect everything up
//! front.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::error::{Result, ShipError};
use crate::paths::{relative_to, resolve_path};

/// File name that marks a directory as a build context.
pub const DEFAULT_DESCRIPTOR: &str = "Dockerfile";

/// A directory in the scanned tree that holds a build descriptor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildContext {
    root_relative_path: PathBuf,
    absolute_path: PathBuf,
}

impl BuildContext {
    pub fn new(root_relative_path: impl Into<PathBuf>, absolute_path: impl Into<PathBuf>) -> Self {
        Self {
            root_relative_path: root_relative_path.into(),
            absolute_path: absolute_path.into(),
        }
    }

    /// Location relative to the scan root; empty for the root itself.
    pub fn root_relative_path(&self) -> &Path {
        &self.root_relative_path
    }

    pub fn absolute_path(&self) -> &Path {
        &self.absolute_path
    }

    /// Human-readable location, `.` for the scan root.
    pub fn display_name(&self) -> String {
        if self.root_relative_path.as_os_str().is_empty() {
            ".".to_string()
        } else {
            self.root_relative_path.display().to_string()
        }
    }
}

/// Restricts discovery to contexts below a root-relative path.
///
/// Matching is done on whole path segments: `services` admits `services/api`
/// but neither `service/api` nor `services-old/api`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrefixFilter {
    value: PathBuf,
}

impl PrefixFilter {
    /// Returns `None` for an empty filter, which means "no restriction".
    pub fn new(value: &str) -> Option<Self> {
        let trimmed = value.trim_start_matches(std::path::is_separator);
        if trimmed.is_empty() {
            return None;
        }
        Some(Self {
            value: PathBuf::from(trimmed),
        })
    }

    pub fn value(&self) -> &Path {
        &self.value
    }

    pub fn matches(&self, root_relative_path: &Path) -> bool {
        root_relative_path.starts_with(&self.value)
    }
}

/// Walks a tree and yields the build contexts inside it.
#[derive(Clone, Debug)]
pub struct ContextDiscoverer {
    root: PathBuf,
    cache: PathBuf,
    descriptor: OsString,
    workspace_name: Option<OsString>,
    prefix: Option<PrefixFilter>,
}

impl ContextDiscoverer {
    /// Discover below `root`, never entering `cache_path`.
    pub fn new(root: impl AsRef<Path>, cache_path: impl AsRef<Path>) -> Self {
        Self {
            root: resolve_path(root),
            cache: resolve_path(cache_path),
            descriptor: OsString::from(DEFAULT_DESCRIPTOR),
            workspace_name: None,
            prefix: None,
        }
    }

    /// File name of the build descriptor.
    pub fn descriptor(mut self, name: impl AsRef<OsStr>) -> Self {
        self.descriptor = name.as_ref().to_os_string();
        self
    }

    /// Directory name used for materialized workspaces. A directory with this
    /// name sitting next to a descriptor is a previous extraction and is
    /// never walked.
    pub fn workspace_name(mut self, name: impl AsRef<OsStr>) -> Self {
        self.workspace_name = Some(name.as_ref().to_os_string());
        self
    }

    pub fn prefix(mut self, prefix: Option<PrefixFilter>) -> Self {
        self.prefix = prefix;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lazily walk the tree in file-name order.
    ///
    /// Unreadable entries are yielded as [`ShipError::Walk`]; the walk carries
    /// on past them.
    pub fn discover(&self) -> impl Iterator<Item = Result<BuildContext>> + '_ {
        WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| !self.is_excluded(entry))
            .filter_map(move |entry| match entry {
                Ok(entry) => self.context_for(&entry).map(Ok),
                Err(source) => Some(Err(ShipError::Walk {
                    path: source
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| self.root.clone()),
                    source,
                })),
            })
    }

    fn is_excluded(&self, entry: &DirEntry) -> bool {
        if !entry.file_type().is_dir() {
            return false;
        }

        let path = entry.path();
        if path.starts_with(&self.cache) {
            return true;
        }

        if let Some(name) = &self.workspace_name
            && entry.file_name() == name.as_os_str()
            && let Some(parent) = path.parent()
        {
            return parent.join(&self.descriptor).is_file();
        }

        false
    }

    fn context_for(&self, entry: &DirEntry) -> Option<BuildContext> {
        if !entry.file_type().is_file() || entry.file_name() != self.descriptor.as_os_str() {
            return None;
        }

        let dir = entry.path().parent()?;
        let relative = relative_to(dir, &self.root);
        if let Some(prefix) = &self.prefix
            && !prefix.matches(&relative)
        {
            return None;
        }

        Some(BuildContext::new(relative, dir))
    }
}
