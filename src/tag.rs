//! Image tag derivation.
//!
//! Tags are derived purely from the repository name, the revision and the
//! context's path relative to the scan root, so the same tree always yields
//! the same tags. Path separators are flattened to `-`, which means distinct
//! paths such as `a/b` and `a-b` can render identically; [`TagRegistry`]
//! catches that within a run.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::discovery::BuildContext;
use crate::error::{Result, ShipError};

const DELIMITER: &str = "-";

/// Image reference `repo_name:revision[-suffix]`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Tag {
    repo_name: String,
    revision: String,
    suffix: String,
}

impl Tag {
    pub fn repo_name(&self) -> &str {
        &self.repo_name
    }

    pub fn revision(&self) -> &str {
        &self.revision
    }

    /// Flattened root-relative path; empty for a context at the scan root.
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// The part after the `:`.
    pub fn tag_component(&self) -> String {
        if self.suffix.is_empty() {
            self.revision.clone()
        } else {
            format!("{}{DELIMITER}{}", self.revision, self.suffix)
        }
    }

    /// Check the rendered reference against the registry grammar.
    pub fn validate(&self) -> Result<()> {
        validate_repo_name(&self.repo_name)?;

        let component = self.tag_component();
        if !tag_component_re().is_match(&component) {
            return Err(ShipError::InvalidTag {
                tag: self.to_string(),
                reason: "tag must match [A-Za-z0-9_][A-Za-z0-9_.-]{0,127}".to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repo_name, self.tag_component())
    }
}

/// Derive the tag for a context at `root_relative_path`.
pub fn derive_tag(repo_name: &str, revision: &str, root_relative_path: &Path) -> Tag {
    Tag {
        repo_name: repo_name.to_string(),
        revision: revision.replace('/', DELIMITER),
        suffix: flatten(root_relative_path),
    }
}

fn flatten(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(segment) => Some(segment.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(DELIMITER)
}

/// Check that `name` is usable as the repository part of an image reference.
pub fn validate_repo_name(name: &str) -> Result<()> {
    if !repo_name_re().is_match(name) {
        return Err(ShipError::InvalidTag {
            tag: name.to_string(),
            reason: "repository name must be lowercase alphanumerics separated by '.', '_', \
                     '__' or '-'"
                .to_string(),
        });
    }
    Ok(())
}

fn repo_name_re() -> &'static Regex {
    static REPO_NAME_RE: OnceLock<Regex> = OnceLock::new();
    REPO_NAME_RE.get_or_init(|| {
        Regex::new(r"^[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*$")
            .expect("repository name regex should compile")
    })
}

fn tag_component_re() -> &'static Regex {
    static TAG_RE: OnceLock<Regex> = OnceLock::new();
    TAG_RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$").expect("tag regex should compile")
    })
}

/// Tags claimed so far in one run.
#[derive(Debug, Default)]
pub struct TagRegistry {
    claimed: HashMap<String, PathBuf>,
}

impl TagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `tag` for `context`.
    ///
    /// The first context to claim a rendered tag keeps it; any later context
    /// rendering the same tag gets [`ShipError::TagCollision`].
    pub fn claim(&mut self, tag: &Tag, context: &BuildContext) -> Result<()> {
        match self.claimed.entry(tag.to_string()) {
            Entry::Occupied(existing) => Err(ShipError::TagCollision {
                tag: tag.to_string(),
                first: existing.get().clone(),
                second: context.absolute_path().to_path_buf(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(context.absolute_path().to_path_buf());
                Ok(())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.claimed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claimed.is_empty()
    }
}
