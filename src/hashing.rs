use std::fs::File;
use std::path::Path;

use blake3::Hasher;
use memmap2::Mmap;
use walkdir::WalkDir;

use crate::error::{Result, ShipError};

/// Computes the BLAKE3 hash of a file using memory mapping and parallel
/// processing.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or memory mapped.
pub fn hash_file(path: &Path) -> Result<blake3::Hash> {
    let file = File::open(path).map_err(|source| ShipError::io(path, source))?;
    let len = file
        .metadata()
        .map_err(|source| ShipError::io(path, source))?
        .len();

    // Mapping a zero-length file fails on some platforms
    if len == 0 {
        return Ok(Hasher::new().finalize());
    }

    let mmap = unsafe { Mmap::map(&file) }.map_err(|source| ShipError::io(path, source))?;

    let mut hasher = Hasher::new();
    hasher.update_rayon(&mmap);
    Ok(hasher.finalize())
}

/// Digest of a directory tree: every entry's relative path, its kind, and
/// for files the content hash, folded in file-name order.
///
/// Two trees with the same digest have the same layout and contents. A
/// top-level `.git` directory (present after a shallow-clone extraction) is
/// left out so both extraction strategies digest the same source.
pub fn tree_digest(root: &Path) -> Result<String> {
    let mut hasher = Hasher::new();

    let walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !(e.depth() == 1 && e.file_name() == ".git"));

    for entry in walker {
        let entry = entry.map_err(|source| ShipError::Walk {
            path: root.to_path_buf(),
            source,
        })?;
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let file_type = entry.file_type();

        let kind: &[u8] = if file_type.is_dir() {
            b"d"
        } else if file_type.is_symlink() {
            b"l"
        } else {
            b"f"
        };
        hasher.update(kind);
        hasher.update(relative.to_string_lossy().as_bytes());
        hasher.update(b"\0");

        if file_type.is_symlink() {
            let target = std::fs::read_link(entry.path())
                .map_err(|source| ShipError::io(entry.path(), source))?;
            hasher.update(target.to_string_lossy().as_bytes());
        } else if file_type.is_file() {
            hasher.update(hash_file(entry.path())?.as_bytes());
        }
        hasher.update(b"\0");
    }

    Ok(hasher.finalize().to_hex().to_string())
}
