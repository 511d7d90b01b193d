//! Directory fingerprints.
//!
//! A fingerprint summarizes the metadata of every relevant source file in a
//! tree: relative path, size and modification time. Contents are never read,
//! so fingerprinting a large tree is cheap. Callers compare fingerprints to
//! decide whether a previous index can be reused.

use crate::skip::SkipFilter;
use crate::{Error, Result};
use std::fmt;
use std::path::Path;
use std::time::UNIX_EPOCH;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Fingerprint {
    /// No file with a matching extension was found
    Empty,
    /// Hex BLAKE3 digest
    Digest(String),
}

impl Fingerprint {
    pub fn is_empty(&self) -> bool {
        matches!(self, Fingerprint::Empty)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Fingerprint::Empty => "empty",
            Fingerprint::Digest(hex) => hex,
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct FileStamp {
    path: String,
    size: u64,
    mtime_nanos: u128,
}

/// Fingerprint the files under `root` whose extension is one of `extensions`
/// (case-insensitive, leading dot optional).
pub fn compute(root: &Path, extensions: &[&str]) -> Result<Fingerprint> {
    compute_with_excludes(root, extensions, &[])
}

pub fn compute_with_excludes(
    root: &Path,
    extensions: &[&str],
    excludes: &[String],
) -> Result<Fingerprint> {
    if !root.is_dir() {
        return Err(Error::InvalidPath(format!("{} is not a directory", root.display())));
    }

    let wanted: Vec<String> = extensions
        .iter()
        .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
        .collect();

    let mut stamps = Vec::new();
    for entry in SkipFilter::new(root, excludes).walker(root) {
        let entry = entry?;
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }

        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| wanted.iter().any(|w| w.eq_ignore_ascii_case(ext)));
        if !matches {
            continue;
        }

        let metadata = entry.metadata()?;
        let mtime_nanos = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .unwrap_or(0);

        stamps.push(FileStamp {
            path: relative_key(root, path),
            size: metadata.len(),
            mtime_nanos,
        });
    }

    if stamps.is_empty() {
        return Ok(Fingerprint::Empty);
    }

    stamps.sort();

    let mut hasher = blake3::Hasher::new();
    for stamp in &stamps {
        hasher.update(stamp.path.as_bytes());
        hasher.update(&[0]);
        hasher.update(&stamp.size.to_le_bytes());
        hasher.update(&stamp.mtime_nanos.to_le_bytes());
    }

    tracing::debug!("Fingerprinted {} files under {}", stamps.len(), root.display());
    Ok(Fingerprint::Digest(hasher.finalize().to_hex().to_string()))
}

/// Root-relative path with `/` separators on every platform.
fn relative_key(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
