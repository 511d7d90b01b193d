//! Input validation performed before any process is spawned.

use crate::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Characters a shell would interpret. Spaces are allowed because real
/// install paths contain them and arguments never pass through a shell.
const SHELL_METACHARACTERS: &[char] = &[
    ';', '&', '|', '$', '`', '<', '>', '(', ')', '{', '}', '[', ']', '!', '*', '?', '~', '\'',
    '"', '\n', '\r', '\0', '%', '^',
];

/// Reject executable names that carry shell metacharacters.
pub fn validate_executable(program: &str) -> Result<()> {
    if program.trim().is_empty() {
        return Err(Error::InvalidExecutable("executable name is empty".to_string()));
    }

    if let Some(bad) = program.chars().find(|c| SHELL_METACHARACTERS.contains(c)) {
        return Err(Error::InvalidExecutable(format!(
            "{:?} contains shell metacharacter {:?}",
            program, bad
        )));
    }

    Ok(())
}

/// Check a root or working directory and return its canonical form.
///
/// Rejects null bytes and `..` components before touching the filesystem,
/// then canonicalizes and requires the path to exist.
pub fn validate_root_path(path: &Path) -> Result<PathBuf> {
    let raw = path.to_string_lossy();
    if raw.is_empty() {
        return Err(Error::InvalidPath("path is empty".to_string()));
    }
    if raw.contains('\0') {
        return Err(Error::InvalidPath(format!("{:?} contains a null byte", raw)));
    }
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(Error::InvalidPath(format!(
            "{} contains a parent-directory traversal",
            path.display()
        )));
    }

    let canonical = path
        .canonicalize()
        .map_err(|e| Error::InvalidPath(format!("{}: {}", path.display(), e)))?;

    if !canonical.exists() {
        return Err(Error::InvalidPath(format!("{} does not exist", canonical.display())));
    }

    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_metacharacters() {
        for bad in ["ls; rm -rf /", "python$(id)", "go|cat", "java`x`", "a&b", "tool>out", ""] {
            assert!(validate_executable(bad).is_err(), "{:?} should be rejected", bad);
        }
    }

    #[test]
    fn test_accepts_plain_paths() {
        for ok in ["python3", "/usr/bin/go", "C:\\Program Files\\Java\\bin\\java.exe", "jbang"] {
            assert!(validate_executable(ok).is_ok(), "{:?} should be accepted", ok);
        }
    }

    #[test]
    fn test_root_path_checks() {
        let dir = tempfile::tempdir().unwrap();
        let canonical = validate_root_path(dir.path()).unwrap();
        assert!(canonical.is_absolute());

        let traversal = dir.path().join("..").join("etc");
        assert!(validate_root_path(&traversal).is_err());

        assert!(validate_root_path(&dir.path().join("missing")).is_err());
        assert!(validate_root_path(Path::new("")).is_err());
    }
}
