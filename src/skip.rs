use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::{DirEntry, WalkBuilder};
use std::path::Path;

/// Build, vendor, VCS and tooling directories that never hold public API.
pub const SKIPPED_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "target",
    "node_modules",
    "vendor",
    "venv",
    ".venv",
    "__pycache__",
    ".mypy_cache",
    ".pytest_cache",
    ".tox",
    ".eggs",
    "build",
    "dist",
    "out",
    "bin",
    "obj",
    ".gradle",
    ".idea",
    ".vscode",
    ".apigraph",
];

/// Directory filter shared by the fingerprint and source discovery.
pub struct SkipFilter {
    extra: Gitignore,
}

impl SkipFilter {
    pub fn new(root: &Path, extra_excludes: &[String]) -> Self {
        let mut builder = GitignoreBuilder::new(root);
        for pattern in extra_excludes {
            if let Err(e) = builder.add_line(None, pattern) {
                tracing::warn!("Ignoring exclude pattern {:?}: {}", pattern, e);
            }
        }
        Self {
            extra: builder.build().unwrap_or_else(|_| Gitignore::empty()),
        }
    }

    pub fn is_skipped_dir_name(name: &str) -> bool {
        SKIPPED_DIRS.contains(&name) || name.ends_with(".egg-info")
    }

    pub fn is_skipped(&self, path: &Path, is_dir: bool) -> bool {
        if is_dir {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            if Self::is_skipped_dir_name(name) {
                return true;
            }
        }
        self.extra.matched(path, is_dir).is_ignore()
    }

    /// Walker over `root` that never descends into skipped directories.
    ///
    /// VCS ignore files are not consulted.
    pub fn walker(self, root: &Path) -> ignore::Walk {
        WalkBuilder::new(root)
            .standard_filters(false)
            .follow_links(false)
            .filter_entry(move |entry: &DirEntry| {
                // The root itself is always walked.
                entry.depth() == 0
                    || !self.is_skipped(entry.path(), entry.file_type().is_some_and(|t| t.is_dir()))
            })
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_walker_skips_noise() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("pkg")).unwrap();
        fs::create_dir_all(dir.path().join("node_modules/lib")).unwrap();
        fs::create_dir_all(dir.path().join("foo.egg-info")).unwrap();
        fs::write(dir.path().join("pkg/a.py"), "").unwrap();
        fs::write(dir.path().join("node_modules/lib/b.py"), "").unwrap();
        fs::write(dir.path().join("foo.egg-info/c.py"), "").unwrap();

        let files: Vec<_> = SkipFilter::new(dir.path(), &[])
            .walker(dir.path())
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_some_and(|t| t.is_file()))
            .collect();
        assert_eq!(files.len(), 1);
        assert!(files[0].path().ends_with("pkg/a.py"));
    }

    #[test]
    fn test_extra_excludes() {
        let dir = tempfile::tempdir().unwrap();
        let filter = SkipFilter::new(dir.path(), &["generated/".to_string()]);
        assert!(filter.is_skipped(&dir.path().join("generated"), true));
        assert!(!filter.is_skipped(&dir.path().join("src"), true));
    }
}
