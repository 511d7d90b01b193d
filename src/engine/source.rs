//! In-process source mode
//!
//! Discovery, parallel extraction and the sequential post-processing shared
//! by every tree-sitter extractor. A language only supplies a
//! [`SourceExtractor`]: how to read its project configuration, how to turn
//! one file into declarations, and the few heuristics that differ between
//! ecosystems.

use super::classify;
use super::merge::{Collected, TypeAccumulator};
use super::{EngineContext, Language};
use crate::diagnostics::{rules, Diagnostic};
use crate::index::{ApiIndex, TypeInfo};
use crate::result::EngineFailure;
use crate::sandbox::validate_root_path;
use crate::skip::SkipFilter;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Package identity read from the project configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectInfo {
    pub root: PathBuf,
    pub package: String,
    pub version: Option<String>,
}

impl AsRef<ProjectInfo> for ProjectInfo {
    fn as_ref(&self) -> &ProjectInfo {
        self
    }
}

/// One file handed to an extractor.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Path relative to the root, `/`-separated
    pub rel_path: Arc<str>,
    pub content: String,
}

impl SourceFile {
    /// Directory part of `rel_path` (empty for files at the root).
    pub fn rel_dir(&self) -> &str {
        self.rel_path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
    }

    pub fn file_name(&self) -> &str {
        self.rel_path.rsplit_once('/').map(|(_, f)| f).unwrap_or(&self.rel_path)
    }
}

/// Outcome of extracting one file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileReport {
    /// The tree contained error nodes; whatever parsed was still extracted
    pub syntax_errors: bool,
}

/// Language-specific half of source mode.
pub trait SourceExtractor: Send + Sync {
    /// Per-run project state. Extractors keep whatever they collect across
    /// files here; it is dropped with the run.
    type Project: AsRef<ProjectInfo> + Send + Sync;

    fn language(&self) -> Language;

    fn load_project(&self, root: &Path) -> crate::Result<Self::Project>;

    /// Whether a discovered file (relative path) belongs to the public surface.
    fn includes(&self, _rel_path: &str) -> bool {
        true
    }

    /// Language-specific directory names to skip on top of the shared set.
    fn skips_dir(&self, _name: &str) -> bool {
        false
    }

    fn extract(
        &self,
        file: &SourceFile,
        project: &Self::Project,
        sink: &TypeAccumulator,
    ) -> crate::Result<FileReport>;

    /// Cross-file fix-ups once every file is merged (entry points, grouping).
    fn finalize(&self, _project: &Self::Project, _collected: &mut Collected) {}

    /// Extractors that record parents as written (Java `extends` versus
    /// `implements`) skip the base/interface reclassification.
    fn parents_are_explicit(&self) -> bool {
        false
    }

    /// Heuristic for a parent type declared outside the tree.
    fn external_parent_is_interface(&self, name: &str) -> bool;

    /// Parent names that make a type an error type.
    fn is_error_root(&self, name: &str) -> bool;

    /// Structural error test for languages without error base classes.
    fn is_error_type(&self, _ty: &TypeInfo) -> bool {
        false
    }

    fn is_stdlib(&self, package: &str) -> bool;
}

/// Run source mode over `root`.
pub fn run<X: SourceExtractor>(
    ctx: &EngineContext,
    extractor: &X,
    root: &Path,
) -> Result<ApiIndex, EngineFailure> {
    let root = validate_root_path(root).map_err(super::invalid_target)?;
    if !root.is_dir() {
        return Err(super::invalid_target(format!(
            "{} is not a directory",
            root.display()
        )));
    }

    let project = extractor
        .load_project(&root)
        .map_err(|e| EngineFailure::Extraction(format!("reading project configuration: {}", e)))?;

    let files = discover(ctx, extractor, &root)?;
    if files.is_empty() {
        return Err(EngineFailure::Extraction(format!(
            "no {} source files under {}",
            extractor.language(),
            root.display()
        )));
    }
    tracing::info!("Extracting {} {} files", files.len(), extractor.language());

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(ctx.config.workers())
        .build()
        .map_err(|e| EngineFailure::Extraction(format!("starting worker pool: {}", e)))?;

    let sink = TypeAccumulator::new();
    let mut diagnostics = Vec::new();

    for batch in files.chunks(ctx.config.batch_size()) {
        if ctx.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
            return Err(EngineFailure::Cancelled {
                tool: format!("{} source extraction", extractor.language()),
            });
        }
        let found: Vec<Diagnostic> = pool.install(|| {
            batch
                .par_iter()
                .filter_map(|(path, rel)| extract_one(extractor, &project, &sink, path, rel))
                .collect()
        });
        diagnostics.extend(found);
    }

    let mut collected = sink.finish();
    extractor.finalize(&project, &mut collected);

    classify::classify_parents(extractor, &mut collected.namespaces, &collected.imports);
    classify::mark_errors(extractor, &mut collected.namespaces, &collected.imports);
    let dependencies = classify::dependencies(extractor, &collected);
    classify::assign_ids(&mut collected.namespaces);

    let info = project.as_ref();
    let index = ApiIndex {
        package: info.package.clone(),
        version: info.version.clone(),
        cross_language_package_id: None,
        namespaces: collected
            .namespaces
            .into_iter()
            .filter(|ns| !ns.types.is_empty() || !ns.functions.is_empty())
            .collect(),
        dependencies,
        diagnostics,
    };

    if index.is_empty() && !index.diagnostics.is_empty() {
        return Err(EngineFailure::Extraction(format!(
            "nothing extracted; {} files failed ({})",
            index.diagnostics.len(),
            index.diagnostics[0].text
        )));
    }

    tracing::debug!(
        "Extracted {} types in {} namespaces",
        index.type_count(),
        index.namespaces.len()
    );
    Ok(index)
}

/// Sorted `(path, relative path)` of every file the extractor wants.
fn discover<X: SourceExtractor>(
    ctx: &EngineContext,
    extractor: &X,
    root: &Path,
) -> Result<Vec<(PathBuf, Arc<str>)>, EngineFailure> {
    let extensions = extractor.language().extensions();
    let filter = SkipFilter::new(root, &ctx.config.exclude);
    let mut files: Vec<(PathBuf, Arc<str>)> = Vec::new();

    for entry in filter.walker(root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        let path = entry.path();
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| extensions.contains(&e));
        if !matches {
            continue;
        }

        let Ok(rel) = path.strip_prefix(root) else {
            continue;
        };
        let rel = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let in_skipped_dir = rel
            .rsplit_once('/')
            .is_some_and(|(dir, _)| dir.split('/').any(|d| extractor.skips_dir(d)));
        if in_skipped_dir || !extractor.includes(&rel) {
            continue;
        }
        files.push((path.to_path_buf(), Arc::from(rel)));
    }

    files.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(files)
}

/// Extract one file; a problem becomes a diagnostic instead of an error.
fn extract_one<X: SourceExtractor>(
    extractor: &X,
    project: &X::Project,
    sink: &TypeAccumulator,
    path: &Path,
    rel: &Arc<str>,
) -> Option<Diagnostic> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            return Some(Diagnostic::warning(
                rules::PARTIAL_EXTRACTION,
                format!("Could not read {}: {}", rel, e),
            ));
        }
    };

    let file = SourceFile {
        rel_path: rel.clone(),
        content,
    };
    match extractor.extract(&file, project, sink) {
        Ok(report) if report.syntax_errors => Some(Diagnostic::warning(
            rules::PARTIAL_EXTRACTION,
            format!("{} has syntax errors; extraction may be incomplete", rel),
        )),
        Ok(_) => None,
        Err(e) => Some(Diagnostic::warning(
            rules::PARTIAL_EXTRACTION,
            format!("Could not parse {}: {}", rel, e),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::merge::Origin;
    use crate::index::{MemberInfo, MemberKind, TypeKind};

    /// Declares one class per `.py` file named after the file; files
    /// containing "broken" fail.
    struct FakeExtractor;

    impl SourceExtractor for FakeExtractor {
        type Project = ProjectInfo;

        fn language(&self) -> Language {
            Language::Python
        }

        fn load_project(&self, root: &Path) -> crate::Result<ProjectInfo> {
            Ok(ProjectInfo {
                root: root.to_path_buf(),
                package: "fake".into(),
                version: Some("1.0".into()),
            })
        }

        fn extract(
            &self,
            file: &SourceFile,
            _project: &ProjectInfo,
            sink: &TypeAccumulator,
        ) -> crate::Result<FileReport> {
            if file.content.contains("broken") {
                return Err(crate::Error::Parse("unexpected token".into()));
            }
            let name = file.file_name().trim_end_matches(".py").to_string();
            let ty = TypeInfo::new(name, TypeKind::Class)
                .with_member(MemberInfo::new("run", MemberKind::Method, ""));
            sink.declare("fake", ty, Origin::new(&file.rel_path, 0));
            Ok(FileReport::default())
        }

        fn external_parent_is_interface(&self, _name: &str) -> bool {
            false
        }

        fn is_error_root(&self, name: &str) -> bool {
            name == "Exception"
        }

        fn is_stdlib(&self, _package: &str) -> bool {
            false
        }
    }

    fn ctx() -> EngineContext {
        EngineContext::new(EngineConfig {
            max_workers: Some(2),
            batch_size: 1,
            ..EngineConfig::default()
        })
    }

    #[test]
    fn test_parse_errors_become_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("alpha.py"), "ok").unwrap();
        std::fs::write(dir.path().join("beta.py"), "broken").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let index = run(&ctx(), &FakeExtractor, dir.path()).unwrap();
        assert_eq!(index.package, "fake");
        assert_eq!(index.type_count(), 1);
        assert_eq!(index.diagnostics.len(), 1);
        assert_eq!(index.diagnostics[0].id, rules::PARTIAL_EXTRACTION);
        assert!(index.diagnostics[0].text.contains("beta.py"));
    }

    #[test]
    fn test_nothing_extracted_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("only.py"), "broken").unwrap();
        let failure = run(&ctx(), &FakeExtractor, dir.path()).unwrap_err();
        assert!(matches!(failure, EngineFailure::Extraction(_)));
    }

    #[test]
    fn test_empty_tree_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let failure = run(&ctx(), &FakeExtractor, dir.path()).unwrap_err();
        assert!(matches!(failure, EngineFailure::Extraction(_)));
    }

    #[test]
    fn test_missing_root_is_invalid_target() {
        let dir = tempfile::tempdir().unwrap();
        let failure = run(&ctx(), &FakeExtractor, &dir.path().join("absent")).unwrap_err();
        assert!(matches!(failure, EngineFailure::InvalidTarget(_)));
    }

    #[test]
    fn test_skipped_directories_are_not_walked() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".venv/lib")).unwrap();
        std::fs::write(dir.path().join(".venv/lib/hidden.py"), "ok").unwrap();
        std::fs::write(dir.path().join("shown.py"), "ok").unwrap();

        let index = run(&ctx(), &FakeExtractor, dir.path()).unwrap();
        assert!(index.find_type("shown").is_some());
        assert!(index.find_type("hidden").is_none());
        assert_eq!(
            index.find_type("shown").unwrap().id.as_deref(),
            Some("fake.shown")
        );
    }

    #[test]
    fn test_cancelled_before_first_batch() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "ok").unwrap();
        let token = crate::sandbox::CancelToken::new();
        token.cancel();
        let failure = run(&ctx().with_cancel(token), &FakeExtractor, dir.path()).unwrap_err();
        assert!(matches!(failure, EngineFailure::Cancelled { .. }));
    }
}
