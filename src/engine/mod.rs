//! Per-language graph engines
//!
//! Every engine accepts a [`Target`]: either a source directory, analyzed
//! in-process with a tree-sitter grammar, or the language's own manifest,
//! handed to the external analyzer through the toolchain resolver and the
//! process sandbox. Both paths produce the same canonical [`ApiIndex`] and go
//! through the same post-processing (diagnostics, cross-language ids).

pub mod classify;
pub mod external;
pub mod go;
pub mod java;
pub mod merge;
pub mod python;
pub mod source;
pub mod syntax;

pub use go::GoEngine;
pub use java::JavaEngine;
pub use merge::{ImportedName, Origin, TypeAccumulator};
pub use python::PythonEngine;
pub use source::{FileReport, ProjectInfo, SourceExtractor, SourceFile};

use crate::config::EngineConfig;
use crate::crossref::CrossLanguageMap;
use crate::index::ApiIndex;
use crate::result::{EngineFailure, EngineResult};
use crate::sandbox::{CancelToken, ProcessSandbox};
use crate::telemetry::{EngineRunEvent, RunMode, RunOutcome, TelemetrySink, TracingTelemetry};
use crate::toolchain::{AvailabilityCache, Resolver, ResolverSettings};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

/// Supported ecosystems
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Language {
    Python,
    Go,
    Java,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Go => "go",
            Language::Java => "java",
        }
    }

    pub fn all() -> &'static [Language] {
        &[Language::Python, Language::Go, Language::Java]
    }

    /// Source file extensions, without the dot
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Language::Python => &["py"],
            Language::Go => &["go"],
            Language::Java => &["java"],
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "python" | "py" => Ok(Language::Python),
            "go" | "golang" => Ok(Language::Go),
            "java" | "jvm" => Ok(Language::Java),
            _ => Err(format!("Unknown language: {}", s)),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an engine analyzes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target<M> {
    /// A source tree, analyzed in-process
    Source(PathBuf),
    /// The language's build manifest, analyzed by the external toolchain
    Manifest(M),
}

/// A language-specific project manifest.
pub trait Manifest: fmt::Debug + Send + Sync {
    fn path(&self) -> &Path;

    /// Project root: the directory holding the manifest
    fn root(&self) -> PathBuf {
        self.path()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Build output the analyzer needs, with the command that produces it
    fn required_artifact(&self) -> Option<(PathBuf, String)> {
        None
    }
}

/// `pyproject.toml`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PyProject {
    pub pyproject: PathBuf,
}

impl Manifest for PyProject {
    fn path(&self) -> &Path {
        &self.pyproject
    }
}

/// `go.mod`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoModule {
    pub go_mod: PathBuf,
}

impl Manifest for GoModule {
    fn path(&self) -> &Path {
        &self.go_mod
    }
}

/// `pom.xml` plus the compiled classes the analyzer reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MavenProject {
    pub pom: PathBuf,
    /// Defaults to `target/classes` next to the pom
    pub classes_dir: Option<PathBuf>,
}

impl MavenProject {
    pub fn new(pom: impl Into<PathBuf>) -> Self {
        Self {
            pom: pom.into(),
            classes_dir: None,
        }
    }
}

impl Manifest for MavenProject {
    fn path(&self) -> &Path {
        &self.pom
    }

    fn required_artifact(&self) -> Option<(PathBuf, String)> {
        let classes = self
            .classes_dir
            .clone()
            .unwrap_or_else(|| self.root().join("target").join("classes"));
        let remediation = format!("run `mvn compile` in {}", self.root().display());
        Some((classes, remediation))
    }
}

/// The contract every language engine implements.
pub trait GraphEngine: Send + Sync {
    type Manifest: Manifest;

    fn language(&self) -> Language;

    /// Whether toolchain mode can run on this machine. Source mode has no
    /// external requirement.
    fn is_available(&self) -> bool;

    fn graph(
        &self,
        target: &Target<Self::Manifest>,
        map: Option<&CrossLanguageMap>,
    ) -> EngineResult<ApiIndex>;

    fn to_json(&self, index: &ApiIndex) -> crate::Result<String> {
        index.to_json()
    }

    /// Render the index in the language's own surface syntax.
    fn to_stubs(&self, index: &ApiIndex) -> String;
}

/// Shared services handed to every engine.
#[derive(Clone)]
pub struct EngineContext {
    pub config: Arc<EngineConfig>,
    pub sandbox: ProcessSandbox,
    pub availability: Arc<AvailabilityCache>,
    pub telemetry: Arc<dyn TelemetrySink>,
    pub cancel: Option<CancelToken>,
}

impl Default for EngineContext {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl EngineContext {
    pub fn new(config: EngineConfig) -> Self {
        let sandbox = ProcessSandbox::from_config(&config);
        let resolver = Resolver::new(ResolverSettings::from_config(&config), sandbox.clone());
        Self {
            config: Arc::new(config),
            sandbox,
            availability: Arc::new(AvailabilityCache::new(resolver)),
            telemetry: Arc::new(TracingTelemetry),
            cancel: None,
        }
    }

    /// Share one availability cache between several contexts.
    pub fn with_availability(mut self, cache: Arc<AvailabilityCache>) -> Self {
        self.availability = cache;
        self
    }

    pub fn with_telemetry(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = sink;
        self
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Run one engine invocation inside a span and report it to telemetry.
    pub(crate) fn instrument(
        &self,
        language: Language,
        mode: RunMode,
        run: impl FnOnce() -> EngineResult<ApiIndex>,
    ) -> EngineResult<ApiIndex> {
        let span = tracing::info_span!("graph", %language, %mode);
        let _guard = span.enter();

        let started = Instant::now();
        let result = run();

        let (types, diagnostics, outcome) = match &result {
            EngineResult::Success { value, diagnostics } => {
                (value.type_count(), diagnostics.len(), RunOutcome::Success)
            }
            EngineResult::Failure(failure) => (0, 0, RunOutcome::Failure(failure.to_string())),
        };
        self.telemetry.record(&EngineRunEvent {
            language,
            mode,
            duration: started.elapsed(),
            types,
            diagnostics,
            outcome,
        });
        result
    }
}

/// Post-processing shared by both modes: diagnostics, then cross-language
/// ids. Each step returns a new index.
pub(crate) fn finish_index(index: ApiIndex, map: Option<&CrossLanguageMap>) -> EngineResult<ApiIndex> {
    let index = crate::diagnostics::apply(&index);
    let index = match map {
        Some(map) => map.attach(&index),
        None => index,
    };
    let diagnostics = index.diagnostics.clone();
    EngineResult::success_with(index, diagnostics)
}

/// Dispatch a target to source or toolchain mode.
pub(crate) fn run_target<X, M>(
    ctx: &EngineContext,
    extractor: &X,
    target: &Target<M>,
    map: Option<&CrossLanguageMap>,
) -> EngineResult<ApiIndex>
where
    X: SourceExtractor,
    M: Manifest,
{
    let language = extractor.language();
    match target {
        Target::Source(root) => ctx.instrument(language, RunMode::Source, || {
            match source::run(ctx, extractor, root) {
                Ok(index) => finish_index(index, map),
                Err(failure) => EngineResult::Failure(failure),
            }
        }),
        Target::Manifest(manifest) => ctx.instrument(language, RunMode::Toolchain, || {
            let spec = crate::toolchain::ToolchainSpec::for_language(language);
            match external::run(ctx, spec, manifest) {
                Ok(index) => finish_index(index, map),
                Err(failure) => EngineResult::Failure(failure),
            }
        }),
    }
}

/// Toolchain availability for one language, as seen through the shared cache.
pub(crate) fn toolchain_available(ctx: &EngineContext, language: Language) -> bool {
    let spec = crate::toolchain::ToolchainSpec::for_language(language);
    ctx.availability.resolve(spec).availability.is_available()
}

/// Failure for a target that cannot be used at all.
pub(crate) fn invalid_target(reason: impl fmt::Display) -> EngineFailure {
    EngineFailure::InvalidTarget(reason.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::testing::RecordingTelemetry;
    use std::time::Duration;

    fn recording() -> (EngineContext, Arc<RecordingTelemetry>) {
        let sink = Arc::new(RecordingTelemetry::default());
        let ctx = EngineContext::default().with_telemetry(sink.clone());
        (ctx, sink)
    }

    #[test]
    fn test_language_aliases() {
        assert_eq!(Language::from_str("golang").unwrap(), Language::Go);
        assert_eq!(Language::from_str("PY").unwrap(), Language::Python);
        assert!(Language::from_str("cobol").is_err());
    }

    #[test]
    fn test_maven_artifact_defaults_to_target_classes() {
        let project = MavenProject::new("/work/sdk/pom.xml");
        let (path, remediation) = project.required_artifact().unwrap();
        assert_eq!(path, PathBuf::from("/work/sdk/target/classes"));
        assert!(remediation.contains("mvn compile"));
        assert_eq!(project.root(), PathBuf::from("/work/sdk"));
    }

    #[test]
    fn test_source_run_reports_success() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("client.py"),
            "class Client:\n    def get(self, id: str) -> str:\n        return id\n",
        )
        .unwrap();
        let (ctx, sink) = recording();

        let result = PythonEngine::new(ctx).graph(&Target::Source(dir.path().to_path_buf()), None);
        assert!(result.is_success());

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].language, Language::Python);
        assert_eq!(events[0].mode, RunMode::Source);
        assert_eq!(events[0].outcome, RunOutcome::Success);
        assert_eq!(events[0].types, 1);
    }

    #[test]
    fn test_invalid_target_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, sink) = recording();

        let missing = dir.path().join("nowhere");
        let result = GoEngine::new(ctx).graph(&Target::Source(missing), None);
        assert!(!result.is_success());

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].types, 0);
        assert!(matches!(&events[0].outcome, RunOutcome::Failure(reason) if reason.contains("invalid target")));
    }

    #[test]
    fn test_timeout_is_reported_as_failure() {
        let (ctx, sink) = recording();
        let result = ctx.instrument(Language::Java, RunMode::Toolchain, || {
            EngineResult::Failure(EngineFailure::Timeout {
                tool: "javac".into(),
                after: Duration::from_secs(3),
            })
        });
        assert!(!result.is_success());

        let events = sink.events.lock().unwrap();
        assert_eq!(events[0].mode, RunMode::Toolchain);
        assert_eq!(
            events[0].outcome,
            RunOutcome::Failure("javac timed out after 3s and was terminated".into())
        );
    }
}
