//! # apigraph - Public API Graph Engine
//!
//! Extracts a minimal, canonical description of a package's public surface
//! from source trees or build artifacts across language ecosystems.
//!
//! apigraph provides:
//! - A canonical, serde-backed API index shared by every language engine
//! - Tree-sitter based engines for Python, Go and Java source trees
//! - A hardened process sandbox and toolchain resolver for external analyzers
//! - Metadata fingerprints so callers can skip unchanged trees
//! - Reachability pruning, structured diagnostics and cross-language ids

pub mod index;
pub mod result;
pub mod diagnostics;
pub mod sandbox;
pub mod toolchain;
pub mod fingerprint;
pub mod engine;
pub mod reachability;
pub mod crossref;
pub mod usage;
pub mod telemetry;
pub mod config;
pub mod skip;
pub mod ui;

// Re-exports for convenient access
pub use index::{ApiIndex, MemberInfo, MemberKind, NamespaceInfo, TypeInfo, TypeKind};
pub use result::{EngineFailure, EngineResult};
pub use diagnostics::{Diagnostic, DiagnosticLevel};
pub use sandbox::{Invocation, ProcessResult, ProcessSandbox};
pub use toolchain::{AvailabilityCache, EngineAvailability};
pub use fingerprint::Fingerprint;
pub use engine::{EngineContext, GoEngine, GraphEngine, JavaEngine, Language, PythonEngine, Target};
pub use reachability::{ReferenceGraph, TypeKey};
pub use crossref::CrossLanguageMap;
pub use config::EngineConfig;

/// Result type alias for apigraph operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for apigraph operations
///
/// Expected engine failures (missing tools, timeouts, bad analyzer output)
/// travel as [`EngineResult::Failure`] instead; this enum covers validation
/// and I/O errors at the library's edges.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid executable: {0}")]
    InvalidExecutable(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Grammar error: {0}")]
    Grammar(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Walk error: {0}")]
    Walk(#[from] ignore::Error),
}
