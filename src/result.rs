//! Engine results
//!
//! Expected failures (tool unavailable, timeout, missing artifact, malformed
//! analyzer output) are values, not panics. Every engine boundary returns an
//! [`EngineResult`].

use crate::diagnostics::Diagnostic;
use std::path::PathBuf;
use std::time::Duration;

/// Typed reason an engine run failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineFailure {
    /// No usable toolchain; `remediation` says how to install one
    #[error("{language} toolchain unavailable: {reason}. {remediation}")]
    Unavailable {
        language: String,
        reason: String,
        remediation: String,
    },

    /// The external analyzer was force-killed after the timeout elapsed
    #[error("{tool} timed out after {}s and was terminated", .after.as_secs())]
    Timeout { tool: String, after: Duration },

    /// The caller cancelled the run
    #[error("{tool} was cancelled")]
    Cancelled { tool: String },

    /// The build artifact the engine reads is missing
    #[error("artifact not found at {} - {remediation}", .path.display())]
    ArtifactMissing { path: PathBuf, remediation: String },

    /// Output was truncated or did not match the canonical schema
    #[error("malformed analyzer output: {0}")]
    MalformedOutput(String),

    /// The analyzer ran but produced nothing usable
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// The target does not exist or is not acceptable
    #[error("invalid target: {0}")]
    InvalidTarget(String),
}

/// `Success(value, diagnostics)` or `Failure(reason)`.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineResult<T> {
    Success { value: T, diagnostics: Vec<Diagnostic> },
    Failure(EngineFailure),
}

impl<T> EngineResult<T> {
    pub fn success(value: T) -> Self {
        EngineResult::Success {
            value,
            diagnostics: Vec::new(),
        }
    }

    pub fn success_with(value: T, diagnostics: Vec<Diagnostic>) -> Self {
        EngineResult::Success { value, diagnostics }
    }

    pub fn failure(failure: EngineFailure) -> Self {
        EngineResult::Failure(failure)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, EngineResult::Success { .. })
    }

    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            EngineResult::Success { value, .. } => Some(value),
            EngineResult::Failure(_) => None,
        }
    }

    pub fn failure_reason(&self) -> Option<&EngineFailure> {
        match self {
            EngineResult::Failure(failure) => Some(failure),
            EngineResult::Success { .. } => None,
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            EngineResult::Success { diagnostics, .. } => diagnostics,
            EngineResult::Failure(_) => &[],
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> EngineResult<U> {
        match self {
            EngineResult::Success { value, diagnostics } => EngineResult::Success {
                value: f(value),
                diagnostics,
            },
            EngineResult::Failure(failure) => EngineResult::Failure(failure),
        }
    }

    /// Drop the diagnostics and convert into a plain `Result`.
    pub fn into_result(self) -> std::result::Result<T, EngineFailure> {
        match self {
            EngineResult::Success { value, .. } => Ok(value),
            EngineResult::Failure(failure) => Err(failure),
        }
    }
}

impl<T> From<EngineFailure> for EngineResult<T> {
    fn from(failure: EngineFailure) -> Self {
        EngineResult::Failure(failure)
    }
}
