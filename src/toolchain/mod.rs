//! Toolchain availability resolution.
//!
//! Decides how a language's analyzer can run on this machine. Order is
//! strict and the first success wins:
//!
//! 1. native analyzer binary beside the host executable (`--help`, exit 0 or 1)
//! 2. runtime interpreter: `<PREFIX>_<TOOL>_PATH`, then the candidate list
//!    (`--version`, exit 0)
//! 3. container runtime with the analyzer image present locally
//! 4. unavailable, with everything that was tried
//!
//! A path existing is never enough; every candidate is executed.

mod spec;

pub use spec::ToolchainSpec;

use crate::engine::Language;
use crate::sandbox::{validate_executable, Invocation, ProcessSandbox};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

const CHECK_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_RUNTIMES: &[&str] = &["docker", "podman"];

/// How an analyzer can be executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineAvailability {
    NativeBinary { path: PathBuf },
    RuntimeInterpreter { path: PathBuf },
    Docker { runtime: PathBuf, image: String },
    Unavailable { reason: String },
}

impl EngineAvailability {
    pub fn is_available(&self) -> bool {
        !matches!(self, EngineAvailability::Unavailable { .. })
    }

    pub fn mode(&self) -> &'static str {
        match self {
            EngineAvailability::NativeBinary { .. } => "native",
            EngineAvailability::RuntimeInterpreter { .. } => "runtime",
            EngineAvailability::Docker { .. } => "docker",
            EngineAvailability::Unavailable { .. } => "unavailable",
        }
    }
}

impl fmt::Display for EngineAvailability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineAvailability::NativeBinary { path } => write!(f, "native binary {}", path.display()),
            EngineAvailability::RuntimeInterpreter { path } => {
                write!(f, "runtime interpreter {}", path.display())
            }
            EngineAvailability::Docker { runtime, image } => {
                write!(f, "{} image {}", runtime.display(), image)
            }
            EngineAvailability::Unavailable { reason } => write!(f, "unavailable: {}", reason),
        }
    }
}

/// Resolution outcome plus an optional non-fatal warning (for example an
/// override that was ignored).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityResult {
    pub availability: EngineAvailability,
    pub warning: Option<String>,
}

/// Settings for the resolver. All of them are injectable for tests.
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub env_prefix: String,
    /// Directory searched for native analyzer binaries
    pub host_dir: Option<PathBuf>,
    pub container_runtimes: Vec<String>,
    pub check_timeout: Duration,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            env_prefix: "APIGRAPH".to_string(),
            host_dir: std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(Path::to_path_buf)),
            container_runtimes: DEFAULT_RUNTIMES.iter().map(|s| s.to_string()).collect(),
            check_timeout: CHECK_TIMEOUT,
        }
    }
}

impl ResolverSettings {
    pub fn from_config(config: &crate::config::EngineConfig) -> Self {
        let mut settings = Self {
            env_prefix: config.env_prefix.clone(),
            ..Self::default()
        };
        if let Some(dir) = &config.host_dir {
            settings.host_dir = Some(dir.clone());
        }
        if let Some(runtime) = &config.container_runtime {
            settings.container_runtimes = vec![runtime.clone()];
        }
        settings
    }
}

/// Performs the actual probing. Stateless; see [`AvailabilityCache`].
#[derive(Debug, Clone)]
pub struct Resolver {
    settings: ResolverSettings,
    sandbox: ProcessSandbox,
}

impl Resolver {
    pub fn new(settings: ResolverSettings, sandbox: ProcessSandbox) -> Self {
        Self { settings, sandbox }
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    pub fn resolve(&self, spec: &ToolchainSpec) -> AvailabilityResult {
        let mut tried = Vec::new();
        let mut warning = None;

        if let Some(path) = self.find_native(spec, &mut tried) {
            return found(EngineAvailability::NativeBinary { path }, warning);
        }
        if let Some(path) = self.find_interpreter(spec, &mut tried, &mut warning) {
            return found(EngineAvailability::RuntimeInterpreter { path }, warning);
        }
        if let Some(runtime) = self.find_container(spec, &mut tried) {
            return found(
                EngineAvailability::Docker {
                    runtime,
                    image: spec.docker_image.to_string(),
                },
                warning,
            );
        }

        let reason = format!(
            "No {} analyzer toolchain found. Tried: {}. {}",
            spec.language,
            tried.join("; "),
            spec.install_hint
        );
        tracing::debug!("{}", reason);
        AvailabilityResult {
            availability: EngineAvailability::Unavailable { reason },
            warning,
        }
    }

    fn find_native(&self, spec: &ToolchainSpec, tried: &mut Vec<String>) -> Option<PathBuf> {
        let Some(dir) = &self.settings.host_dir else {
            tried.push("native binary (host directory unknown)".to_string());
            return None;
        };
        let path = dir.join(spec.native_file_name());
        if !path.is_file() {
            tried.push(format!("native binary {} (missing)", path.display()));
            return None;
        }
        // Analyzers that print usage may exit 1 on --help.
        if self.responds(&path, &["--help"], &[0, 1]) {
            Some(path)
        } else {
            tried.push(format!("native binary {} (failed --help)", path.display()));
            None
        }
    }

    fn find_interpreter(
        &self,
        spec: &ToolchainSpec,
        tried: &mut Vec<String>,
        warning: &mut Option<String>,
    ) -> Option<PathBuf> {
        let var = spec.override_var(&self.settings.env_prefix);
        if let Ok(value) = std::env::var(&var) {
            match self.check_override(spec, &var, &value) {
                Ok(path) => return Some(path),
                Err(message) => {
                    tracing::warn!("{}", message);
                    tried.push(format!("${} ({})", var, value));
                    *warning = Some(message);
                }
            }
        }

        for candidate in spec.candidates {
            let Ok(path) = which::which(candidate) else {
                tried.push(format!("{} (not on PATH)", candidate));
                continue;
            };
            if self.responds(&path, spec.version_args, &[0]) {
                return Some(path);
            }
            tried.push(format!("{} (failed version check)", path.display()));
        }
        None
    }

    fn check_override(
        &self,
        spec: &ToolchainSpec,
        var: &str,
        value: &str,
    ) -> std::result::Result<PathBuf, String> {
        validate_executable(value)
            .map_err(|e| format!("Ignoring {}: {}", var, e))?;
        let path = PathBuf::from(value);
        if self.responds(&path, spec.version_args, &[0]) {
            Ok(path)
        } else {
            Err(format!("Ignoring {}: {} did not pass the version check", var, value))
        }
    }

    fn find_container(&self, spec: &ToolchainSpec, tried: &mut Vec<String>) -> Option<PathBuf> {
        for runtime in &self.settings.container_runtimes {
            let Ok(path) = which::which(runtime) else {
                tried.push(format!("{} (not on PATH)", runtime));
                continue;
            };
            if self.responds(&path, &["image", "inspect", spec.docker_image], &[0]) {
                return Some(path);
            }
            tried.push(format!("{} image {} (not present)", runtime, spec.docker_image));
        }
        None
    }

    /// Run `program args`, true when it exits with one of `accepted`.
    fn responds(&self, program: &Path, args: &[&str], accepted: &[i32]) -> bool {
        let invocation = Invocation::new(program.to_string_lossy())
            .args(args.iter().copied())
            .timeout(self.settings.check_timeout);
        match self.sandbox.execute(&invocation) {
            Ok(result) => {
                !result.timed_out && !result.cancelled && accepted.contains(&result.exit_code)
            }
            Err(e) => {
                tracing::debug!("Check of {} failed: {}", program.display(), e);
                false
            }
        }
    }
}

fn found(availability: EngineAvailability, warning: Option<String>) -> AvailabilityResult {
    tracing::debug!("Resolved toolchain: {}", availability);
    AvailabilityResult { availability, warning }
}

/// Per-language availability, resolved once and reused. Shared across engines
/// through [`crate::engine::EngineContext`].
#[derive(Debug)]
pub struct AvailabilityCache {
    resolver: Resolver,
    entries: Mutex<HashMap<Language, AvailabilityResult>>,
}

impl AvailabilityCache {
    pub fn new(resolver: Resolver) -> Self {
        Self {
            resolver,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn resolve(&self, spec: &ToolchainSpec) -> AvailabilityResult {
        if let Some(hit) = self.lock().get(&spec.language) {
            return hit.clone();
        }
        self.resolve_forced(spec)
    }

    /// Re-check and overwrite the cached entry.
    pub fn resolve_forced(&self, spec: &ToolchainSpec) -> AvailabilityResult {
        let result = self.resolver.resolve(spec);
        self.lock().insert(spec.language, result.clone());
        result
    }

    /// Drop one language's entry, or all entries.
    pub fn invalidate(&self, language: Option<Language>) {
        let mut entries = self.lock();
        match language {
            Some(language) => {
                entries.remove(&language);
            }
            None => entries.clear(),
        }
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Language, AvailabilityResult>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(host_dir: Option<PathBuf>) -> ResolverSettings {
        ResolverSettings {
            env_prefix: "APIGRAPH_TEST_UNSET".to_string(),
            host_dir,
            container_runtimes: vec!["apigraph-no-such-runtime".to_string()],
            check_timeout: Duration::from_secs(5),
        }
    }

    const MISSING: ToolchainSpec = ToolchainSpec {
        language: Language::Go,
        native_binary: "apigraph-no-such-analyzer",
        tool: "NOPE",
        candidates: &["apigraph-no-such-interpreter"],
        version_args: &["--version"],
        script_prefix: &[],
        script: "extract_api.none",
        docker_image: "apigraph/none:latest",
        install_hint: "Install nothing",
    };

    #[test]
    fn test_unavailable_lists_what_was_tried() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = Resolver::new(settings(Some(dir.path().to_path_buf())), ProcessSandbox::default());
        let result = resolver.resolve(&MISSING);

        let EngineAvailability::Unavailable { reason } = result.availability else {
            panic!("expected unavailable");
        };
        assert!(reason.contains("apigraph-no-such-analyzer"));
        assert!(reason.contains("apigraph-no-such-interpreter"));
        assert!(reason.contains("apigraph-no-such-runtime"));
        assert!(reason.contains("Install nothing"));
    }

    #[cfg(unix)]
    #[test]
    fn test_interpreter_fallback_executes_candidate() {
        let spec = ToolchainSpec {
            candidates: &["sh"],
            version_args: &["-c", "exit 0"],
            ..MISSING
        };
        let resolver = Resolver::new(settings(None), ProcessSandbox::default());
        let result = resolver.resolve(&spec);
        assert!(matches!(
            result.availability,
            EngineAvailability::RuntimeInterpreter { .. }
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_candidate_is_not_accepted() {
        let spec = ToolchainSpec {
            candidates: &["sh"],
            version_args: &["-c", "exit 2"],
            ..MISSING
        };
        let resolver = Resolver::new(settings(None), ProcessSandbox::default());
        assert!(!resolver.resolve(&spec).availability.is_available());
    }

    #[cfg(unix)]
    #[test]
    fn test_native_binary_wins_over_interpreter() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("apigraph-no-such-analyzer");
        std::fs::write(&binary, "#!/bin/sh\necho usage\nexit 1\n").unwrap();
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();

        let spec = ToolchainSpec {
            candidates: &["sh"],
            version_args: &["-c", "exit 0"],
            ..MISSING
        };
        let resolver = Resolver::new(settings(Some(dir.path().to_path_buf())), ProcessSandbox::default());
        assert!(matches!(
            resolver.resolve(&spec).availability,
            EngineAvailability::NativeBinary { .. }
        ));
    }

    #[test]
    fn test_cache_invalidate() {
        let resolver = Resolver::new(settings(None), ProcessSandbox::default());
        let cache = AvailabilityCache::new(resolver);

        let first = cache.resolve(&MISSING);
        assert_eq!(cache.resolve(&MISSING), first);
        assert_eq!(cache.lock().len(), 1);

        cache.invalidate(Some(Language::Go));
        assert!(cache.lock().is_empty());
    }
}
