//! Toolchain mode: run the language's external analyzer and parse its
//! canonical JSON from stdout.

use super::{EngineContext, Manifest};
use crate::diagnostics::{rules, Diagnostic};
use crate::index::ApiIndex;
use crate::result::EngineFailure;
use crate::sandbox::{validate_root_path, Invocation};
use crate::toolchain::{EngineAvailability, ToolchainSpec};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

const CONTAINER_ROOT: &str = "/workspace";
const CONTAINER_CLASSES: &str = "/classes";
/// How much stderr goes into a failure message
const STDERR_HEAD: usize = 2000;

/// Run the external analyzer for `manifest`.
pub fn run(
    ctx: &EngineContext,
    spec: &ToolchainSpec,
    manifest: &impl Manifest,
) -> Result<ApiIndex, EngineFailure> {
    let root = validate_root_path(&manifest.root()).map_err(super::invalid_target)?;

    let artifact = match manifest.required_artifact() {
        Some((path, remediation)) => {
            if !path.exists() {
                return Err(EngineFailure::ArtifactMissing { path, remediation });
            }
            Some(path)
        }
        None => None,
    };

    let resolved = ctx.availability.resolve(spec);
    let mut diagnostics = Vec::new();
    if let Some(warning) = &resolved.warning {
        diagnostics.push(Diagnostic::warning(rules::TOOLCHAIN_WARNING, warning.clone()));
    }

    let invocation = match &resolved.availability {
        EngineAvailability::Unavailable { reason } => {
            return Err(EngineFailure::Unavailable {
                language: spec.language.to_string(),
                reason: reason.clone(),
                remediation: spec.install_hint.to_string(),
            });
        }
        EngineAvailability::NativeBinary { path } => {
            Invocation::new(path.to_string_lossy()).args(analyzer_args(&root, artifact.as_deref()))
        }
        EngineAvailability::RuntimeInterpreter { path } => {
            let script = analyzers_dir(ctx).join(spec.script);
            if !script.is_file() {
                return Err(EngineFailure::ArtifactMissing {
                    path: script,
                    remediation: format!(
                        "install the {} analyzer scripts or set `analyzers_dir` in apigraph.toml",
                        spec.language
                    ),
                });
            }
            Invocation::new(path.to_string_lossy())
                .args(spec.script_prefix.iter().copied())
                .arg(script)
                .args(analyzer_args(&root, artifact.as_deref()))
        }
        EngineAvailability::Docker { runtime, image } => {
            Invocation::new(runtime.to_string_lossy()).args(container_args(&root, artifact.as_deref(), image))
        }
    };

    let mut invocation = invocation.timeout(ctx.config.process_timeout());
    if let Some(token) = &ctx.cancel {
        invocation = invocation.cancel_on(token.clone());
    }

    tracing::info!(
        "Running {} analyzer ({})",
        spec.language,
        resolved.availability.mode()
    );
    let result = match ctx.sandbox.execute(&invocation) {
        Ok(result) => result,
        Err(e) => {
            // The cached toolchain no longer works; the next run re-resolves.
            ctx.availability.invalidate(Some(spec.language));
            return Err(EngineFailure::Unavailable {
                language: spec.language.to_string(),
                reason: e.to_string(),
                remediation: spec.install_hint.to_string(),
            });
        }
    };

    let tool = invocation.program.clone();
    if result.timed_out {
        return Err(EngineFailure::Timeout {
            tool,
            after: ctx.config.process_timeout(),
        });
    }
    if result.cancelled {
        return Err(EngineFailure::Cancelled { tool });
    }
    if result.stdout_truncated {
        return Err(EngineFailure::MalformedOutput(format!(
            "{} output exceeded {} characters and was truncated",
            tool, ctx.config.max_output_chars
        )));
    }
    if !result.success() {
        return Err(EngineFailure::Extraction(format!(
            "{} exited with code {}: {}",
            tool,
            result.exit_code,
            head(&result.stderr, STDERR_HEAD)
        )));
    }

    let mut index = ApiIndex::from_json(&result.stdout)
        .map_err(|e| EngineFailure::MalformedOutput(e.to_string()))?;

    let stderr = result.stderr.trim();
    if !stderr.is_empty() {
        diagnostics.push(Diagnostic::warning(
            rules::TOOLCHAIN_WARNING,
            format!("{} reported: {}", spec.language, head(stderr, STDERR_HEAD)),
        ));
    }
    index.diagnostics = crate::diagnostics::merge([index.diagnostics, diagnostics]);

    tracing::debug!(
        "{} analyzer finished in {:?} with {} types",
        spec.language,
        result.duration,
        index.type_count()
    );
    Ok(index)
}

fn analyzers_dir(ctx: &EngineContext) -> PathBuf {
    if let Some(dir) = &ctx.config.analyzers_dir {
        return dir.clone();
    }
    ctx.availability
        .resolver()
        .settings()
        .host_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("analyzers")
}

fn analyzer_args(root: &Path, artifact: Option<&Path>) -> Vec<OsString> {
    let mut args = vec![root.as_os_str().to_owned(), OsString::from("--json")];
    if let Some(classes) = artifact {
        args.push(OsString::from("--classes"));
        args.push(classes.as_os_str().to_owned());
    }
    args
}

/// `run --rm --network=none` with the root mounted read-only.
fn container_args(root: &Path, artifact: Option<&Path>, image: &str) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["run", "--rm", "--network=none", "-v"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(mount(root, CONTAINER_ROOT));

    // Artifacts inside the root are already visible through the first mount.
    let classes = artifact.map(|path| match path.strip_prefix(root) {
        Ok(rel) => Path::new(CONTAINER_ROOT).join(rel),
        Err(_) => {
            args.push(OsString::from("-v"));
            args.push(mount(path, CONTAINER_CLASSES));
            PathBuf::from(CONTAINER_CLASSES)
        }
    });

    args.push(OsString::from(image));
    args.extend(analyzer_args(Path::new(CONTAINER_ROOT), classes.as_deref()));
    args
}

fn mount(host: &Path, container: &str) -> OsString {
    let mut spec = host.as_os_str().to_owned();
    spec.push(":");
    spec.push(container);
    spec.push(":ro");
    spec
}

fn head(text: &str, max: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(max).collect();
    format!("{}...", cut)
}
