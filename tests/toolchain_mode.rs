#![cfg(unix)]

use apigraph::config::EngineConfig;
use apigraph::diagnostics::rules;
use apigraph::engine::PyProject;
use apigraph::toolchain::ToolchainSpec;
use apigraph::{EngineAvailability, EngineContext, EngineFailure, GraphEngine, PythonEngine, Target};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

const INDEX_JSON: &str = r#"{"package":"fake","namespaces":[{"name":"fake","types":[{"name":"Client","kind":"class","entryPoint":true,"doc":"Fake client.","members":[{"name":"get","kind":"method","sig":"key: str","doc":"Get one."}]}]}]}"#;

/// Install a shell script as the native Python analyzer in `host_dir`.
fn install_analyzer(host_dir: &Path, body: &str) {
    let path = host_dir.join(ToolchainSpec::PYTHON.native_file_name());
    let script = format!(
        "#!/bin/sh\nif [ \"$1\" = \"--help\" ]; then echo usage; exit 0; fi\n{}\n",
        body
    );
    fs::write(&path, script).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
}

fn engine(host_dir: &Path) -> PythonEngine {
    let config = EngineConfig {
        host_dir: Some(host_dir.to_path_buf()),
        container_runtime: Some("apigraph-no-such-runtime".to_string()),
        ..EngineConfig::default()
    };
    PythonEngine::new(EngineContext::new(config))
}

fn manifest_target(project: &Path) -> Target<PyProject> {
    let pyproject = project.join("pyproject.toml");
    fs::write(&pyproject, "[project]\nname = \"fake\"\n").unwrap();
    Target::Manifest(PyProject { pyproject })
}

#[test]
fn test_native_analyzer_output_is_parsed() {
    let host = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    install_analyzer(
        host.path(),
        &format!("echo '{}'\necho 'partial scan' >&2", INDEX_JSON),
    );

    let engine = engine(host.path());
    assert!(engine.is_available());

    let result = engine.graph(&manifest_target(project.path()), None);
    assert!(result.is_success(), "{:?}", result.failure_reason());
    assert!(result
        .diagnostics()
        .iter()
        .any(|d| d.id == rules::TOOLCHAIN_WARNING && d.text.contains("partial scan")));

    let index = result.into_result().unwrap();
    assert_eq!(index.package, "fake");
    assert!(index.find_type("Client").unwrap().is_client());
}

#[test]
fn test_analyzer_failures_are_reported() {
    let host = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    install_analyzer(host.path(), "echo 'boom' >&2\nexit 3");

    let result = engine(host.path()).graph(&manifest_target(project.path()), None);
    match result.failure_reason() {
        Some(EngineFailure::Extraction(message)) => {
            assert!(message.contains("code 3"));
            assert!(message.contains("boom"));
        }
        other => panic!("expected extraction failure, got {:?}", other),
    }

    let host = tempfile::tempdir().unwrap();
    install_analyzer(host.path(), "echo 'not json'");
    let result = engine(host.path()).graph(&manifest_target(project.path()), None);
    assert!(matches!(
        result.failure_reason(),
        Some(EngineFailure::MalformedOutput(_))
    ));
}

#[test]
fn test_missing_host_binary_is_not_native() {
    let host = tempfile::tempdir().unwrap();
    let ctx = EngineContext::new(EngineConfig {
        host_dir: Some(host.path().to_path_buf()),
        container_runtime: Some("apigraph-no-such-runtime".to_string()),
        ..EngineConfig::default()
    });

    let resolved = ctx.availability.resolve(&ToolchainSpec::GO);
    assert!(!matches!(
        resolved.availability,
        EngineAvailability::NativeBinary { .. }
    ));
}
