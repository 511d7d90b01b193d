use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sandbox::{DEFAULT_MAX_OUTPUT_CHARS, DEFAULT_TIMEOUT, MAX_TIMEOUT};

pub const MAX_WORKERS_ENV: &str = "APIGRAPH_MAX_WORKERS";
pub const DEFAULT_BATCH_SIZE: usize = 256;
const WORKER_CEILING: usize = 8;

/// Engine settings. Every field has a default, so an empty `apigraph.toml`
/// is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Per-invocation timeout for external analyzers, in seconds
    pub timeout_secs: u64,
    pub max_output_chars: usize,
    /// Parser pool size; `None` means min(cores, 8)
    pub max_workers: Option<usize>,
    pub batch_size: usize,
    /// Prefix of the `<PREFIX>_<TOOL>_PATH` overrides
    pub env_prefix: String,
    /// Directory holding the runtime analyzer scripts
    pub analyzers_dir: Option<PathBuf>,
    /// Directory searched for native analyzer binaries
    pub host_dir: Option<PathBuf>,
    /// Container runtime to use instead of docker then podman
    pub container_runtime: Option<String>,
    /// Extra gitignore-style patterns excluded from discovery
    pub exclude: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            max_output_chars: DEFAULT_MAX_OUTPUT_CHARS,
            max_workers: None,
            batch_size: DEFAULT_BATCH_SIZE,
            env_prefix: "APIGRAPH".to_string(),
            analyzers_dir: None,
            host_dir: None,
            container_runtime: None,
            exclude: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn process_timeout(&self) -> Duration {
        match self.timeout_secs {
            0 => DEFAULT_TIMEOUT,
            secs => Duration::from_secs(secs).min(MAX_TIMEOUT),
        }
    }

    pub fn workers(&self) -> usize {
        let cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        self.max_workers
            .filter(|&n| n > 0)
            .unwrap_or_else(|| cores.min(WORKER_CEILING))
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size.max(1)
    }

    /// Overlay environment overrides. Invalid values are logged and ignored.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(raw) = lookup(crate::sandbox::TIMEOUT_ENV) {
            self.timeout_secs = crate::sandbox::parse_timeout(Some(&raw)).as_secs();
        }
        if let Some(raw) = lookup(MAX_WORKERS_ENV) {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => self.max_workers = Some(n),
                _ => tracing::warn!("Ignoring invalid {}={:?}", MAX_WORKERS_ENV, raw),
            }
        }
        self
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("apigraph.toml")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<EngineConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: EngineConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

/// Config file (if any) with environment overrides applied.
pub fn resolve_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    let config = load_config(path)?.unwrap_or_default();
    Ok(config.with_env_overrides())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apigraph.toml");
        std::fs::write(&path, "timeout_secs = 60\nexclude = [\"generated/\"]\n").unwrap();

        let config = load_config(Some(&path)).unwrap().unwrap();
        assert_eq!(config.process_timeout(), Duration::from_secs(60));
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.exclude, vec!["generated/".to_string()]);
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("nope.toml"))).unwrap().is_none());
    }

    #[test]
    fn test_env_overrides() {
        let config = EngineConfig::default().with_overrides_from(|key| match key {
            "APIGRAPH_PROCESS_TIMEOUT_SECS" => Some("99999".to_string()),
            "APIGRAPH_MAX_WORKERS" => Some("3".to_string()),
            _ => None,
        });
        assert_eq!(config.process_timeout(), MAX_TIMEOUT);
        assert_eq!(config.workers(), 3);

        let invalid = EngineConfig::default().with_overrides_from(|key| match key {
            "APIGRAPH_MAX_WORKERS" => Some("many".to_string()),
            _ => None,
        });
        assert_eq!(invalid.max_workers, None);
        assert!(invalid.workers() >= 1 && invalid.workers() <= 8);
    }
}
