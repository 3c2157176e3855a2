//! Engine-wide configuration, loaded with the same fallback chain as a
//! typical CLI tool's config: an explicit path, else a project-local
//! dotfile, else the user's config directory, else built-in defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckpointPolicy {
    EveryCycle,
    EveryNInferences(u64),
}

impl Default for CheckpointPolicy {
    fn default() -> Self {
        CheckpointPolicy::EveryNInferences(10)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RetryPolicy {
    pub retry_body_errors: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { retry_body_errors: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EngineConfig {
    pub max_cycles: u64,
    pub checkpoint_policy: CheckpointPolicy,
    /// `{run_id}` is substituted at checkpoint-store-open time.
    pub db_path_template: String,
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_cycles: 1000,
            checkpoint_policy: CheckpointPolicy::default(),
            db_path_template: "data/runs/{run_id}/run.db".to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Fallback chain: `explicit_path`, then `./.normcode.yml`, then
    /// `dirs::config_dir()/normcode/normcode.yml`, then built-in defaults.
    /// A present-but-unparsable file logs a warning and falls through
    /// rather than aborting the run.
    pub fn load(explicit_path: Option<&Path>) -> Self {
        if let Some(path) = explicit_path {
            match Self::load_from_file(path) {
                Ok(config) => {
                    tracing::info!(path = %path.display(), "loaded engine config");
                    return config;
                }
                Err(error) => {
                    tracing::warn!(path = %path.display(), %error, "failed to load explicit config path, falling back");
                }
            }
        }

        let local = PathBuf::from(".normcode.yml");
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    tracing::info!(path = %local.display(), "loaded project-local engine config");
                    return config;
                }
                Err(error) => {
                    tracing::warn!(path = %local.display(), %error, "failed to load project-local config, falling back");
                }
            }
        }

        if let Some(dir) = dirs::config_dir() {
            let path = dir.join("normcode").join("normcode.yml");
            if path.exists() {
                match Self::load_from_file(&path) {
                    Ok(config) => {
                        tracing::info!(path = %path.display(), "loaded user engine config");
                        return config;
                    }
                    Err(error) => {
                        tracing::warn!(path = %path.display(), %error, "failed to load user config, falling back");
                    }
                }
            }
        }

        tracing::info!("no config file found, using built-in defaults");
        Self::default()
    }

    fn load_from_file(path: &Path) -> Result<Self, String> {
        let raw = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
        serde_yaml::from_str(&raw).map_err(|e| e.to_string())
    }

    pub fn db_path(&self, run_id: &str) -> PathBuf {
        PathBuf::from(self.db_path_template.replace("{run_id}", run_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = EngineConfig::default();
        assert_eq!(config.max_cycles, 1000);
        assert_eq!(config.checkpoint_policy, CheckpointPolicy::EveryNInferences(10));
    }

    #[test]
    fn missing_explicit_path_falls_back_to_defaults() {
        let config = EngineConfig::load(Some(Path::new("/nonexistent/path/config.yml")));
        assert_eq!(config.max_cycles, 1000);
    }

    #[test]
    fn db_path_substitutes_run_id() {
        let config = EngineConfig::default();
        assert_eq!(config.db_path("abc"), PathBuf::from("data/runs/abc/run.db"));
    }

    #[test]
    fn loads_explicit_yaml_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, "max-cycles: 42\ncheckpoint-policy: every-cycle\n").unwrap();
        let config = EngineConfig::load(Some(&path));
        assert_eq!(config.max_cycles, 42);
        assert_eq!(config.checkpoint_policy, CheckpointPolicy::EveryCycle);
    }
}
