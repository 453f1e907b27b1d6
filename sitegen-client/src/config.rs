use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(180);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(4);

pub const ENV_BASE_URL: &str = "SITEGEN_BASE_URL";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "SITEGEN_REQUEST_TIMEOUT_SECS";
pub const ENV_POLL_INTERVAL_MS: &str = "SITEGEN_POLL_INTERVAL_MS";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("Invalid config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// On-disk shape; every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    base_url: Option<String>,
    request_timeout_secs: Option<u64>,
    poll_interval_ms: Option<u64>,
}

impl ClientConfig {
    /// Defaults, then the YAML file (if given), then `SITEGEN_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    pub fn load_with_env<F>(path: Option<&Path>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(path) = path {
            let source = fs::read_to_string(path).map_err(|e| ConfigError::Read {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
            let file: ConfigFile = if source.trim().is_empty() {
                ConfigFile::default()
            } else {
                serde_yaml::from_str(&source).map_err(|e| ConfigError::Parse {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?
            };
            config.apply_file(file);
        }
        config.apply_env(env)?;
        Ok(config)
    }

    fn apply_file(&mut self, file: ConfigFile) {
        if let Some(url) = file.base_url {
            self.base_url = url;
        }
        if let Some(secs) = file.request_timeout_secs {
            self.request_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = file.poll_interval_ms {
            self.poll_interval = Duration::from_millis(ms);
        }
    }

    fn apply_env<F>(&mut self, env: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = env(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            self.base_url = url.trim().to_string();
        }
        if let Some(raw) = env(ENV_REQUEST_TIMEOUT_SECS) {
            self.request_timeout = Duration::from_secs(parse_number(ENV_REQUEST_TIMEOUT_SECS, &raw)?);
        }
        if let Some(raw) = env(ENV_POLL_INTERVAL_MS) {
            self.poll_interval = Duration::from_millis(parse_number(ENV_POLL_INTERVAL_MS, &raw)?);
        }
        self.base_url = self.base_url.trim_end_matches('/').to_string();
        Ok(())
    }
}

fn parse_number(key: &str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::load_with_env(None, no_env).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.poll_interval, Duration::from_secs(4));
    }

    #[test]
    fn test_file_then_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sitegen.yaml");
        fs::write(&path, "base_url: https://api.example.com/\npoll_interval_ms: 1500\n").unwrap();

        let env: HashMap<&str, &str> = [(ENV_REQUEST_TIMEOUT_SECS, "30")].into_iter().collect();
        let config = ClientConfig::load_with_env(Some(&path), |k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.base_url, "https://api.example.com");
        assert_eq!(config.poll_interval, Duration::from_millis(1500));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sitegen.yaml");
        fs::write(&path, "base_url: http://file\n").unwrap();
        let config = ClientConfig::load_with_env(Some(&path), |k| {
            (k == ENV_BASE_URL).then(|| "http://env".to_string())
        })
        .unwrap();
        assert_eq!(config.base_url, "http://env");
    }

    #[test]
    fn test_bad_values_are_errors() {
        let err = ClientConfig::load_with_env(None, |k| (k == ENV_POLL_INTERVAL_MS).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        fs::write(&path, "base_url: [1, 2\n").unwrap();
        assert!(matches!(
            ClientConfig::load_with_env(Some(&path), no_env),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            ClientConfig::load_with_env(Some(&dir.path().join("missing.yaml")), no_env),
            Err(ConfigError::Read { .. })
        ));
    }
}
