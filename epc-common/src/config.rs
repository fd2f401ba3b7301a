//! Controller configuration.
//!
//! Loaded from a TOML file with `EPC_`-prefixed environment variable
//! overrides applied on top. Validation happens at load time so a bad
//! deployment fails on startup, not mid-reconciliation.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::ConfigError;

/// Environment variable prefix for overrides.
const ENV_PREFIX: &str = "EPC_";

/// Default interval between reconcile ticks.
const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// Credential material for one repository URL prefix.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialEntry {
    /// Repo URLs starting with this prefix use these credentials. The
    /// longest matching prefix wins.
    pub url_prefix: String,
    pub username: String,
    pub password: String,
}

/// Identity used for promotion commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitterConfig {
    pub name: String,
    pub email: String,
}

impl Default for CommitterConfig {
    fn default() -> Self {
        Self {
            name: "epc".to_string(),
            email: "epc@localhost".to_string(),
        }
    }
}

/// Top-level controller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Interval between reconcile ticks, as a humantime string ("30s").
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,
    /// TOML file seeding the object store with Environment and Application
    /// documents.
    #[serde(default)]
    pub environments_file: Option<PathBuf>,
    #[serde(default)]
    pub committer: CommitterConfig,
    #[serde(default)]
    pub credentials: Vec<CredentialEntry>,
}

fn default_poll_interval() -> String {
    format!("{DEFAULT_POLL_INTERVAL_SECS}s")
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            environments_file: None,
            committer: CommitterConfig::default(),
            credentials: Vec::new(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from `path`, or defaults when `path` is `None`
    /// and no file exists at the conventional location.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path.map(PathBuf::from).or_else(default_config_path) {
            Some(p) if p.exists() => {
                let raw = std::fs::read_to_string(&p).map_err(|source| ConfigError::Read {
                    path: p.display().to_string(),
                    source,
                })?;
                toml::from_str(&raw).map_err(|source| ConfigError::Parse {
                    path: p.display().to_string(),
                    source,
                })?
            }
            Some(p) if path.is_some() => {
                // An explicitly named file must exist.
                return Err(ConfigError::Read {
                    path: p.display().to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
                });
            }
            _ => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `EPC_`-prefixed environment variable overrides.
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(value) = std::env::var(format!("{ENV_PREFIX}POLL_INTERVAL")) {
            self.poll_interval = value;
        }
        if let Ok(value) = std::env::var(format!("{ENV_PREFIX}ENVIRONMENTS_FILE")) {
            self.environments_file = Some(PathBuf::from(value));
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        humantime::parse_duration(&self.poll_interval).map_err(|_| {
            ConfigError::InvalidEnvValue {
                var: "poll_interval".to_string(),
                value: self.poll_interval.clone(),
            }
        })?;
        Ok(())
    }

    /// Parsed poll interval. `validate` already guaranteed the format.
    pub fn poll_interval(&self) -> Duration {
        humantime::parse_duration(&self.poll_interval)
            .unwrap_or(Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS))
    }
}

/// Conventional config location: `<config dir>/epc/config.toml`.
fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "epc")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}
