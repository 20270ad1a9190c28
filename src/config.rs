use std::path::{Path, PathBuf};
use std::time::Duration;
use directories::{BaseDirs, ProjectDirs};
use log::debug;
use serde::Deserialize;
use crate::error::{Error, Result};
use crate::fetch::RetryPolicy;

pub const ROOT_ENV: &str = "TOOLVER_ROOT";
pub const CONFIG_ENV: &str = "TOOLVER_CONFIG";

/// User settings from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Install root holding one directory per tool.
    pub root: PathBuf,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub timeout_secs: u64,
    /// Directory of JSON tool definitions overriding the built-in ones.
    pub definitions_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            root: default_root(),
            max_retries: 3,
            retry_delay_ms: 2000,
            timeout_secs: 1800,
            definitions_dir: None,
        }
    }
}

impl Settings {
    /// Loads settings from `$TOOLVER_CONFIG` or the platform config directory,
    /// then applies `$TOOLVER_ROOT`. A missing file yields defaults.
    pub fn load() -> Result<Self> {
        let path = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Some(PathBuf::from(path)),
            None => config_file(),
        };
        let mut settings = match path {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        if let Some(root) = std::env::var_os(ROOT_ENV).filter(|r| !r.is_empty()) {
            settings.root = PathBuf::from(root);
        }
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading settings from {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_toml(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "toolver", "toolver")
}

pub fn config_file() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}

pub fn home_dir() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
}

fn default_root() -> PathBuf {
    home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".toolver")
        .join("versions")
}
