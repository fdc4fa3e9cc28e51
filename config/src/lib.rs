//! Configuration loading for lintbridge.
//!
//! The config file lives at `~/.lintbridge/config.toml`. Every field has a
//! default, so a missing file (or a missing section) is not an error.
//!
//! ```toml
//! [sidecar]
//! node_command = "node"
//! artifacts_dir = "${HOME}/.lintbridge/eslint-bridge"
//! port = 0
//! startup_timeout_secs = 30
//! request_timeout_secs = 30
//!
//! [linter]
//! environments = ["node", "browser"]
//! globals = ["angular", "d3"]
//! ```

mod globals;

pub use globals::{
    DEFAULT_ENVIRONMENTS, DEFAULT_GLOBALS, ENVIRONMENTS_PROPERTY_KEY, GLOBALS_PROPERTY_KEY,
    LinterGlobals, split_setting,
};

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use serde::Deserialize;

const CONFIG_DIR_NAME: &str = ".lintbridge";
const CONFIG_FILE_NAME: &str = "config.toml";
const DEFAULT_ARTIFACTS_DIR_NAME: &str = "eslint-bridge";

const fn default_startup_timeout_secs() -> u64 {
    30
}

const fn default_request_timeout_secs() -> u64 {
    30
}

const fn default_shutdown_timeout_secs() -> u64 {
    2
}

fn default_node_command() -> String {
    "node".to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Default, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub sidecar: SidecarConfig,
    #[serde(default)]
    pub linter: LinterConfig,
}

/// How the sidecar process is launched and talked to.
#[derive(Debug, Clone, Deserialize)]
pub struct SidecarConfig {
    /// Executable used to run the startup script. Resolved through `PATH`.
    #[serde(default = "default_node_command")]
    pub node_command: String,
    /// Directory holding the unpacked engine (`package/bin/server`, ...).
    /// Supports `${VAR}` expansion.
    pub artifacts_dir: Option<String>,
    /// Port requested from the sidecar. 0 lets the sidecar choose.
    #[serde(default)]
    pub port: u16,
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            node_command: default_node_command(),
            artifacts_dir: None,
            port: 0,
            startup_timeout_secs: default_startup_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl SidecarConfig {
    #[must_use]
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Resolved artifacts directory: the configured value with `${VAR}`
    /// expanded, or `~/.lintbridge/eslint-bridge`.
    #[must_use]
    pub fn artifacts_dir(&self) -> Option<PathBuf> {
        match &self.artifacts_dir {
            Some(raw) => Some(PathBuf::from(expand_env_vars(raw))),
            None => config_dir().map(|dir| dir.join(DEFAULT_ARTIFACTS_DIR_NAME)),
        }
    }
}

/// Linter session defaults. Unset lists fall back to the built-in defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LinterConfig {
    pub environments: Option<Vec<String>>,
    pub globals: Option<Vec<String>>,
}

/// Replace `${VAR}` references with the variable's value (empty if unset).
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let var = &after[..end];
                if !var.is_empty() {
                    out.push_str(&env::var(var).unwrap_or_default());
                }
                rest = &after[end + 1..];
            }
            None => {
                // Unclosed reference: keep the text verbatim.
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

impl BridgeConfig {
    /// Load the user config file. `Ok(None)` when no file exists.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let path = match config_path() {
            Some(path) => path,
            None => return Ok(None),
        };
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from(&path).map(Some)
    }

    /// Load and parse a specific config file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(config),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }
}

fn config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIR_NAME))
}

pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
}
