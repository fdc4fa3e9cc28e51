//! Locating the unpacked engine on disk.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::error::BridgeError;

const UNKNOWN_VERSION: &str = "unknown";

/// Paths and version of an installed engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineArtifacts {
    startup_script: PathBuf,
    rules_dir: PathBuf,
    version: String,
}

impl EngineArtifacts {
    #[must_use]
    pub fn new(
        startup_script: impl Into<PathBuf>,
        rules_dir: impl Into<PathBuf>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            startup_script: startup_script.into(),
            rules_dir: rules_dir.into(),
            version: version.into(),
        }
    }

    #[must_use]
    pub fn startup_script(&self) -> &Path {
        &self.startup_script
    }

    #[must_use]
    pub fn rules_dir(&self) -> &Path {
        &self.rules_dir
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }
}

/// Makes the engine available before a launch.
pub trait ArtifactProvisioner: Send + Sync {
    fn ensure_artifacts(&self) -> Result<EngineArtifacts, BridgeError>;
}

/// An engine already unpacked under a root directory:
///
/// ```text
/// <root>/package/bin/server
/// <root>/package/lib/rules/*.js
/// <root>/package/package.json
/// ```
#[derive(Debug, Clone)]
pub struct InstalledArtifacts {
    root: PathBuf,
}

#[derive(Deserialize)]
struct PackageManifest {
    version: Option<String>,
}

impl InstalledArtifacts {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn package_dir(&self) -> PathBuf {
        self.root.join("package")
    }

    fn discover(&self) -> Result<EngineArtifacts> {
        let package = self.package_dir();
        let startup_script = package.join("bin").join("server");
        if !startup_script.is_file() {
            bail!(
                "engine startup script not found at {}",
                startup_script.display()
            );
        }
        let rules_dir = package.join("lib").join("rules");
        if !rules_dir.is_dir() {
            tracing::warn!(dir = %rules_dir.display(), "Engine rules directory is missing");
        }
        let version = read_version(&package.join("package.json")).unwrap_or_else(|e| {
            tracing::debug!("Cannot read engine version: {e:#}");
            UNKNOWN_VERSION.to_string()
        });
        Ok(EngineArtifacts {
            startup_script,
            rules_dir,
            version,
        })
    }
}

fn read_version(manifest: &Path) -> Result<String> {
    let raw = fs::read_to_string(manifest)
        .with_context(|| format!("reading {}", manifest.display()))?;
    let manifest: PackageManifest = serde_json::from_str(&raw)
        .with_context(|| format!("parsing {}", manifest.display()))?;
    manifest.version.context("package.json has no version")
}

impl ArtifactProvisioner for InstalledArtifacts {
    fn ensure_artifacts(&self) -> Result<EngineArtifacts, BridgeError> {
        self.discover()
            .map_err(|e| BridgeError::process_start(format!("{e:#}")))
    }
}
