use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use tandem_util::errors::TandemError;

/// Tandem configuration, usually loaded from `tandem.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TandemConfig {
    #[serde(default)]
    pub resolver: ResolverConfig,
}

/// Resolver settings from `[resolver]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Upper bound on registry requests in flight at once.
    #[serde(default = "default_fetch_concurrency", rename = "fetch-concurrency")]
    pub fetch_concurrency: usize,
    /// Directory local `link:`/`path:` locations are checked against.
    #[serde(default = "default_project_root", rename = "project-root")]
    pub project_root: PathBuf,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            fetch_concurrency: default_fetch_concurrency(),
            project_root: default_project_root(),
        }
    }
}

fn default_fetch_concurrency() -> usize {
    8
}

fn default_project_root() -> PathBuf {
    PathBuf::from(".")
}

impl ResolverConfig {
    /// Number of semaphore permits to hand out; never zero.
    pub fn fetch_permits(&self) -> usize {
        self.fetch_concurrency.max(1)
    }

    /// Where a project-relative location lives on disk.
    pub fn on_disk(&self, location: &Path) -> PathBuf {
        self.project_root.join(location)
    }
}

impl TandemConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, TandemError> {
        toml::from_str(content).map_err(|e| TandemError::Config {
            message: format!("Failed to parse config: {e}"),
        })
    }

    pub fn from_path(path: &Path) -> Result<Self, TandemError> {
        let content = std::fs::read_to_string(path).map_err(|e| TandemError::Config {
            message: format!("Failed to read {}: {e}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::from_path(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config, using defaults: {e}");
                Self::default()
            }
        }
    }
}
