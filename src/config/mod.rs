//! Configuration management for kiln

pub mod schema;

pub use schema::Config;

use crate::error::{KilnError, KilnResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Project config file name; its presence marks a project root
pub const CONFIG_FILE: &str = "kiln.toml";

/// Configuration manager for one project
pub struct ConfigManager {
    project_root: PathBuf,
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a config manager for a known project root
    pub fn new(project_root: PathBuf) -> Self {
        let config_path = project_root.join(CONFIG_FILE);
        Self {
            project_root,
            config_path,
        }
    }

    /// Walk upward from `start` and return a manager for the first
    /// directory containing `kiln.toml`
    pub fn discover(start: &Path) -> KilnResult<Self> {
        Self::find_project_root(start).map(Self::new)
    }

    /// Find the nearest ancestor of `start` (inclusive) containing `kiln.toml`
    pub fn find_project_root(start: &Path) -> KilnResult<PathBuf> {
        let mut current = start
            .canonicalize()
            .unwrap_or_else(|_| start.to_path_buf());

        loop {
            if current.join(CONFIG_FILE).is_file() {
                debug!("Found project root: {}", current.display());
                return Ok(current);
            }

            if !current.pop() {
                return Err(KilnError::ProjectRootNotFound {
                    start: start.to_path_buf(),
                });
            }
        }
    }

    /// Load the project configuration
    pub async fn load(&self) -> KilnResult<Config> {
        let content = fs::read_to_string(&self.config_path).await.map_err(|e| {
            KilnError::io(format!("reading config from {}", self.config_path.display()), e)
        })?;

        toml::from_str(&content).map_err(|e| KilnError::ConfigInvalid {
            path: self.config_path.clone(),
            reason: e.to_string(),
        })
    }

    /// Project root directory
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Config {
    /// Project name from config, falling back to the root directory name
    pub fn project_name(&self, project_root: &Path) -> String {
        self.project
            .name
            .clone()
            .or_else(|| {
                project_root
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| "project".to_string())
    }

    /// Root directory holding vendor cache entries
    pub fn cache_root(&self) -> PathBuf {
        self.cache
            .root
            .as_deref()
            .map(expand_home)
            .unwrap_or_else(std::env::temp_dir)
    }

    /// Root directory holding build workspaces
    pub fn workspace_root(&self) -> PathBuf {
        self.workspace
            .root
            .as_deref()
            .map(expand_home)
            .unwrap_or_else(std::env::temp_dir)
    }
}

/// Expand a leading `~` to the user's home directory
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}
