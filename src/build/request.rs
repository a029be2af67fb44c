//! Per-invocation build request

use crate::config::Config;
use crate::tools::CompileOptions;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Debug metadata index location, relative to the project root
pub const DEBUG_DIR: &str = "build/debug";

/// Build mode tag
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    /// Debug metadata and source maps enabled
    Development,
    #[default]
    Production,
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
        }
    }
}

/// Everything one build attempt needs. Immutable once created.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub project_root: PathBuf,
    pub project_name: String,
    pub source_dir: PathBuf,
    pub bootstrap: PathBuf,
    pub descriptors: Vec<PathBuf>,
    pub output_dir: PathBuf,
    pub mode: BuildMode,
    pub options: CompileOptions,
}

impl BuildRequest {
    /// Resolve a request from project config. Development mode forces both
    /// metadata flags on.
    pub fn from_config(
        project_root: &Path,
        config: &Config,
        mode: BuildMode,
        mut options: CompileOptions,
    ) -> Self {
        if mode == BuildMode::Development {
            options.emit_debug_metadata = true;
            options.emit_source_maps = true;
        }

        let project = &config.project;
        Self {
            project_root: project_root.to_path_buf(),
            project_name: config.project_name(project_root),
            source_dir: project_root.join(&project.source_dir),
            bootstrap: project_root.join(&project.bootstrap),
            descriptors: project
                .descriptors
                .iter()
                .map(|d| project_root.join(d))
                .collect(),
            output_dir: project_root.join(&project.output_dir),
            mode,
            options,
        }
    }

    /// File name of the primary data artifact
    pub fn data_file_name(&self) -> String {
        format!("{}.data", self.project_name)
    }

    /// File name of the companion loader script
    pub fn loader_file_name(&self) -> String {
        format!("{}.js", self.project_name)
    }

    /// Final location of the primary data artifact
    pub fn data_artifact(&self) -> PathBuf {
        self.output_dir.join(self.data_file_name())
    }

    /// Final location of the loader script
    pub fn loader_artifact(&self) -> PathBuf {
        self.output_dir.join(self.loader_file_name())
    }

    /// Directory receiving the debug metadata index
    pub fn debug_dir(&self) -> PathBuf {
        self.project_root.join(DEBUG_DIR)
    }
}
