//! Bundler / packager invocation
//!
//! The packager serializes a populated workspace into a primary data
//! artifact plus a companion loader script, preloading the workspace at a
//! fixed virtual mount point.

use super::{expand, CommandSpec, ToolOutput};
use crate::config::schema::PackagerConfig;
use crate::error::{KilnError, KilnResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// One packaging run
#[derive(Debug, Clone)]
pub struct PackRequest {
    /// Absolute real path of the populated workspace
    pub workspace: PathBuf,
    /// Virtual root the workspace appears at inside the bundle
    pub mount_point: String,
    /// Primary data artifact to write
    pub data_path: PathBuf,
    /// Companion loader/manifest script to write
    pub loader_path: PathBuf,
    /// Non-payload glob patterns
    pub exclude: Vec<String>,
}

impl PackRequest {
    /// The `source@mount` preload mapping passed to the bundler
    pub fn preload_mapping(&self) -> String {
        format!("{}@{}", self.workspace.display(), self.mount_point)
    }
}

/// Abstract packager interface
#[async_trait]
pub trait Packager: Send + Sync {
    async fn pack(&self, request: &PackRequest) -> KilnResult<ToolOutput>;
}

/// Packager backed by an external bundler executable
pub struct CommandPackager {
    config: PackagerConfig,
}

impl CommandPackager {
    pub fn new(config: PackagerConfig) -> Self {
        Self { config }
    }

    fn command(&self, request: &PackRequest) -> CommandSpec {
        let data = request.data_path.display().to_string();
        let loader = request.loader_path.display().to_string();
        let workspace = request.workspace.display().to_string();
        let preload = request.preload_mapping();
        let vars = [
            ("data", data.as_str()),
            ("loader", loader.as_str()),
            ("workspace", workspace.as_str()),
            ("mount", request.mount_point.as_str()),
            ("preload", preload.as_str()),
        ];

        let mut spec = CommandSpec::new(&self.config.program)
            .args(self.config.args.iter().map(|a| expand(a, &vars)));
        if !request.exclude.is_empty() {
            spec = spec.arg("--exclude").args(request.exclude.iter().cloned());
        }
        spec
    }
}

#[async_trait]
impl Packager for CommandPackager {
    async fn pack(&self, request: &PackRequest) -> KilnResult<ToolOutput> {
        self.command(request).run().await
    }
}

/// Run the packager, failing with `PackagingFailed` on a non-zero exit
pub async fn pack(packager: &dyn Packager, request: &PackRequest) -> KilnResult<ToolOutput> {
    let output = packager.pack(request).await?;
    if output.success() {
        Ok(output)
    } else {
        Err(KilnError::PackagingFailed {
            code: output.code,
            output: output.lines,
        })
    }
}

/// Canonical absolute path of `path`, as required for the preload mapping
pub fn real_path(path: &Path) -> KilnResult<PathBuf> {
    path.canonicalize()
        .map_err(|e| KilnError::workspace(format!("resolving {}", path.display()), e))
}
