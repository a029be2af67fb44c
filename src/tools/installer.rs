//! Dependency installer invocation

use super::{expand, CommandSpec, ToolOutput};
use crate::config::schema::InstallerConfig;
use crate::error::KilnResult;
use async_trait::async_trait;
use std::path::Path;

/// Abstract dependency installer
///
/// Implementations install production dependencies only, never prompt, and
/// never run package side-effect scripts.
#[async_trait]
pub trait Installer: Send + Sync {
    /// Install the dependencies declared in `project_dir` into `target`
    async fn install(&self, project_dir: &Path, target: &Path) -> KilnResult<ToolOutput>;
}

/// Installer backed by an external package manager
pub struct CommandInstaller {
    config: InstallerConfig,
}

impl CommandInstaller {
    pub fn new(config: InstallerConfig) -> Self {
        Self { config }
    }

    fn command(&self, project_dir: &Path, target: &Path) -> CommandSpec {
        let out = target.display().to_string();
        let vars = [("out", out.as_str())];

        let mut spec = CommandSpec::new(&self.config.program)
            .args(self.config.args.iter().map(|a| expand(a, &vars)))
            .current_dir(project_dir);
        if let Some(ref var) = self.config.output_env {
            spec = spec.env(var, &out);
        }
        spec
    }
}

#[async_trait]
impl Installer for CommandInstaller {
    async fn install(&self, project_dir: &Path, target: &Path) -> KilnResult<ToolOutput> {
        self.command(project_dir, target).run().await
    }
}
