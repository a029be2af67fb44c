//! Source compiler invocation
//!
//! The compiler transforms the workspace source subtree in place (the same
//! path is used for input and output). This module performs no cleanup on
//! failure; the caller owns the workspace.

use super::{expand, CommandSpec, ToolOutput};
use crate::config::schema::CompilerConfig;
use crate::error::{KilnError, KilnResult};
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// File name suffix of compiler-emitted debug metadata side-files
pub const SIDE_FILE_SUFFIX: &str = ".kmeta";

/// Optional compiler outputs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CompileOptions {
    /// Emit debug metadata side-files next to compiled sources
    pub emit_debug_metadata: bool,
    /// Emit browser-facing source maps
    pub emit_source_maps: bool,
}

/// Successful compilation
#[derive(Debug, Clone, Default)]
pub struct CompileResult {
    /// Compiler output lines
    pub lines: Vec<String>,
    /// Side-files found under the compiled subtree (empty unless requested)
    pub side_files: Vec<PathBuf>,
}

/// Abstract compiler interface
#[async_trait]
pub trait Compiler: Send + Sync {
    /// Compile `source` in place
    async fn compile(&self, source: &Path, options: &CompileOptions) -> KilnResult<ToolOutput>;
}

/// Compiler backed by an external executable
pub struct CommandCompiler {
    config: CompilerConfig,
}

impl CommandCompiler {
    pub fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    fn command(&self, source: &Path, options: &CompileOptions) -> CommandSpec {
        let src = source.display().to_string();
        let vars = [("src", src.as_str())];

        let mut spec = CommandSpec::new(&self.config.program)
            .args(self.config.args.iter().map(|a| expand(a, &vars)));
        if options.emit_debug_metadata {
            spec = spec.arg(&self.config.debug_flag);
        }
        if options.emit_source_maps {
            spec = spec.arg(&self.config.source_map_flag);
        }
        spec
    }
}

#[async_trait]
impl Compiler for CommandCompiler {
    async fn compile(&self, source: &Path, options: &CompileOptions) -> KilnResult<ToolOutput> {
        self.command(source, options).run().await
    }
}

/// Run the compiler over `source`, failing with `CompilationFailed` on a
/// non-zero exit. Side-files are collected only when debug metadata was
/// requested.
pub async fn compile(
    compiler: &dyn Compiler,
    source: &Path,
    options: &CompileOptions,
) -> KilnResult<CompileResult> {
    let output = compiler.compile(source, options).await?;
    if !output.success() {
        return Err(KilnError::CompilationFailed {
            code: output.code,
            output: output.lines,
        });
    }

    let side_files = if options.emit_debug_metadata {
        let root = source.to_path_buf();
        tokio::task::spawn_blocking(move || find_side_files(&root))
            .await
            .map_err(|e| KilnError::Internal(format!("side-file scan panicked: {}", e)))??
    } else {
        vec![]
    };
    debug!("Found {} side-file(s)", side_files.len());

    Ok(CompileResult {
        lines: output.lines,
        side_files,
    })
}

/// Find every side-file under `root`, sorted by path
pub fn find_side_files(root: &Path) -> KilnResult<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(|e| {
            let context = format!("scanning {} for side-files", root.display());
            KilnError::workspace(context, e.into())
        })?;
        if entry.file_type().is_file()
            && entry
                .file_name()
                .to_string_lossy()
                .ends_with(SIDE_FILE_SUFFIX)
        {
            found.push(entry.into_path());
        }
    }
    found.sort();
    Ok(found)
}
