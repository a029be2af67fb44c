//! Error types for kiln
//!
//! All modules use `KilnResult<T>` as their return type. Component errors
//! are propagated upward unchanged; the build pipeline only attaches cleanup.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for kiln operations
pub type KilnResult<T> = Result<T, KilnError>;

/// All errors that can occur in kiln
#[derive(Error, Debug)]
pub enum KilnError {
    // Project discovery
    #[error("No kiln.toml found in {} or any parent directory", .start.display())]
    ProjectRootNotFound { start: PathBuf },

    // Dependency cache errors
    #[error("Dependency descriptor unreadable: {}", .path.display())]
    DescriptorUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Dependency install failed (exit code: {})", display_code(.code))]
    DependencyInstallFailed { code: Option<i32>, output: Vec<String> },

    // Workspace errors
    #[error("Workspace IO error: {context}")]
    WorkspaceIo {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Tool errors
    #[error("Compilation failed (exit code: {})", display_code(.code))]
    CompilationFailed { code: Option<i32>, output: Vec<String> },

    #[error("Packaging failed (exit code: {})", display_code(.code))]
    PackagingFailed { code: Option<i32>, output: Vec<String> },

    #[error("Failed to launch {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Configuration errors
    #[error("Invalid configuration at {}: {reason}", .path.display())]
    ConfigInvalid { path: PathBuf, reason: String },

    // Watch errors
    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

fn display_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |c| c.to_string())
}

impl KilnError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a workspace IO error with context
    pub fn workspace(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::WorkspaceIo {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Subprocess output captured by the failing tool, if any
    pub fn captured_output(&self) -> Option<&[String]> {
        match self {
            Self::DependencyInstallFailed { output, .. }
            | Self::CompilationFailed { output, .. }
            | Self::PackagingFailed { output, .. } => Some(output),
            _ => None,
        }
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::ProjectRootNotFound { .. } => 2,
            _ => 1,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::ProjectRootNotFound { .. } => Some("Run: kiln init"),
            Self::DescriptorUnreadable { .. } => {
                Some("Check [project].descriptors in kiln.toml")
            }
            Self::CommandFailed { .. } => Some("Check the [tools] programs in kiln.toml"),
            _ => None,
        }
    }
}
