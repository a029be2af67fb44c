//! CLI argument definitions using clap derive

use crate::build::{BuildMode, BuildRequest};
use crate::config::Config;
use crate::tools::CompileOptions;
use clap::builder::FalseyValueParser;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

/// Kiln - cache-aware bundle builder
///
/// Builds a project into a data artifact plus loader script inside an
/// isolated workspace, reusing installed dependencies across builds.
#[derive(Parser, Debug)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "text", env = "KILN_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Start project discovery here instead of the current directory
    #[arg(short = 'C', long, global = true, env = "KILN_PROJECT")]
    pub project: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the project once
    Build(BuildArgs),

    /// Rebuild on every source change
    Watch(WatchArgs),

    /// Manage the vendor cache
    Cache(CacheArgs),

    /// Remove retained build workspaces
    Clean(CleanArgs),

    /// Show configuration
    Config(ConfigArgs),

    /// Create a kiln.toml in a project directory
    Init(InitArgs),
}

/// Compile flags shared by build and watch
#[derive(Args, Debug, Clone)]
pub struct BuildFlags {
    /// Emit debug metadata and write build/debug/index.json
    #[arg(long, env = "KILN_DEBUG_META", value_parser = FalseyValueParser::new())]
    pub debug_meta: bool,

    /// Emit source maps
    #[arg(long, env = "KILN_SOURCE_MAPS", value_parser = FalseyValueParser::new())]
    pub source_maps: bool,

    /// Build mode (development enables both flags above)
    #[arg(long, value_enum, default_value = "production", env = "KILN_MODE")]
    pub mode: BuildMode,
}

impl BuildFlags {
    pub fn options(&self) -> CompileOptions {
        CompileOptions {
            emit_debug_metadata: self.debug_meta,
            emit_source_maps: self.source_maps,
        }
    }

    /// Resolve the build request for a project
    pub fn request(&self, project_root: &Path, config: &Config) -> BuildRequest {
        BuildRequest::from_config(project_root, config, self.mode, self.options())
    }
}

/// Arguments for the build command
#[derive(Parser, Debug)]
pub struct BuildArgs {
    #[command(flatten)]
    pub flags: BuildFlags,
}

/// Arguments for the watch command
#[derive(Parser, Debug)]
pub struct WatchArgs {
    #[command(flatten)]
    pub flags: BuildFlags,

    /// Minimum time between build starts (default: from config)
    #[arg(long, env = "KILN_DEBOUNCE_MS")]
    pub debounce_ms: Option<u64>,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List cache entries
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,

        /// Include entries of every project
        #[arg(long)]
        all: bool,
    },

    /// Show the cache key and state for the current project
    Info,

    /// Remove old entries
    Gc {
        /// Remove entries older than N days (default: from config)
        #[arg(long)]
        days: Option<u32>,

        /// Dry run - show what would be removed
        #[arg(long)]
        dry_run: bool,
    },

    /// Remove entries
    Clear {
        /// Clear entries of every project, not just this one
        #[arg(long)]
        all: bool,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Arguments for the clean command
#[derive(Parser, Debug)]
pub struct CleanArgs {
    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,

    /// Show configuration file path
    Path,
}

/// Arguments for the init command
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Overwrite existing kiln.toml
    #[arg(short, long)]
    pub force: bool,

    /// Target directory (defaults to current directory)
    #[arg(short, long)]
    pub path: Option<PathBuf>,
}

/// Output format for listings
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}
