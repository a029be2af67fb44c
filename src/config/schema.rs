//! Configuration schema for kiln
//!
//! Configuration is stored at `<project>/kiln.toml`. Every section is
//! optional; an empty file yields the defaults below.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Project layout
    pub project: ProjectConfig,

    /// Vendor cache settings
    pub cache: CacheConfig,

    /// Build workspace settings
    pub workspace: WorkspaceConfig,

    /// External tool invocations
    pub tools: ToolsConfig,

    /// Watch mode settings
    pub watch: WatchConfig,
}

/// Project layout settings, relative to the project root
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Project name (defaults to the project directory name)
    pub name: Option<String>,

    /// Source directory copied into `<workspace>/src`
    pub source_dir: PathBuf,

    /// Bootstrap file copied to the workspace root
    pub bootstrap: PathBuf,

    /// Dependency descriptors hashed into the vendor cache key, in order
    pub descriptors: Vec<PathBuf>,

    /// Directory receiving the packaged artifacts
    pub output_dir: PathBuf,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: None,
            source_dir: PathBuf::from("src"),
            bootstrap: PathBuf::from("index.php"),
            descriptors: vec![
                PathBuf::from("composer.json"),
                PathBuf::from("composer.lock"),
            ],
            output_dir: PathBuf::from("build"),
        }
    }
}

/// Vendor cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Root directory for cache entries (defaults to the system temp dir)
    pub root: Option<PathBuf>,

    /// `kiln cache gc` removes entries older than N days (0 = disabled)
    pub gc_days: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: None,
            gc_days: 30,
        }
    }
}

/// Workspace configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Root directory for build workspaces (defaults to the system temp dir)
    pub root: Option<PathBuf>,
}

/// External tool configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Dependency installer
    pub installer: InstallerConfig,

    /// Source compiler
    pub compiler: CompilerConfig,

    /// Bundler / packager
    pub packager: PackagerConfig,
}

/// Dependency installer invocation
///
/// Arguments may reference `{out}` (the target vendor directory).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerConfig {
    pub program: String,
    pub args: Vec<String>,

    /// Environment variable that receives the target directory
    pub output_env: Option<String>,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            program: "composer".to_string(),
            args: vec![
                "install".to_string(),
                "--no-dev".to_string(),
                "--no-interaction".to_string(),
                "--no-scripts".to_string(),
                "--no-progress".to_string(),
            ],
            output_env: Some("COMPOSER_VENDOR_DIR".to_string()),
        }
    }
}

/// Compiler invocation
///
/// Arguments may reference `{src}` (the workspace source subtree, used for
/// both input and output).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    pub program: String,
    pub args: Vec<String>,

    /// Flag appended when debug metadata side-files are requested
    pub debug_flag: String,

    /// Flag appended when browser source maps are requested
    pub source_map_flag: String,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            program: "kilnc".to_string(),
            args: vec!["{src}".to_string(), "{src}".to_string()],
            debug_flag: "--debug-meta".to_string(),
            source_map_flag: "--source-maps".to_string(),
        }
    }
}

/// Packager invocation
///
/// Arguments may reference `{data}`, `{loader}`, `{workspace}`, `{mount}` and
/// `{preload}` (the `{workspace}@{mount}` mapping).
/// Each `exclude` pattern is passed after an `--exclude` flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PackagerConfig {
    pub program: String,
    pub args: Vec<String>,

    /// Virtual root the workspace is mounted at inside the bundle
    pub mount_point: String,

    /// Non-payload patterns excluded from the bundle
    pub exclude: Vec<String>,
}

impl Default for PackagerConfig {
    fn default() -> Self {
        Self {
            program: "file_packager".to_string(),
            args: vec![
                "{data}".to_string(),
                "--preload".to_string(),
                "{preload}".to_string(),
                "--js-output={loader}".to_string(),
            ],
            mount_point: "/app".to_string(),
            exclude: vec![
                ".git".to_string(),
                ".hg".to_string(),
                ".svn".to_string(),
                "build".to_string(),
                "docs".to_string(),
                "*.md".to_string(),
            ],
        }
    }
}

/// Watch mode configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Minimum milliseconds between the start of two triggered builds
    pub debounce_ms: u64,

    /// Watched paths relative to the project root (empty = source dir,
    /// bootstrap file and descriptors)
    pub paths: Vec<PathBuf>,

    /// Glob patterns for transient and editor files that never trigger a build
    pub exclude: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 2000,
            paths: vec![],
            exclude: vec![
                "*.swp".to_string(),
                "*.swx".to_string(),
                "*~".to_string(),
                ".#*".to_string(),
                "#*#".to_string(),
                "*.tmp".to_string(),
                "4913".to_string(),
                ".DS_Store".to_string(),
            ],
        }
    }
}
