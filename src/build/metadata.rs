//! Debug metadata aggregation
//!
//! After a successful development compile, every side-file emitted under
//! the compiled source subtree is folded into one `index.json` and copied
//! flat into the debug directory (`lib/a.php.kmeta` becomes
//! `lib_a.php.kmeta`). Zero side-files is the normal case when no source
//! exercised metadata emission, and still produces a valid index.

use crate::build::request::BuildMode;
use crate::error::{KilnError, KilnResult};
use crate::fsutil;
use crate::tools::SIDE_FILE_SUFFIX;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Schema identifier written into every index
pub const INDEX_SCHEMA: &str = "kiln.debug-index/v1";

/// Index file name inside the debug directory
pub const INDEX_FILE: &str = "index.json";

/// Replaces path separators in flattened side-file names
const FLAT_FILLER: char = '_';

/// Per-file statistics read from a side-file. Missing fields default to zero.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SideFileStats {
    source: Option<String>,
    transforms: u64,
    compile_ms: f64,
}

/// One side-file in the index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Runtime path of the compiled file inside the bundle
    pub virtual_path: String,
    /// Originating source file
    pub source_path: String,
    /// SHA256 of the side-file contents
    pub checksum: String,
    /// Number of constructs the compiler transformed
    pub transforms: u64,
    /// Compile time in milliseconds
    pub compile_ms: f64,
    /// Flattened copy inside the debug directory
    pub flat_name: String,
}

/// Run-wide totals
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexTotals {
    pub file_count: usize,
    pub transforms: u64,
    pub compile_ms: f64,
}

/// Consolidated debug metadata index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugIndex {
    pub schema: String,
    pub generated_at: DateTime<Utc>,
    pub mode: BuildMode,
    pub files: Vec<IndexEntry>,
    pub totals: IndexTotals,
}

impl DebugIndex {
    fn new(mode: BuildMode) -> Self {
        Self {
            schema: INDEX_SCHEMA.to_string(),
            generated_at: Utc::now(),
            mode,
            files: vec![],
            totals: IndexTotals::default(),
        }
    }

    fn push(&mut self, entry: IndexEntry) {
        self.totals.file_count += 1;
        self.totals.transforms += entry.transforms;
        self.totals.compile_ms += entry.compile_ms;
        self.files.push(entry);
    }
}

/// Inputs to one aggregation run
#[derive(Debug, Clone)]
pub struct Aggregation<'a> {
    /// Compiled source subtree the side-files live under
    pub compiled_root: &'a Path,
    /// Project-side source directory the compiled tree was copied from
    pub origin_root: &'a Path,
    /// Virtual runtime prefix of the compiled tree (`{mount}/src`)
    pub virtual_root: &'a str,
    /// Destination directory for the index and flattened copies
    pub debug_dir: &'a Path,
    pub mode: BuildMode,
}

/// Build and write the index for `side_files`
///
/// The debug directory is recreated so stale copies from earlier builds do
/// not linger.
pub fn aggregate(input: &Aggregation<'_>, side_files: &[PathBuf]) -> KilnResult<DebugIndex> {
    let debug_dir = input.debug_dir;
    fsutil::remove_tree(debug_dir)
        .map_err(|e| KilnError::io(format!("clearing {}", debug_dir.display()), e))?;
    fs::create_dir_all(debug_dir)
        .map_err(|e| KilnError::io(format!("creating {}", debug_dir.display()), e))?;

    let mut index = DebugIndex::new(input.mode);
    let mut taken = HashSet::new();

    for side_file in side_files {
        let relative = side_file.strip_prefix(input.compiled_root).map_err(|_| {
            KilnError::Internal(format!(
                "side-file {} outside {}",
                side_file.display(),
                input.compiled_root.display()
            ))
        })?;
        let contents = fs::read(side_file)
            .map_err(|e| KilnError::io(format!("reading {}", side_file.display()), e))?;

        let stats: SideFileStats = serde_json::from_slice(&contents).unwrap_or_else(|e| {
            warn!("Unparseable side-file {}: {}", side_file.display(), e);
            SideFileStats::default()
        });

        let compiled = strip_suffix(relative);
        let flat_name = unique_name(flatten(relative), &mut taken);
        fs::write(debug_dir.join(&flat_name), &contents)
            .map_err(|e| KilnError::io(format!("copying {}", side_file.display()), e))?;

        index.push(IndexEntry {
            virtual_path: virtual_path(input.virtual_root, &compiled),
            source_path: stats.source.unwrap_or_else(|| {
                input.origin_root.join(&compiled).display().to_string()
            }),
            checksum: hex::encode(Sha256::digest(&contents)),
            transforms: stats.transforms,
            compile_ms: stats.compile_ms,
            flat_name,
        });
    }

    let index_path = debug_dir.join(INDEX_FILE);
    fs::write(&index_path, serde_json::to_string_pretty(&index)?)
        .map_err(|e| KilnError::io(format!("writing {}", index_path.display()), e))?;

    debug!(
        "Wrote debug index with {} file(s) to {}",
        index.totals.file_count,
        index_path.display()
    );
    Ok(index)
}

/// Relative path components as plain strings
fn components(relative: &Path) -> impl Iterator<Item = String> + '_ {
    relative.components().filter_map(|c| match c {
        Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
        _ => None,
    })
}

/// `lib/a.php.kmeta` -> `lib/a.php`
fn strip_suffix(relative: &Path) -> PathBuf {
    let name = relative.to_string_lossy();
    PathBuf::from(name.strip_suffix(SIDE_FILE_SUFFIX).unwrap_or(&name))
}

/// `lib/a.php.kmeta` -> `lib_a.php.kmeta`
fn flatten(relative: &Path) -> String {
    components(relative)
        .collect::<Vec<_>>()
        .join(&FLAT_FILLER.to_string())
}

/// Claim `name` in `taken`, numbering it (`a_b.2.kmeta`) when an earlier
/// side-file already flattened to the same name
fn unique_name(name: String, taken: &mut HashSet<String>) -> String {
    if taken.insert(name.clone()) {
        return name;
    }
    let stem = name.strip_suffix(SIDE_FILE_SUFFIX).unwrap_or(&name);
    let unique = (2..)
        .map(|n| format!("{}.{}{}", stem, n, SIDE_FILE_SUFFIX))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_default();
    warn!("Flattened side-file name {} is taken, using {}", name, unique);
    taken.insert(unique.clone());
    unique
}

/// Join a virtual root and a relative path with forward slashes
fn virtual_path(root: &str, relative: &Path) -> String {
    std::iter::once(root.trim_end_matches('/').to_string())
        .chain(components(relative))
        .collect::<Vec<_>>()
        .join("/")
}
