//! Isolated per-build workspaces
//!
//! A workspace is a uniquely named directory `{root}/{project}-{token}`
//! holding deep copies of the bootstrap file, the full source tree (under
//! `src/`) and the cached dependency directory (under `vendor/`). It is
//! owned by a single build. Failed builds destroy it; successful builds
//! keep it for inspection until `kiln clean` removes it.

use crate::error::{KilnError, KilnResult};
use crate::fsutil;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

/// Subdirectory receiving the source tree
pub const SOURCE_SUBDIR: &str = "src";

/// Subdirectory receiving the dependency directory
pub const VENDOR_SUBDIR: &str = "vendor";

/// Length of the timestamp part of a build token (`%Y%m%d%H%M%S`)
const TIMESTAMP_LEN: usize = 14;

/// Length of the random part of a build token
const NONCE_LEN: usize = 8;

/// An ephemeral build directory
#[derive(Debug, Clone)]
pub struct Workspace {
    path: PathBuf,
}

impl Workspace {
    /// Create a fresh workspace for `project` under `root`
    pub async fn create(root: &Path, project: &str) -> KilnResult<Self> {
        Self::create_named(root, project, &build_token()).await
    }

    /// Create `{root}/{project}-{token}`, replacing any stale directory of
    /// the same name
    async fn create_named(root: &Path, project: &str, token: &str) -> KilnResult<Self> {
        let path = root.join(format!("{}-{}", project, token));

        if fs::symlink_metadata(&path).await.is_ok() {
            debug!("Removing stale workspace {}", path.display());
            remove(&path).await?;
        }

        fs::create_dir_all(&path)
            .await
            .map_err(|e| KilnError::workspace(format!("creating {}", path.display()), e))?;

        info!("Created workspace {}", path.display());
        Ok(Self { path })
    }

    /// Wrap an existing workspace directory
    pub fn open(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The copied source subtree
    pub fn source_dir(&self) -> PathBuf {
        self.path.join(SOURCE_SUBDIR)
    }

    /// The copied dependency directory
    pub fn vendor_dir(&self) -> PathBuf {
        self.path.join(VENDOR_SUBDIR)
    }

    /// Copy the bootstrap file, source tree and dependency directory in.
    ///
    /// The source tree is copied in full with no exclusions. The dependency
    /// directory is copied rather than linked so the cache entry stays
    /// pristine for other workspaces.
    pub async fn populate(
        &self,
        bootstrap: &Path,
        source_dir: &Path,
        dependency_dir: &Path,
    ) -> KilnResult<()> {
        let file_name = bootstrap.file_name().ok_or_else(|| {
            KilnError::workspace(
                format!("bootstrap path {} has no file name", bootstrap.display()),
                std::io::Error::from(std::io::ErrorKind::InvalidInput),
            )
        })?;
        let bootstrap_target = self.path.join(file_name);
        fs::copy(bootstrap, &bootstrap_target).await.map_err(|e| {
            KilnError::workspace(format!("copying bootstrap {}", bootstrap.display()), e)
        })?;

        let sources = copy_tree(source_dir, &self.source_dir()).await?;
        let vendored = copy_tree(dependency_dir, &self.vendor_dir()).await?;
        debug!(
            "Populated {} ({} source files, {} vendor files)",
            self.path.display(),
            sources,
            vendored
        );
        Ok(())
    }

    /// Recursively delete the workspace. A no-op if already gone.
    pub async fn destroy(&self) -> KilnResult<()> {
        remove(&self.path).await?;
        debug!("Destroyed workspace {}", self.path.display());
        Ok(())
    }

    /// Retained workspaces of `project` under `root`, oldest first
    pub async fn list_retained(root: &Path, project: &str) -> KilnResult<Vec<Workspace>> {
        let mut found = Vec::new();
        let mut dir = match fs::read_dir(root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(found),
            Err(e) => return Err(KilnError::io(format!("reading {}", root.display()), e)),
        };

        let prefix = format!("{}-", project);
        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| KilnError::io(format!("reading {}", root.display()), e))?
        {
            let name = item.file_name().to_string_lossy().into_owned();
            let is_ours = name
                .strip_prefix(&prefix)
                .is_some_and(is_build_token);
            if is_ours && item.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                found.push(Workspace::open(item.path()));
            }
        }

        found.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(found)
    }
}

/// Build-scoped token: UTC timestamp plus a random suffix
fn build_token() -> String {
    let nonce = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}",
        Utc::now().format("%Y%m%d%H%M%S"),
        &nonce[..NONCE_LEN]
    )
}

fn is_build_token(s: &str) -> bool {
    let Some((stamp, nonce)) = s.split_once('-') else {
        return false;
    };
    stamp.len() == TIMESTAMP_LEN
        && stamp.chars().all(|c| c.is_ascii_digit())
        && nonce.len() == NONCE_LEN
        && nonce.chars().all(|c| c.is_ascii_hexdigit())
}

async fn copy_tree(src: &Path, dst: &Path) -> KilnResult<u64> {
    let (from, to) = (src.to_path_buf(), dst.to_path_buf());
    tokio::task::spawn_blocking(move || fsutil::copy_tree(&from, &to))
        .await
        .map_err(|e| KilnError::Internal(format!("copy task panicked: {}", e)))?
        .map_err(|e| {
            KilnError::workspace(format!("copying {} to {}", src.display(), dst.display()), e)
        })
}

async fn remove(path: &Path) -> KilnResult<()> {
    let target = path.to_path_buf();
    tokio::task::spawn_blocking(move || fsutil::remove_tree(&target))
        .await
        .map_err(|e| KilnError::Internal(format!("remove task panicked: {}", e)))?
        .map_err(|e| KilnError::workspace(format!("removing {}", path.display()), e))
}
