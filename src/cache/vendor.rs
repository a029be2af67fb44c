//! Content-addressed vendor cache
//!
//! Each entry is a directory `{root}/{project}-vendor-{key}` holding one
//! installed dependency set. Existence on disk is the only index: a hit is
//! a directory check, a miss runs the installer. Entries are read-only once
//! committed and are only removed by explicit maintenance (`gc`, `clear`).

use crate::cache::key::{derive_key, CacheKey, KEY_LEN};
use crate::error::{KilnError, KilnResult};
use crate::fsutil;
use crate::tools::Installer;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Infix separating project name and key in entry names
const VENDOR_INFIX: &str = "-vendor-";

/// Marker in the name of an uncommitted staging directory
const PARTIAL_MARKER: &str = ".partial-";

/// Result of resolving a dependency directory
#[derive(Debug, Clone)]
pub struct Resolved {
    /// Canonical cache entry directory
    pub path: PathBuf,
    /// Key the entry was found under
    pub key: CacheKey,
    /// Whether the entry already existed
    pub hit: bool,
}

/// A committed cache entry found on disk
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Directory name (`{project}-vendor-{key}`)
    pub name: String,
    pub path: PathBuf,
    pub project: String,
    pub key: String,
    /// Last modification time of the entry directory
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Parse an entry from its directory name
    fn from_dir(path: PathBuf, created_at: DateTime<Utc>) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_string();
        if name.contains(PARTIAL_MARKER) {
            return None;
        }
        let (project, key) = name.rsplit_once(VENDOR_INFIX)?;
        if project.is_empty()
            || key.len() != KEY_LEN
            || !key.chars().all(|c| c.is_ascii_hexdigit())
        {
            return None;
        }
        Some(Self {
            project: project.to_string(),
            key: key.to_string(),
            name,
            path,
            created_at,
        })
    }

    /// Check if this entry is older than the given number of days
    pub fn is_older_than_days(&self, days: u32) -> bool {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(days));
        self.created_at < cutoff
    }
}

/// Vendor cache rooted at a directory on durable local storage
pub struct VendorCache {
    root: PathBuf,
    installer: Arc<dyn Installer>,
}

impl VendorCache {
    pub fn new(root: PathBuf, installer: Arc<dyn Installer>) -> Self {
        Self { root, installer }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Canonical entry name for a project and key
    pub fn entry_name(project: &str, key: &CacheKey) -> String {
        format!("{}{}{}", project, VENDOR_INFIX, key)
    }

    /// Canonical entry path for a project and key
    pub fn entry_path(&self, project: &str, key: &CacheKey) -> PathBuf {
        self.root.join(Self::entry_name(project, key))
    }

    /// Derive the key and report whether its entry exists, without installing
    pub async fn lookup(&self, project: &str, descriptors: &[PathBuf]) -> KilnResult<Resolved> {
        let key = derive_key(descriptors).await?;
        let path = self.entry_path(project, &key);
        let hit = fs::metadata(&path).await.map(|m| m.is_dir()).unwrap_or(false);
        Ok(Resolved { path, key, hit })
    }

    /// Return the dependency directory for the given descriptors,
    /// installing it on a cache miss
    ///
    /// A hit performs no integrity check beyond the directory existing. On
    /// a miss the installer runs from `project_dir`; its non-zero exit fails
    /// with `DependencyInstallFailed` and leaves no entry behind.
    pub async fn resolve(
        &self,
        project: &str,
        project_dir: &Path,
        descriptors: &[PathBuf],
    ) -> KilnResult<Resolved> {
        let resolved = self.lookup(project, descriptors).await?;
        if resolved.hit {
            info!("Vendor cache hit: {}", resolved.path.display());
            return Ok(resolved);
        }

        info!("Vendor cache miss: installing into {}", resolved.path.display());
        self.populate(project_dir, &resolved.path).await?;
        Ok(resolved)
    }

    /// Install into a staging sibling, then rename it onto `entry`
    async fn populate(&self, project_dir: &Path, entry: &Path) -> KilnResult<()> {
        fs::create_dir_all(&self.root).await.map_err(|e| {
            KilnError::io(format!("creating cache root {}", self.root.display()), e)
        })?;

        let mut staging_name = entry.as_os_str().to_os_string();
        staging_name.push(format!("{}{}", PARTIAL_MARKER, Uuid::new_v4().simple()));
        let staging = PathBuf::from(staging_name);

        fs::create_dir(&staging).await.map_err(|e| {
            KilnError::io(format!("creating cache staging dir {}", staging.display()), e)
        })?;

        let output = match self.installer.install(project_dir, &staging).await {
            Ok(output) => output,
            Err(e) => {
                discard(&staging).await;
                return Err(e);
            }
        };

        if !output.success() {
            discard(&staging).await;
            return Err(KilnError::DependencyInstallFailed {
                code: output.code,
                output: output.lines,
            });
        }

        match fs::rename(&staging, entry).await {
            Ok(()) => {
                debug!("Committed cache entry {}", entry.display());
                Ok(())
            }
            Err(_) if entry.is_dir() => {
                // Lost the commit race to a concurrent build of the same key.
                info!("Cache entry {} committed concurrently, reusing it", entry.display());
                discard(&staging).await;
                Ok(())
            }
            Err(e) => {
                discard(&staging).await;
                Err(KilnError::io(
                    format!("committing cache entry {}", entry.display()),
                    e,
                ))
            }
        }
    }

    /// List committed entries, optionally restricted to one project
    pub async fn entries(&self, project: Option<&str>) -> KilnResult<Vec<CacheEntry>> {
        let mut entries = Vec::new();

        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => {
                return Err(KilnError::io(
                    format!("reading cache root {}", self.root.display()),
                    e,
                ))
            }
        };

        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| KilnError::io("reading cache root", e))?
        {
            let Ok(meta) = item.metadata().await else {
                continue;
            };
            if !meta.is_dir() {
                continue;
            }
            let created_at = meta
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            if let Some(entry) = CacheEntry::from_dir(item.path(), created_at) {
                if project.map_or(true, |p| p == entry.project) {
                    entries.push(entry);
                }
            }
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Remove a single entry
    pub async fn remove(&self, entry: &CacheEntry) -> KilnResult<()> {
        debug!("Removing cache entry: {}", entry.name);
        let path = entry.path.clone();
        tokio::task::spawn_blocking(move || fsutil::remove_tree(&path))
            .await
            .map_err(|e| KilnError::Internal(format!("cache removal panicked: {}", e)))?
            .map_err(|e| KilnError::io(format!("removing cache entry {}", entry.name), e))
    }

    /// Remove entries older than `days`, returning what was (or would be) removed
    pub async fn evict_older_than(
        &self,
        days: u32,
        project: Option<&str>,
        dry_run: bool,
    ) -> KilnResult<Vec<CacheEntry>> {
        let stale: Vec<CacheEntry> = self
            .entries(project)
            .await?
            .into_iter()
            .filter(|e| e.is_older_than_days(days))
            .collect();

        if !dry_run {
            for entry in &stale {
                self.remove(entry).await?;
            }
        }
        Ok(stale)
    }

    /// Remove every entry, optionally restricted to one project
    pub async fn clear(&self, project: Option<&str>) -> KilnResult<usize> {
        let entries = self.entries(project).await?;
        for entry in &entries {
            self.remove(entry).await?;
        }
        Ok(entries.len())
    }
}

/// Best-effort removal of an uncommitted staging directory
async fn discard(staging: &Path) {
    let path = staging.to_path_buf();
    let result = tokio::task::spawn_blocking(move || fsutil::remove_tree(&path)).await;
    if !matches!(result, Ok(Ok(()))) {
        warn!("Failed to remove cache staging dir {}", staging.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolOutput;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Installer that writes one file and counts invocations
    struct FakeInstaller {
        calls: AtomicUsize,
        exit_code: i32,
    }

    impl FakeInstaller {
        fn new(exit_code: i32) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                exit_code,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Installer for FakeInstaller {
        async fn install(&self, _project_dir: &Path, target: &Path) -> KilnResult<ToolOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            fs::write(target.join("autoload.php"), "<?php // vendor")
                .await
                .unwrap();
            Ok(ToolOutput {
                code: Some(self.exit_code),
                lines: vec!["Installing dependencies".to_string()],
            })
        }
    }

    fn project() -> (TempDir, Vec<PathBuf>) {
        let dir = TempDir::new().unwrap();
        let manifest = dir.path().join("composer.json");
        let lock = dir.path().join("composer.lock");
        std::fs::write(&manifest, r#"{"a":1}"#).unwrap();
        std::fs::write(&lock, "L1").unwrap();
        (dir, vec![manifest, lock])
    }

    #[tokio::test]
    async fn miss_then_hit_installs_once() {
        let (proj, descriptors) = project();
        let cache_root = TempDir::new().unwrap();
        let installer = FakeInstaller::new(0);
        let cache = VendorCache::new(cache_root.path().to_path_buf(), installer.clone());

        let first = cache.resolve("shop", proj.path(), &descriptors).await.unwrap();
        assert!(!first.hit);
        assert!(first.path.join("autoload.php").is_file());

        let second = cache.resolve("shop", proj.path(), &descriptors).await.unwrap();
        assert!(second.hit);
        assert_eq!(first.path, second.path);
        assert_eq!(installer.calls(), 1);
    }

    #[tokio::test]
    async fn entry_named_from_project_and_key() {
        let (proj, descriptors) = project();
        let cache_root = TempDir::new().unwrap();
        let cache = VendorCache::new(cache_root.path().to_path_buf(), FakeInstaller::new(0));

        let resolved = cache.resolve("shop", proj.path(), &descriptors).await.unwrap();
        let expected = format!("shop-vendor-{}", CacheKey::from_bytes(br#"{"a":1}L1"#));
        assert_eq!(resolved.path, cache_root.path().join(expected));
    }

    #[tokio::test]
    async fn failed_install_leaves_no_entry() {
        let (proj, descriptors) = project();
        let cache_root = TempDir::new().unwrap();
        let cache = VendorCache::new(cache_root.path().to_path_buf(), FakeInstaller::new(1));

        let err = cache.resolve("shop", proj.path(), &descriptors).await.unwrap_err();
        match err {
            KilnError::DependencyInstallFailed { code, output } => {
                assert_eq!(code, Some(1));
                assert_eq!(output, vec!["Installing dependencies"]);
            }
            other => panic!("unexpected error: {other}"),
        }

        let leftovers: Vec<_> = std::fs::read_dir(cache_root.path()).unwrap().collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn missing_descriptor_aborts_before_install() {
        let (proj, mut descriptors) = project();
        std::fs::remove_file(&descriptors[1]).unwrap();
        descriptors.push(proj.path().join("extra.json"));
        let cache_root = TempDir::new().unwrap();
        let installer = FakeInstaller::new(0);
        let cache = VendorCache::new(cache_root.path().to_path_buf(), installer.clone());

        let err = cache.resolve("shop", proj.path(), &descriptors).await.unwrap_err();
        assert!(matches!(err, KilnError::DescriptorUnreadable { .. }));
        assert_eq!(installer.calls(), 0);
    }

    #[tokio::test]
    async fn existing_directory_is_a_hit_without_verification() {
        let (proj, descriptors) = project();
        let cache_root = TempDir::new().unwrap();
        let installer = FakeInstaller::new(0);
        let cache = VendorCache::new(cache_root.path().to_path_buf(), installer.clone());

        let key = derive_key(&descriptors).await.unwrap();
        std::fs::create_dir_all(cache.entry_path("shop", &key)).unwrap();

        let resolved = cache.resolve("shop", proj.path(), &descriptors).await.unwrap();
        assert!(resolved.hit);
        assert_eq!(installer.calls(), 0);
    }

    #[tokio::test]
    async fn entries_lists_committed_only() {
        let cache_root = TempDir::new().unwrap();
        let root = cache_root.path();
        std::fs::create_dir(root.join("shop-vendor-0123456789ab")).unwrap();
        std::fs::create_dir(root.join("blog-vendor-ba9876543210")).unwrap();
        std::fs::create_dir(root.join("shop-vendor-0123456789ab.partial-ffff")).unwrap();
        std::fs::create_dir(root.join("shop-20260101-abcdef12")).unwrap();
        std::fs::write(root.join("shop-vendor-aaaaaaaaaaaa"), "not a dir").unwrap();
        let cache = VendorCache::new(root.to_path_buf(), FakeInstaller::new(0));

        let all = cache.entries(None).await.unwrap();
        assert_eq!(all.len(), 2);

        let shop = cache.entries(Some("shop")).await.unwrap();
        assert_eq!(shop.len(), 1);
        assert_eq!(shop[0].key, "0123456789ab");
    }

    #[tokio::test]
    async fn evict_respects_age_and_dry_run() {
        let cache_root = TempDir::new().unwrap();
        std::fs::create_dir(cache_root.path().join("shop-vendor-0123456789ab")).unwrap();
        let cache = VendorCache::new(cache_root.path().to_path_buf(), FakeInstaller::new(0));

        // Fresh entries survive a 1-day gc
        assert!(cache.evict_older_than(1, None, false).await.unwrap().is_empty());

        let entries = cache.entries(None).await.unwrap();
        let mut old = entries[0].clone();
        old.created_at = Utc::now() - chrono::Duration::days(10);
        assert!(old.is_older_than_days(5));
        assert!(!entries[0].is_older_than_days(5));

        assert_eq!(cache.clear(None).await.unwrap(), 1);
        assert!(cache.entries(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn entries_on_missing_root_is_empty() {
        let dir = TempDir::new().unwrap();
        let cache = VendorCache::new(dir.path().join("nope"), FakeInstaller::new(0));
        assert!(cache.entries(None).await.unwrap().is_empty());
    }
}
