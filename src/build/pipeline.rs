//! Build pipeline
//!
//! One build attempt walks these stages in order:
//!
//! | Stage                 | Work                                                  |
//! |-----------------------|-------------------------------------------------------|
//! | `VendorResolving`     | derive cache key, install on miss                     |
//! | `WorkspacePopulating` | create workspace, copy bootstrap, sources and vendor  |
//! | `Compiling`           | compile the workspace source subtree in place         |
//! | `MetadataAggregating` | debug builds only: write the index into staging       |
//! | `Packaging`           | bundle into staging, then move everything to `build/` |
//!
//! Any failure moves to `Failed`: the workspace and staging directory are
//! removed and the original error is returned unchanged. Artifacts and debug
//! metadata from an earlier successful build are only replaced once
//! packaging has succeeded, and then all together.

use crate::build::metadata::{self, Aggregation, DebugIndex};
use crate::build::request::BuildRequest;
use crate::cache::VendorCache;
use crate::config::Config;
use crate::error::{KilnError, KilnResult};
use crate::fsutil;
use crate::tools::{
    compile, pack, real_path, CommandCompiler, CommandInstaller, CommandPackager, Compiler,
    PackRequest, Packager,
};
use crate::workspace::{Workspace, SOURCE_SUBDIR};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs;
use tracing::{debug, error, info, warn};

/// Suffix of the packaging staging directory next to the workspace
const STAGING_SUFFIX: &str = ".pack";

/// Debug metadata directory inside the staging directory
const DEBUG_SUBDIR: &str = "debug";

/// Temporary name of an output waiting to replace its target
const INCOMING_SUFFIX: &str = ".kiln-new";

/// Temporary name of a replaced output directory
const RETIRED_SUFFIX: &str = ".kiln-old";

/// Pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    Init,
    VendorResolving,
    WorkspacePopulating,
    Compiling,
    MetadataAggregating,
    Packaging,
    Done,
    Failed,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Init => "starting",
            Self::VendorResolving => "resolving dependencies",
            Self::WorkspacePopulating => "populating workspace",
            Self::Compiling => "compiling",
            Self::MetadataAggregating => "aggregating debug metadata",
            Self::Packaging => "packaging",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        write!(f, "{}", label)
    }
}

/// Outcome of a successful build
#[derive(Debug, Clone)]
pub struct BuildReport {
    /// Retained workspace directory
    pub workspace: PathBuf,
    /// Cache entry the dependencies came from
    pub cache_entry: PathBuf,
    pub cache_hit: bool,
    pub data_artifact: PathBuf,
    /// Loader script, if the packager produced one
    pub loader_artifact: Option<PathBuf>,
    pub artifact_size: u64,
    pub debug_index: Option<DebugIndex>,
    pub compiler_output: Vec<String>,
    pub duration: Duration,
}

/// Mutable state of one attempt, used for teardown on failure
#[derive(Debug)]
struct Attempt {
    stage: BuildStage,
    workspace: Option<Workspace>,
    staging: Option<PathBuf>,
}

/// The build orchestrator
pub struct BuildPipeline {
    cache: VendorCache,
    workspace_root: PathBuf,
    compiler: Arc<dyn Compiler>,
    packager: Arc<dyn Packager>,
    mount_point: String,
    exclude: Vec<String>,
}

impl BuildPipeline {
    pub fn new(
        cache: VendorCache,
        workspace_root: PathBuf,
        compiler: Arc<dyn Compiler>,
        packager: Arc<dyn Packager>,
    ) -> Self {
        Self {
            cache,
            workspace_root,
            compiler,
            packager,
            mount_point: crate::config::schema::PackagerConfig::default().mount_point,
            exclude: vec![],
        }
    }

    /// Pipeline wired to the external tools named in `config`
    pub fn from_config(config: &Config) -> Self {
        let tools = &config.tools;
        let cache = VendorCache::new(
            config.cache_root(),
            Arc::new(CommandInstaller::new(tools.installer.clone())),
        );
        Self::new(
            cache,
            config.workspace_root(),
            Arc::new(CommandCompiler::new(tools.compiler.clone())),
            Arc::new(CommandPackager::new(tools.packager.clone())),
        )
        .with_mount_point(&tools.packager.mount_point)
        .with_exclude(tools.packager.exclude.clone())
    }

    pub fn with_mount_point(mut self, mount_point: &str) -> Self {
        self.mount_point = mount_point.to_string();
        self
    }

    pub fn with_exclude(mut self, exclude: Vec<String>) -> Self {
        self.exclude = exclude;
        self
    }

    /// Run one build attempt, reporting each stage as it starts
    pub async fn run(
        &self,
        request: &BuildRequest,
        on_stage: &(dyn Fn(BuildStage) + Send + Sync),
    ) -> KilnResult<BuildReport> {
        let started = Instant::now();
        let mut attempt = Attempt {
            stage: BuildStage::Init,
            workspace: None,
            staging: None,
        };
        on_stage(attempt.stage);

        match self.execute(request, &mut attempt, on_stage).await {
            Ok(mut report) => {
                attempt.stage = BuildStage::Done;
                on_stage(attempt.stage);
                report.duration = started.elapsed();
                info!(
                    "Build of {} finished in {:.1}s",
                    request.project_name,
                    report.duration.as_secs_f64()
                );
                Ok(report)
            }
            Err(e) => {
                error!("Build failed while {}: {}", attempt.stage, e);
                self.teardown(&attempt).await;
                on_stage(BuildStage::Failed);
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        request: &BuildRequest,
        attempt: &mut Attempt,
        on_stage: &(dyn Fn(BuildStage) + Send + Sync),
    ) -> KilnResult<BuildReport> {
        let enter = |attempt: &mut Attempt, stage: BuildStage| {
            debug!("Stage: {}", stage);
            attempt.stage = stage;
            on_stage(stage);
        };

        enter(attempt, BuildStage::VendorResolving);
        let resolved = self
            .cache
            .resolve(
                &request.project_name,
                &request.project_root,
                &request.descriptors,
            )
            .await?;

        enter(attempt, BuildStage::WorkspacePopulating);
        let workspace = Workspace::create(&self.workspace_root, &request.project_name).await?;
        attempt.workspace = Some(workspace.clone());
        workspace
            .populate(&request.bootstrap, &request.source_dir, &resolved.path)
            .await?;

        enter(attempt, BuildStage::Compiling);
        let compiled = compile(
            self.compiler.as_ref(),
            &workspace.source_dir(),
            &request.options,
        )
        .await?;

        let mut staging_name = workspace.path().as_os_str().to_os_string();
        staging_name.push(STAGING_SUFFIX);
        let staging = PathBuf::from(staging_name);
        attempt.staging = Some(staging.clone());
        fs::create_dir_all(&staging)
            .await
            .map_err(|e| KilnError::workspace(format!("creating {}", staging.display()), e))?;

        let staged_debug = staging.join(DEBUG_SUBDIR);
        let debug_index = if request.options.emit_debug_metadata {
            enter(attempt, BuildStage::MetadataAggregating);
            Some(
                self.aggregate(request, &workspace, &staged_debug, compiled.side_files)
                    .await?,
            )
        } else {
            None
        };

        enter(attempt, BuildStage::Packaging);
        let pack_request = PackRequest {
            workspace: real_path(workspace.path())?,
            mount_point: self.mount_point.clone(),
            data_path: staging.join(request.data_file_name()),
            loader_path: staging.join(request.loader_file_name()),
            exclude: self.exclude.clone(),
        };
        pack(self.packager.as_ref(), &pack_request).await?;

        if !fs::try_exists(&pack_request.data_path).await.unwrap_or(false) {
            return Err(KilnError::PackagingFailed {
                code: Some(0),
                output: vec![format!(
                    "packager did not produce {}",
                    pack_request.data_path.display()
                )],
            });
        }

        let data_artifact = request.data_artifact();
        let mut moves = vec![(pack_request.data_path.clone(), data_artifact.clone())];
        let loader_artifact = if fs::try_exists(&pack_request.loader_path)
            .await
            .unwrap_or(false)
        {
            let target = request.loader_artifact();
            moves.push((pack_request.loader_path.clone(), target.clone()));
            Some(target)
        } else {
            warn!("Packager produced no loader script");
            None
        };
        if debug_index.is_some() {
            moves.push((staged_debug, request.debug_dir()));
        }

        fs::create_dir_all(&request.output_dir).await.map_err(|e| {
            KilnError::io(format!("creating {}", request.output_dir.display()), e)
        })?;
        promote_all(&moves).await?;

        if let Err(e) = fsutil::remove_tree(&staging) {
            warn!("Failed to remove {}: {}", staging.display(), e);
        }
        attempt.staging = None;

        let artifact_size = fs::metadata(&data_artifact)
            .await
            .map(|m| m.len())
            .unwrap_or(0);

        Ok(BuildReport {
            workspace: workspace.path().to_path_buf(),
            cache_entry: resolved.path,
            cache_hit: resolved.hit,
            data_artifact,
            loader_artifact,
            artifact_size,
            debug_index,
            compiler_output: compiled.lines,
            duration: Duration::ZERO,
        })
    }

    async fn aggregate(
        &self,
        request: &BuildRequest,
        workspace: &Workspace,
        debug_dir: &Path,
        side_files: Vec<PathBuf>,
    ) -> KilnResult<DebugIndex> {
        let compiled_root = workspace.source_dir();
        let origin_root = request.source_dir.clone();
        let debug_dir = debug_dir.to_path_buf();
        let virtual_root = format!(
            "{}/{}",
            self.mount_point.trim_end_matches('/'),
            SOURCE_SUBDIR
        );
        let mode = request.mode;

        tokio::task::spawn_blocking(move || {
            metadata::aggregate(
                &Aggregation {
                    compiled_root: &compiled_root,
                    origin_root: &origin_root,
                    virtual_root: &virtual_root,
                    debug_dir: &debug_dir,
                    mode,
                },
                &side_files,
            )
        })
        .await
        .map_err(|e| KilnError::Internal(format!("metadata task panicked: {}", e)))?
    }

    /// Remove everything the failed attempt created. Errors are logged only.
    async fn teardown(&self, attempt: &Attempt) {
        if let Some(staging) = &attempt.staging {
            if let Err(e) = fsutil::remove_tree(staging) {
                warn!("Failed to remove {}: {}", staging.display(), e);
            }
        }
        if let Some(workspace) = &attempt.workspace {
            if let Err(e) = workspace.destroy().await {
                warn!("Failed to destroy workspace: {}", e);
            }
        }
    }
}

/// Move every staged `(from, to)` pair into place as one unit
///
/// Each item is first brought next to its target under a temporary name.
/// Only once all of them have landed are the targets replaced, so a failure
/// before that point leaves every earlier output untouched.
async fn promote_all(moves: &[(PathBuf, PathBuf)]) -> KilnResult<()> {
    let mut landed: Vec<PathBuf> = Vec::with_capacity(moves.len());
    for (from, to) in moves {
        let incoming = sibling(to, INCOMING_SUFFIX);
        if let Err(e) = transfer(from, &incoming).await {
            landed.push(incoming);
            for path in &landed {
                discard(path);
            }
            return Err(e);
        }
        landed.push(incoming);
    }

    for ((_, to), incoming) in moves.iter().zip(&landed) {
        replace(incoming, to).await?;
    }
    Ok(())
}

/// `{path}{suffix}` in the same directory
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// Move `from` to `to`, copying when a rename crosses filesystems
async fn transfer(from: &Path, to: &Path) -> KilnResult<()> {
    let is_dir = fs::metadata(from).await.map(|m| m.is_dir()).unwrap_or(false);
    if is_dir {
        discard(to);
    }
    if fs::rename(from, to).await.is_ok() {
        return Ok(());
    }

    let copy_err = |e| KilnError::io(format!("writing {}", to.display()), e);
    if is_dir {
        let (src, dst) = (from.to_path_buf(), to.to_path_buf());
        tokio::task::spawn_blocking(move || fsutil::copy_tree(&src, &dst))
            .await
            .map_err(|e| KilnError::Internal(format!("copy task panicked: {}", e)))?
            .map_err(copy_err)?;
    } else {
        fs::copy(from, to).await.map_err(copy_err)?;
    }
    discard(from);
    Ok(())
}

/// Swap `incoming` onto `target`. Directories are replaced as a whole.
async fn replace(incoming: &Path, target: &Path) -> KilnResult<()> {
    let is_dir = fs::metadata(incoming).await.map(|m| m.is_dir()).unwrap_or(false);
    let retired = sibling(target, RETIRED_SUFFIX);
    if is_dir {
        discard(&retired);
        if fs::try_exists(target).await.unwrap_or(false) {
            fs::rename(target, &retired).await.map_err(|e| {
                KilnError::io(format!("replacing {}", target.display()), e)
            })?;
        }
    }
    fs::rename(incoming, target)
        .await
        .map_err(|e| KilnError::io(format!("replacing {}", target.display()), e))?;
    if is_dir {
        discard(&retired);
    }
    Ok(())
}

/// Best-effort removal of a file or directory
fn discard(path: &Path) {
    let result = match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fsutil::remove_tree(path),
        Ok(_) => std::fs::remove_file(path),
        Err(_) => return,
    };
    if let Err(e) = result {
        warn!("Failed to remove {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::request::BuildMode;
    use crate::tools::{CompileOptions, Installer, ToolOutput};
    use async_trait::async_trait;
    use std::fs as stdfs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct FakeInstaller {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Installer for FakeInstaller {
        async fn install(&self, _project_dir: &Path, target: &Path) -> KilnResult<ToolOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            stdfs::write(target.join("autoload.php"), "<?php // autoload").unwrap();
            Ok(ToolOutput::success_with(vec![]))
        }
    }

    /// Compiler that records its input and optionally writes a side-file
    struct FakeCompiler {
        exit_code: i32,
        seen: Mutex<Vec<PathBuf>>,
    }

    #[async_trait]
    impl Compiler for FakeCompiler {
        async fn compile(&self, source: &Path, options: &CompileOptions) -> KilnResult<ToolOutput> {
            self.seen.lock().unwrap().push(source.to_path_buf());
            if options.emit_debug_metadata {
                stdfs::write(
                    source.join("X.kmeta"),
                    r#"{"transforms": 2, "compile_ms": 0.5}"#,
                )
                .unwrap();
            }
            Ok(ToolOutput {
                code: Some(self.exit_code),
                lines: vec!["compiled".to_string()],
            })
        }
    }

    struct FakePackager {
        exit_code: i32,
    }

    #[async_trait]
    impl Packager for FakePackager {
        async fn pack(&self, request: &PackRequest) -> KilnResult<ToolOutput> {
            stdfs::write(&request.data_path, "NEW").unwrap();
            stdfs::write(&request.loader_path, "loader").unwrap();
            Ok(ToolOutput {
                code: Some(self.exit_code),
                lines: vec![],
            })
        }
    }

    struct Harness {
        project: TempDir,
        _cache: TempDir,
        workspaces: TempDir,
        installer: Arc<FakeInstaller>,
        compiler: Arc<FakeCompiler>,
        pipeline: BuildPipeline,
    }

    fn harness(compile_code: i32, pack_code: i32) -> Harness {
        let project = TempDir::new().unwrap();
        let root = project.path();
        stdfs::write(root.join("composer.json"), r#"{"a":1}"#).unwrap();
        stdfs::write(root.join("composer.lock"), "L1").unwrap();
        stdfs::write(root.join("index.php"), "<?php").unwrap();
        stdfs::create_dir_all(root.join("src")).unwrap();
        stdfs::write(root.join("src/X"), "T").unwrap();

        let cache = TempDir::new().unwrap();
        let workspaces = TempDir::new().unwrap();
        let installer = Arc::new(FakeInstaller {
            calls: AtomicUsize::new(0),
        });
        let compiler = Arc::new(FakeCompiler {
            exit_code: compile_code,
            seen: Mutex::new(vec![]),
        });
        let pipeline = BuildPipeline::new(
            VendorCache::new(cache.path().to_path_buf(), installer.clone()),
            workspaces.path().to_path_buf(),
            compiler.clone(),
            Arc::new(FakePackager {
                exit_code: pack_code,
            }),
        );

        Harness {
            project,
            _cache: cache,
            workspaces,
            installer,
            compiler,
            pipeline,
        }
    }

    fn request(h: &Harness, mode: BuildMode) -> BuildRequest {
        let mut config = Config::default();
        config.project.name = Some("shop".to_string());
        BuildRequest::from_config(h.project.path(), &config, mode, CompileOptions::default())
    }

    fn no_stage(_: BuildStage) {}

    fn write_prior_artifact(h: &Harness) -> PathBuf {
        let out = h.project.path().join("build");
        stdfs::create_dir_all(&out).unwrap();
        let artifact = out.join("shop.data");
        stdfs::write(&artifact, "PRIOR").unwrap();
        artifact
    }

    fn workspace_root_is_empty(h: &Harness) -> bool {
        stdfs::read_dir(h.workspaces.path()).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn end_to_end_build_and_cache_reuse() {
        let h = harness(0, 0);
        let req = request(&h, BuildMode::Production);

        let first = h.pipeline.run(&req, &no_stage).await.unwrap();
        assert!(!first.cache_hit);
        assert!(first
            .cache_entry
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("shop-vendor-"));
        assert_eq!(
            stdfs::read_to_string(first.workspace.join("src/X")).unwrap(),
            "T"
        );
        assert!(first.workspace.join("vendor/autoload.php").is_file());
        assert_eq!(stdfs::read_to_string(&first.data_artifact).unwrap(), "NEW");
        assert_eq!(first.artifact_size, 3);
        assert!(first.loader_artifact.unwrap().is_file());
        assert!(first.debug_index.is_none());

        let second = h.pipeline.run(&req, &no_stage).await.unwrap();
        assert!(second.cache_hit);
        assert_eq!(second.cache_entry, first.cache_entry);
        assert_ne!(second.workspace, first.workspace);
        assert_eq!(h.installer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn compile_failure_removes_workspace_and_keeps_artifact() {
        let h = harness(1, 0);
        let prior = write_prior_artifact(&h);

        let err = h
            .pipeline
            .run(&request(&h, BuildMode::Production), &no_stage)
            .await
            .unwrap_err();

        assert!(matches!(err, KilnError::CompilationFailed { code: Some(1), .. }));
        assert_eq!(err.captured_output().unwrap(), ["compiled".to_string()]);
        let seen = h.compiler.seen.lock().unwrap();
        assert!(!seen[0].exists());
        assert!(workspace_root_is_empty(&h));
        assert_eq!(stdfs::read_to_string(prior).unwrap(), "PRIOR");
    }

    #[tokio::test]
    async fn packaging_failure_keeps_prior_artifact() {
        let h = harness(0, 3);
        let prior = write_prior_artifact(&h);

        let err = h
            .pipeline
            .run(&request(&h, BuildMode::Production), &no_stage)
            .await
            .unwrap_err();

        assert!(matches!(err, KilnError::PackagingFailed { code: Some(3), .. }));
        assert!(workspace_root_is_empty(&h));
        assert_eq!(stdfs::read_to_string(prior).unwrap(), "PRIOR");
    }

    #[tokio::test]
    async fn packaging_failure_keeps_prior_debug_metadata() {
        let h = harness(0, 3);
        let debug_dir = h.project.path().join("build/debug");
        stdfs::create_dir_all(&debug_dir).unwrap();
        stdfs::write(debug_dir.join("index.json"), "PRIOR-INDEX").unwrap();

        let err = h
            .pipeline
            .run(&request(&h, BuildMode::Development), &no_stage)
            .await
            .unwrap_err();

        assert!(matches!(err, KilnError::PackagingFailed { code: Some(3), .. }));
        assert_eq!(
            stdfs::read_to_string(debug_dir.join("index.json")).unwrap(),
            "PRIOR-INDEX"
        );
        assert!(!debug_dir.join("X.kmeta").exists());
    }

    #[tokio::test]
    async fn failed_promotion_replaces_no_output() {
        let h = harness(0, 0);
        let prior = write_prior_artifact(&h);
        let out = h.project.path().join("build");
        stdfs::create_dir_all(out.join("shop.js.kiln-new/occupied")).unwrap();

        let result = h
            .pipeline
            .run(&request(&h, BuildMode::Production), &no_stage)
            .await;

        assert!(result.is_err());
        assert_eq!(stdfs::read_to_string(prior).unwrap(), "PRIOR");
        assert!(!out.join("shop.js").exists());
        assert!(!out.join("shop.data.kiln-new").exists());
        assert!(workspace_root_is_empty(&h));
    }

    #[tokio::test]
    async fn debug_metadata_is_replaced_on_success() {
        let h = harness(0, 0);
        let debug_dir = h.project.path().join("build/debug");
        stdfs::create_dir_all(&debug_dir).unwrap();
        stdfs::write(debug_dir.join("old.php.kmeta"), "{}").unwrap();

        h.pipeline
            .run(&request(&h, BuildMode::Development), &no_stage)
            .await
            .unwrap();

        assert!(!debug_dir.join("old.php.kmeta").exists());
        assert!(debug_dir.join("X.kmeta").is_file());
        assert!(!h.project.path().join("build/debug.kiln-old").exists());
    }

    #[tokio::test]
    async fn missing_descriptor_creates_no_workspace() {
        let h = harness(0, 0);
        stdfs::remove_file(h.project.path().join("composer.lock")).unwrap();

        let err = h
            .pipeline
            .run(&request(&h, BuildMode::Production), &no_stage)
            .await
            .unwrap_err();

        assert!(matches!(err, KilnError::DescriptorUnreadable { .. }));
        assert_eq!(h.installer.calls.load(Ordering::SeqCst), 0);
        assert!(workspace_root_is_empty(&h));
    }

    #[tokio::test]
    async fn development_build_writes_debug_index() {
        let h = harness(0, 0);
        let report = h
            .pipeline
            .run(&request(&h, BuildMode::Development), &no_stage)
            .await
            .unwrap();

        let index = report.debug_index.unwrap();
        assert_eq!(index.totals.file_count, 1);
        assert_eq!(index.files[0].virtual_path, "/app/src/X");
        assert!(h.project.path().join("build/debug/index.json").is_file());
        assert!(h.project.path().join("build/debug/X.kmeta").is_file());
    }

    #[tokio::test]
    async fn stages_are_reported_in_order() {
        let h = harness(0, 0);
        let stages = Mutex::new(vec![]);
        let record = |stage: BuildStage| stages.lock().unwrap().push(stage);

        h.pipeline
            .run(&request(&h, BuildMode::Production), &record)
            .await
            .unwrap();

        assert_eq!(
            *stages.lock().unwrap(),
            vec![
                BuildStage::Init,
                BuildStage::VendorResolving,
                BuildStage::WorkspacePopulating,
                BuildStage::Compiling,
                BuildStage::Packaging,
                BuildStage::Done,
            ]
        );
    }
}
