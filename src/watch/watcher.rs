//! Filesystem watch loop

use super::debounce::{Clock, Decision, SystemClock, WatchState};
use crate::build::BuildRequest;
use crate::error::{KilnError, KilnResult};
use async_trait::async_trait;
use glob::Pattern;
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// One watched directory
///
/// Files are watched through their parent directory so editors that save by
/// renaming over the original keep triggering. `files` then limits which
/// entries of that directory count; it is empty for source directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchTarget {
    pub path: PathBuf,
    pub recursive: bool,
    pub files: Vec<PathBuf>,
}

impl WatchTarget {
    /// A directory watched recursively
    pub fn dir(path: PathBuf) -> Self {
        Self {
            path,
            recursive: true,
            files: vec![],
        }
    }

    /// Whether a change at `path` belongs to this target
    pub fn covers(&self, path: &Path) -> bool {
        if self.files.is_empty() {
            path.starts_with(&self.path)
        } else {
            self.files.iter().any(|f| f == path)
        }
    }
}

/// Watched paths for a request: the configured `paths` when given,
/// otherwise the source dir, bootstrap file and descriptors
pub fn watch_targets(request: &BuildRequest, configured: &[PathBuf]) -> Vec<WatchTarget> {
    let (dirs, files): (Vec<PathBuf>, Vec<PathBuf>) = if configured.is_empty() {
        let files: Vec<PathBuf> = std::iter::once(&request.bootstrap)
            .chain(&request.descriptors)
            .cloned()
            .collect();
        (vec![request.source_dir.clone()], files)
    } else {
        configured
            .iter()
            .map(|p| request.project_root.join(p))
            .partition(|p| p.is_dir())
    };

    let mut targets: Vec<WatchTarget> = dirs.into_iter().map(WatchTarget::dir).collect();
    for file in files {
        let parent = file.parent().map(Path::to_path_buf).unwrap_or_default();
        match targets
            .iter_mut()
            .find(|t| !t.files.is_empty() && t.path == parent)
        {
            Some(target) => target.files.push(file),
            None => targets.push(WatchTarget {
                path: parent,
                recursive: false,
                files: vec![file],
            }),
        }
    }
    targets
}

/// Compiled exclude globs
#[derive(Debug, Clone, Default)]
pub struct ExcludeSet {
    patterns: Vec<Pattern>,
}

impl ExcludeSet {
    pub fn new(patterns: &[String]) -> KilnResult<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| {
                    KilnError::User(format!("Invalid watch exclude pattern '{}': {}", p, e))
                })
            })
            .collect::<KilnResult<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Whether `path` matches a pattern by file name or full path
    pub fn is_excluded(&self, path: &Path) -> bool {
        let name = path.file_name().and_then(|n| n.to_str());
        self.patterns.iter().any(|p| {
            name.is_some_and(|n| p.matches(n)) || p.matches_path(path)
        })
    }
}

/// Whether an event should be considered for a rebuild: a content or
/// name change to a non-excluded path some target covers
pub fn qualifies(event: &Event, excludes: &ExcludeSet, targets: &[WatchTarget]) -> bool {
    let relevant_kind = match event.kind {
        EventKind::Create(_) | EventKind::Remove(_) => true,
        EventKind::Modify(ModifyKind::Metadata(_)) => false,
        EventKind::Modify(_) => true,
        _ => false,
    };
    relevant_kind
        && event
            .paths
            .iter()
            .any(|p| !excludes.is_excluded(p) && targets.iter().any(|t| t.covers(p)))
}

/// Work run for every triggered build
#[async_trait]
pub trait BuildTrigger: Send + Sync {
    async fn build(&self) -> KilnResult<()>;
}

/// Counters for one watch session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchSummary {
    pub builds: usize,
    pub failures: usize,
}

/// Debounced rebuild loop
pub struct Watcher {
    targets: Vec<WatchTarget>,
    excludes: ExcludeSet,
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl Watcher {
    pub fn new(targets: Vec<WatchTarget>, excludes: ExcludeSet, window: Duration) -> Self {
        Self {
            targets,
            excludes,
            window,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn targets(&self) -> &[WatchTarget] {
        &self.targets
    }

    /// Watch until Ctrl-C
    pub async fn run(&self, trigger: &dyn BuildTrigger) -> KilnResult<WatchSummary> {
        let (tx, rx) = mpsc::unbounded_channel();
        let _watcher = self.spawn_watcher(tx)?;
        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        };
        Ok(self.run_until(trigger, rx, shutdown).await)
    }

    /// Core loop: initial build, debounced rebuilds, then a final flush of
    /// any pending change once `shutdown` resolves or the event source closes
    ///
    /// Builds run one at a time. Changes that queued up while a build ran are
    /// folded into `pending` instead of starting another build.
    pub async fn run_until(
        &self,
        trigger: &dyn BuildTrigger,
        mut events: mpsc::UnboundedReceiver<notify::Result<Event>>,
        shutdown: impl Future<Output = ()>,
    ) -> WatchSummary {
        let mut state = WatchState::new();
        let mut summary = WatchSummary::default();

        state.record_build(self.clock.now());
        self.build_once(trigger, &mut summary).await;
        self.absorb_queued(&mut events, &mut state);

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                received = events.recv() => {
                    let Some(result) = received else {
                        debug!("Event source closed");
                        break;
                    };
                    if !self.accepts(result) {
                        continue;
                    }
                    match state.on_event(self.clock.now(), self.window) {
                        Decision::Build => {
                            self.build_once(trigger, &mut summary).await;
                            self.absorb_queued(&mut events, &mut state);
                        }
                        Decision::Defer => debug!("Change deferred"),
                    }
                }
            }
        }

        if state.take_pending() {
            info!("Flushing pending change");
            self.build_once(trigger, &mut summary).await;
        }
        summary
    }

    /// Whether a received event is a qualifying change
    fn accepts(&self, result: notify::Result<Event>) -> bool {
        match result {
            Ok(event) if qualifies(&event, &self.excludes, &self.targets) => {
                debug!("Change: {:?} {:?}", event.kind, event.paths);
                true
            }
            Ok(_) => false,
            Err(e) => {
                warn!("Watch error: {}", e);
                false
            }
        }
    }

    /// Mark pending for every qualifying change queued during the last build
    fn absorb_queued(
        &self,
        events: &mut mpsc::UnboundedReceiver<notify::Result<Event>>,
        state: &mut WatchState,
    ) {
        while let Ok(result) = events.try_recv() {
            if self.accepts(result) {
                debug!("Change during build deferred");
                state.mark_pending();
            }
        }
    }

    async fn build_once(&self, trigger: &dyn BuildTrigger, summary: &mut WatchSummary) {
        summary.builds += 1;
        if let Err(e) = trigger.build().await {
            summary.failures += 1;
            warn!("Build failed: {}", e);
        }
    }

    fn spawn_watcher(
        &self,
        tx: mpsc::UnboundedSender<notify::Result<Event>>,
    ) -> KilnResult<RecommendedWatcher> {
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.send(res);
        })?;

        for target in &self.targets {
            let mode = if target.recursive {
                RecursiveMode::Recursive
            } else {
                RecursiveMode::NonRecursive
            };
            match watcher.watch(&target.path, mode) {
                Ok(()) => debug!("Watching {}", target.path.display()),
                Err(e) => warn!("Cannot watch {}: {}", target.path.display(), e),
            }
        }
        Ok(watcher)
    }
}
