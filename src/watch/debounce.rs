//! Rebuild debouncing

use std::time::{Duration, Instant};

/// Source of the current instant
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// What to do with a qualifying change event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Start a build now
    Build,
    /// Too soon after the last build start; remembered as pending
    Defer,
}

/// Debounce state of one watch session
#[derive(Debug, Clone, Default)]
pub struct WatchState {
    last_build: Option<Instant>,
    pending: bool,
}

impl WatchState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a build started at `now`. Clears `pending`.
    pub fn record_build(&mut self, now: Instant) {
        self.last_build = Some(now);
        self.pending = false;
    }

    /// Decide on a change observed at `now`
    ///
    /// Builds only when at least `window` has passed since the last build
    /// start. A `Build` decision records `now` as the new start.
    pub fn on_event(&mut self, now: Instant, window: Duration) -> Decision {
        match self.last_build {
            Some(last) if now.saturating_duration_since(last) < window => {
                self.pending = true;
                Decision::Defer
            }
            _ => {
                self.record_build(now);
                Decision::Build
            }
        }
    }

    /// Remember a change that arrived while a build was running
    pub fn mark_pending(&mut self) {
        self.pending = true;
    }

    /// Consume the pending flag at shutdown. True when one final build is owed.
    pub fn take_pending(&mut self) -> bool {
        std::mem::take(&mut self.pending)
    }
}
