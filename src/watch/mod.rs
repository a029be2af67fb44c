//! Incremental rebuild on file changes
//!
//! [`Watcher`] forwards `notify` events into a tokio channel and runs
//! builds one at a time. [`WatchState`] decides whether a change builds now
//! or is deferred until shutdown.

pub mod debounce;
pub mod watcher;

pub use debounce::{Clock, Decision, SystemClock, WatchState};
pub use watcher::{
    qualifies, watch_targets, BuildTrigger, ExcludeSet, WatchSummary, WatchTarget, Watcher,
};
