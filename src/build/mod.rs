//! Build orchestration
//!
//! - [`request`]: immutable per-invocation inputs
//! - [`pipeline`]: the staged build state machine
//! - [`metadata`]: debug side-file aggregation

pub mod metadata;
pub mod pipeline;
pub mod request;

pub use metadata::{DebugIndex, IndexEntry, IndexTotals, INDEX_SCHEMA};
pub use pipeline::{BuildPipeline, BuildReport, BuildStage};
pub use request::{BuildMode, BuildRequest};
