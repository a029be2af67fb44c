//! Kiln - cache-aware bundle builder
//!
//! Compiles a project inside an isolated workspace, reuses installed
//! dependencies through a content-addressed vendor cache, and packages the
//! result into a data artifact plus loader script.

pub mod build;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod fsutil;
pub mod tools;
pub mod ui;
pub mod watch;
pub mod workspace;

pub use error::{KilnError, KilnResult};
