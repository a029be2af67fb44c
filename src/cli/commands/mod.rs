//! CLI command implementations

pub mod build;
pub mod cache;
pub mod clean;
pub mod config;
pub mod init;
pub mod watch;

pub use build::execute as build;
pub use cache::execute as cache;
pub use clean::execute as clean;
pub use config::execute as config;
pub use init::execute as init;
pub use watch::execute as watch;
