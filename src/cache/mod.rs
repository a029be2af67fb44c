//! Content-addressed vendor cache
//!
//! Dependency directories are cached by a hash of the project's dependency
//! descriptors (manifest + lock file). Same descriptors = same entry.
//!
//! # Entry Lifecycle
//!
//! | State | On disk | Description |
//! |-------|---------|-------------|
//! | Miss | nothing | Installer runs into a staging sibling |
//! | Staging | `{entry}.partial-{id}` | Ignored by lookups; removed on failure |
//! | Committed | `{project}-vendor-{key}` | Read-only, copied out of, never into |
//!
//! Entries are never evicted automatically; see [`VendorCache::evict_older_than`].

pub mod key;
pub mod vendor;

pub use key::{derive_key, CacheKey};
pub use vendor::{CacheEntry, Resolved, VendorCache};
