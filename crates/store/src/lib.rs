//! Disk content store for edgenode
//!
//! This crate owns the mapping from cache key to on-disk bytes:
//! - Capacity accounting with synchronous LRU eviction before each insert
//! - Atomic replacement (temp file + rename during the metadata commit)
//! - A persisted index, verified entry by entry at startup
//! - TTL expiry on read and by a periodic sweep
//!
//! # Layout
//!
//! ```text
//! <dir>/
//!   index.json          (version, saved_at, entries, access_counts)
//!   objects/
//!     img%2Flogo.png    (one file per key)
//! ```
//!
//! # Eviction order
//!
//! Lowest access count first; ties go to the entry inserted earliest.

#![expect(
    clippy::missing_errors_doc,
    reason = "Error documentation to be added incrementally"
)]

mod config;
mod entry;
mod error;
mod index;
mod locks;
pub mod maintenance;
mod recovery;
mod store;

pub use config::{MAX_ENTRY_PERCENT, StoreConfig};
pub use entry::{CacheEntry, PutOptions, StoreStats, file_name_for_key, integrity_tag};
pub use error::{Error, Result};
pub use index::{INDEX_FILE, INDEX_VERSION, IndexFile};
pub use maintenance::spawn_maintenance;
pub use recovery::{RecoveryReport, RecoverySource};
pub use store::{ContentStore, MAX_KEY_LEN, OBJECTS_DIR, SweepReport};
