//! Error types for the content store

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::Path;
use thiserror::Error;

/// Error type for content store operations
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// A single entry would take more than the allowed share of capacity
    #[error("Entry {key} is {size} bytes, above the per-entry limit of {limit} bytes")]
    #[diagnostic(
        code(edgenode::store::oversized),
        help("A single entry may use at most 10% of the configured capacity")
    )]
    OversizedEntry {
        /// Key of the rejected entry
        key: String,
        /// Size of the rejected payload
        size: u64,
        /// Largest accepted payload
        limit: u64,
    },

    /// Eviction could not free enough room for the entry
    #[error("Cannot free {needed} bytes for {key}: only {evictable} bytes are evictable")]
    #[diagnostic(
        code(edgenode::store::insufficient_space),
        help("Orphaned files from a cold start are still accounted; run a sweep or purge")
    )]
    InsufficientSpace {
        /// Key of the rejected entry
        key: String,
        /// Bytes that had to be freed
        needed: u64,
        /// Bytes eviction could have freed
        evictable: u64,
    },

    /// Writing the entry bytes failed; the previous entry is untouched
    #[error("Failed to write bytes for {key}")]
    #[diagnostic(code(edgenode::store::write))]
    StorageWrite {
        /// Key being written
        key: String,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Invalidation pattern did not compile
    #[error("Invalid invalidation pattern {pattern:?}")]
    #[diagnostic(
        code(edgenode::store::invalid_pattern),
        help("Patterns are regular expressions matched against the whole key")
    )]
    InvalidPattern {
        /// The rejected pattern
        pattern: String,
        /// Regex compilation error
        #[source]
        source: regex::Error,
    },

    /// Key cannot be stored
    #[error("Invalid cache key: {message}")]
    #[diagnostic(code(edgenode::store::invalid_key))]
    InvalidKey {
        /// Why the key was rejected
        message: String,
    },

    /// I/O error during store operations
    #[error("I/O {operation} failed{}", path.as_ref().map_or(String::new(), |p| format!(": {}", p.display())))]
    #[diagnostic(
        code(edgenode::store::io),
        help("Check permissions on the cache directory")
    )]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Path that caused the error, if available
        path: Option<Box<Path>>,
        /// Operation that failed (e.g., "read", "rename", "create_dir_all")
        operation: String,
    },

    /// Index (de)serialization error
    #[error("Serialization error: {message}")]
    #[diagnostic(code(edgenode::store::serialization))]
    Serialization {
        /// Error message describing the serialization issue
        message: String,
    },
}

impl Error {
    /// Create an I/O error with path context
    #[must_use]
    pub fn io(
        source: std::io::Error,
        path: impl AsRef<Path>,
        operation: impl Into<String>,
    ) -> Self {
        Self::Io {
            source,
            path: Some(path.as_ref().into()),
            operation: operation.into(),
        }
    }

    /// Create a storage write error
    #[must_use]
    pub fn storage_write(key: impl Into<String>, source: std::io::Error) -> Self {
        Self::StorageWrite {
            key: key.into(),
            source,
        }
    }

    /// Create an invalid key error
    #[must_use]
    pub fn invalid_key(msg: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: msg.into(),
        }
    }

    /// Create a serialization error
    #[must_use]
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }
}

/// Result type for content store operations
pub type Result<T> = std::result::Result<T, Error>;
