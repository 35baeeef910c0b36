//! Error types for the edge node

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Error type for node operations
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Content store failure
    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] edgenode_store::Error),

    /// Origin fetch failure
    #[error(transparent)]
    #[diagnostic(transparent)]
    Origin(#[from] edgenode_origin::Error),

    /// Transform failure
    #[error(transparent)]
    #[diagnostic(transparent)]
    Transform(#[from] edgenode_transform::Error),

    /// Invalid node configuration
    #[error("Configuration error: {message}")]
    #[diagnostic(code(edgenode::config::invalid), help("Check the edgenode configuration file"))]
    Configuration {
        /// What is wrong
        message: String,
    },

    /// Reading configuration failed
    #[error("I/O error during {operation}: {source}")]
    #[diagnostic(code(edgenode::io))]
    Io {
        /// Underlying error
        #[source]
        source: std::io::Error,
        /// Path involved
        path: Option<Box<Path>>,
        /// Operation being performed
        operation: String,
    },

    /// A blocking task panicked or was cancelled
    #[error("Background task failed: {message}")]
    #[diagnostic(code(edgenode::task))]
    Task {
        /// Join error description
        message: String,
    },
}

impl Error {
    /// Create a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an I/O error with path context
    #[must_use]
    pub fn io(source: std::io::Error, path: impl AsRef<Path>, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            path: Some(path.as_ref().into()),
            operation: operation.into(),
        }
    }
}

/// Result type for node operations
pub type Result<T> = std::result::Result<T, Error>;

/// Why a resolution ended without content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotFoundCause {
    /// The key is empty or has the reserved derived-key shape
    InvalidKey,
    /// The origin has no content for the key either
    Absent,
    /// No tier had the key and the origin is disabled
    OriginDisabled,
    /// The origin was asked and failed or refused the path
    OriginFailed,
    /// Bytes were found but the transform failed
    TransformFailed,
}

impl fmt::Display for NotFoundCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::InvalidKey => "not a valid content key",
            Self::Absent => "absent from every tier and the origin",
            Self::OriginDisabled => "not cached and origin fetching is disabled",
            Self::OriginFailed => "origin fetch failed",
            Self::TransformFailed => "transform failed",
        })
    }
}

/// Terminal failure of the resolution pipeline
#[derive(Error, Debug, Diagnostic)]
pub enum ResolveError {
    /// Nothing could be served for the key
    #[error("Not found: {key} ({cause})")]
    #[diagnostic(code(edgenode::resolve::not_found))]
    NotFound {
        /// Requested key (derived when options were given)
        key: String,
        /// Informational reason
        cause: NotFoundCause,
        /// Underlying failure, when there was one
        #[source]
        source: Option<Box<Error>>,
    },
}

impl ResolveError {
    /// The requested key
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::NotFound { key, .. } => key,
        }
    }

    /// Why nothing was served
    #[must_use]
    pub fn cause(&self) -> NotFoundCause {
        match self {
            Self::NotFound { cause, .. } => *cause,
        }
    }
}
