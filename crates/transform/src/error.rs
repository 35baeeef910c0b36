//! Error types for image transforms

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Error type for transform operations
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Source bytes could not be decoded as an image
    #[error("Failed to decode {content_type} source: {source}")]
    #[diagnostic(
        code(edgenode::transform::decode),
        help("The cached source may be truncated or not actually an image")
    )]
    Decode {
        /// Declared content type of the source
        content_type: String,
        /// Underlying codec error
        #[source]
        source: image::ImageError,
    },

    /// The transformed image could not be encoded
    #[error("Failed to encode {format} output: {source}")]
    #[diagnostic(code(edgenode::transform::encode))]
    Encode {
        /// Target format
        format: String,
        /// Underlying codec error
        #[source]
        source: image::ImageError,
    },

    /// The source is not an image format the engine handles
    #[error("Unsupported source format: {content_type}")]
    #[diagnostic(
        code(edgenode::transform::unsupported),
        help("Supported sources are JPEG, PNG, WebP and GIF; SVG is served unchanged")
    )]
    UnsupportedFormat {
        /// Declared content type of the source
        content_type: String,
    },
}

impl Error {
    /// Create a decode error
    #[must_use]
    pub fn decode(content_type: impl Into<String>, source: image::ImageError) -> Self {
        Self::Decode {
            content_type: content_type.into(),
            source,
        }
    }

    /// Create an encode error
    #[must_use]
    pub fn encode(format: impl Into<String>, source: image::ImageError) -> Self {
        Self::Encode {
            format: format.into(),
            source,
        }
    }

    /// Create an unsupported format error
    #[must_use]
    pub fn unsupported(content_type: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            content_type: content_type.into(),
        }
    }
}

/// Result type for transform operations
pub type Result<T> = std::result::Result<T, Error>;
