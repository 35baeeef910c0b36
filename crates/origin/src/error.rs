//! Error types for origin fetches

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Error type for origin operations
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// The path's extension is on the deny list
    #[error("Extension '{extension}' is denied: {path}")]
    #[diagnostic(
        code(edgenode::origin::extension_denied),
        help("Remove the extension from origin.denied_extensions to allow it")
    )]
    ExtensionDenied {
        /// Requested path
        path: String,
        /// Offending extension, lowercased
        extension: String,
    },

    /// An allow list is configured and the extension is not on it
    #[error("Extension {} is not allowed: {path}", describe_extension(.extension))]
    #[diagnostic(
        code(edgenode::origin::extension_not_allowed),
        help("Add the extension to origin.allowed_extensions or clear the allow list")
    )]
    ExtensionNotAllowed {
        /// Requested path
        path: String,
        /// Extension found, if any
        extension: Option<String>,
    },

    /// The origin answered 404
    #[error("Origin has no content at {url}")]
    #[diagnostic(code(edgenode::origin::not_found))]
    OriginNotFound {
        /// Requested URL
        url: String,
    },

    /// The origin redirected more times than allowed
    #[error("Redirect limit of {limit} exceeded fetching {url}")]
    #[diagnostic(
        code(edgenode::origin::redirect_limit),
        help("Check the origin for redirect loops or raise origin.redirect_limit")
    )]
    RedirectLimitExceeded {
        /// Requested URL
        url: String,
        /// Configured limit
        limit: usize,
    },

    /// The response body is larger than `origin.max_body_bytes`
    #[error("Origin response for {url} exceeds {limit} bytes")]
    #[diagnostic(
        code(edgenode::origin::body_too_large),
        help("Raise origin.max_body_bytes to accept larger objects")
    )]
    BodyTooLarge {
        /// Requested URL
        url: String,
        /// Configured limit
        limit: u64,
    },

    /// The fetch failed permanently or exhausted its retries
    #[error("Origin fetch of {url} failed after {attempts} attempt(s): {reason}")]
    #[diagnostic(code(edgenode::origin::fetch_failed))]
    OriginFetchFailed {
        /// Requested URL
        url: String,
        /// Attempts made
        attempts: u32,
        /// Last failure observed
        reason: String,
    },

    /// Origin fetching is switched off
    #[error("Origin fetching is disabled")]
    #[diagnostic(
        code(edgenode::origin::disabled),
        help("Set origin.enabled = true and origin.base_url to fetch from an origin")
    )]
    Disabled,

    /// Invalid client configuration
    #[error("Invalid origin configuration: {message}")]
    #[diagnostic(code(edgenode::origin::configuration))]
    Configuration {
        /// What is wrong
        message: String,
    },
}

impl Error {
    /// Create a fetch failure
    #[must_use]
    pub fn fetch_failed(url: impl Into<String>, attempts: u32, reason: impl Into<String>) -> Self {
        Self::OriginFetchFailed {
            url: url.into(),
            attempts,
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Whether the error came from the extension policy
    #[must_use]
    pub fn is_policy(&self) -> bool {
        matches!(
            self,
            Self::ExtensionDenied { .. } | Self::ExtensionNotAllowed { .. }
        )
    }
}

fn describe_extension(extension: &Option<String>) -> String {
    extension
        .as_deref()
        .map_or_else(|| "(none)".to_string(), |e| format!("'{e}'"))
}

/// Result type for origin operations
pub type Result<T> = std::result::Result<T, Error>;
