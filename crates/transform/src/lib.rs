//! On-demand image transforms for edgenode
//!
//! - [`parse_options`] validates query-style parameters into [`TransformOptions`]
//! - [`derive_key`] names the cached output of a base key under those options
//! - [`TransformEngine`] performs the resize and re-encode
//!
//! ```
//! use edgenode_transform::{RawOptions, TransformConfig, derive_key, parse_options};
//!
//! let mut raw = RawOptions::new();
//! raw.insert("w".into(), "200".into());
//! raw.insert("format".into(), "webp".into());
//!
//! let opts = parse_options(&raw, &TransformConfig::default()).unwrap();
//! assert!(derive_key("img/logo.png", &opts).starts_with("img/logo.png~t"));
//! ```

#![expect(
    clippy::missing_errors_doc,
    reason = "Error documentation to be added incrementally"
)]

mod engine;
mod error;
mod key;
mod options;

pub use engine::{SVG_CONTENT_TYPE, TransformEngine, TransformOutput};
pub use error::{Error, Result};
pub use key::{DERIVED_MARKER, derive_key, is_derived_key};
pub use options::{
    CropPosition, FitMode, OutputFormat, RawOptions, TransformConfig, TransformOptions,
    parse_options,
};
