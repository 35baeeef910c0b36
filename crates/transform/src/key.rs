//! Derived cache keys for transform outputs
//!
//! A key ending in `~t` plus 16 lowercase hex characters is reserved for
//! derived entries; see [`is_derived_key`].

use crate::options::TransformOptions;
use sha2::{Digest, Sha256};

/// Separator between a base key and its transform digest
pub const DERIVED_MARKER: &str = "~t";

/// Hex characters of the options digest kept in a derived key
const DIGEST_LEN: usize = 16;

/// Key under which the output of `options` applied to `base` is cached.
///
/// Empty options map to `base` itself.
#[must_use]
pub fn derive_key(base: &str, options: &TransformOptions) -> String {
    if options.is_empty() {
        return base.to_string();
    }
    let digest = hex::encode(Sha256::digest(options.canonical().as_bytes()));
    format!("{base}{DERIVED_MARKER}{}", &digest[..DIGEST_LEN])
}

/// Whether `key` has the shape of a derived key.
///
/// Such keys must not be used as base keys, or they would alias the
/// derived entry of their prefix.
#[must_use]
pub fn is_derived_key(key: &str) -> bool {
    key.rsplit_once(DERIVED_MARKER).is_some_and(|(_, digest)| {
        digest.len() == DIGEST_LEN
            && digest
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    })
}
