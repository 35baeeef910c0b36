//! Extension policy and request path normalization

use crate::error::{Error, Result};
use std::collections::HashSet;

/// Allow/deny lists of file extensions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionPolicy {
    allowed: HashSet<String>,
    denied: HashSet<String>,
}

impl ExtensionPolicy {
    /// Build from configured lists; entries are lowercased and lose leading dots
    pub fn new<A, D>(allowed: A, denied: D) -> Self
    where
        A: IntoIterator,
        A::Item: AsRef<str>,
        D: IntoIterator,
        D::Item: AsRef<str>,
    {
        Self {
            allowed: normalize_list(allowed),
            denied: normalize_list(denied),
        }
    }

    /// Check `path` against the lists. The deny list wins over the allow list.
    pub fn check(&self, path: &str) -> Result<()> {
        let extension = extension_of(path);
        if let Some(ext) = &extension {
            if self.denied.contains(ext) {
                return Err(Error::ExtensionDenied {
                    path: path.to_string(),
                    extension: ext.clone(),
                });
            }
        }
        if self.allowed.is_empty() {
            return Ok(());
        }
        match extension {
            Some(ext) if self.allowed.contains(&ext) => Ok(()),
            extension => Err(Error::ExtensionNotAllowed {
                path: path.to_string(),
                extension,
            }),
        }
    }
}

fn normalize_list<I>(items: I) -> HashSet<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    items
        .into_iter()
        .map(|item| item.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|item| !item.is_empty())
        .collect()
}

/// Lowercased extension of the last path segment, ignoring any query
#[must_use]
pub fn extension_of(path: &str) -> Option<String> {
    let (path, _) = split_query(path);
    let segment = path.rsplit('/').next().unwrap_or_default();
    let (_, ext) = segment.rsplit_once('.')?;
    (!ext.is_empty()).then(|| ext.to_ascii_lowercase())
}

/// A request path with its query split off
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedPath {
    /// Cache key: segments joined by `/`, no leading slash
    pub key: String,
    /// Query string without the `?`, if present
    pub query: Option<String>,
}

impl NormalizedPath {
    /// Path and query to append to the origin base URL
    #[must_use]
    pub fn request_target(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{query}", self.key),
            None => self.key.clone(),
        }
    }
}

/// Normalize a request path.
///
/// `.` segments and empty segments are dropped and `..` pops the previous
/// segment, never climbing above the root.
#[must_use]
pub fn normalize_path(path: &str) -> NormalizedPath {
    let (path, query) = split_query(path);
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    NormalizedPath {
        key: segments.join("/"),
        query: query.map(str::to_string),
    }
}

fn split_query(path: &str) -> (&str, Option<&str>) {
    let path = path.split('#').next().unwrap_or_default();
    match path.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (path, None),
    }
}
