//! The origin fetch client

use crate::config::OriginConfig;
use crate::error::{Error, Result};
use crate::mime::guess_content_type;
use crate::policy::{ExtensionPolicy, NormalizedPath, normalize_path};
use crate::retry::{AttemptError, RetryPolicy};
use bytes::{Bytes, BytesMut};
use futures::stream::{self, StreamExt};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode, Url, redirect};
use serde::Serialize;
use tracing::{debug, info};

/// Outcome of pulling one path from the origin
#[derive(Debug, Clone, Serialize)]
pub struct OriginPullResult {
    /// Whether bytes were fetched
    pub success: bool,
    /// Normalized request path, used as the cache key
    pub key: String,
    /// Body length in bytes
    pub size: u64,
    /// Content type from the response, or guessed from the extension
    pub content_type: String,
    /// Whether the caller stored the bytes locally
    pub cached: bool,
    /// Resolved origin URL
    pub url: String,
    /// Response body
    #[serde(skip)]
    pub body: Bytes,
    /// Failure description for unsuccessful prefetch items
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OriginPullResult {
    fn failed(key: String, url: String, error: &Error) -> Self {
        Self {
            success: false,
            key,
            size: 0,
            content_type: String::new(),
            cached: false,
            url,
            body: Bytes::new(),
            error: Some(error.to_string()),
        }
    }
}

/// Per-item outcomes of a prefetch, in input order
#[derive(Debug, Clone, Default, Serialize)]
pub struct PrefetchReport {
    /// One result per requested item
    pub results: Vec<OriginPullResult>,
    /// Items fetched successfully
    pub succeeded: usize,
    /// Items that failed
    pub failed: usize,
}

impl PrefetchReport {
    /// Tally a list of results
    #[must_use]
    pub fn from_results(results: Vec<OriginPullResult>) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        Self {
            failed: results.len() - succeeded,
            succeeded,
            results,
        }
    }
}

/// HTTP client for the configured origin
#[derive(Debug, Clone)]
pub struct OriginClient {
    http: Client,
    base: Option<Url>,
    config: OriginConfig,
    policy: ExtensionPolicy,
    retry: RetryPolicy,
}

impl OriginClient {
    /// Build a client; fails when enabled without a valid base URL
    pub fn new(config: OriginConfig) -> Result<Self> {
        let base = if config.base_url.trim().is_empty() {
            None
        } else {
            Some(parse_base(&config.base_url)?)
        };
        if config.enabled && base.is_none() {
            return Err(Error::configuration(
                "origin.base_url is required when the origin is enabled",
            ));
        }

        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout())
            .redirect(redirect::Policy::limited(config.redirect_limit))
            .build()
            .map_err(|e| Error::configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base,
            policy: ExtensionPolicy::new(&config.allowed_extensions, &config.denied_extensions),
            retry: config.retry_policy(),
            config,
        })
    }

    /// Client configuration
    #[must_use]
    pub fn config(&self) -> &OriginConfig {
        &self.config
    }

    /// Whether misses may be fetched from the origin
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.config.enabled && self.base.is_some()
    }

    /// Origin URL for a normalized path
    pub fn url_for(&self, path: &NormalizedPath) -> Result<Url> {
        let base = self.base.as_ref().ok_or(Error::Disabled)?;
        let joined = format!(
            "{}/{}",
            base.as_str().trim_end_matches('/'),
            path.request_target()
        );
        Url::parse(&joined)
            .map_err(|e| Error::configuration(format!("Invalid origin URL {joined}: {e}")))
    }

    /// Fetch `path` from the origin, retrying transient failures
    pub async fn pull(&self, path: &str) -> Result<OriginPullResult> {
        if !self.is_enabled() {
            return Err(Error::Disabled);
        }
        let normalized = normalize_path(path);
        self.policy.check(&normalized.key)?;
        let url = self.url_for(&normalized)?;
        let url_str = url.to_string();

        let (body, header_type) = self
            .retry
            .run(&url_str, |attempt| self.attempt(url.clone(), attempt))
            .await?;
        let content_type =
            header_type.unwrap_or_else(|| guess_content_type(&normalized.key).to_string());

        debug!(
            url = %url_str,
            size = body.len(),
            content_type = %content_type,
            "Fetched from origin"
        );
        Ok(OriginPullResult {
            success: true,
            key: normalized.key,
            size: body.len() as u64,
            content_type,
            cached: false,
            url: url_str,
            body,
            error: None,
        })
    }

    /// Pull every item with bounded concurrency.
    ///
    /// Items may be absolute URLs (only their path and query are used) or
    /// paths. Failures are recorded, never propagated.
    pub async fn prefetch<I, S>(&self, items: I) -> PrefetchReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let paths: Vec<String> = items
            .into_iter()
            .map(|item| prefetch_path(item.as_ref()))
            .collect();
        let concurrency = self.config.prefetch_concurrency.max(1);

        let results: Vec<OriginPullResult> = stream::iter(paths)
            .map(|path| async move {
                match self.pull(&path).await {
                    Ok(result) => result,
                    Err(err) => {
                        let normalized = normalize_path(&path);
                        let url = self
                            .url_for(&normalized)
                            .map_or_else(|_| path.clone(), |u| u.to_string());
                        debug!(path = %path, error = %err, "Prefetch item failed");
                        OriginPullResult::failed(normalized.key, url, &err)
                    }
                }
            })
            .buffered(concurrency)
            .collect()
            .await;

        let report = PrefetchReport::from_results(results);
        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            "Prefetch complete"
        );
        report
    }

    async fn attempt(
        &self,
        url: Url,
        attempt: u32,
    ) -> std::result::Result<(Bytes, Option<String>), AttemptError> {
        let url_str = url.to_string();
        let mut response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| self.classify(&url_str, attempt, &e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(AttemptError::Permanent(Error::OriginNotFound { url: url_str }));
        }
        if status.is_server_error() {
            return Err(AttemptError::Transient(format!("HTTP {status}")));
        }
        if !status.is_success() {
            return Err(AttemptError::Permanent(Error::fetch_failed(
                url_str,
                attempt,
                format!("HTTP {status}"),
            )));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(';').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);

        let limit = self.config.max_body_bytes;
        let too_large = || {
            AttemptError::Permanent(Error::BodyTooLarge {
                url: url_str.clone(),
                limit,
            })
        };
        if response.content_length().is_some_and(|len| len > limit) {
            return Err(too_large());
        }
        let mut body = BytesMut::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.classify(&url_str, attempt, &e))?
        {
            if (body.len() + chunk.len()) as u64 > limit {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }
        Ok((body.freeze(), content_type))
    }

    fn classify(&self, url: &str, attempt: u32, err: &reqwest::Error) -> AttemptError {
        if err.is_redirect() {
            AttemptError::Permanent(Error::RedirectLimitExceeded {
                url: url.to_string(),
                limit: self.config.redirect_limit,
            })
        } else if err.is_timeout() {
            AttemptError::Transient(format!("timed out after {}s", self.config.timeout().as_secs()))
        } else if err.is_connect() || err.is_request() || err.is_body() {
            AttemptError::Transient(err.to_string())
        } else {
            AttemptError::Permanent(Error::fetch_failed(url, attempt, err.to_string()))
        }
    }
}

fn parse_base(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| Error::configuration(format!("Invalid origin.base_url '{raw}': {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(Error::configuration(format!(
            "origin.base_url must be http or https, got '{other}'"
        ))),
    }
}

/// Path and query of an absolute URL, or the item itself
fn prefetch_path(item: &str) -> String {
    match Url::parse(item) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => match url.query() {
            Some(query) => format!("{}?{query}", url.path()),
            None => url.path().to_string(),
        },
        _ => item.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enabled_without_base_url_is_rejected() {
        let config = OriginConfig {
            enabled: true,
            ..OriginConfig::default()
        };
        assert!(matches!(
            OriginClient::new(config),
            Err(Error::Configuration { .. })
        ));
    }

    #[test]
    fn non_http_base_is_rejected() {
        assert!(OriginClient::new(OriginConfig::new("ftp://origin.test")).is_err());
        assert!(OriginClient::new(OriginConfig::new("not a url")).is_err());
    }

    #[test]
    fn url_joins_base_path_and_query() {
        let client = OriginClient::new(OriginConfig::new("https://origin.test/assets/")).unwrap();
        let url = client.url_for(&normalize_path("/img/../a.png?v=1")).unwrap();
        assert_eq!(url.as_str(), "https://origin.test/assets/a.png?v=1");
    }

    #[test]
    fn prefetch_items_accept_urls_and_paths() {
        assert_eq!(prefetch_path("https://cdn.test/img/a.png?x=1"), "/img/a.png?x=1");
        assert_eq!(prefetch_path("/img/a.png"), "/img/a.png");
        assert_eq!(prefetch_path("img/a.png"), "img/a.png");
    }

    #[tokio::test]
    async fn disabled_client_refuses_to_pull() {
        let client = OriginClient::new(OriginConfig::default()).unwrap();
        assert!(!client.is_enabled());
        assert!(matches!(client.pull("/a.png").await, Err(Error::Disabled)));
    }
}
