//! Provider identities, the shared HTTP plumbing, and structured error types.
//!
//! Every provider client issues exactly one request per series. There is no
//! retry loop and no rate limiting: a failed request surfaces as an error and
//! the caller decides what to do with it.

use crate::config::ConfigError;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Longest response body excerpt kept inside an error message.
const BODY_EXCERPT_LEN: usize = 300;

/// Where a dataset came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    YahooFinance,
    Fred,
    WorldBank,
    FamaFrench,
}

impl DataSource {
    /// Stable machine-readable name.
    pub fn name(self) -> &'static str {
        match self {
            DataSource::YahooFinance => "yahoo_finance",
            DataSource::Fred => "fred",
            DataSource::WorldBank => "world_bank",
            DataSource::FamaFrench => "fama_french",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Structured error types for collection operations.
///
/// These are designed to be displayable directly in CLI output.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("network error talking to {provider}: {message}")]
    Network {
        provider: DataSource,
        message: String,
    },

    #[error("{provider} returned HTTP {status}: {body}")]
    HttpStatus {
        provider: DataSource,
        status: u16,
        body: String,
    },

    #[error("{provider} reported an error: {message}")]
    Provider {
        provider: DataSource,
        message: String,
    },

    #[error("response format changed: {0}")]
    ResponseFormat(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("parquet I/O error: {0}")]
    Parquet(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Build the blocking HTTP client used by a provider.
pub(crate) fn http_client(provider: DataSource) -> Result<Client, CollectError> {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
        .build()
        .map_err(|e| CollectError::Network {
            provider,
            message: format!("failed to build HTTP client: {e}"),
        })
}

/// Send a request once and reject non-success statuses.
pub(crate) fn send(provider: DataSource, request: RequestBuilder) -> Result<Response, CollectError> {
    let resp = request.send().map_err(|e| CollectError::Network {
        provider,
        message: e.to_string(),
    })?;

    let status = resp.status();
    debug!(%provider, url = %resp.url(), %status, "provider response");

    if !status.is_success() {
        let body = resp.text().unwrap_or_default();
        return Err(CollectError::HttpStatus {
            provider,
            status: status.as_u16(),
            body: excerpt(&body),
        });
    }

    Ok(resp)
}

/// Trim a response body down to something that fits on one log line.
fn excerpt(body: &str) -> String {
    let body = body.trim();
    match body.char_indices().nth(BODY_EXCERPT_LEN) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}

/// Join a base URL and a path without doubling slashes.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_names_are_stable() {
        assert_eq!(DataSource::YahooFinance.to_string(), "yahoo_finance");
        assert_eq!(DataSource::Fred.to_string(), "fred");
        assert_eq!(
            serde_json::to_string(&DataSource::WorldBank).unwrap(),
            "\"world_bank\""
        );
    }

    #[test]
    fn excerpt_truncates_long_bodies() {
        let long = "x".repeat(1000);
        let cut = excerpt(&long);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.len(), BODY_EXCERPT_LEN + 3);
        assert_eq!(excerpt("  short  "), "short");
    }

    #[test]
    fn join_url_handles_slashes() {
        assert_eq!(join_url("http://h/", "/a/b"), "http://h/a/b");
        assert_eq!(join_url("http://h", "a"), "http://h/a");
    }

    #[test]
    fn http_status_error_is_readable() {
        let err = CollectError::HttpStatus {
            provider: DataSource::Fred,
            status: 400,
            body: "bad".into(),
        };
        assert_eq!(err.to_string(), "fred returned HTTP 400: bad");
    }
}
