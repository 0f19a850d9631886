//! Error taxonomy shared by every component.
//!
//! One sum type instead of per-client enums: the retry loop in the HTTP
//! engine and the orchestrator's failure accounting both key off
//! [`ScrapeError::retryable`], so the classification has to live in a
//! single place.

use std::time::Duration;

use thiserror::Error;

use crate::models::Venue;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("API key missing for venue '{0}'")]
    MissingApiKey(Venue),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("DNS resolution failed: {0}")]
    Dns(String),

    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error("rate limited by venue{}", .retry_after.map(|s| format!(", retry after {s}s")).unwrap_or_default())]
    RateLimited { retry_after: Option<u64> },

    #[error("empty response body from {0}")]
    EmptyBody(String),

    #[error("failed to parse {what}: {reason}")]
    Parse { what: String, reason: String },

    #[error("invalid item: {0}")]
    Validation(String),

    #[error("no proxies available")]
    ProxyUnavailable,

    #[error("persistence failed for {path}: {reason}")]
    Persistence { path: String, reason: String },

    #[error("canceled")]
    Canceled,
}

impl ScrapeError {
    /// Whether the HTTP engine should retry the request that produced this.
    ///
    /// 429 and 5xx are transient; any other 4xx means the request itself is
    /// wrong and repeating it would only burn proxy quota.
    pub fn retryable(&self) -> bool {
        match self {
            ScrapeError::Timeout(_)
            | ScrapeError::Connection(_)
            | ScrapeError::Dns(_)
            | ScrapeError::RateLimited { .. } => true,
            ScrapeError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Map a transport-level reqwest error into the taxonomy.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return ScrapeError::Timeout(Duration::from_secs(0));
        }
        let text = sanitize(&err.to_string());
        if err.is_connect() {
            if text.contains("dns") || text.contains("resolve") {
                ScrapeError::Dns(text)
            } else {
                ScrapeError::Connection(text)
            }
        } else {
            ScrapeError::Connection(text)
        }
    }

    pub fn parse(what: impl Into<String>, reason: impl Into<String>) -> Self {
        ScrapeError::Parse {
            what: what.into(),
            reason: sanitize(&reason.into()),
        }
    }
}

/// Strip credential-looking `key=value` fragments out of messages that may
/// end up in logs. Matches the patterns the summary reporter also redacts.
pub fn sanitize(message: &str) -> String {
    const MARKERS: [&str; 4] = ["api_key", "token", "bearer", "authorization"];
    let lower = message.to_lowercase();
    if !MARKERS.iter().any(|m| lower.contains(m)) {
        return message.to_string();
    }
    message
        .split_whitespace()
        .map(|word| {
            let lower = word.to_lowercase();
            if MARKERS.iter().any(|m| lower.contains(m)) {
                "[redacted]"
            } else {
                word
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub type Result<T> = std::result::Result<T, ScrapeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(ScrapeError::Http { status: 429, url: String::new() }.retryable());
        assert!(ScrapeError::Http { status: 502, url: String::new() }.retryable());
        assert!(!ScrapeError::Http { status: 403, url: String::new() }.retryable());
        assert!(!ScrapeError::Http { status: 404, url: String::new() }.retryable());
        assert!(ScrapeError::Timeout(Duration::from_secs(5)).retryable());
        assert!(ScrapeError::RateLimited { retry_after: None }.retryable());
        assert!(!ScrapeError::Parse { what: "x".into(), reason: "y".into() }.retryable());
        assert!(!ScrapeError::MissingApiKey(Venue::Empire).retryable());
    }

    #[test]
    fn sanitize_redacts_credentials() {
        let msg = "request failed: api_key=abc123 at host";
        let clean = sanitize(msg);
        assert!(!clean.contains("abc123"));
        assert!(clean.contains("[redacted]"));

        let plain = "connection reset by peer";
        assert_eq!(sanitize(plain), plain);
    }
}
