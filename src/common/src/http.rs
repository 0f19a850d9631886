//! Shared HTTP engine: one typed entry point for every outbound request.
//!
//! Owns the retry policy, proxy borrowing, header profiles, and telemetry
//! hooks so adapters only contribute URLs and response decoding. Responses
//! are fully buffered before any decoding; venues that serve Brotli are
//! handled by reqwest's transparent decompression via the `brotli`/`gzip`/
//! `deflate` features (setting Accept-Encoding manually would turn that
//! off).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use tracing::{debug, warn};

use crate::config::Settings;
use crate::error::{Result, ScrapeError};
use crate::proxy::{ProxyEndpoint, ProxyManager};
use crate::telemetry::Telemetry;

const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const LOW_LEVEL_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:120.0) \
                            Gecko/20100101 Firefox/120.0";

/// Bound on the per-proxy client cache; beyond this the oldest entries are
/// dropped and rebuilt on demand.
const PROXIED_CLIENT_CAP: usize = 32;

/// Per-request knobs; venue-level defaults come from config, callers
/// override per call.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub headers: Vec<(String, String)>,
    pub timeout: Option<Duration>,
    pub use_proxy: bool,
    /// Route through the low-level client profile (WAF-fronted venues).
    pub low_level: bool,
    pub max_retries: Option<u32>,
}

/// HTTP engine shared by every adapter and the orchestrator.
pub struct HttpEngine {
    standard: reqwest::Client,
    low_level: reqwest::Client,
    proxied: Mutex<HashMap<String, reqwest::Client>>,
    proxy_manager: Arc<ProxyManager>,
    telemetry: Arc<Telemetry>,
    settings: Settings,
}

impl HttpEngine {
    pub fn new(
        settings: Settings,
        proxy_manager: Arc<ProxyManager>,
        telemetry: Arc<Telemetry>,
    ) -> Result<Self> {
        Ok(Self {
            standard: build_client(browser_headers(), &settings, false)?,
            low_level: build_client(low_level_headers(), &settings, true)?,
            proxied: Mutex::new(HashMap::new()),
            proxy_manager,
            telemetry,
            settings,
        })
    }

    /// GET a URL and return the fully buffered body.
    pub async fn get(&self, url: &str, options: &RequestOptions) -> Result<Vec<u8>> {
        self.request(reqwest::Method::GET, url, None, options).await
    }

    /// Perform a request and return the fully buffered body.
    ///
    /// Retries retryable failures up to `max_retries` with exponential
    /// backoff (`min(base * 2^attempt, cap)`), borrowing a fresh proxy on
    /// every attempt. HTTP 429 stretches the backoff further; non-429 4xx
    /// is terminal for the request.
    pub async fn request(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<&serde_json::Value>,
        options: &RequestOptions,
    ) -> Result<Vec<u8>> {
        let max_retries = options.max_retries.unwrap_or(self.settings.max_retries);
        let mut last_error = ScrapeError::Connection("no attempt made".to_string());

        for attempt in 0..=max_retries {
            if attempt > 0 {
                let backoff = self.backoff_for(attempt, &last_error);
                debug!("retrying {url} in {backoff:?} (attempt {attempt}/{max_retries})");
                tokio::time::sleep(backoff).await;
                if options.use_proxy {
                    self.telemetry.record_proxy_rotation();
                }
            }
            match self.attempt(method.clone(), url, body, options).await {
                Ok(body) => return Ok(body),
                Err(e) if e.retryable() && attempt < max_retries => {
                    warn!("request to {url} failed ({e}), will retry");
                    last_error = e;
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error)
    }

    /// GET and JSON-decode in one step; an empty body is reported as its
    /// own error kind, not a JSON failure.
    pub async fn get_json(&self, url: &str, options: &RequestOptions) -> Result<serde_json::Value> {
        let body = self.get(url, options).await?;
        serde_json::from_slice(&body)
            .map_err(|e| ScrapeError::parse(format!("JSON from {url}"), e.to_string()))
    }

    /// Run many GETs concurrently under `concurrency`, preserving input
    /// order. Failures stay in their slot; siblings are unaffected.
    pub async fn batch(
        &self,
        urls: &[String],
        concurrency: usize,
        options: &RequestOptions,
    ) -> Vec<Result<Vec<u8>>> {
        stream::iter(urls.iter().map(|url| self.get(url, options)))
            .buffered(concurrency.max(1))
            .collect()
            .await
    }

    async fn attempt(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<&serde_json::Value>,
        options: &RequestOptions,
    ) -> Result<Vec<u8>> {
        let endpoint = if options.use_proxy {
            let borrowed = self.proxy_manager.acquire();
            if borrowed.is_none() {
                // Allowed fallback: proceed direct.
                debug!("no proxy available for {url}, going direct");
            }
            borrowed
        } else {
            None
        };

        let client = self.client_for(&endpoint, options)?;
        let timeout = options
            .timeout
            .unwrap_or(Duration::from_secs(self.settings.timeout_secs));

        let mut request = client.request(method, url).timeout(timeout);
        if let Some(body) = body {
            request = request.json(body);
        }
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        self.telemetry.record_request();
        let started = Instant::now();
        let outcome = self.execute(request, url).await;
        let latency = started.elapsed();

        match &outcome {
            Ok(_) => {
                self.telemetry.record_success(latency);
                if let Some(endpoint) = &endpoint {
                    self.proxy_manager.record_success(&endpoint.pool, latency);
                }
            }
            Err(e) => {
                self.telemetry.record_failure(latency);
                if matches!(e, ScrapeError::RateLimited { .. }) {
                    self.telemetry.record_rate_limit_hit();
                }
                if let Some(endpoint) = &endpoint {
                    self.proxy_manager.record_failure(&endpoint.pool);
                }
            }
        }
        outcome
    }

    async fn execute(&self, request: reqwest::RequestBuilder, url: &str) -> Result<Vec<u8>> {
        let response = request.send().await.map_err(ScrapeError::from_reqwest)?;
        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(ScrapeError::RateLimited { retry_after });
        }
        if !status.is_success() {
            return Err(ScrapeError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(ScrapeError::from_reqwest)?;
        if body.is_empty() {
            return Err(ScrapeError::EmptyBody(url.to_string()));
        }
        Ok(body.to_vec())
    }

    fn client_for(
        &self,
        endpoint: &Option<ProxyEndpoint>,
        options: &RequestOptions,
    ) -> Result<reqwest::Client> {
        let Some(endpoint) = endpoint else {
            return Ok(if options.low_level {
                self.low_level.clone()
            } else {
                self.standard.clone()
            });
        };

        let mut cache = self.proxied.lock();
        if let Some(client) = cache.get(&endpoint.url) {
            return Ok(client.clone());
        }
        let headers = if options.low_level {
            low_level_headers()
        } else {
            browser_headers()
        };
        let proxy = reqwest::Proxy::all(&endpoint.url)
            .map_err(|e| ScrapeError::Connection(format!("bad proxy url: {e}")))?;
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .pool_max_idle_per_host(30)
            .proxy(proxy)
            .build()
            .map_err(|e| ScrapeError::Connection(format!("client build failed: {e}")))?;
        if cache.len() >= PROXIED_CLIENT_CAP {
            cache.clear();
        }
        cache.insert(endpoint.url.clone(), client.clone());
        Ok(client)
    }

    fn backoff_for(&self, attempt: u32, last_error: &ScrapeError) -> Duration {
        let base = self.settings.retry_backoff_ms;
        let cap = self.settings.retry_backoff_cap_ms;
        let exp = base.saturating_mul(1u64 << attempt.min(16)).min(cap);
        match last_error {
            // Rate limiting gets the longer of the server's ask and twice
            // the computed backoff.
            ScrapeError::RateLimited { retry_after } => {
                let server = retry_after.map(|s| s * 1000).unwrap_or(0);
                Duration::from_millis(server.max(exp.saturating_mul(2).min(cap)))
            }
            _ => Duration::from_millis(exp),
        }
    }
}

fn build_client(headers: HeaderMap, settings: &Settings, http1_only: bool) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(settings.timeout_secs))
        .pool_max_idle_per_host(30);
    if http1_only {
        builder = builder.http1_only();
    }
    builder
        .build()
        .map_err(|e| ScrapeError::Config(format!("cannot build HTTP client: {e}")))
}

fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_UA));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(
        HeaderName::from_static("cache-control"),
        HeaderValue::from_static("no-cache"),
    );
    headers
}

/// Sparse header set for WAF-fronted venues: the point is to look unlike
/// the default profile of a modern HTTP library.
fn low_level_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(LOW_LEVEL_UA));
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn engine() -> HttpEngine {
        let config = AppConfig::defaults();
        let proxy = Arc::new(ProxyManager::with_static_pools(vec![]));
        HttpEngine::new(config.settings.clone(), proxy, Arc::new(Telemetry::new())).unwrap()
    }

    #[test]
    fn backoff_grows_exponentially_and_caps() {
        let engine = engine();
        let err = ScrapeError::Connection("reset".into());
        let b1 = engine.backoff_for(1, &err);
        let b2 = engine.backoff_for(2, &err);
        let b10 = engine.backoff_for(10, &err);
        assert_eq!(b1, Duration::from_millis(2_000));
        assert_eq!(b2, Duration::from_millis(4_000));
        assert_eq!(b10, Duration::from_millis(30_000));
    }

    #[test]
    fn rate_limited_backoff_honors_retry_after() {
        let engine = engine();
        let err = ScrapeError::RateLimited {
            retry_after: Some(45),
        };
        assert_eq!(engine.backoff_for(1, &err), Duration::from_millis(45_000));
        let err_no_hint = ScrapeError::RateLimited { retry_after: None };
        assert_eq!(
            engine.backoff_for(1, &err_no_hint),
            Duration::from_millis(4_000)
        );
    }
}
