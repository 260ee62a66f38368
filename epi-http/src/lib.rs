//! Small HTTP client for fetching HTML pages with safe logging and retries.
//!
//! - Request options: timeout, retries, absolute URLs
//! - Bodies are decoded with the charset declared in `Content-Type`,
//!   falling back to UTF-8
//! - No request timeout unless one is configured
//! - Retries network failures and 429/5xx with exponential backoff and
//!   `Retry-After` support (the retry budget defaults to zero)
//! - Non-success statuses are *not* errors: the body is handed back in a
//!   [`Page`] and callers decide what to do with it
//! - Optional *raw* request/response logging via `EPI_HTTP_RAW=1`
//!
//! Example (no_run):
//! ```no_run
//! # async fn demo() -> Result<(), epi_http::HttpError> {
//! let client = epi_http::HttpClient::new("https://www.example.com")?;
//! let page = client
//!     .get_page("/recipes/food/views/soup", epi_http::RequestOpts::default())
//!     .await?;
//! println!("{} bytes", page.body.len());
//! # Ok(()) }
//! ```
//!
//! Observability: `tracing` events are emitted for request start, response
//! headers, body snippets (truncated), retries and final network errors. Raw
//! request/response lines go to target `http.raw` when `EPI_HTTP_RAW=1`.

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, RETRY_AFTER, USER_AGENT};
use reqwest::{Client, Method, StatusCode, Url};
use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

// ==============================
// Raw logging toggles
// ==============================

const RAW_ENV: &str = "EPI_HTTP_RAW";
const RAW_MAX_BODY: usize = 64 * 1024; // cap raw body logs (64 KiB)
const SNIPPET_MAX: usize = 500;

static REQUEST_SEQ: AtomicU64 = AtomicU64::new(1);

fn raw_enabled() -> bool {
    matches!(
        env::var(RAW_ENV).as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

/// Render a best-effort curl command for repro/debug.
fn make_curl(method: &Method, url: &Url) -> String {
    format!("curl -X{} '{}'", method, url.as_str().replace('\'', r"'\''"))
}

/// Redact sensitive headers for logging
fn redact_headers(h: &HeaderMap) -> Vec<(String, String)> {
    h.iter()
        .map(|(k, v)| {
            let key = k.as_str().to_string();
            let mut val = v.to_str().unwrap_or("").to_string();
            if key.eq_ignore_ascii_case("authorization") || key.eq_ignore_ascii_case("cookie") {
                val = "<redacted>".into();
            }
            (key, val)
        })
        .collect()
}

// ==============================
// Errors
// ==============================

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid URL: {0}")]
    Url(String),
    #[error("request build failed: {0}")]
    Build(String),
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
}

// ==============================
// Request options & responses
// ==============================

/// Per-request tuning knobs for the HTTP client.
///
/// ```
/// use epi_http::RequestOpts;
/// use std::time::Duration;
///
/// let opts = RequestOpts {
///     timeout: Some(Duration::from_secs(30)),
///     retries: Some(1),
///     ..Default::default()
/// };
///
/// assert_eq!(opts.timeout.unwrap().as_secs(), 30);
/// assert!(!opts.allow_absolute);
/// ```
#[derive(Clone, Debug, Default)]
pub struct RequestOpts {
    /// Overrides the client timeout for this request.
    pub timeout: Option<Duration>,
    pub retries: Option<usize>,
    /// If true and `path` is an absolute URL, use it as-is (ignore base).
    pub allow_absolute: bool,
}

/// A fetched page. The status is informational; the body is returned for
/// every status the server answered with.
#[derive(Clone, Debug)]
pub struct Page {
    pub status: StatusCode,
    pub body: String,
}

// ==============================
// Client
// ==============================

#[derive(Clone)]
pub struct HttpClient {
    base: Url,
    inner: Client,
    /// `None` waits as long as the server takes.
    pub default_timeout: Option<Duration>,
    pub max_retries: usize,
}

/// Connection-level settings applied when the underlying client is built.
#[derive(Clone, Debug, Default)]
pub struct ClientSettings {
    pub connect_timeout: Option<Duration>,
    pub timeout: Option<Duration>,
    pub retries: usize,
    pub user_agent: Option<String>,
}

impl HttpClient {
    /// Construct a client anchored to a base URL with default settings.
    ///
    /// ```no_run
    /// use epi_http::{HttpClient, HttpError};
    ///
    /// let client = HttpClient::new("https://www.example.com")?;
    /// assert_eq!(client.default_timeout, None);
    /// assert_eq!(client.max_retries, 0);
    /// # Ok::<(), HttpError>(())
    /// ```
    pub fn new(base: &str) -> Result<Self, HttpError> {
        Self::with_settings(base, ClientSettings::default())
    }

    pub fn with_settings(base: &str, settings: ClientSettings) -> Result<Self, HttpError> {
        let base = Url::parse(base).map_err(|e| HttpError::Url(e.to_string()))?;
        let mut builder = Client::builder();
        if let Some(dur) = settings.connect_timeout {
            builder = builder.connect_timeout(dur);
        }
        if let Some(ua) = settings.user_agent.as_deref() {
            let value = HeaderValue::from_str(ua)
                .map_err(|e| HttpError::Build(format!("invalid user agent: {e}")))?;
            let mut headers = HeaderMap::new();
            headers.insert(USER_AGENT, value);
            builder = builder.default_headers(headers);
        }
        let inner = builder
            .build()
            .map_err(|e| HttpError::Build(e.to_string()))?;
        Ok(Self {
            base,
            inner,
            default_timeout: settings.timeout,
            max_retries: settings.retries,
        })
    }

    /// Override the default timeout.
    pub fn with_timeout(mut self, dur: Duration) -> Self {
        self.default_timeout = Some(dur);
        self
    }

    /// Override the default retry budget.
    ///
    /// ```no_run
    /// use epi_http::{HttpClient, HttpError};
    ///
    /// let client = HttpClient::new("https://www.example.com")?.with_retries(3);
    /// assert_eq!(client.max_retries, 3);
    /// # Ok::<(), HttpError>(())
    /// ```
    pub fn with_retries(mut self, n: usize) -> Self {
        self.max_retries = n;
        self
    }

    /// GET a page and return its body as text, whatever the status code.
    pub async fn get_page(&self, path: &str, opts: RequestOpts) -> Result<Page, HttpError> {
        self.request_page(Method::GET, path, opts).await
    }

    fn resolve(&self, path: &str, allow_absolute: bool) -> Result<Url, HttpError> {
        if allow_absolute {
            if let Ok(abs) = Url::parse(path) {
                return Ok(abs);
            }
        }
        self.base
            .join(path)
            .map_err(|e| HttpError::Url(e.to_string()))
    }

    // ==============================
    // Core request implementation
    // ==============================

    async fn request_page(
        &self,
        method: Method,
        path: &str,
        opts: RequestOpts,
    ) -> Result<Page, HttpError> {
        let url = self.resolve(path, opts.allow_absolute)?;

        let mut attempt = 0usize;
        let max_retries = opts.retries.unwrap_or(self.max_retries);
        let timeout = opts.timeout.or(self.default_timeout);
        let req_id = format!("r{}", REQUEST_SEQ.fetch_add(1, Ordering::Relaxed));

        loop {
            // ----- Build request -----
            let mut rb = self.inner.request(method.clone(), url.clone());
            if let Some(dur) = timeout {
                rb = rb.timeout(dur);
            }

            tracing::debug!(
                req_id=%req_id,
                attempt=attempt + 1,
                max_retries,
                method=%method,
                host_path=%format!("{}{}", url.host_str().unwrap_or("-"), url.path()),
                query=?url.query(),
                timeout_ms=?timeout.map(|d| d.as_millis() as u64),
                "http.request.start"
            );

            if raw_enabled() {
                let curl = make_curl(&method, &url);
                tracing::debug!(target: "http.raw", %req_id, %curl, "request");
            }

            // ----- Send -----
            let t0 = std::time::Instant::now();
            let resp = match rb.send().await {
                Ok(resp) => resp,
                Err(err) => {
                    if attempt < max_retries {
                        attempt += 1;
                        let delay = backoff(attempt);
                        tracing::warn!(
                            req_id=%req_id,
                            attempt,
                            max_retries,
                            backoff_ms=delay.as_millis() as u64,
                            message=%err,
                            "http.retrying.network_send"
                        );
                        sleep(delay).await;
                        continue;
                    }
                    tracing::warn!(
                        req_id=%req_id,
                        attempt,
                        max_retries,
                        message=%err,
                        "http.network_error.send"
                    );
                    return Err(classify(err));
                }
            };
            let status = resp.status();
            let headers = resp.headers().clone();
            // Decodes with the charset from Content-Type, UTF-8 otherwise.
            let body = match resp.text().await {
                Ok(body) => body,
                Err(err) => {
                    if attempt < max_retries {
                        attempt += 1;
                        let delay = backoff(attempt);
                        tracing::warn!(
                            req_id=%req_id,
                            attempt,
                            max_retries,
                            backoff_ms=delay.as_millis() as u64,
                            message=%err,
                            "http.retrying.network_body"
                        );
                        sleep(delay).await;
                        continue;
                    }
                    tracing::warn!(
                        req_id=%req_id,
                        attempt,
                        max_retries,
                        message=%err,
                        "http.network_error.body"
                    );
                    return Err(classify(err));
                }
            };
            let dur_ms = t0.elapsed().as_millis() as u64;

            let content_type = headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-");
            tracing::debug!(
                req_id=%req_id,
                %status,
                duration_ms=dur_ms,
                body_len=body.len(),
                content_type=%content_type,
                "http.response.headers"
            );

            if raw_enabled() {
                let hdrs = redact_headers(&headers);
                let truncated = body.len() > RAW_MAX_BODY;
                let text = truncate_at_char(&body, RAW_MAX_BODY);
                tracing::info!(
                    target: "http.raw",
                    %req_id,
                    status=%status,
                    duration_ms=dur_ms,
                    headers=?hdrs,
                    body=%text,
                    truncated
                );
            }

            tracing::trace!(
                req_id=%req_id,
                body_snippet=%snip_body(&body),
                "http.response.body_snippet"
            );

            // ----- Non-success: maybe retry -----
            let is_429 = status == StatusCode::TOO_MANY_REQUESTS;
            if (is_429 || status.is_server_error()) && attempt < max_retries {
                attempt += 1;
                let retry_after = retry_after_delay_secs(&headers);
                let delay = match retry_after {
                    Some(secs) => Duration::from_secs(secs),
                    // default floor for 429 when no Retry-After is present
                    None if is_429 => backoff(attempt).max(Duration::from_millis(1100)),
                    None => backoff(attempt),
                };
                tracing::warn!(
                    req_id=%req_id,
                    %status,
                    attempt,
                    max_retries,
                    backoff_ms=delay.as_millis() as u64,
                    retry_after_secs=?retry_after,
                    "http.retrying"
                );
                sleep(delay).await;
                continue;
            }

            if !status.is_success() {
                tracing::debug!(req_id=%req_id, %status, "http.response.non_success");
            }

            return Ok(Page { status, body });
        }
    }
}

// ==============================
// Helpers
// ==============================

fn backoff(attempt: usize) -> Duration {
    let shift = attempt.saturating_sub(1).min(16) as u32;
    Duration::from_millis(200u64.saturating_mul(1u64 << shift))
}

fn classify(err: reqwest::Error) -> HttpError {
    if err.is_timeout() {
        HttpError::Timeout
    } else if err.is_builder() {
        HttpError::Build(err.to_string())
    } else {
        HttpError::Network(err.to_string())
    }
}

fn retry_after_delay_secs(h: &HeaderMap) -> Option<u64> {
    h.get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())?
        .trim()
        .parse()
        .ok()
}

/// Longest prefix of `s` that fits in `max` bytes without splitting a char.
fn truncate_at_char(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn snip_body(body: &str) -> String {
    let mut snip = truncate_at_char(body, SNIPPET_MAX).to_string();
    if body.len() > SNIPPET_MAX {
        snip.push_str("...");
    }
    snip
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{AUTHORIZATION, COOKIE};

    #[test]
    fn backoff_doubles_per_attempt() {
        assert_eq!(backoff(1), Duration::from_millis(200));
        assert_eq!(backoff(2), Duration::from_millis(400));
        assert_eq!(backoff(3), Duration::from_millis(800));
    }

    #[test]
    fn retry_after_parses_seconds_only() {
        let mut h = HeaderMap::new();
        assert_eq!(retry_after_delay_secs(&h), None);
        h.insert(RETRY_AFTER, HeaderValue::from_static(" 7 "));
        assert_eq!(retry_after_delay_secs(&h), Some(7));
        h.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(retry_after_delay_secs(&h), None);
    }

    #[test]
    fn snippet_is_truncated() {
        let long = "a".repeat(SNIPPET_MAX + 10);
        let snip = snip_body(&long);
        assert_eq!(snip.len(), SNIPPET_MAX + 3);
        assert!(snip.ends_with("..."));
        assert_eq!(snip_body("short"), "short");
    }

    #[test]
    fn truncation_keeps_multibyte_chars_whole() {
        let s = format!("{}è", "a".repeat(SNIPPET_MAX - 1));
        assert_eq!(truncate_at_char(&s, SNIPPET_MAX), "a".repeat(SNIPPET_MAX - 1));
        assert_eq!(truncate_at_char("crème", 64), "crème");
    }

    #[test]
    fn secrets_are_redacted() {
        let mut h = HeaderMap::new();
        h.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        h.insert(COOKIE, HeaderValue::from_static("session=1"));
        h.insert("accept", HeaderValue::from_static("text/html"));
        let red = redact_headers(&h);
        assert!(red.iter().all(|(_, v)| v != "Bearer abc" && v != "session=1"));
        assert!(red.contains(&("accept".to_string(), "text/html".to_string())));
    }

    #[test]
    fn absolute_paths_need_opt_in() {
        let client = HttpClient::new("https://site.example").unwrap();
        let joined = client.resolve("/recipes/food/views/x", false).unwrap();
        assert_eq!(joined.as_str(), "https://site.example/recipes/food/views/x");

        let abs = client
            .resolve("https://other.example/search?page=3", true)
            .unwrap();
        assert_eq!(abs.host_str(), Some("other.example"));
        assert_eq!(abs.query(), Some("page=3"));
    }

    #[test]
    fn invalid_base_is_rejected() {
        assert!(matches!(HttpClient::new("not a url"), Err(HttpError::Url(_))));
    }
}
