//! Rate-limited network exchange.
//!
//! The transport owns the HTTP client, the shared [`RateBudget`] and the
//! [`Bulkhead`]; every send passes through both before any bytes leave the
//! process. It moves opaque envelopes — encoding and decoding stay in
//! [`crate::protocol`], session bookkeeping in [`crate::session`].
//!
//! ## Retry Strategy
//!
//! Exactly one retry, only for idempotent transient failures (timeout,
//! connection reset), after a short fixed backoff. The upload is a pure
//! recognition query so a duplicate send is harmless; anything else —
//! non-success status, schema drift — surfaces immediately. Each attempt
//! consumes its own rate-budget slot so the retry cannot push the client
//! over the service's ceiling.

use crate::config::ClientConfig;
use crate::error::LensError;
use crate::limiter::{Bulkhead, RateBudget};
use crate::session::{cookie_header, Cookie};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, COOKIE, SET_COOKIE, USER_AGENT};
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

const CONTENT_TYPE_PROTOBUF: &str = "application/x-protobuf";
const API_KEY_HEADER: &str = "X-Goog-Api-Key";
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// How a send claims its rate-budget slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Suspend until the rolling window has capacity.
    Wait,
    /// Fail immediately with a rate-limit error when the window is full.
    Fail,
}

/// The raw result of one successful exchange: response bytes plus any
/// cookies the service set.
#[derive(Debug)]
pub struct HttpExchange {
    pub body: Vec<u8>,
    pub cookies: Vec<Cookie>,
}

/// Network layer for one client instance.
#[derive(Debug)]
pub struct Transport {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    budget: RateBudget,
    bulkhead: Bulkhead,
    retry_backoff: Duration,
}

impl Transport {
    /// Build the transport from the client configuration.
    ///
    /// # Errors
    /// [`LensError::InvalidConfig`] when the proxy URL is malformed or the
    /// HTTP client cannot be constructed.
    pub fn new(config: &ClientConfig) -> Result<Self, LensError> {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(DEFAULT_USER_AGENT);

        if let Some(ref proxy_url) = config.proxy {
            let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| {
                LensError::InvalidConfig(format!("invalid proxy '{proxy_url}': {e}"))
            })?;
            builder = builder.proxy(proxy);
            info!(proxy = %proxy_url, "Routing requests through proxy");
        }

        let http = builder
            .build()
            .map_err(|e| LensError::InvalidConfig(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            budget: RateBudget::new(config.max_requests_per_minute),
            bulkhead: Bulkhead::new(config.max_in_flight),
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }

    /// The shared rate budget, exposed for instrumentation.
    pub fn budget(&self) -> &RateBudget {
        &self.budget
    }

    /// Post one envelope and return the raw response exchange.
    ///
    /// Admission order: the rate budget first, then the bulkhead, so a
    /// caller suspended up to a full window for rate capacity does not
    /// occupy an in-flight slot while it waits. The permit then spans both
    /// attempts — one logical call keeps one slot across its retry — and the
    /// retry re-admits through the budget while holding it, so the retry
    /// cannot push the client over the service's ceiling. All waits are
    /// cancellation-safe. Retries exactly once on a transient transport
    /// failure.
    pub async fn send(
        &self,
        envelope: &[u8],
        cookies: &[Cookie],
        admission: Admission,
    ) -> Result<HttpExchange, LensError> {
        self.admit(admission).await?;
        let _permit = self.bulkhead.acquire().await;

        let mut retried = false;
        loop {
            match self.attempt(envelope, cookies).await {
                Ok(exchange) => return Ok(exchange),
                Err(e) if e.is_retryable() && !retried => {
                    warn!(
                        error = %e,
                        backoff_ms = self.retry_backoff.as_millis() as u64,
                        "Transient transport failure, retrying once"
                    );
                    retried = true;
                    sleep(self.retry_backoff).await;
                    self.admit(admission).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn admit(&self, admission: Admission) -> Result<(), LensError> {
        match admission {
            Admission::Wait => {
                self.budget.acquire().await;
                Ok(())
            }
            Admission::Fail => self.budget.try_acquire(),
        }
    }

    async fn attempt(
        &self,
        envelope: &[u8],
        cookies: &[Cookie],
    ) -> Result<HttpExchange, LensError> {
        debug!(size = envelope.len(), endpoint = %self.endpoint, "Posting envelope");

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_PROTOBUF));
        headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
        if !self.api_key.is_empty() {
            let value = HeaderValue::from_str(&self.api_key).map_err(|_| {
                LensError::InvalidConfig("API key contains non-header characters".into())
            })?;
            headers.insert(API_KEY_HEADER, value);
        }
        if !cookies.is_empty() {
            if let Ok(value) = HeaderValue::from_str(&cookie_header(cookies)) {
                headers.insert(COOKIE, value);
            }
        }

        let response = self
            .http
            .post(&self.endpoint)
            .headers(headers)
            .body(envelope.to_vec())
            .send()
            .await
            .map_err(|e| LensError::Transport {
                detail: e.to_string(),
                timed_out: e.is_timeout(),
            })?;

        let status = response.status();
        let set_cookies = harvest_cookies(response.headers());

        if !status.is_success() {
            let detail = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(200)
                .collect::<String>();
            return Err(LensError::Upstream {
                status: status.as_u16(),
                detail: if detail.is_empty() {
                    status.canonical_reason().unwrap_or("no body").to_string()
                } else {
                    detail
                },
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| LensError::Transport {
                detail: format!("reading response body: {e}"),
                timed_out: e.is_timeout(),
            })?
            .to_vec();

        debug!(status = status.as_u16(), size = body.len(), "Response received");
        Ok(HttpExchange {
            body,
            cookies: set_cookies,
        })
    }
}

/// Extract `name=value` pairs from every `Set-Cookie` header, dropping
/// attributes (Path, Expires, …) the client does not replay.
fn harvest_cookies(headers: &HeaderMap) -> Vec<Cookie> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| {
            let raw = value.to_str().ok()?;
            let pair = raw.split(';').next()?;
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some(Cookie::new(name, value.trim()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn harvest_cookies_strips_attributes() {
        let mut headers = HeaderMap::new();
        headers.append(
            SET_COOKIE,
            HeaderValue::from_static("NID=511=abc; expires=Tue, 24-Feb-2026; path=/; HttpOnly"),
        );
        headers.append(SET_COOKIE, HeaderValue::from_static("AEC=xyz; secure"));

        let cookies = harvest_cookies(&headers);
        assert_eq!(
            cookies,
            vec![Cookie::new("NID", "511=abc"), Cookie::new("AEC", "xyz")]
        );
    }

    #[test]
    fn harvest_cookies_ignores_malformed_headers() {
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("no-equals-sign"));
        headers.append(SET_COOKIE, HeaderValue::from_static("=valueless"));
        assert!(harvest_cookies(&headers).is_empty());
    }

    #[test]
    fn transport_builds_from_default_config() {
        let config = ClientConfig::default();
        let transport = Transport::new(&config).unwrap();
        assert_eq!(transport.budget().limit(), config.max_requests_per_minute);
    }

    #[test]
    fn invalid_proxy_is_a_config_error() {
        let config = ClientConfig::builder().proxy("::not a url::").build().unwrap();
        let err = Transport::new(&config).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidConfig);
    }
}
