//! Client configuration.
//!
//! Every knob lives in one [`ClientConfig`] built via its
//! [`ClientConfigBuilder`]. Keeping the whole surface in a single struct makes
//! it trivial to share a config across tasks, serialise it for logging, and
//! diff two runs to understand why their outputs differ.
//!
//! The config is consumed once by [`crate::client::LensClient::new`]; the
//! layers that load it from files or CLI flags are external collaborators.

use crate::error::LensError;
use serde::{Deserialize, Serialize};

/// Default requests-per-minute ceiling.
pub const DEFAULT_MAX_RPM: u32 = 30;
/// Hard ceiling on the requests-per-minute setting. The service starts
/// rejecting and eventually banning clients somewhere above this rate.
pub const MAX_RPM_LIMIT: u32 = 40;
/// Default bulkhead: maximum simultaneous in-flight sends.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 5;

/// How the full text string in an [`crate::annotation::OcrResult`] is built
/// from the decoded word list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconstructionMode {
    /// Words concatenated in server-emission order using each word's own
    /// separator. Deterministic and robust; the fallback for rotated text.
    Sequential,
    /// Words grouped into visual lines by geometric proximity, lines ordered
    /// top-to-bottom. Degrades on heavily rotated text because grouping is
    /// evaluated axis-aligned. (default)
    #[default]
    Smart,
    /// Smart lines clustered further into paragraph blocks with aggregate
    /// geometry. Intended for multi-region sources such as panelled images.
    Blocks,
}

/// Configuration for a [`crate::client::LensClient`].
///
/// Built via [`ClientConfig::builder()`] or [`ClientConfig::default()`].
///
/// # Example
/// ```rust
/// use lens_ocr::ClientConfig;
///
/// let config = ClientConfig::builder()
///     .language("ja")
///     .max_requests_per_minute(20)
///     .max_in_flight(3)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Endpoint the binary envelope is posted to.
    pub endpoint: String,

    /// API key sent in the `X-Goog-Api-Key` header.
    pub api_key: String,

    /// BCP 47 language hint for recognition (e.g. "en", "ja").
    /// Empty string lets the service auto-detect.
    pub language: String,

    /// ISO 3166-1 alpha-2 client region (e.g. "US", "DE"). Default: "US".
    pub region: String,

    /// IANA time zone name (e.g. "America/New_York").
    pub time_zone: String,

    /// Proxy URL applied to all requests (http/https/socks5). Default: none.
    pub proxy: Option<String>,

    /// Per-call network timeout in seconds. Default: 60.
    ///
    /// Expiry surfaces as a transport error, eligible for the single retry.
    pub timeout_secs: u64,

    /// Rolling 60-second window ceiling, shared across all concurrent
    /// callers of one client instance. Clamped to 1..=[`MAX_RPM_LIMIT`].
    /// Default: [`DEFAULT_MAX_RPM`].
    pub max_requests_per_minute: u32,

    /// Maximum simultaneous in-flight sends, independent of the rate cap.
    /// Bounds connection and memory use. Default: [`DEFAULT_MAX_IN_FLIGHT`].
    pub max_in_flight: usize,

    /// Fixed backoff before the single transport retry, in milliseconds.
    /// Default: 500.
    pub retry_backoff_ms: u64,

    /// Reuse session token/cookie state across calls. When false every call
    /// starts from a fresh, empty session. Default: true.
    pub session_continuation: bool,

    /// Preserve line breaks in the reconstructed full text. When false,
    /// lines are collapsed and joined by each word's own separator (space
    /// when a separator is absent). Default: true.
    pub preserve_line_breaks: bool,

    /// How full text is reconstructed from the word list.
    /// Default: [`ReconstructionMode::Smart`].
    pub mode: ReconstructionMode,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://lensfrontend-pa.googleapis.com/v1/crupload".to_string(),
            api_key: String::new(),
            language: String::new(),
            region: "US".to_string(),
            time_zone: "America/New_York".to_string(),
            proxy: None,
            timeout_secs: 60,
            max_requests_per_minute: DEFAULT_MAX_RPM,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            retry_backoff_ms: 500,
            session_continuation: true,
            preserve_line_breaks: true,
            mode: ReconstructionMode::default(),
        }
    }
}

impl ClientConfig {
    /// Create a new builder for `ClientConfig`.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint = url.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = key.into();
        self
    }

    pub fn language(mut self, lang: impl Into<String>) -> Self {
        self.config.language = lang.into();
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.config.region = region.into();
        self
    }

    pub fn time_zone(mut self, tz: impl Into<String>) -> Self {
        self.config.time_zone = tz.into();
        self
    }

    pub fn proxy(mut self, url: impl Into<String>) -> Self {
        self.config.proxy = Some(url.into());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs.max(1);
        self
    }

    pub fn max_requests_per_minute(mut self, rpm: u32) -> Self {
        self.config.max_requests_per_minute = rpm.clamp(1, MAX_RPM_LIMIT);
        self
    }

    pub fn max_in_flight(mut self, n: usize) -> Self {
        self.config.max_in_flight = n.max(1);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn session_continuation(mut self, v: bool) -> Self {
        self.config.session_continuation = v;
        self
    }

    pub fn preserve_line_breaks(mut self, v: bool) -> Self {
        self.config.preserve_line_breaks = v;
        self
    }

    pub fn mode(mut self, mode: ReconstructionMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ClientConfig, LensError> {
        let c = &self.config;
        if c.endpoint.is_empty() {
            return Err(LensError::InvalidConfig("endpoint must not be empty".into()));
        }
        if !c.endpoint.starts_with("http://") && !c.endpoint.starts_with("https://") {
            return Err(LensError::InvalidConfig(format!(
                "endpoint must be an http(s) URL, got '{}'",
                c.endpoint
            )));
        }
        if c.max_requests_per_minute == 0 || c.max_requests_per_minute > MAX_RPM_LIMIT {
            return Err(LensError::InvalidConfig(format!(
                "max_requests_per_minute must be 1–{MAX_RPM_LIMIT}, got {}",
                c.max_requests_per_minute
            )));
        }
        if c.max_in_flight == 0 {
            return Err(LensError::InvalidConfig("max_in_flight must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn defaults_are_valid() {
        let config = ClientConfig::builder().build().unwrap();
        assert_eq!(config.max_requests_per_minute, DEFAULT_MAX_RPM);
        assert_eq!(config.max_in_flight, DEFAULT_MAX_IN_FLIGHT);
        assert!(config.session_continuation);
        assert_eq!(config.mode, ReconstructionMode::Smart);
    }

    #[test]
    fn rpm_is_clamped_to_service_limit() {
        let config = ClientConfig::builder()
            .max_requests_per_minute(500)
            .build()
            .unwrap();
        assert_eq!(config.max_requests_per_minute, MAX_RPM_LIMIT);

        let config = ClientConfig::builder()
            .max_requests_per_minute(0)
            .build()
            .unwrap();
        assert_eq!(config.max_requests_per_minute, 1);
    }

    #[test]
    fn rejects_non_http_endpoint() {
        let err = ClientConfig::builder()
            .endpoint("ftp://example.com/upload")
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    }

    #[test]
    fn mode_serialises_snake_case() {
        let json = serde_json::to_string(&ReconstructionMode::Smart).unwrap();
        assert_eq!(json, "\"smart\"");
    }
}
