//! Error types for the lens-ocr library.
//!
//! The taxonomy maps each failure to the layer that produced it, which in
//! turn decides whether a retry can ever help:
//!
//! * [`LensError::Encoding`] — the payload violated server constraints before
//!   anything was sent. Local input is bad; never retried.
//! * [`LensError::Transport`] — the network exchange itself failed (timeout,
//!   connection reset). Retried exactly once with a short fixed backoff.
//! * [`LensError::Upstream`] — the service answered with a non-success status
//!   or an error marker inside the envelope (quota/ban signals). Surfaces
//!   immediately; backing off further is the caller's decision.
//! * [`LensError::Decoding`] — the response bytes did not match the expected
//!   wire schema. This signals protocol drift upstream and must never be
//!   absorbed silently; never retried.
//! * [`LensError::RateLimitExceeded`] — non-blocking admission only; the
//!   blocking path suspends the caller instead.
//!
//! Every variant carries enough context for diagnosis (payload size, byte
//! offset, expected vs. found wire marker) and exposes a stable
//! machine-readable [`ErrorKind`] via [`LensError::kind`].

use thiserror::Error;

/// All errors returned by the lens-ocr library.
#[derive(Debug, Error)]
pub enum LensError {
    // ── Pre-send errors ───────────────────────────────────────────────────
    /// The image payload violates server constraints (size or dimensions).
    #[error("Cannot encode request: {detail} (payload is {payload_bytes} bytes)")]
    Encoding {
        detail: String,
        payload_bytes: usize,
    },

    // ── Network errors ────────────────────────────────────────────────────
    /// The network exchange failed: connection error or per-call timeout.
    #[error("Transport failure{}: {detail}", if *.timed_out { " (timed out)" } else { "" })]
    Transport { detail: String, timed_out: bool },

    /// The service answered, but not with success.
    #[error("Upstream error (status {status}): {detail}")]
    Upstream { status: u16, detail: String },

    // ── Response errors ───────────────────────────────────────────────────
    /// The response bytes do not match the expected wire schema.
    ///
    /// `expected` and `found` name the wire marker (field number / wire type)
    /// at `offset` so protocol drift can be diagnosed from the error alone.
    #[error(
        "Cannot decode response at byte {offset}: {detail} (expected {expected}, found {found})"
    )]
    Decoding {
        detail: String,
        offset: usize,
        expected: String,
        found: String,
    },

    // ── Admission errors ──────────────────────────────────────────────────
    /// Non-blocking admission was requested and the rolling window is full.
    #[error("Rate limit of {limit} requests per minute exceeded")]
    RateLimitExceeded { limit: u32 },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Stable machine-readable classification of a [`LensError`].
///
/// Intended for callers that branch on failure class (retry policies,
/// metrics labels) without string-matching display output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Encoding,
    Transport,
    Upstream,
    Decoding,
    RateLimitExceeded,
    InvalidConfig,
}

impl LensError {
    /// The stable machine-readable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LensError::Encoding { .. } => ErrorKind::Encoding,
            LensError::Transport { .. } => ErrorKind::Transport,
            LensError::Upstream { .. } => ErrorKind::Upstream,
            LensError::Decoding { .. } => ErrorKind::Decoding,
            LensError::RateLimitExceeded { .. } => ErrorKind::RateLimitExceeded,
            LensError::InvalidConfig(_) => ErrorKind::InvalidConfig,
        }
    }

    /// Whether the single-retry policy applies to this error.
    ///
    /// Only transient transport failures qualify. Encoding and decoding
    /// failures indicate bad input or stale protocol understanding; upstream
    /// errors indicate a server-side decision.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LensError::Transport { .. })
    }

    pub(crate) fn decoding(
        detail: impl Into<String>,
        offset: usize,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        LensError::Decoding {
            detail: detail.into(),
            offset,
            expected: expected.into(),
            found: found.into(),
        }
    }
}
