//! The client facade: one call from normalized image to [`OcrResult`].
//!
//! [`LensClient`] wires the layers together in a fixed order per call:
//! session snapshot → envelope encode → rate-limited send → decode → session
//! merge → text reconstruction. Each layer stays independently testable; the
//! client owns only the sequencing and the per-call option overrides.
//!
//! The client is cheap to share behind an `Arc` — all mutable state (session
//! store, rate window) is internally synchronized, and concurrent calls are
//! the intended use.

use crate::annotation::{ImagePayload, OcrResult};
use crate::config::{ClientConfig, ReconstructionMode};
use crate::error::LensError;
use crate::protocol::schema::capability;
use crate::protocol::{decode_response, encode_request, RequestContext};
use crate::reconstruct;
use crate::session::{ResponseMetadata, SessionState, SessionStore};
use crate::transport::{Admission, Transport};
use tracing::{info, instrument, warn};

/// Per-call overrides for [`LensClient::recognize_with`].
///
/// The default instance changes nothing: the call uses the client
/// configuration as-is and waits for rate-budget capacity.
#[derive(Debug, Clone, Default)]
pub struct RecognizeOptions {
    /// Discard session state and start a fresh session before this call.
    pub new_session: bool,
    /// Override the configured reconstruction mode for this call only.
    pub mode: Option<ReconstructionMode>,
    /// Override the configured language hint for this call only.
    pub language: Option<String>,
    /// Fail immediately with a rate-limit error instead of waiting when the
    /// rolling window is full.
    pub non_blocking: bool,
}

/// Client for the text recognition service.
///
/// # Example
/// ```rust,no_run
/// use lens_ocr::{ClientConfig, ImagePayload, LensClient};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let client = LensClient::new(ClientConfig::default())?;
/// let payload = ImagePayload::new(std::fs::read("scan.png")?, 1280, 720)?;
/// let result = client.recognize(&payload).await?;
/// println!("{}", result.full_text);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct LensClient {
    config: ClientConfig,
    transport: Transport,
    session: SessionStore,
}

impl LensClient {
    /// Build a client from the given configuration.
    ///
    /// # Errors
    /// [`LensError::InvalidConfig`] when the HTTP layer cannot be constructed
    /// (for example a malformed proxy URL).
    pub fn new(config: ClientConfig) -> Result<Self, LensError> {
        let transport = Transport::new(&config)?;
        Ok(Self {
            config,
            transport,
            session: SessionStore::new(),
        })
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Number of sends currently inside the rolling rate window.
    pub fn current_load(&self) -> usize {
        self.transport.budget().current_load()
    }

    /// Discard all session state. The next call starts a fresh session.
    pub fn reset_session(&self) {
        self.session.reset();
    }

    /// Current session state, cloned. Intended for inspection and tests.
    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// Recognize text in one image with the configured defaults.
    pub async fn recognize(&self, payload: &ImagePayload) -> Result<OcrResult, LensError> {
        self.recognize_with(payload, RecognizeOptions::default()).await
    }

    /// Recognize text in one image, with per-call overrides.
    ///
    /// # Errors
    /// Any [`LensError`]: encoding, transport (after the single retry),
    /// upstream status, in-envelope service error, decoding, or — with
    /// `non_blocking` — an immediate rate-limit error.
    #[instrument(skip_all, fields(width = payload.width(), height = payload.height()))]
    pub async fn recognize_with(
        &self,
        payload: &ImagePayload,
        options: RecognizeOptions,
    ) -> Result<OcrResult, LensError> {
        if !self.config.session_continuation || options.new_session {
            self.session.reset();
        }

        let snapshot = self.session.snapshot(true);
        let cookies = snapshot.cookies.clone();
        let ctx = RequestContext {
            language: options
                .language
                .unwrap_or_else(|| self.config.language.clone()),
            region: self.config.region.clone(),
            time_zone: self.config.time_zone.clone(),
            capabilities: capability::OCR | capability::LAYOUT,
            session: snapshot,
        };
        let envelope = encode_request(payload, &ctx)?;

        let admission = if options.non_blocking {
            Admission::Fail
        } else {
            Admission::Wait
        };
        let exchange = self.transport.send(&envelope, &cookies, admission).await?;

        let decoded = decode_response(&exchange.body)?;

        // Merge rotated identifiers and cookies even when the envelope
        // carries an error marker, so the next call replays fresh state.
        self.session.update(&ResponseMetadata {
            server_session_id: decoded.metadata.server_session_id.clone(),
            routing_token: decoded.metadata.routing_token.clone(),
            cookies: exchange.cookies,
        });

        if decoded.error_code != 0 {
            warn!(code = decoded.error_code, "Service reported an in-envelope error");
            return Err(LensError::Upstream {
                status: 200,
                detail: format!("service error code {}", decoded.error_code),
            });
        }

        let mode = options.mode.unwrap_or(self.config.mode);
        let reconstruction = reconstruct::reconstruct(
            &decoded.tree.words,
            mode,
            self.config.preserve_line_breaks,
        );

        info!(
            words = decoded.tree.words.len(),
            lines = reconstruction.lines.len(),
            blocks = reconstruction.blocks.len(),
            language = decoded.tree.language.as_deref().unwrap_or("?"),
            "Recognition complete"
        );

        Ok(OcrResult {
            full_text: reconstruction.full_text,
            lines: reconstruction.lines,
            blocks: reconstruction.blocks,
            words: decoded.tree.words.clone(),
            language: decoded.tree.language.clone(),
            tree: decoded.tree,
        })
    }
}
