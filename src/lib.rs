//! # lens-ocr
//!
//! Async client for a text recognition service that speaks an undocumented
//! binary envelope protocol: upload one normalized image, receive word-level
//! annotations with fractional bounding boxes, and reconstruct readable text
//! from them.
//!
//! ## Pipeline
//!
//! ```text
//! ImagePayload ──► encode ──► rate-limited send ──► decode ──► reconstruct ──► OcrResult
//!                    ▲              │                  │
//!              SessionStore ◄──────┴──── cookies / tokens
//! ```
//!
//! Three concerns dominate the design:
//!
//! * **Wire contract** ([`protocol`]) — a hand-rolled codec for the nested
//!   binary envelope, strict on known fields, tolerant of unknown ones.
//! * **Reading order** ([`reconstruct`]) — the service emits words in its own
//!   order; three modes rebuild visual lines and paragraph blocks from the
//!   bounding boxes, degrading to emission order when geometry is unusable.
//! * **Service protection** ([`limiter`], [`transport`]) — a rolling
//!   60-second rate window and an in-flight bulkhead shared by all concurrent
//!   callers of one client, plus a single retry for transient failures.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lens_ocr::{ClientConfig, ImagePayload, LensClient, ReconstructionMode};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::builder()
//!     .language("en")
//!     .mode(ReconstructionMode::Smart)
//!     .max_requests_per_minute(20)
//!     .build()?;
//! let client = LensClient::new(config)?;
//!
//! let bytes = std::fs::read("scan.png")?;
//! let payload = ImagePayload::new(bytes, 1280, 720)?;
//! let result = client.recognize(&payload).await?;
//!
//! println!("{}", result.full_text);
//! for line in &result.lines {
//!     println!("{:?}: {}", line.geometry, line.text());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Image acquisition and normalization (decoding files, downscaling,
//! re-encoding) are out of scope: the client accepts exactly one inbound
//! shape, a validated `(bytes, width, height)` triple.

pub mod annotation;
pub mod client;
pub mod config;
pub mod error;
pub mod limiter;
pub mod protocol;
pub mod reconstruct;
pub mod session;
pub mod transport;

pub use annotation::{
    AnnotationTree, BlockAnnotation, Geometry, ImagePayload, LineAnnotation, OcrResult,
    WordAnnotation, MAX_DIMENSION, MAX_PAYLOAD_BYTES,
};
pub use client::{LensClient, RecognizeOptions};
pub use config::{
    ClientConfig, ClientConfigBuilder, ReconstructionMode, DEFAULT_MAX_IN_FLIGHT,
    DEFAULT_MAX_RPM, MAX_RPM_LIMIT,
};
pub use error::{ErrorKind, LensError};
pub use session::{Cookie, SessionState};
