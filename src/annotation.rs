//! Data model: the image payload contract and the annotation types produced
//! by decode and reconstruction.
//!
//! ## Lifecycle
//!
//! [`ImagePayload`] is per-call and transient — built by an external image
//! normalizer, validated here, consumed by the codec. Everything else in this
//! module is produced during decode/reconstruction and returned immutable to
//! the caller.
//!
//! ## The normalizer contract
//!
//! The core accepts exactly one inbound shape: a normalized
//! `(bytes, width, height)` triple. Converting heterogeneous sources (file,
//! URL, decoded bitmap, numeric array) into that triple is the collaborator's
//! job; the core never branches on source kind.

use crate::error::LensError;
use serde::{Deserialize, Serialize};

/// Maximum accepted width or height in pixels.
///
/// The service rejects larger uploads; normalizers are expected to downscale
/// before handing bytes to the core.
pub const MAX_DIMENSION: u32 = 3000;

/// Maximum accepted encoded image size in bytes (8 MiB).
pub const MAX_PAYLOAD_BYTES: usize = 8 * 1024 * 1024;

/// A normalized, encoded image ready for the wire.
///
/// Immutable once constructed; [`ImagePayload::new`] is the single place the
/// server's payload constraints are enforced, so an `ImagePayload` in hand is
/// always sendable.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    bytes: Vec<u8>,
    width: u32,
    height: u32,
}

impl ImagePayload {
    /// Validate and wrap a normalized image.
    ///
    /// # Errors
    /// [`LensError::Encoding`] when the byte size or either dimension exceeds
    /// the server-accepted bounds, or when the payload is empty.
    pub fn new(bytes: Vec<u8>, width: u32, height: u32) -> Result<Self, LensError> {
        let payload_bytes = bytes.len();
        if bytes.is_empty() {
            return Err(LensError::Encoding {
                detail: "image payload is empty".into(),
                payload_bytes,
            });
        }
        if payload_bytes > MAX_PAYLOAD_BYTES {
            return Err(LensError::Encoding {
                detail: format!("payload exceeds maximum of {MAX_PAYLOAD_BYTES} bytes"),
                payload_bytes,
            });
        }
        if width == 0 || height == 0 {
            return Err(LensError::Encoding {
                detail: format!("dimensions {width}x{height} must be non-zero"),
                payload_bytes,
            });
        }
        if width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(LensError::Encoding {
                detail: format!(
                    "dimensions {width}x{height} exceed maximum {MAX_DIMENSION}px"
                ),
                payload_bytes,
            });
        }
        Ok(Self {
            bytes,
            width,
            height,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

/// Fractional geometry of a recognized text region.
///
/// All positions and sizes are fractions of the image dimensions (0.0–1.0);
/// `rotation` is the raw angle in radians as emitted by the service. A
/// degrees view is derived on demand and never replaces the raw value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub center_x: f64,
    pub center_y: f64,
    pub width: f64,
    pub height: f64,
    /// Rotation around the z axis in radians.
    pub rotation: f64,
    /// Recognizer confidence, when the service supplies one.
    pub confidence: Option<f64>,
}

impl Geometry {
    /// Rotation in degrees, derived from the raw radians.
    pub fn rotation_degrees(&self) -> f64 {
        self.rotation.to_degrees()
    }

    /// Convert fractional coordinates to pixel coordinates for an image of
    /// the given dimensions. Returns `(center_x, center_y, width, height)`.
    pub fn to_pixels(&self, image_width: u32, image_height: u32) -> (f64, f64, f64, f64) {
        (
            self.center_x * image_width as f64,
            self.center_y * image_height as f64,
            self.width * image_width as f64,
            self.height * image_height as f64,
        )
    }

    /// Whether every positional component is finite and usable for line
    /// reconstruction.
    pub fn is_well_formed(&self) -> bool {
        self.center_x.is_finite()
            && self.center_y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.rotation.is_finite()
            && self.height > 0.0
    }
}

/// One recognized word: text fragment, trailing separator, geometry.
///
/// Read-only once produced by decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordAnnotation {
    pub text: String,
    /// The separator the service emits after this word ("" or " ", sometimes
    /// language-specific). `None` when the field was absent.
    pub separator: Option<String>,
    /// `None` when the service omitted geometry for this word.
    pub geometry: Option<Geometry>,
}

/// An ordered sequence of words sharing a visual line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineAnnotation {
    pub words: Vec<WordAnnotation>,
    /// Axis-aligned aggregate over the member words' geometry.
    pub geometry: Geometry,
}

impl LineAnnotation {
    /// The line's text: member words joined by their own separators.
    pub fn text(&self) -> String {
        join_words(&self.words)
    }
}

/// An ordered sequence of lines forming a paragraph/segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockAnnotation {
    pub lines: Vec<LineAnnotation>,
    /// Axis-aligned aggregate over the member lines' geometry.
    pub geometry: Geometry,
}

impl BlockAnnotation {
    /// The block's text with one line per visual line.
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(LineAnnotation::text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Raw product of decoding one response: the flat word list plus envelope
/// hints, before any reading-order reconstruction.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnnotationTree {
    /// BCP 47 language the service detected, when present.
    pub language: Option<String>,
    /// Words in server-emission order.
    pub words: Vec<WordAnnotation>,
    /// The service's own "full text" rendering. Known to reorder and merge
    /// text unreliably — informational only, never authoritative. The
    /// reconstruction engine's output is always preferred.
    pub full_text_hint: Option<String>,
}

/// Complete result of one recognition call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrResult {
    /// Reconstructed full text, per the configured mode and line-break flag.
    pub full_text: String,
    /// Ordered visual lines (empty in sequential mode).
    pub lines: Vec<LineAnnotation>,
    /// Ordered paragraph blocks (populated in blocks mode).
    pub blocks: Vec<BlockAnnotation>,
    /// Flat word list in server-emission order.
    pub words: Vec<WordAnnotation>,
    /// Detected language, when the service reported one.
    pub language: Option<String>,
    /// The raw decoded annotation tree for advanced consumers.
    pub tree: AnnotationTree,
}

/// Join words by their own separators, falling back to a single space when a
/// word carries none (except after the final word).
pub(crate) fn join_words(words: &[WordAnnotation]) -> String {
    let mut out = String::new();
    for (i, word) in words.iter().enumerate() {
        out.push_str(&word.text);
        if i + 1 < words.len() {
            match &word.separator {
                Some(sep) => out.push_str(sep),
                None => out.push(' '),
            }
        }
    }
    out
}
