//! The field-number table for the request and response envelopes.
//!
//! This is the single place the externally versioned wire contract is
//! written down. Both encode and decode consult these constants; nothing
//! else in the crate hard-codes a field number. When the service revs the
//! layout, this module changes and decode starts failing loudly with
//! expected-vs-found markers instead of guessing.
//!
//! Naming follows the nesting: `REQ_*` / `RESP_*` prefixes, one constant per
//! field, grouped by the message that owns it.

// ── Request envelope ──────────────────────────────────────────────────────

/// ServerRequest.objects_request
pub const REQ_OBJECTS_REQUEST: u32 = 1;

/// ObjectsRequest.request_context
pub const REQ_REQUEST_CONTEXT: u32 = 1;
/// ObjectsRequest.image_data
pub const REQ_IMAGE_DATA: u32 = 3;

/// RequestContext.request_id
pub const REQ_REQUEST_ID: u32 = 1;
/// RequestContext.client_context
pub const REQ_CLIENT_CONTEXT: u32 = 3;

/// RequestId.uuid — 63-bit session identifier
pub const REQ_ID_UUID: u32 = 1;
/// RequestId.sequence_id — increments once per request in a session
pub const REQ_ID_SEQUENCE: u32 = 2;
/// RequestId.image_sequence_id — increments once per new image payload
pub const REQ_ID_IMAGE_SEQUENCE: u32 = 3;
/// RequestId.routing_token — opaque bytes replayed from the previous response
pub const REQ_ID_ROUTING_TOKEN: u32 = 6;

/// ClientContext.platform
pub const REQ_CTX_PLATFORM: u32 = 1;
/// ClientContext.surface
pub const REQ_CTX_SURFACE: u32 = 2;
/// ClientContext.locale
pub const REQ_CTX_LOCALE: u32 = 4;
/// ClientContext.capabilities — bitmask of [`capability`] flags
pub const REQ_CTX_CAPABILITIES: u32 = 9;

/// Locale.language / region / time_zone
pub const REQ_LOCALE_LANGUAGE: u32 = 1;
pub const REQ_LOCALE_REGION: u32 = 2;
pub const REQ_LOCALE_TIME_ZONE: u32 = 3;

/// ImageData.payload / image_metadata
pub const REQ_IMAGE_PAYLOAD: u32 = 1;
pub const REQ_IMAGE_METADATA: u32 = 2;

/// ImagePayload.image_bytes
pub const REQ_PAYLOAD_BYTES: u32 = 1;
/// ImageMetadata.width / height
pub const REQ_META_WIDTH: u32 = 1;
pub const REQ_META_HEIGHT: u32 = 2;

/// Platform / surface identifiers the service expects from a web client.
pub const PLATFORM_WEB: u64 = 1;
pub const SURFACE_CHROMIUM: u64 = 4;

/// Capability flags carried in `ClientContext.capabilities`.
pub mod capability {
    /// Request text recognition.
    pub const OCR: u64 = 1 << 0;
    /// Request layout (paragraph/line) segmentation alongside words.
    pub const LAYOUT: u64 = 1 << 1;
}

// ── Response envelope ─────────────────────────────────────────────────────

/// ServerResponse.server_error
pub const RESP_SERVER_ERROR: u32 = 1;
/// ServerResponse.objects_response
pub const RESP_OBJECTS_RESPONSE: u32 = 2;

/// ServerError.error_type — zero means no error
pub const RESP_ERROR_TYPE: u32 = 1;

/// ObjectsResponse.cluster_info
pub const RESP_CLUSTER_INFO: u32 = 1;
/// ObjectsResponse.text
pub const RESP_TEXT: u32 = 3;

/// ClusterInfo.server_session_id / routing_token
pub const RESP_CLUSTER_SESSION_ID: u32 = 1;
pub const RESP_CLUSTER_ROUTING_TOKEN: u32 = 2;

/// Text.layout / content_language / full_text_hint
pub const RESP_TEXT_LAYOUT: u32 = 1;
pub const RESP_CONTENT_LANGUAGE: u32 = 2;
pub const RESP_FULL_TEXT_HINT: u32 = 3;

/// TextLayout.paragraphs (repeated)
pub const RESP_PARAGRAPHS: u32 = 1;

/// Paragraph.lines (repeated)
pub const RESP_LINES: u32 = 1;

/// Line.words (repeated)
pub const RESP_WORDS: u32 = 1;

/// Word.plain_text / text_separator / geometry
pub const RESP_WORD_TEXT: u32 = 1;
pub const RESP_WORD_SEPARATOR: u32 = 2;
pub const RESP_WORD_GEOMETRY: u32 = 3;

/// Geometry.bounding_box
pub const RESP_BOUNDING_BOX: u32 = 1;

/// BoundingBox fields — all fixed32 floats, fractional coordinates.
pub const RESP_BOX_CENTER_X: u32 = 1;
pub const RESP_BOX_CENTER_Y: u32 = 2;
pub const RESP_BOX_WIDTH: u32 = 3;
pub const RESP_BOX_HEIGHT: u32 = 4;
/// Rotation around z in radians.
pub const RESP_BOX_ROTATION: u32 = 5;
/// Recognizer confidence, 0.0–1.0, optional.
pub const RESP_BOX_CONFIDENCE: u32 = 6;
