//! The binary wire protocol: pure encode/decode, no I/O.
//!
//! The service speaks a nested protobuf-style envelope over HTTPS. The field
//! layout is an opaque, externally versioned contract: this crate does not
//! ship a protobuf toolchain, it consults the explicit field table in
//! [`schema`] and fails loudly on anything the table does not predict.
//!
//! ## Data Flow
//!
//! ```text
//! ImagePayload ──▶ encode ──▶ bytes ──▶ (transport) ──▶ bytes ──▶ decode
//!                 (envelope)                                    (annotation
//!                                                                  tree)
//! ```
//!
//! 1. [`wire`]   — minimal wire-format primitives: varints, fixed32, tags,
//!    length-delimited slices
//! 2. [`schema`] — the field-number table both directions consult
//! 3. [`encode`] — request envelope assembly from a payload + call context
//! 4. [`decode`] — response envelope traversal into a flat word list;
//!    structural mismatch surfaces as a decoding error, never a guess

pub mod decode;
pub mod encode;
pub mod schema;
pub mod wire;

pub use decode::{decode_response, DecodedResponse};
pub use encode::{encode_request, RequestContext};
