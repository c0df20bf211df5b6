//! Request envelope assembly.
//!
//! `encode_request` is a pure transformation from a validated
//! [`ImagePayload`] plus per-call context into the nested binary envelope.
//! No I/O, no side effects; the session counters it embeds were already
//! advanced by the session store when the snapshot was taken.

use crate::annotation::ImagePayload;
use crate::error::LensError;
use crate::protocol::schema as s;
use crate::protocol::wire::WireWriter;
use crate::session::SessionSnapshot;
use tracing::debug;

/// Everything besides the image that goes into one request envelope.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// BCP 47 language hint; empty lets the service auto-detect.
    pub language: String,
    /// ISO 3166-1 alpha-2 region.
    pub region: String,
    /// IANA time zone name.
    pub time_zone: String,
    /// Bitmask of [`crate::protocol::schema::capability`] flags.
    pub capabilities: u64,
    /// Session identifiers applied to this envelope.
    pub session: SessionSnapshot,
}

/// Serialize one request envelope.
///
/// The payload's size and dimension constraints were enforced when the
/// [`ImagePayload`] was constructed; this function re-checks nothing and
/// cannot fail for a payload that exists. The `Result` is kept for the one
/// remaining constraint this layer owns: a request must ask for at least one
/// capability, otherwise the service answers with an empty envelope that is
/// indistinguishable from "no text found".
pub fn encode_request(
    payload: &ImagePayload,
    ctx: &RequestContext,
) -> Result<Vec<u8>, LensError> {
    if ctx.capabilities == 0 {
        return Err(LensError::Encoding {
            detail: "request must carry at least one capability flag".into(),
            payload_bytes: payload.bytes().len(),
        });
    }

    let mut root = WireWriter::new();
    root.message(s::REQ_OBJECTS_REQUEST, |objects| {
        objects.message(s::REQ_REQUEST_CONTEXT, |rc| {
            rc.message(s::REQ_REQUEST_ID, |id| {
                id.varint(s::REQ_ID_UUID, ctx.session.uuid);
                id.varint_always(s::REQ_ID_SEQUENCE, ctx.session.sequence_id);
                id.varint_always(s::REQ_ID_IMAGE_SEQUENCE, ctx.session.image_sequence_id);
                if let Some(ref token) = ctx.session.routing_token {
                    id.bytes(s::REQ_ID_ROUTING_TOKEN, token);
                }
            });
            rc.message(s::REQ_CLIENT_CONTEXT, |cc| {
                cc.varint(s::REQ_CTX_PLATFORM, s::PLATFORM_WEB);
                cc.varint(s::REQ_CTX_SURFACE, s::SURFACE_CHROMIUM);
                cc.message(s::REQ_CTX_LOCALE, |loc| {
                    loc.string(s::REQ_LOCALE_LANGUAGE, &ctx.language);
                    loc.string(s::REQ_LOCALE_REGION, &ctx.region);
                    loc.string(s::REQ_LOCALE_TIME_ZONE, &ctx.time_zone);
                });
                cc.varint(s::REQ_CTX_CAPABILITIES, ctx.capabilities);
            });
        });
        objects.message(s::REQ_IMAGE_DATA, |img| {
            img.message(s::REQ_IMAGE_PAYLOAD, |p| {
                p.bytes(s::REQ_PAYLOAD_BYTES, payload.bytes());
            });
            img.message(s::REQ_IMAGE_METADATA, |m| {
                m.varint(s::REQ_META_WIDTH, u64::from(payload.width()));
                m.varint(s::REQ_META_HEIGHT, u64::from(payload.height()));
            });
        });
    });

    let bytes = root.into_bytes();
    debug!(
        uuid = ctx.session.uuid,
        sequence_id = ctx.session.sequence_id,
        image_sequence_id = ctx.session.image_sequence_id,
        size = bytes.len(),
        "Request envelope encoded"
    );
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::protocol::wire::WireReader;

    fn ctx() -> RequestContext {
        RequestContext {
            language: "en".into(),
            region: "US".into(),
            time_zone: "America/New_York".into(),
            capabilities: s::capability::OCR | s::capability::LAYOUT,
            session: SessionSnapshot {
                uuid: 42,
                sequence_id: 1,
                image_sequence_id: 1,
                routing_token: Some(vec![0xDE, 0xAD]),
                cookies: vec![],
            },
        }
    }

    fn payload() -> ImagePayload {
        ImagePayload::new(vec![0x89, 0x50, 0x4E, 0x47], 640, 480).unwrap()
    }

    /// Walk the envelope back down to a handful of leaves to prove the
    /// nesting matches the schema table.
    #[test]
    fn envelope_nests_per_schema_table() {
        let bytes = encode_request(&payload(), &ctx()).unwrap();
        let mut root = WireReader::new(&bytes);

        let h = root.next_field().unwrap().unwrap();
        assert_eq!(h.number, s::REQ_OBJECTS_REQUEST);
        let mut objects = root.read_message().unwrap();

        let h = objects.next_field().unwrap().unwrap();
        assert_eq!(h.number, s::REQ_REQUEST_CONTEXT);
        let mut rc = objects.read_message().unwrap();

        let h = rc.next_field().unwrap().unwrap();
        assert_eq!(h.number, s::REQ_REQUEST_ID);
        let mut id = rc.read_message().unwrap();
        let h = id.next_field().unwrap().unwrap();
        assert_eq!(h.number, s::REQ_ID_UUID);
        assert_eq!(id.read_varint().unwrap(), 42);

        let h = objects.next_field().unwrap().unwrap();
        assert_eq!(h.number, s::REQ_IMAGE_DATA);
        let mut img = objects.read_message().unwrap();
        let h = img.next_field().unwrap().unwrap();
        assert_eq!(h.number, s::REQ_IMAGE_PAYLOAD);
        let mut p = img.read_message().unwrap();
        let _ = p.next_field().unwrap().unwrap();
        assert_eq!(p.read_bytes().unwrap(), &[0x89, 0x50, 0x4E, 0x47]);

        let h = img.next_field().unwrap().unwrap();
        assert_eq!(h.number, s::REQ_IMAGE_METADATA);
        let mut m = img.read_message().unwrap();
        let _ = m.next_field().unwrap().unwrap();
        assert_eq!(m.read_varint().unwrap(), 640);
        let _ = m.next_field().unwrap().unwrap();
        assert_eq!(m.read_varint().unwrap(), 480);
    }

    #[test]
    fn encoding_is_deterministic() {
        let a = encode_request(&payload(), &ctx()).unwrap();
        let b = encode_request(&payload(), &ctx()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn zero_capabilities_is_an_encoding_error() {
        let mut c = ctx();
        c.capabilities = 0;
        let err = encode_request(&payload(), &c).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Encoding);
    }
}
