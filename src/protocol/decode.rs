//! Response envelope traversal.
//!
//! `decode_response` walks the nested reply — objects response → text →
//! layout → paragraphs → lines → words — and flattens it into the
//! [`AnnotationTree`] word list, preserving rotation in radians exactly as
//! received.
//!
//! ## Strictness
//!
//! A known field carrying the wrong wire type, a truncated value, or a
//! response containing none of the envelope's top-level fields is protocol
//! drift and surfaces as a decoding error with expected-vs-found markers.
//! Field numbers the schema table does not list are skipped: the service
//! adds fields between contract revisions and skipping them is the only
//! behaviour that survives that. Words missing their text are dropped with
//! a warning, matching how sibling annotations keep flowing when one entry
//! is malformed.
//!
//! Decoding is pure and idempotent: the same bytes always produce a
//! structurally identical tree, and a failed decode returns no partial tree.

use crate::annotation::{AnnotationTree, Geometry, WordAnnotation};
use crate::error::LensError;
use crate::protocol::schema as s;
use crate::protocol::wire::{FieldHeader, WireReader, WireType};
use crate::session::ResponseMetadata;
use tracing::{debug, warn};

/// Everything one response carries: the annotation tree, session metadata
/// for the store, and the server's in-envelope error marker.
#[derive(Debug, Clone, Default)]
pub struct DecodedResponse {
    pub tree: AnnotationTree,
    /// Server session id / routing token for session continuation. Cookies
    /// travel in HTTP headers and are merged in by the transport layer.
    pub metadata: ResponseMetadata,
    /// Non-zero when the service reports an error inside a 200 envelope
    /// (quota, ban, unsupported image). Zero means success.
    pub error_code: u64,
}

/// Decode one response envelope.
///
/// # Errors
/// [`LensError::Decoding`] on any structural mismatch; never a partial tree.
pub fn decode_response(bytes: &[u8]) -> Result<DecodedResponse, LensError> {
    if bytes.is_empty() {
        return Err(LensError::decoding(
            "empty response body",
            0,
            "response envelope",
            "0 bytes",
        ));
    }

    let mut out = DecodedResponse::default();
    let mut saw_envelope_field = false;

    let mut root = WireReader::new(bytes);
    while let Some(h) = root.next_field()? {
        match h.number {
            s::RESP_SERVER_ERROR => {
                expect(h, WireType::Len, "server_error")?;
                saw_envelope_field = true;
                out.error_code = parse_server_error(root.read_message()?)?;
            }
            s::RESP_OBJECTS_RESPONSE => {
                expect(h, WireType::Len, "objects_response")?;
                saw_envelope_field = true;
                parse_objects_response(root.read_message()?, &mut out)?;
            }
            _ => root.skip(h)?,
        }
    }

    if !saw_envelope_field {
        return Err(LensError::decoding(
            "response carries no recognised envelope field",
            0,
            "server_error or objects_response",
            "only unknown fields",
        ));
    }

    debug!(
        words = out.tree.words.len(),
        language = out.tree.language.as_deref().unwrap_or("?"),
        error_code = out.error_code,
        "Response envelope decoded"
    );
    Ok(out)
}

fn parse_server_error(mut r: WireReader<'_>) -> Result<u64, LensError> {
    let mut code = 0;
    while let Some(h) = r.next_field()? {
        match h.number {
            s::RESP_ERROR_TYPE => {
                expect(h, WireType::Varint, "error_type")?;
                code = r.read_varint()?;
            }
            _ => r.skip(h)?,
        }
    }
    Ok(code)
}

fn parse_objects_response(
    mut r: WireReader<'_>,
    out: &mut DecodedResponse,
) -> Result<(), LensError> {
    while let Some(h) = r.next_field()? {
        match h.number {
            s::RESP_CLUSTER_INFO => {
                expect(h, WireType::Len, "cluster_info")?;
                parse_cluster_info(r.read_message()?, &mut out.metadata)?;
            }
            s::RESP_TEXT => {
                expect(h, WireType::Len, "text")?;
                parse_text(r.read_message()?, &mut out.tree)?;
            }
            _ => r.skip(h)?,
        }
    }
    Ok(())
}

fn parse_cluster_info(
    mut r: WireReader<'_>,
    meta: &mut ResponseMetadata,
) -> Result<(), LensError> {
    while let Some(h) = r.next_field()? {
        match h.number {
            s::RESP_CLUSTER_SESSION_ID => {
                expect(h, WireType::Len, "server_session_id")?;
                meta.server_session_id = Some(r.read_string()?.to_string());
            }
            s::RESP_CLUSTER_ROUTING_TOKEN => {
                expect(h, WireType::Len, "routing_token")?;
                meta.routing_token = Some(r.read_bytes()?.to_vec());
            }
            _ => r.skip(h)?,
        }
    }
    Ok(())
}

fn parse_text(mut r: WireReader<'_>, tree: &mut AnnotationTree) -> Result<(), LensError> {
    while let Some(h) = r.next_field()? {
        match h.number {
            s::RESP_TEXT_LAYOUT => {
                expect(h, WireType::Len, "text_layout")?;
                parse_layout(r.read_message()?, tree)?;
            }
            s::RESP_CONTENT_LANGUAGE => {
                expect(h, WireType::Len, "content_language")?;
                let lang = r.read_string()?;
                if !lang.is_empty() {
                    tree.language = Some(lang.to_string());
                }
            }
            s::RESP_FULL_TEXT_HINT => {
                expect(h, WireType::Len, "full_text_hint")?;
                tree.full_text_hint = Some(r.read_string()?.to_string());
            }
            _ => r.skip(h)?,
        }
    }
    Ok(())
}

fn parse_layout(mut r: WireReader<'_>, tree: &mut AnnotationTree) -> Result<(), LensError> {
    while let Some(h) = r.next_field()? {
        match h.number {
            s::RESP_PARAGRAPHS => {
                expect(h, WireType::Len, "paragraph")?;
                let mut para = r.read_message()?;
                while let Some(ph) = para.next_field()? {
                    match ph.number {
                        s::RESP_LINES => {
                            expect(ph, WireType::Len, "line")?;
                            let mut line = para.read_message()?;
                            while let Some(lh) = line.next_field()? {
                                match lh.number {
                                    s::RESP_WORDS => {
                                        expect(lh, WireType::Len, "word")?;
                                        if let Some(word) = parse_word(line.read_message()?)? {
                                            tree.words.push(word);
                                        }
                                    }
                                    _ => line.skip(lh)?,
                                }
                            }
                        }
                        _ => para.skip(ph)?,
                    }
                }
            }
            _ => r.skip(h)?,
        }
    }
    Ok(())
}

fn parse_word(mut r: WireReader<'_>) -> Result<Option<WordAnnotation>, LensError> {
    let mut text: Option<String> = None;
    let mut separator: Option<String> = None;
    let mut geometry: Option<Geometry> = None;

    while let Some(h) = r.next_field()? {
        match h.number {
            s::RESP_WORD_TEXT => {
                expect(h, WireType::Len, "plain_text")?;
                text = Some(r.read_string()?.to_string());
            }
            s::RESP_WORD_SEPARATOR => {
                expect(h, WireType::Len, "text_separator")?;
                separator = Some(r.read_string()?.to_string());
            }
            s::RESP_WORD_GEOMETRY => {
                expect(h, WireType::Len, "geometry")?;
                geometry = parse_geometry(r.read_message()?)?;
            }
            _ => r.skip(h)?,
        }
    }

    match text {
        Some(text) => Ok(Some(WordAnnotation {
            text,
            separator,
            geometry,
        })),
        None => {
            warn!("Dropping word annotation with no text field");
            Ok(None)
        }
    }
}

fn parse_geometry(mut r: WireReader<'_>) -> Result<Option<Geometry>, LensError> {
    let mut geometry = None;
    while let Some(h) = r.next_field()? {
        match h.number {
            s::RESP_BOUNDING_BOX => {
                expect(h, WireType::Len, "bounding_box")?;
                geometry = Some(parse_bounding_box(r.read_message()?)?);
            }
            _ => r.skip(h)?,
        }
    }
    Ok(geometry)
}

fn parse_bounding_box(mut r: WireReader<'_>) -> Result<Geometry, LensError> {
    let mut g = Geometry {
        center_x: 0.0,
        center_y: 0.0,
        width: 0.0,
        height: 0.0,
        rotation: 0.0,
        confidence: None,
    };
    while let Some(h) = r.next_field()? {
        match h.number {
            s::RESP_BOX_CENTER_X => {
                expect(h, WireType::Fixed32, "center_x")?;
                g.center_x = f64::from(r.read_fixed32()?);
            }
            s::RESP_BOX_CENTER_Y => {
                expect(h, WireType::Fixed32, "center_y")?;
                g.center_y = f64::from(r.read_fixed32()?);
            }
            s::RESP_BOX_WIDTH => {
                expect(h, WireType::Fixed32, "width")?;
                g.width = f64::from(r.read_fixed32()?);
            }
            s::RESP_BOX_HEIGHT => {
                expect(h, WireType::Fixed32, "height")?;
                g.height = f64::from(r.read_fixed32()?);
            }
            s::RESP_BOX_ROTATION => {
                expect(h, WireType::Fixed32, "rotation")?;
                g.rotation = f64::from(r.read_fixed32()?);
            }
            s::RESP_BOX_CONFIDENCE => {
                expect(h, WireType::Fixed32, "confidence")?;
                g.confidence = Some(f64::from(r.read_fixed32()?));
            }
            _ => r.skip(h)?,
        }
    }
    Ok(g)
}

fn expect(h: FieldHeader, want: WireType, what: &str) -> Result<(), LensError> {
    if h.wire_type != want {
        return Err(LensError::decoding(
            format!("wrong wire type for {what}"),
            h.offset,
            format!("field {} ({:?})", h.number, want),
            format!("field {} ({:?})", h.number, h.wire_type),
        ));
    }
    Ok(())
}
