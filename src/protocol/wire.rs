//! Wire-format primitives: varints, fixed 32-bit values, tags, and
//! length-delimited slices.
//!
//! This is the smallest subset of the protobuf wire format the envelope
//! actually uses. Groups (wire types 3 and 4) are obsolete and treated as
//! schema violations, as is anything else outside the four types below.
//!
//! The reader is strict where the contract is strict: truncated input,
//! over-long varints, and unknown wire types all surface as decoding errors
//! with the byte offset attached. Unknown *fields* are the caller's decision
//! (skippable for forward compatibility); unknown *shapes* are not.

use crate::error::LensError;

/// Maximum bytes a varint may occupy (64-bit value, 7 bits per byte).
const MAX_VARINT_BYTES: usize = 10;

/// The wire types the envelope uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    /// Base-128 varint.
    Varint,
    /// Little-endian 64-bit scalar.
    Fixed64,
    /// Length-prefixed bytes: strings, nested messages, packed fields.
    Len,
    /// Little-endian 32-bit scalar (floats in this protocol).
    Fixed32,
}

impl WireType {
    fn from_raw(raw: u64, offset: usize) -> Result<Self, LensError> {
        match raw {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::Fixed64),
            2 => Ok(WireType::Len),
            5 => Ok(WireType::Fixed32),
            other => Err(LensError::decoding(
                "unknown wire type in tag",
                offset,
                "wire type 0, 1, 2 or 5",
                format!("wire type {other}"),
            )),
        }
    }

    fn as_raw(self) -> u64 {
        match self {
            WireType::Varint => 0,
            WireType::Fixed64 => 1,
            WireType::Len => 2,
            WireType::Fixed32 => 5,
        }
    }
}

/// A decoded field tag: number plus wire type, with the offset it was read
/// at so error messages can point at the exact byte.
#[derive(Debug, Clone, Copy)]
pub struct FieldHeader {
    pub number: u32,
    pub wire_type: WireType,
    pub offset: usize,
}

// ── Writer ────────────────────────────────────────────────────────────────

/// Append-only encoder for one message body.
///
/// Nested messages are built by encoding the inner message into its own
/// writer and emitting the result as a length-delimited field.
#[derive(Debug, Default)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn put_varint(&mut self, mut value: u64) {
        loop {
            let byte = (value & 0x7F) as u8;
            value >>= 7;
            if value == 0 {
                self.buf.push(byte);
                return;
            }
            self.buf.push(byte | 0x80);
        }
    }

    fn put_tag(&mut self, field: u32, wire_type: WireType) {
        self.put_varint(((field as u64) << 3) | wire_type.as_raw());
    }

    /// Emit a varint field. Zero values are skipped, matching proto3
    /// default-elision semantics the service expects.
    pub fn varint(&mut self, field: u32, value: u64) {
        if value == 0 {
            return;
        }
        self.put_tag(field, WireType::Varint);
        self.put_varint(value);
    }

    /// Emit a varint field even when the value is zero.
    ///
    /// Sequence counters start at zero-adjacent values where elision would
    /// change meaning, so the encoder opts in explicitly where it matters.
    pub fn varint_always(&mut self, field: u32, value: u64) {
        self.put_tag(field, WireType::Varint);
        self.put_varint(value);
    }

    /// Emit a length-delimited bytes field. Empty values are skipped.
    pub fn bytes(&mut self, field: u32, value: &[u8]) {
        if value.is_empty() {
            return;
        }
        self.put_tag(field, WireType::Len);
        self.put_varint(value.len() as u64);
        self.buf.extend_from_slice(value);
    }

    /// Emit a UTF-8 string field. Empty strings are skipped.
    pub fn string(&mut self, field: u32, value: &str) {
        self.bytes(field, value.as_bytes());
    }

    /// Emit a UTF-8 string field even when empty.
    ///
    /// Word separators distinguish "" (no space, CJK) from an absent field,
    /// so presence must survive the round trip.
    pub fn string_always(&mut self, field: u32, value: &str) {
        self.put_tag(field, WireType::Len);
        self.put_varint(value.len() as u64);
        self.buf.extend_from_slice(value.as_bytes());
    }

    /// Emit a 32-bit float field. Zero values are skipped.
    pub fn float(&mut self, field: u32, value: f32) {
        if value == 0.0 {
            return;
        }
        self.put_tag(field, WireType::Fixed32);
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a nested message built by `f`. Empty messages are skipped.
    pub fn message(&mut self, field: u32, f: impl FnOnce(&mut WireWriter)) {
        let mut inner = WireWriter::new();
        f(&mut inner);
        if !inner.is_empty() {
            self.bytes(field, &inner.buf);
        }
    }

    /// Emit a nested message even when its body is empty (presence marker).
    pub fn message_always(&mut self, field: u32, f: impl FnOnce(&mut WireWriter)) {
        let mut inner = WireWriter::new();
        f(&mut inner);
        self.put_tag(field, WireType::Len);
        self.put_varint(inner.buf.len() as u64);
        self.buf.extend_from_slice(&inner.buf);
    }
}

// ── Reader ────────────────────────────────────────────────────────────────

/// Cursor over one message body.
///
/// `base` is the absolute offset of this body within the original response
/// so nested readers still report positions a human can find in a hex dump.
#[derive(Debug)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0, base: 0 }
    }

    fn at(buf: &'a [u8], base: usize) -> Self {
        Self { buf, pos: 0, base }
    }

    /// Absolute offset of the cursor within the original input.
    pub fn offset(&self) -> usize {
        self.base + self.pos
    }

    /// Read the next field header, or `None` at end of this message body.
    pub fn next_field(&mut self) -> Result<Option<FieldHeader>, LensError> {
        if self.pos >= self.buf.len() {
            return Ok(None);
        }
        let offset = self.offset();
        let tag = self.read_varint()?;
        let number = (tag >> 3) as u32;
        if number == 0 {
            return Err(LensError::decoding(
                "field number zero is reserved",
                offset,
                "field number ≥ 1",
                "field number 0",
            ));
        }
        let wire_type = WireType::from_raw(tag & 0x07, offset)?;
        Ok(Some(FieldHeader {
            number,
            wire_type,
            offset,
        }))
    }

    pub fn read_varint(&mut self) -> Result<u64, LensError> {
        let start = self.offset();
        let mut value: u64 = 0;
        for i in 0..MAX_VARINT_BYTES {
            let Some(&byte) = self.buf.get(self.pos) else {
                return Err(LensError::decoding(
                    "truncated varint",
                    start,
                    "varint continuation byte",
                    "end of input",
                ));
            };
            self.pos += 1;
            value |= u64::from(byte & 0x7F) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(LensError::decoding(
            "varint exceeds 10 bytes",
            start,
            "terminated varint",
            "11th continuation byte",
        ))
    }

    pub fn read_fixed32(&mut self) -> Result<f32, LensError> {
        let start = self.offset();
        let end = self.pos + 4;
        let Some(bytes) = self.buf.get(self.pos..end) else {
            return Err(LensError::decoding(
                "truncated fixed32",
                start,
                "4 bytes",
                format!("{} bytes", self.buf.len() - self.pos),
            ));
        };
        self.pos = end;
        Ok(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_fixed64_raw(&mut self) -> Result<(), LensError> {
        let start = self.offset();
        let end = self.pos + 8;
        if self.buf.get(self.pos..end).is_none() {
            return Err(LensError::decoding(
                "truncated fixed64",
                start,
                "8 bytes",
                format!("{} bytes", self.buf.len() - self.pos),
            ));
        }
        self.pos = end;
        Ok(())
    }

    /// Read a length-delimited slice and return a reader positioned over it,
    /// preserving absolute offsets for error reporting.
    pub fn read_message(&mut self) -> Result<WireReader<'a>, LensError> {
        let (slice, base) = self.read_len_slice()?;
        Ok(WireReader::at(slice, base))
    }

    /// Read a length-delimited field as raw bytes.
    pub fn read_bytes(&mut self) -> Result<&'a [u8], LensError> {
        Ok(self.read_len_slice()?.0)
    }

    /// Read a length-delimited field as UTF-8 text.
    pub fn read_string(&mut self) -> Result<&'a str, LensError> {
        let (slice, base) = self.read_len_slice()?;
        std::str::from_utf8(slice).map_err(|_| {
            LensError::decoding("invalid UTF-8 in string field", base, "UTF-8 text", "raw bytes")
        })
    }

    fn read_len_slice(&mut self) -> Result<(&'a [u8], usize), LensError> {
        let start = self.offset();
        let len = self.read_varint()? as usize;
        let body_base = self.offset();
        let end = self.pos + len;
        let Some(slice) = self.buf.get(self.pos..end) else {
            return Err(LensError::decoding(
                "length-delimited field overruns input",
                start,
                format!("{len} bytes of body"),
                format!("{} bytes remaining", self.buf.len() - self.pos),
            ));
        };
        self.pos = end;
        Ok((slice, body_base))
    }

    /// Skip the value belonging to `header`. Used for fields the schema
    /// table does not describe (forward compatibility).
    pub fn skip(&mut self, header: FieldHeader) -> Result<(), LensError> {
        match header.wire_type {
            WireType::Varint => {
                self.read_varint()?;
            }
            WireType::Fixed64 => self.read_fixed64_raw()?,
            WireType::Len => {
                self.read_len_slice()?;
            }
            WireType::Fixed32 => {
                self.read_fixed32()?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn varint_roundtrip() {
        let mut w = WireWriter::new();
        w.varint(1, 1);
        w.varint(2, 300);
        w.varint(3, u64::MAX);
        let bytes = w.into_bytes();

        let mut r = WireReader::new(&bytes);
        let h = r.next_field().unwrap().unwrap();
        assert_eq!((h.number, r.read_varint().unwrap()), (1, 1));
        let h = r.next_field().unwrap().unwrap();
        assert_eq!((h.number, r.read_varint().unwrap()), (2, 300));
        let h = r.next_field().unwrap().unwrap();
        assert_eq!((h.number, r.read_varint().unwrap()), (3, u64::MAX));
        assert!(r.next_field().unwrap().is_none());
    }

    #[test]
    fn nested_message_preserves_absolute_offsets() {
        let mut w = WireWriter::new();
        w.message(1, |m| {
            m.string(2, "hi");
        });
        let bytes = w.into_bytes();

        let mut r = WireReader::new(&bytes);
        let _ = r.next_field().unwrap().unwrap();
        let mut inner = r.read_message().unwrap();
        let h = inner.next_field().unwrap().unwrap();
        assert_eq!(h.number, 2);
        // tag(1) + len(1) = 2 bytes of outer framing before the inner body
        assert_eq!(h.offset, 2);
        assert_eq!(inner.read_string().unwrap(), "hi");
    }

    #[test]
    fn float_roundtrip() {
        let mut w = WireWriter::new();
        w.float(4, 0.125);
        let bytes = w.into_bytes();

        let mut r = WireReader::new(&bytes);
        let h = r.next_field().unwrap().unwrap();
        assert_eq!(h.wire_type, WireType::Fixed32);
        assert_eq!(r.read_fixed32().unwrap(), 0.125);
    }

    #[test]
    fn truncated_varint_is_a_decoding_error() {
        // 0x80 promises a continuation byte that never arrives.
        let mut r = WireReader::new(&[0x08, 0x80]);
        let _ = r.next_field().unwrap().unwrap();
        let err = r.read_varint().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decoding);
        assert!(err.to_string().contains("byte 1"));
    }

    #[test]
    fn overrunning_length_is_a_decoding_error() {
        // Field 1, wire type 2, claims 100 bytes but carries 2.
        let mut r = WireReader::new(&[0x0A, 100, 0xAB, 0xCD]);
        let _ = r.next_field().unwrap().unwrap();
        let err = r.read_bytes().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decoding);
    }

    #[test]
    fn group_wire_types_are_rejected() {
        // Tag: field 1, wire type 3 (start group).
        let mut r = WireReader::new(&[0x0B]);
        let err = r.next_field().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decoding);
        assert!(err.to_string().contains("wire type 3"));
    }

    #[test]
    fn zero_values_are_elided() {
        let mut w = WireWriter::new();
        w.varint(1, 0);
        w.string(2, "");
        w.float(3, 0.0);
        assert!(w.is_empty());

        let mut w = WireWriter::new();
        w.varint_always(1, 0);
        assert_eq!(w.into_bytes(), vec![0x08, 0x00]);
    }
}
