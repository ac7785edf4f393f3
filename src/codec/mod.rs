//! Canonical binary codec.
//!
//! Values are encoded as MessagePack with one extension: raw byte buffers are
//! written as extension type [`BYTES_EXT_TYPE`] so they come back as
//! [`Value::Bytes`] instead of an array of numbers. The codec is
//! schema-agnostic; type checks live in [`crate::protocol::ValueType`].
//!
//! Encoding is canonical: integers take their smallest form, floats are
//! always 64-bit, and map entries are written in key order. Marker and
//! length handling is `rmp`'s; this module adds the ordering, the bytes
//! extension and the decode limits.

mod bridge;
mod value;

pub use bridge::{from_value, to_value};
pub(crate) use bridge::{from_args, to_args};
pub use value::{Key, Value};

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::convert::Infallible;

use bytes::Bytes;
use rmp::decode::bytes::BytesReadError;
use rmp::decode::{NumValueReadError, ValueReadError};
use rmp::encode::{ByteBuf, ValueWriteError};
use rmp::Marker;
use thiserror::Error;

/// Extension type tag used for raw byte buffers.
pub const BYTES_EXT_TYPE: i8 = 0x12;

/// Deepest array/map nesting accepted by [`decode`].
pub const MAX_DEPTH: usize = 128;

/// Errors produced while decoding bytes into a [`Value`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    // ---
    #[error("unexpected end of input at offset {offset} (needed {needed} more bytes)")]
    Truncated { offset: usize, needed: usize },

    #[error("invalid marker 0x{marker:02x} at offset {offset}")]
    InvalidMarker { marker: u8, offset: usize },

    #[error("unsupported extension type {0}")]
    UnknownExtension(i8),

    #[error("map key at offset {0} is not a string or integer")]
    InvalidMapKey(usize),

    #[error("duplicate map key {0:?}")]
    DuplicateKey(String),

    #[error("integer {0} exceeds i64 range")]
    IntegerOverflow(u64),

    #[error("invalid utf-8 in string at offset {0}")]
    InvalidUtf8(usize),

    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),

    #[error("nesting deeper than {MAX_DEPTH} levels")]
    TooDeep,

    #[error("read failed: {0}")]
    Read(String),
}

/// Errors produced while encoding a [`Value`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    // ---
    /// MessagePack lengths are 32-bit.
    #[error("{kind} of length {len} does not fit a 32-bit length")]
    TooLong { kind: &'static str, len: usize },
}

/// How byte buffers are written.
///
/// The wire always uses the extension tag; the serde bridge uses plain
/// `bin` so that `serialize_bytes`/`visit_bytes` line up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BytesRepr {
    Ext,
    Bin,
}

/// Encode a value.
///
/// # Errors
///
/// `EncodeError::TooLong` if a string, buffer, array or map holds more
/// than `u32::MAX` items or bytes.
pub fn encode(value: &Value) -> Result<Bytes, EncodeError> {
    // ---
    encode_with(value, BytesRepr::Ext)
}

/// Decode a single value that must span the whole input.
pub fn decode(input: &[u8]) -> Result<Value, DecodeError> {
    // ---
    let mut decoder = Decoder::new(input);
    let value = decoder.read_value(0)?;

    let rest = decoder.remaining();
    if rest > 0 {
        return Err(DecodeError::TrailingBytes(rest));
    }
    Ok(value)
}

/// Structural copy through the codec (`decode(encode(v))`).
pub fn deep_clone(value: &Value) -> crate::Result<Value> {
    // ---
    Ok(decode(&encode(value)?)?)
}

pub(crate) fn encode_with(value: &Value, bytes_repr: BytesRepr) -> Result<Bytes, EncodeError> {
    // ---
    let mut encoder = Encoder {
        buf: ByteBuf::with_capacity(64),
        bytes_repr,
    };
    encoder.write_value(value)?;
    Ok(Bytes::from(encoder.buf.into_vec()))
}

fn length(kind: &'static str, len: usize) -> Result<u32, EncodeError> {
    u32::try_from(len).map_err(|_| EncodeError::TooLong { kind, len })
}

// `ByteBuf` writes cannot fail.
fn written<T>(result: Result<T, ValueWriteError<Infallible>>) -> T {
    match result {
        Ok(out) => out,
        Err(ValueWriteError::InvalidMarkerWrite(never))
        | Err(ValueWriteError::InvalidDataWrite(never)) => match never {},
    }
}

struct Encoder {
    buf: ByteBuf,
    bytes_repr: BytesRepr,
}

impl Encoder {
    // ---
    fn write_value(&mut self, value: &Value) -> Result<(), EncodeError> {
        match value {
            Value::Nil => {
                let marker = rmp::encode::write_nil(&mut self.buf);
                written(marker.map_err(ValueWriteError::InvalidMarkerWrite))
            }
            Value::Bool(b) => {
                let marker = rmp::encode::write_bool(&mut self.buf, *b);
                written(marker.map_err(ValueWriteError::InvalidMarkerWrite))
            }
            Value::Int(n) => {
                written(rmp::encode::write_sint(&mut self.buf, *n));
            }
            Value::Float(f) => written(rmp::encode::write_f64(&mut self.buf, *f)),
            Value::Str(s) => self.write_str(s)?,
            Value::Bytes(b) => {
                let len = length("byte buffer", b.len())?;
                match self.bytes_repr {
                    BytesRepr::Ext => {
                        written(rmp::encode::write_ext_meta(&mut self.buf, len, BYTES_EXT_TYPE));
                        self.buf.as_mut_vec().extend_from_slice(b);
                    }
                    BytesRepr::Bin => written(rmp::encode::write_bin(&mut self.buf, b)),
                }
            }
            Value::Array(items) => {
                let len = length("array", items.len())?;
                written(rmp::encode::write_array_len(&mut self.buf, len));
                for item in items {
                    self.write_value(item)?;
                }
            }
            Value::Map(entries) => {
                let len = length("map", entries.len())?;
                written(rmp::encode::write_map_len(&mut self.buf, len));
                for (key, item) in entries {
                    match key {
                        Key::Int(n) => {
                            written(rmp::encode::write_sint(&mut self.buf, *n));
                        }
                        Key::Str(s) => self.write_str(s)?,
                    }
                    self.write_value(item)?;
                }
            }
        }
        Ok(())
    }

    fn write_str(&mut self, s: &str) -> Result<(), EncodeError> {
        length("string", s.len())?;
        written(rmp::encode::write_str(&mut self.buf, s));
        Ok(())
    }
}

/// Cursor over an input slice.
///
/// Markers are peeked on a copy of the reader, then the matching `rmp`
/// reader consumes the header. Payload bytes are sliced directly.
struct Decoder<'a> {
    input_len: usize,
    reader: rmp::decode::Bytes<'a>,
}

impl<'a> Decoder<'a> {
    // ---
    fn new(input: &'a [u8]) -> Self {
        Self {
            input_len: input.len(),
            reader: rmp::decode::Bytes::new(input),
        }
    }

    fn remaining(&self) -> usize {
        self.reader.remaining_slice().len()
    }

    fn offset(&self) -> usize {
        self.input_len - self.remaining()
    }

    fn take(&mut self, len: u32) -> Result<&'a [u8], DecodeError> {
        let rest = self.reader.remaining_slice();
        let len = len as usize;
        if rest.len() < len {
            return Err(DecodeError::Truncated {
                offset: self.offset(),
                needed: len - rest.len(),
            });
        }
        let (data, tail) = rest.split_at(len);
        self.reader = rmp::decode::Bytes::new(tail);
        Ok(data)
    }

    fn peek_marker(&self) -> Result<Marker, DecodeError> {
        let mut ahead = self.reader;
        rmp::decode::read_marker(&mut ahead).map_err(|err| self.read_failed(err.0))
    }

    fn read_failed(&self, err: BytesReadError) -> DecodeError {
        match err {
            BytesReadError::InsufficientBytes {
                expected, actual, ..
            } => DecodeError::Truncated {
                offset: self.offset(),
                needed: expected.saturating_sub(actual),
            },
            other => DecodeError::Read(other.to_string()),
        }
    }

    fn header_failed(&self, err: ValueReadError<BytesReadError>) -> DecodeError {
        match err {
            ValueReadError::InvalidMarkerRead(err) | ValueReadError::InvalidDataRead(err) => {
                self.read_failed(err)
            }
            ValueReadError::TypeMismatch(marker) => DecodeError::InvalidMarker {
                marker: marker.to_u8(),
                offset: self.offset(),
            },
        }
    }

    fn int_failed(&self, err: NumValueReadError<BytesReadError>) -> DecodeError {
        match err {
            NumValueReadError::InvalidMarkerRead(err) | NumValueReadError::InvalidDataRead(err) => {
                self.read_failed(err)
            }
            NumValueReadError::TypeMismatch(marker) => DecodeError::InvalidMarker {
                marker: marker.to_u8(),
                offset: self.offset(),
            },
            NumValueReadError::OutOfRange => DecodeError::Read("integer out of range".into()),
        }
    }

    fn read_value(&mut self, depth: usize) -> Result<Value, DecodeError> {
        if depth > MAX_DEPTH {
            return Err(DecodeError::TooDeep);
        }

        let offset = self.offset();
        let value = match self.peek_marker()? {
            Marker::Null => {
                rmp::decode::read_nil(&mut self.reader).map_err(|e| self.header_failed(e))?;
                Value::Nil
            }
            Marker::True | Marker::False => {
                let b = rmp::decode::read_bool(&mut self.reader)
                    .map_err(|e| self.header_failed(e))?;
                Value::Bool(b)
            }
            Marker::U64 => {
                let n: u64 =
                    rmp::decode::read_int(&mut self.reader).map_err(|e| self.int_failed(e))?;
                Value::Int(i64::try_from(n).map_err(|_| DecodeError::IntegerOverflow(n))?)
            }
            Marker::FixPos(_)
            | Marker::FixNeg(_)
            | Marker::U8
            | Marker::U16
            | Marker::U32
            | Marker::I8
            | Marker::I16
            | Marker::I32
            | Marker::I64 => {
                let n: i64 =
                    rmp::decode::read_int(&mut self.reader).map_err(|e| self.int_failed(e))?;
                Value::Int(n)
            }
            Marker::F32 => {
                let f = rmp::decode::read_f32(&mut self.reader).map_err(|e| self.header_failed(e))?;
                Value::Float(f64::from(f))
            }
            Marker::F64 => {
                let f = rmp::decode::read_f64(&mut self.reader).map_err(|e| self.header_failed(e))?;
                Value::Float(f)
            }
            Marker::FixStr(_) | Marker::Str8 | Marker::Str16 | Marker::Str32 => {
                let len =
                    rmp::decode::read_str_len(&mut self.reader).map_err(|e| self.header_failed(e))?;
                self.read_str(len)?
            }
            Marker::Bin8 | Marker::Bin16 | Marker::Bin32 => {
                let len =
                    rmp::decode::read_bin_len(&mut self.reader).map_err(|e| self.header_failed(e))?;
                Value::Bytes(Bytes::copy_from_slice(self.take(len)?))
            }
            Marker::FixExt1
            | Marker::FixExt2
            | Marker::FixExt4
            | Marker::FixExt8
            | Marker::FixExt16
            | Marker::Ext8
            | Marker::Ext16
            | Marker::Ext32 => {
                let meta = rmp::decode::read_ext_meta(&mut self.reader)
                    .map_err(|e| self.header_failed(e))?;
                let data = self.take(meta.size)?;
                if meta.typeid != BYTES_EXT_TYPE {
                    return Err(DecodeError::UnknownExtension(meta.typeid));
                }
                Value::Bytes(Bytes::copy_from_slice(data))
            }
            Marker::FixArray(_) | Marker::Array16 | Marker::Array32 => {
                let len = rmp::decode::read_array_len(&mut self.reader)
                    .map_err(|e| self.header_failed(e))?;
                self.read_array(len, depth)?
            }
            Marker::FixMap(_) | Marker::Map16 | Marker::Map32 => {
                let len =
                    rmp::decode::read_map_len(&mut self.reader).map_err(|e| self.header_failed(e))?;
                self.read_map(len, depth)?
            }
            Marker::Reserved => {
                return Err(DecodeError::InvalidMarker {
                    marker: Marker::Reserved.to_u8(),
                    offset,
                })
            }
        };
        Ok(value)
    }

    fn read_str(&mut self, len: u32) -> Result<Value, DecodeError> {
        let offset = self.offset();
        let raw = self.take(len)?;
        let s = std::str::from_utf8(raw).map_err(|_| DecodeError::InvalidUtf8(offset))?;
        Ok(Value::Str(s.to_string()))
    }

    fn read_array(&mut self, len: u32, depth: usize) -> Result<Value, DecodeError> {
        // Every element takes at least one byte; cap the up-front allocation.
        let mut items = Vec::with_capacity((len as usize).min(self.remaining()));
        for _ in 0..len {
            items.push(self.read_value(depth + 1)?);
        }
        Ok(Value::Array(items))
    }

    fn read_map(&mut self, len: u32, depth: usize) -> Result<Value, DecodeError> {
        let mut entries = BTreeMap::new();
        for _ in 0..len {
            let offset = self.offset();
            let key = match self.read_value(depth + 1)? {
                Value::Int(n) => Key::Int(n),
                Value::Str(s) => Key::Str(s),
                _ => return Err(DecodeError::InvalidMapKey(offset)),
            };
            let item = self.read_value(depth + 1)?;
            match entries.entry(key) {
                Entry::Vacant(slot) => {
                    slot.insert(item);
                }
                Entry::Occupied(slot) => {
                    return Err(DecodeError::DuplicateKey(slot.key().to_string()));
                }
            }
        }
        Ok(Value::Map(entries))
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn hex(value: &Value) -> String {
        encode(value)
            .unwrap()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }

    #[test]
    fn integers_use_smallest_form() {
        // ---
        assert_eq!(hex(&Value::Int(5)), "05");
        assert_eq!(hex(&Value::Int(-1)), "ff");
        assert_eq!(hex(&Value::Int(200)), "ccc8");
        assert_eq!(hex(&Value::Int(-100)), "d09c");
        assert_eq!(hex(&Value::Int(70_000)), "ce00011170");
        assert_eq!(hex(&Value::Int(i64::MIN)), "d38000000000000000");
    }

    #[test]
    fn byte_buffers_use_extension_tag() {
        // ---
        let four = Value::Bytes(Bytes::from_static(b"abcd"));
        assert_eq!(hex(&four), "d61261626364");

        let three = Value::Bytes(Bytes::from_static(b"abc"));
        assert_eq!(hex(&three), "c70312616263");
        assert_eq!(decode(&encode(&three).unwrap()), Ok(three));
    }

    #[test]
    fn bin_and_float32_are_accepted() {
        // ---
        assert_eq!(
            decode(&[0xc4, 0x02, 0x01, 0x02]),
            Ok(Value::Bytes(Bytes::from_static(&[1, 2])))
        );
        assert_eq!(
            decode(&[0xca, 0x3f, 0xc0, 0x00, 0x00]),
            Ok(Value::Float(1.5))
        );
    }

    #[test]
    fn map_encoding_is_key_ordered() {
        // ---
        let a = Value::map([("b", Value::Int(1)), ("a", Value::Int(2))]);
        let b = Value::map([("a", Value::Int(2)), ("b", Value::Int(1))]);
        assert_eq!(encode(&a), encode(&b));
        assert_eq!(hex(&a), "82a16102a16201");
    }

    #[test]
    fn truncated_input_is_rejected() {
        // ---
        let full = encode(&Value::from("hello world")).unwrap();
        let err = decode(&full[..full.len() - 3]).unwrap_err();
        assert!(matches!(err, DecodeError::Truncated { needed: 3, .. }));
        assert!(matches!(decode(&[]), Err(DecodeError::Truncated { .. })));
    }

    #[test]
    fn structural_errors_are_rejected() {
        // ---
        assert_eq!(
            decode(&[0xc1]),
            Err(DecodeError::InvalidMarker {
                marker: 0xc1,
                offset: 0
            })
        );
        assert_eq!(decode(&[0x01, 0x02]), Err(DecodeError::TrailingBytes(1)));
        assert_eq!(
            decode(&[0xd4, 0x07, 0x00]),
            Err(DecodeError::UnknownExtension(7))
        );
        // {nil: 1}
        assert_eq!(
            decode(&[0x81, 0xc0, 0x01]),
            Err(DecodeError::InvalidMapKey(1))
        );
        // {"a": 1, "a": 2}
        assert_eq!(
            decode(&[0x82, 0xa1, 0x61, 0x01, 0xa1, 0x61, 0x02]),
            Err(DecodeError::DuplicateKey("a".into()))
        );
        assert_eq!(
            decode(&[0xcf, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]),
            Err(DecodeError::IntegerOverflow(u64::MAX))
        );
        assert_eq!(
            decode(&[0xa2, 0xff, 0xfe]),
            Err(DecodeError::InvalidUtf8(1))
        );
    }

    #[test]
    fn deep_nesting_is_rejected() {
        // ---
        let mut input = vec![0x91; MAX_DEPTH + 2];
        input.push(0xc0);
        assert_eq!(decode(&input), Err(DecodeError::TooDeep));
    }

    #[test]
    fn huge_declared_length_does_not_preallocate() {
        // ---
        // array32 claiming u32::MAX elements with nothing behind it
        let err = decode(&[0xdd, 0xff, 0xff, 0xff, 0xff]).unwrap_err();
        assert!(matches!(err, DecodeError::Truncated { .. }));
    }

    #[test]
    fn strings_switch_to_str8_at_32_bytes() {
        // ---
        let short = "a".repeat(31);
        let long = "a".repeat(32);
        assert!(hex(&Value::from(short.as_str())).starts_with("bf"));
        assert!(hex(&Value::from(long.as_str())).starts_with("d920"));
    }

    #[test]
    fn lengths_beyond_u32_are_rejected() {
        // ---
        assert_eq!(length("array", 16), Ok(16));
        let len = u32::MAX as usize + 1;
        assert_eq!(
            length("array", len),
            Err(EncodeError::TooLong { kind: "array", len })
        );
    }

    #[test]
    fn plain_msgpack_readers_understand_the_output() {
        // ---
        let value = Value::Array(vec![
            Value::Int(-7),
            Value::from("x"),
            Value::map([("k", Value::Bool(true))]),
        ]);
        let packed = encode(&value).unwrap();

        let (n, s, m): (i64, String, BTreeMap<String, bool>) =
            rmp_serde::from_slice(&packed).unwrap();
        assert_eq!((n, s.as_str()), (-7, "x"));
        assert_eq!(m.get("k"), Some(&true));
    }

    #[test]
    fn deep_clone_copies_structure() {
        // ---
        let original = Value::Array(vec![
            Value::Bytes(Bytes::from_static(b"\xde\xad")),
            Value::map([("x", Value::Float(0.25))]),
        ]);
        assert_eq!(deep_clone(&original), Ok(original));
    }

    fn arb_key() -> impl Strategy<Value = Key> {
        prop_oneof![any::<i64>().prop_map(Key::Int), ".{0,12}".prop_map(Key::Str)]
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Nil),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Int),
            any::<f64>()
                .prop_filter("NaN never compares equal", |f| !f.is_nan())
                .prop_map(Value::Float),
            ".{0,40}".prop_map(Value::Str),
            prop::collection::vec(any::<u8>(), 0..300).prop_map(|b| Value::Bytes(Bytes::from(b))),
        ];
        leaf.prop_recursive(4, 64, 8, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..8).prop_map(Value::Array),
                prop::collection::btree_map(arb_key(), inner, 0..8)
                    .prop_map(|m: BTreeMap<Key, Value>| Value::Map(m)),
            ]
        })
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(value in arb_value()) {
            prop_assert_eq!(decode(&encode(&value).unwrap()), Ok(value));
        }

        #[test]
        fn decode_never_panics_on_garbage(input in prop::collection::vec(any::<u8>(), 0..64)) {
            let _ = decode(&input);
        }
    }
}
