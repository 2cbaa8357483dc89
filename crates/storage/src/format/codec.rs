//! Typed value payload codec.
//!
//! Converts a [`Value`] to and from its persisted byte representation.
//! Encoding is total for any value whose length prefixes fit the format;
//! decoding validates tag, width, length and bounds before trusting a
//! single payload byte and fails with [`RecordError`] rather than reading
//! out of range.
//!
//! # Payload Layout
//!
//! All integers are little-endian regardless of host platform.
//!
//! ```text
//! Int32/Int64/Float32/Float64   fixed-width LE value
//! Bool                          1 byte, 0 or 1 (anything else is corrupt)
//! String / ByteArray            length (u32) + raw bytes
//! *Array                        elem width (u8) + count (u32) + packed LE elements
//! ```
//!
//! Strings and byte arrays are length-prefixed, never null-terminated;
//! zero bytes are legal anywhere in a payload. Arrays carry their element
//! width explicitly so a decoder can reject a tag/width disagreement
//! instead of misreading elements.

use byteorder::{LittleEndian, ReadBytesExt};
use satchel_core::{TypeTag, Value};
use std::io::{Cursor, Read};

use super::record::RecordError;

/// Append the persisted payload for `value` to `out`.
///
/// Fails only with [`RecordError::TooLarge`] when a length prefix would
/// overflow the format's u32 fields.
pub fn encode_value(value: &Value, out: &mut Vec<u8>) -> Result<(), RecordError> {
    match value {
        Value::Int32(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Int64(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Float32(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Float64(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Bool(v) => out.push(*v as u8),
        Value::String(s) => {
            let len = length_prefix(s.len())?;
            out.extend_from_slice(&len.to_le_bytes());
            out.extend_from_slice(s.as_bytes());
        }
        Value::ByteArray(b) => {
            let len = length_prefix(b.len())?;
            out.extend_from_slice(&len.to_le_bytes());
            out.extend_from_slice(b);
        }
        Value::Int32Array(a) => {
            let count = length_prefix(a.len())?;
            out.push(4);
            out.extend_from_slice(&count.to_le_bytes());
            for v in a {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        Value::Int64Array(a) => {
            let count = length_prefix(a.len())?;
            out.push(8);
            out.extend_from_slice(&count.to_le_bytes());
            for v in a {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        Value::Float32Array(a) => {
            let count = length_prefix(a.len())?;
            out.push(4);
            out.extend_from_slice(&count.to_le_bytes());
            for v in a {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        Value::Float64Array(a) => {
            let count = length_prefix(a.len())?;
            out.push(8);
            out.extend_from_slice(&count.to_le_bytes());
            for v in a {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
    }
    Ok(())
}

/// Decode a payload previously produced by [`encode_value`] for `tag`.
///
/// The slice must contain exactly one payload; trailing bytes are treated
/// as corruption.
pub fn decode_value(tag: TypeTag, bytes: &[u8]) -> Result<Value, RecordError> {
    let mut rdr = Cursor::new(bytes);

    let value = match tag {
        TypeTag::Int32 => Value::Int32(rdr.read_i32::<LittleEndian>()?),
        TypeTag::Int64 => Value::Int64(rdr.read_i64::<LittleEndian>()?),
        TypeTag::Float32 => Value::Float32(rdr.read_f32::<LittleEndian>()?),
        TypeTag::Float64 => Value::Float64(rdr.read_f64::<LittleEndian>()?),
        TypeTag::Bool => match rdr.read_u8()? {
            0 => Value::Bool(false),
            1 => Value::Bool(true),
            _ => return Err(RecordError::InvalidFormat),
        },
        TypeTag::String => {
            let raw = read_length_prefixed(&mut rdr, bytes)?;
            let s = String::from_utf8(raw).map_err(|_| RecordError::InvalidFormat)?;
            Value::String(s)
        }
        TypeTag::ByteArray => {
            let raw = read_length_prefixed(&mut rdr, bytes)?;
            Value::ByteArray(raw)
        }
        TypeTag::Int32Array => {
            let count = read_array_header(&mut rdr, bytes, tag)?;
            let mut elems = vec![0i32; count];
            rdr.read_i32_into::<LittleEndian>(&mut elems)?;
            Value::Int32Array(elems)
        }
        TypeTag::Int64Array => {
            let count = read_array_header(&mut rdr, bytes, tag)?;
            let mut elems = vec![0i64; count];
            rdr.read_i64_into::<LittleEndian>(&mut elems)?;
            Value::Int64Array(elems)
        }
        TypeTag::Float32Array => {
            let count = read_array_header(&mut rdr, bytes, tag)?;
            let mut elems = vec![0f32; count];
            rdr.read_f32_into::<LittleEndian>(&mut elems)?;
            Value::Float32Array(elems)
        }
        TypeTag::Float64Array => {
            let count = read_array_header(&mut rdr, bytes, tag)?;
            let mut elems = vec![0f64; count];
            rdr.read_f64_into::<LittleEndian>(&mut elems)?;
            Value::Float64Array(elems)
        }
    };

    // A payload must be consumed exactly; leftovers mean the stored length
    // disagrees with the content.
    if rdr.position() != bytes.len() as u64 {
        return Err(RecordError::InvalidFormat);
    }

    Ok(value)
}

fn length_prefix(len: usize) -> Result<u32, RecordError> {
    u32::try_from(len).map_err(|_| RecordError::TooLarge(len))
}

/// Read a u32 length prefix and that many raw bytes.
///
/// Bounds are checked against the slice before allocating, so a corrupt
/// length field cannot trigger a huge allocation.
fn read_length_prefixed(rdr: &mut Cursor<&[u8]>, bytes: &[u8]) -> Result<Vec<u8>, RecordError> {
    let len = rdr.read_u32::<LittleEndian>()? as usize;
    ensure_remaining(rdr, bytes, len as u64)?;
    let mut raw = vec![0u8; len];
    rdr.read_exact(&mut raw)?;
    Ok(raw)
}

/// Read an array header (width + count), validating the width against the
/// tag and the claimed byte size against the remaining input.
fn read_array_header(
    rdr: &mut Cursor<&[u8]>,
    bytes: &[u8],
    tag: TypeTag,
) -> Result<usize, RecordError> {
    let width = rdr.read_u8()?;
    if Some(width) != tag.element_width() {
        return Err(RecordError::InvalidFormat);
    }
    let count = rdr.read_u32::<LittleEndian>()? as usize;
    ensure_remaining(rdr, bytes, count as u64 * width as u64)?;
    Ok(count)
}

fn ensure_remaining(rdr: &Cursor<&[u8]>, bytes: &[u8], needed: u64) -> Result<(), RecordError> {
    let remaining = bytes.len() as u64 - rdr.position();
    if needed > remaining {
        return Err(RecordError::InvalidFormat);
    }
    Ok(())
}
