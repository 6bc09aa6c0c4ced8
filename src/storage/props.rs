//! Encoding of single property values stored in property blocks.
//!
//! A block payload is a type tag followed by the value body. Integers use
//! zig-zag varints, strings and byte arrays a varint length prefix.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Tag of [`PropValue::Null`].
pub const TYPE_NULL: u8 = 0;
/// Tag of [`PropValue::Bool`].
pub const TYPE_BOOL: u8 = 1;
/// Tag of [`PropValue::Int`].
pub const TYPE_INT: u8 = 2;
/// Tag of [`PropValue::Float`].
pub const TYPE_FLOAT: u8 = 3;
/// Tag of [`PropValue::Str`].
pub const TYPE_STR: u8 = 4;
/// Tag of [`PropValue::Bytes`].
pub const TYPE_BYTES: u8 = 5;
/// Tag of [`PropValue::IntArray`].
pub const TYPE_INT_ARRAY: u8 = 6;

/// A decoded property value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum PropValue {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit floating point number.
    Float(f64),
    /// UTF-8 string.
    Str(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Array of 64-bit signed integers.
    IntArray(Vec<i64>),
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Null => write!(f, "null"),
            PropValue::Bool(v) => write!(f, "{v}"),
            PropValue::Int(v) => write!(f, "{v}"),
            PropValue::Float(v) => write!(f, "{v}"),
            PropValue::Str(v) => write!(f, "{v:?}"),
            PropValue::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            PropValue::IntArray(v) => write!(f, "{v:?}"),
        }
    }
}

/// Reason a payload failed to decode.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum DecodeError {
    /// Payload ended before the value was complete.
    #[error("{0} truncated")]
    Truncated(&'static str),
    /// Payload carried bytes that no encoder produces.
    #[error("{0}")]
    Invalid(&'static str),
}

/// Encodes `value` into a block payload.
pub fn encode_value(value: &PropValue) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(10);
    match value {
        PropValue::Null => bytes.push(TYPE_NULL),
        PropValue::Bool(v) => {
            bytes.push(TYPE_BOOL);
            bytes.push(u8::from(*v));
        }
        PropValue::Int(v) => {
            bytes.push(TYPE_INT);
            write_var_i64(*v, &mut bytes);
        }
        PropValue::Float(v) => {
            bytes.push(TYPE_FLOAT);
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        PropValue::Str(s) => {
            bytes.push(TYPE_STR);
            write_var_u64(s.len() as u64, &mut bytes);
            bytes.extend_from_slice(s.as_bytes());
        }
        PropValue::Bytes(b) => {
            bytes.push(TYPE_BYTES);
            write_var_u64(b.len() as u64, &mut bytes);
            bytes.extend_from_slice(b);
        }
        PropValue::IntArray(values) => {
            bytes.push(TYPE_INT_ARRAY);
            write_var_u64(values.len() as u64, &mut bytes);
            for v in values {
                write_var_i64(*v, &mut bytes);
            }
        }
    }
    bytes
}

/// Encodes a value tuple into one comparable key.
///
/// Two tuples share a key exactly when their values are bit-identical, so
/// `NaN` matches itself and `-0.0` stays apart from `0.0`.
pub fn encode_tuple(values: &[PropValue]) -> Vec<u8> {
    let mut key = Vec::new();
    for value in values {
        let encoded = encode_value(value);
        key.extend_from_slice(&(encoded.len() as u32).to_le_bytes());
        key.extend_from_slice(&encoded);
    }
    key
}

/// Decodes a block payload, rejecting trailing bytes.
pub fn decode_value(buf: &[u8]) -> Result<PropValue, DecodeError> {
    let mut cursor = 0usize;
    let Some(&type_tag) = buf.first() else {
        return Err(DecodeError::Truncated("property block"));
    };
    cursor += 1;
    let value = match type_tag {
        TYPE_NULL => PropValue::Null,
        TYPE_BOOL => {
            let byte = *buf
                .get(cursor)
                .ok_or(DecodeError::Truncated("bool payload"))?;
            cursor += 1;
            if byte > 1 {
                return Err(DecodeError::Invalid("bool payload invalid"));
            }
            PropValue::Bool(byte == 1)
        }
        TYPE_INT => PropValue::Int(read_var_i64(buf, &mut cursor)?),
        TYPE_FLOAT => {
            if cursor + 8 > buf.len() {
                return Err(DecodeError::Truncated("float payload"));
            }
            let mut arr = [0u8; 8];
            arr.copy_from_slice(&buf[cursor..cursor + 8]);
            cursor += 8;
            PropValue::Float(f64::from_le_bytes(arr))
        }
        TYPE_STR => {
            let data = read_len_prefixed(buf, &mut cursor)?;
            let s = std::str::from_utf8(data)
                .map_err(|_| DecodeError::Invalid("stored string not utf8"))?;
            PropValue::Str(s.to_owned())
        }
        TYPE_BYTES => PropValue::Bytes(read_len_prefixed(buf, &mut cursor)?.to_vec()),
        TYPE_INT_ARRAY => {
            let len = read_var_u64(buf, &mut cursor)?;
            // every element takes at least one byte
            if len > (buf.len() - cursor) as u64 {
                return Err(DecodeError::Truncated("int array payload"));
            }
            let mut values = Vec::with_capacity(len as usize);
            for _ in 0..len {
                values.push(read_var_i64(buf, &mut cursor)?);
            }
            PropValue::IntArray(values)
        }
        _ => return Err(DecodeError::Invalid("unknown property type tag")),
    };
    if cursor != buf.len() {
        return Err(DecodeError::Invalid("trailing bytes after property value"));
    }
    Ok(value)
}

fn read_len_prefixed<'a>(buf: &'a [u8], cursor: &mut usize) -> Result<&'a [u8], DecodeError> {
    let len = read_var_u64(buf, cursor)?;
    let remaining = (buf.len() - *cursor) as u64;
    if len > remaining {
        return Err(DecodeError::Truncated("inline bytes"));
    }
    let len = len as usize;
    let data = &buf[*cursor..*cursor + len];
    *cursor += len;
    Ok(data)
}

fn write_var_u64(mut v: u64, out: &mut Vec<u8>) {
    loop {
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            out.push(byte);
            break;
        } else {
            out.push(byte | 0x80);
        }
    }
}

fn write_var_i64(v: i64, out: &mut Vec<u8>) {
    let zigzag = ((v << 1) ^ (v >> 63)) as u64;
    write_var_u64(zigzag, out);
}

fn read_var_u64(buf: &[u8], cursor: &mut usize) -> Result<u64, DecodeError> {
    let mut result = 0u64;
    let mut shift = 0u32;
    for _ in 0..10 {
        if *cursor >= buf.len() {
            return Err(DecodeError::Truncated("varint"));
        }
        let byte = buf[*cursor];
        *cursor += 1;
        result |= ((byte & 0x7f) as u64) << shift;
        if (byte & 0x80) == 0 {
            return Ok(result);
        }
        shift += 7;
    }
    Err(DecodeError::Invalid("varint too long"))
}

fn read_var_i64(buf: &[u8], cursor: &mut usize) -> Result<i64, DecodeError> {
    let raw = read_var_u64(buf, cursor)?;
    Ok(((raw >> 1) as i64) ^ (-((raw & 1) as i64)))
}
