//! Type-directed value encoding
//!
//! [`TypeCodec`] maps the type tags produced by symbol resolution to
//! fixed-width little-endian encodings. [`PokeValue`] is the tagged input
//! accepted by a poke: an integer with optional width, a 4-byte float, or
//! raw bytes.

use super::frame::MAX_FRAME_SIZE;
use crate::error::{DestraError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Symbolic encoding understood by the codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeTag {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    F32,
    F64,
    /// Space separated hex pairs
    Hex,
    /// ASCII text, cut at the first NUL
    Ascii,
    /// Raw bytes
    Bytes,
}

impl TypeTag {
    /// Canonical tag name
    pub fn name(self) -> &'static str {
        match self {
            TypeTag::U8 => "uint8",
            TypeTag::I8 => "int8",
            TypeTag::U16 => "uint16",
            TypeTag::I16 => "int16",
            TypeTag::U32 => "uint32",
            TypeTag::I32 => "int32",
            TypeTag::F32 => "float",
            TypeTag::F64 => "double",
            TypeTag::Hex => "hex",
            TypeTag::Ascii => "string",
            TypeTag::Bytes => "bytes",
        }
    }

    /// Encoded width in bytes; `None` for the variable-length display tags
    pub fn width(self) -> Option<usize> {
        match self {
            TypeTag::U8 | TypeTag::I8 => Some(1),
            TypeTag::U16 | TypeTag::I16 => Some(2),
            TypeTag::U32 | TypeTag::I32 | TypeTag::F32 => Some(4),
            TypeTag::F64 => Some(8),
            TypeTag::Hex | TypeTag::Ascii | TypeTag::Bytes => None,
        }
    }

    pub fn is_numeric(self) -> bool {
        self.width().is_some()
    }
}

impl FromStr for TypeTag {
    type Err = DestraError;

    fn from_str(s: &str) -> Result<Self> {
        let tag = match s.trim().to_ascii_lowercase().as_str() {
            "uint8" => TypeTag::U8,
            "int8" => TypeTag::I8,
            "uint16" => TypeTag::U16,
            "int16" => TypeTag::I16,
            "uint32" | "long unsigned int" | "unsigned long" => TypeTag::U32,
            "int32" | "long" | "long signed int" | "long int" => TypeTag::I32,
            "float" | "float32" => TypeTag::F32,
            "double" | "double64" => TypeTag::F64,
            "hex" => TypeTag::Hex,
            "string" | "ascii" => TypeTag::Ascii,
            "bytes" => TypeTag::Bytes,
            _ => return Err(DestraError::UnknownTypeTag(s.to_string())),
        };
        Ok(tag)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded target value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Bytes(Vec<u8>),
    Text(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unsigned(v) => write!(f, "{}", v),
            Value::Signed(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Bytes(b) => write!(f, "{}", hex_string(b)),
            Value::Text(s) => f.write_str(s),
        }
    }
}

fn hex_string(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_hex(text: &str) -> Result<Vec<u8>> {
    text.split_whitespace()
        .map(|pair| {
            u8::from_str_radix(pair, 16)
                .map_err(|_| DestraError::InvalidValue(format!("'{}' is not a hex byte", pair)))
        })
        .collect()
}

/// Stateless encoder/decoder over [`TypeTag`]
pub struct TypeCodec;

impl TypeCodec {
    /// Decode `bytes` according to the tag named `tag`
    pub fn decode(bytes: &[u8], tag: &str) -> Result<Value> {
        Self::decode_tag(bytes, tag.parse()?)
    }

    /// Decode `bytes` according to `tag`
    ///
    /// Fixed-width tags read the leading bytes and ignore the rest.
    pub fn decode_tag(bytes: &[u8], tag: TypeTag) -> Result<Value> {
        if let Some(needed) = tag.width() {
            if bytes.len() < needed {
                return Err(DestraError::InsufficientBytes {
                    tag: tag.name().to_string(),
                    needed,
                    got: bytes.len(),
                });
            }
        }

        let value = match tag {
            TypeTag::U8 => Value::Unsigned(bytes[0] as u64),
            TypeTag::I8 => Value::Signed(bytes[0] as i8 as i64),
            TypeTag::U16 => Value::Unsigned(u16::from_le_bytes([bytes[0], bytes[1]]) as u64),
            TypeTag::I16 => Value::Signed(i16::from_le_bytes([bytes[0], bytes[1]]) as i64),
            TypeTag::U32 => Value::Unsigned(u32::from_le_bytes(le4(bytes)) as u64),
            TypeTag::I32 => Value::Signed(i32::from_le_bytes(le4(bytes)) as i64),
            TypeTag::F32 => Value::Float(f32::from_le_bytes(le4(bytes)) as f64),
            TypeTag::F64 => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&bytes[..8]);
                Value::Float(f64::from_le_bytes(buf))
            }
            TypeTag::Hex => Value::Text(hex_string(bytes)),
            TypeTag::Ascii => {
                let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
                Value::Text(String::from_utf8_lossy(&bytes[..end]).into_owned())
            }
            TypeTag::Bytes => Value::Bytes(bytes.to_vec()),
        };
        Ok(value)
    }

    /// Encode `value` as `tag`, rejecting values the tag cannot represent
    pub fn encode(value: &Value, tag: TypeTag) -> Result<Vec<u8>> {
        let out_of_range = || {
            DestraError::InvalidValue(format!("{} does not fit {}", value, tag.name()))
        };

        let bytes = match tag {
            TypeTag::U8 => vec![u8::try_from(integer(value)?).map_err(|_| out_of_range())?],
            TypeTag::I8 => {
                let v = i8::try_from(integer(value)?).map_err(|_| out_of_range())?;
                v.to_le_bytes().to_vec()
            }
            TypeTag::U16 => u16::try_from(integer(value)?)
                .map_err(|_| out_of_range())?
                .to_le_bytes()
                .to_vec(),
            TypeTag::I16 => i16::try_from(integer(value)?)
                .map_err(|_| out_of_range())?
                .to_le_bytes()
                .to_vec(),
            TypeTag::U32 => u32::try_from(integer(value)?)
                .map_err(|_| out_of_range())?
                .to_le_bytes()
                .to_vec(),
            TypeTag::I32 => i32::try_from(integer(value)?)
                .map_err(|_| out_of_range())?
                .to_le_bytes()
                .to_vec(),
            TypeTag::F32 => (float(value)? as f32).to_le_bytes().to_vec(),
            TypeTag::F64 => float(value)?.to_le_bytes().to_vec(),
            TypeTag::Hex => match value {
                Value::Text(text) => parse_hex(text)?,
                Value::Bytes(b) => b.clone(),
                _ => return Err(out_of_range()),
            },
            TypeTag::Ascii => match value {
                Value::Text(text) if text.is_ascii() => text.as_bytes().to_vec(),
                _ => return Err(out_of_range()),
            },
            TypeTag::Bytes => match value {
                Value::Bytes(b) => b.clone(),
                _ => return Err(out_of_range()),
            },
        };
        Ok(bytes)
    }

    /// Parse user text into a value suitable for encoding as `tag`
    ///
    /// Integers accept a `0x` prefix; `hex` and `bytes` take space
    /// separated hex pairs.
    pub fn parse_value(text: &str, tag: TypeTag) -> Result<Value> {
        let text = text.trim();
        let invalid = || DestraError::InvalidValue(format!("'{}' is not a valid {}", text, tag));

        let value = match tag {
            TypeTag::U8 | TypeTag::U16 | TypeTag::U32 => {
                let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
                    Some(hex) => u64::from_str_radix(hex, 16),
                    None => text.parse::<u64>(),
                };
                Value::Unsigned(parsed.map_err(|_| invalid())?)
            }
            TypeTag::I8 | TypeTag::I16 | TypeTag::I32 => {
                let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
                    Some(hex) => i64::from_str_radix(hex, 16),
                    None => text.parse::<i64>(),
                };
                Value::Signed(parsed.map_err(|_| invalid())?)
            }
            TypeTag::F32 | TypeTag::F64 => Value::Float(text.parse().map_err(|_| invalid())?),
            TypeTag::Hex | TypeTag::Bytes => Value::Bytes(parse_hex(text)?),
            TypeTag::Ascii => Value::Text(text.to_string()),
        };
        Ok(value)
    }
}

fn le4(bytes: &[u8]) -> [u8; 4] {
    [bytes[0], bytes[1], bytes[2], bytes[3]]
}

fn integer(value: &Value) -> Result<i128> {
    match value {
        Value::Unsigned(v) => Ok(*v as i128),
        Value::Signed(v) => Ok(*v as i128),
        Value::Float(v) if v.fract() == 0.0 && v.is_finite() => Ok(*v as i128),
        other => Err(DestraError::InvalidValue(format!(
            "{:?} is not an integer",
            other
        ))),
    }
}

fn float(value: &Value) -> Result<f64> {
    match value {
        Value::Float(v) => Ok(*v),
        Value::Unsigned(v) => Ok(*v as f64),
        Value::Signed(v) => Ok(*v as f64),
        other => Err(DestraError::InvalidValue(format!("{:?} is not a number", other))),
    }
}

/// Value accepted by a poke
#[derive(Debug, Clone, PartialEq)]
pub enum PokeValue {
    /// Integer; without a width it is sized to 1, 2 or 4 bytes by magnitude
    Int { value: i64, width: Option<u8> },
    /// IEEE-754 single, 4 bytes
    Float32(f32),
    /// Bytes written verbatim
    Raw(Vec<u8>),
}

impl PokeValue {
    pub fn int(value: i64) -> Self {
        PokeValue::Int { value, width: None }
    }

    pub fn int_with_width(value: i64, width: u8) -> Self {
        PokeValue::Int {
            value,
            width: Some(width),
        }
    }

    /// Smallest of 1, 2 or 4 bytes that holds `value` as signed or unsigned
    pub fn auto_width(value: i64) -> Result<u8> {
        match value {
            -128..=255 => Ok(1),
            -32_768..=65_535 => Ok(2),
            -2_147_483_648..=4_294_967_295 => Ok(4),
            _ => Err(DestraError::InvalidValue(format!(
                "{} does not fit in 4 bytes",
                value
            ))),
        }
    }

    /// Little-endian bytes to transmit
    pub fn encode(&self) -> Result<Vec<u8>> {
        match self {
            PokeValue::Int { value, width } => {
                let width = match width {
                    Some(w @ (1 | 2 | 4)) => *w,
                    Some(w) => {
                        return Err(DestraError::InvalidValue(format!(
                            "integer width must be 1, 2 or 4, got {}",
                            w
                        )))
                    }
                    None => Self::auto_width(*value)?,
                };
                let bits = width as u32 * 8;
                let min = -(1i64 << (bits - 1));
                let max = (1i64 << bits) - 1;
                if *value < min || *value > max {
                    return Err(DestraError::InvalidValue(format!(
                        "{} does not fit in {} byte(s)",
                        value, width
                    )));
                }
                Ok(value.to_le_bytes()[..width as usize].to_vec())
            }
            PokeValue::Float32(v) => Ok(v.to_le_bytes().to_vec()),
            PokeValue::Raw(bytes) => {
                if bytes.is_empty() || bytes.len() > MAX_FRAME_SIZE {
                    return Err(DestraError::SizeOutOfRange { size: bytes.len() });
                }
                Ok(bytes.clone())
            }
        }
    }
}
