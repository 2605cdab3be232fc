use std::cmp::Ordering;
use std::fmt;

use bytes::BufMut;

use crate::common::{Result, StoreError};

use super::DataType;

/// Pad byte for `Char` values
const CHAR_PAD: u8 = b' ';

/// Pad byte for `VarChar` values
const VARCHAR_PAD: u8 = 0;

/// Represents a typed value that can be stored in a tuple.
/// Each variant corresponds to exactly one DataType tag; the codec never coerces across tags.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// 32-bit signed integer
    Integer(i32),

    /// 64-bit floating point
    Double(f64),

    /// Boolean value
    Boolean(bool),

    /// Fixed-length text
    Char(String),

    /// Bounded variable-length text
    VarChar(String),
}

impl Value {
    /// Returns true if this value may be stored in an attribute of the given type.
    pub fn matches_type(&self, data_type: &DataType) -> bool {
        matches!(
            (self, data_type),
            (Value::Integer(_), DataType::Integer)
                | (Value::Double(_), DataType::Double)
                | (Value::Boolean(_), DataType::Boolean)
                | (Value::Char(_), DataType::Char(_))
                | (Value::VarChar(_), DataType::VarChar(_))
        )
    }

    /// Returns the name of this value's tag, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "INTEGER",
            Value::Double(_) => "DOUBLE",
            Value::Boolean(_) => "BOOLEAN",
            Value::Char(_) => "CHAR",
            Value::VarChar(_) => "VARCHAR",
        }
    }

    /// Returns the value with text padding removed, the form decode produces.
    /// Negative zero becomes positive zero so equal doubles are one key.
    pub fn canonical(&self) -> Value {
        match self {
            Value::Double(d) if *d == 0.0 => Value::Double(0.0),
            Value::Char(s) => Value::Char(s.trim_end_matches(CHAR_PAD as char).to_string()),
            Value::VarChar(s) => {
                Value::VarChar(s.trim_end_matches(VARCHAR_PAD as char).to_string())
            }
            other => other.clone(),
        }
    }

    /// Appends the fixed-width encoding of this value to `dst`.
    /// Fails with `SchemaMismatch` when the tag does not match the type and
    /// with `ValueTooLong` when text exceeds the declared length.
    pub fn encode_into(&self, data_type: &DataType, dst: &mut impl BufMut) -> Result<()> {
        match (self, data_type) {
            (Value::Integer(v), DataType::Integer) => dst.put_i32(*v),
            (Value::Double(v), DataType::Double) => dst.put_f64(*v),
            (Value::Boolean(b), DataType::Boolean) => dst.put_u8(u8::from(*b)),
            (Value::Char(s), DataType::Char(n)) => put_padded(dst, s, *n as usize, CHAR_PAD)?,
            (Value::VarChar(s), DataType::VarChar(n)) => {
                put_padded(dst, s, *n as usize, VARCHAR_PAD)?
            }
            (value, data_type) => {
                return Err(StoreError::SchemaMismatch(format!(
                    "{} value cannot be stored as {}",
                    value.type_name(),
                    data_type
                )))
            }
        }
        Ok(())
    }

    /// Encodes this value into a freshly allocated buffer of `data_type.width()` bytes.
    pub fn encode(&self, data_type: &DataType) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(data_type.width());
        self.encode_into(data_type, &mut bytes)?;
        Ok(bytes)
    }

    /// Decodes a value of the given type starting at `offset` in `data`.
    pub fn decode(data: &[u8], offset: usize, data_type: &DataType) -> Result<Self> {
        let width = data_type.width();
        let raw = offset
            .checked_add(width)
            .and_then(|end| data.get(offset..end))
            .ok_or_else(|| {
                StoreError::Corrupted(format!(
                    "{} needs {} bytes at offset {}, buffer has {}",
                    data_type,
                    width,
                    offset,
                    data.len()
                ))
            })?;

        let value = match data_type {
            DataType::Integer => Value::Integer(i32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]])),
            DataType::Double => {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(raw);
                Value::Double(f64::from_be_bytes(bytes))
            }
            DataType::Boolean => match raw[0] {
                0 => Value::Boolean(false),
                1 => Value::Boolean(true),
                other => {
                    return Err(StoreError::Corrupted(format!("invalid boolean byte {}", other)))
                }
            },
            DataType::Char(_) => Value::Char(trim_padded(raw, CHAR_PAD)?),
            DataType::VarChar(_) => Value::VarChar(trim_padded(raw, VARCHAR_PAD)?),
        };
        Ok(value)
    }

    /// Parses a textual literal as a value of the given type.
    /// Text literals may be wrapped in double quotes.
    pub fn parse_literal(text: &str, data_type: &DataType) -> Result<Self> {
        let malformed = || StoreError::MalformedLiteral {
            literal: text.to_string(),
            data_type: data_type.to_string(),
        };

        match data_type {
            DataType::Integer => text.trim().parse().map(Value::Integer).map_err(|_| malformed()),
            DataType::Double => text.trim().parse().map(Value::Double).map_err(|_| malformed()),
            DataType::Boolean => match text.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(Value::Boolean(true)),
                "false" => Ok(Value::Boolean(false)),
                _ => Err(malformed()),
            },
            DataType::Char(n) | DataType::VarChar(n) => {
                let inner = match text.strip_prefix('"') {
                    Some(rest) => rest.strip_suffix('"').ok_or_else(malformed)?,
                    None => text,
                };
                if inner.len() > *n as usize {
                    return Err(StoreError::ValueTooLong {
                        max: *n as usize,
                        actual: inner.len(),
                    });
                }
                Ok(if matches!(data_type, DataType::Char(_)) {
                    Value::Char(inner.to_string())
                } else {
                    Value::VarChar(inner.to_string())
                })
            }
        }
    }

    /// Compares two values of the same tag in their natural order.
    /// Returns None if the tags differ.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Double(a), Value::Double(b)) => Some(a.total_cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::Char(a), Value::Char(b)) | (Value::VarChar(a), Value::VarChar(b)) => {
                Some(a.as_bytes().cmp(b.as_bytes()))
            }
            _ => None,
        }
    }
}

fn put_padded(dst: &mut impl BufMut, s: &str, width: usize, pad: u8) -> Result<()> {
    let bytes = s.as_bytes();
    if bytes.len() > width {
        return Err(StoreError::ValueTooLong {
            max: width,
            actual: bytes.len(),
        });
    }
    dst.put_slice(bytes);
    dst.put_bytes(pad, width - bytes.len());
    Ok(())
}

fn trim_padded(raw: &[u8], pad: u8) -> Result<String> {
    let end = raw.iter().rposition(|&b| b != pad).map_or(0, |i| i + 1);
    String::from_utf8(raw[..end].to_vec())
        .map_err(|e| StoreError::Corrupted(format!("invalid UTF-8 in text value: {}", e)))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Char(s) | Value::VarChar(s) => write!(f, "\"{}\"", s),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_encoding_is_big_endian() {
        let bytes = Value::Integer(42).encode(&DataType::Integer).unwrap();
        assert_eq!(bytes, vec![0, 0, 0, 42]);

        let bytes = Value::Integer(-1).encode(&DataType::Integer).unwrap();
        assert_eq!(bytes, vec![0xFF; 4]);
        assert_eq!(
            Value::decode(&bytes, 0, &DataType::Integer).unwrap(),
            Value::Integer(-1)
        );
    }

    #[test]
    fn test_double_encoding() {
        let bytes = Value::Double(1.5).encode(&DataType::Double).unwrap();
        assert_eq!(bytes, 1.5f64.to_be_bytes().to_vec());
        assert_eq!(
            Value::decode(&bytes, 0, &DataType::Double).unwrap(),
            Value::Double(1.5)
        );
    }

    #[test]
    fn test_char_padding() {
        let val = Value::Char("hi".to_string());
        let bytes = val.encode(&DataType::Char(5)).unwrap();
        assert_eq!(bytes, vec![b'h', b'i', b' ', b' ', b' ']);
        assert_eq!(Value::decode(&bytes, 0, &DataType::Char(5)).unwrap(), val);
    }

    #[test]
    fn test_varchar_padding() {
        let val = Value::VarChar("ab ".to_string());
        let bytes = val.encode(&DataType::VarChar(4)).unwrap();
        assert_eq!(bytes, vec![b'a', b'b', b' ', 0]);
        // trailing spaces survive, only zero padding is trimmed
        assert_eq!(Value::decode(&bytes, 0, &DataType::VarChar(4)).unwrap(), val);
    }

    #[test]
    fn test_text_too_long_is_rejected() {
        let err = Value::Char("hello".into()).encode(&DataType::Char(4)).unwrap_err();
        assert!(matches!(err, StoreError::ValueTooLong { max: 4, actual: 5 }));
    }

    #[test]
    fn test_no_coercion_across_tags() {
        assert!(matches!(
            Value::Integer(1).encode(&DataType::Double),
            Err(StoreError::SchemaMismatch(_))
        ));
        assert!(matches!(
            Value::Char("a".into()).encode(&DataType::VarChar(4)),
            Err(StoreError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_decode_at_offset() {
        let mut buf = vec![0xAA, 0xBB];
        Value::Boolean(true).encode_into(&DataType::Boolean, &mut buf).unwrap();
        assert_eq!(
            Value::decode(&buf, 2, &DataType::Boolean).unwrap(),
            Value::Boolean(true)
        );
        assert!(matches!(
            Value::decode(&buf, 3, &DataType::Boolean),
            Err(StoreError::Corrupted(_))
        ));
    }

    #[test]
    fn test_parse_literal() {
        assert_eq!(
            Value::parse_literal(" 17 ", &DataType::Integer).unwrap(),
            Value::Integer(17)
        );
        assert_eq!(
            Value::parse_literal("2.5", &DataType::Double).unwrap(),
            Value::Double(2.5)
        );
        assert_eq!(
            Value::parse_literal("TRUE", &DataType::Boolean).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(
            Value::parse_literal("\"abc\"", &DataType::VarChar(5)).unwrap(),
            Value::VarChar("abc".into())
        );
        assert!(matches!(
            Value::parse_literal("12x", &DataType::Integer),
            Err(StoreError::MalformedLiteral { .. })
        ));
        assert!(matches!(
            Value::parse_literal("yes", &DataType::Boolean),
            Err(StoreError::MalformedLiteral { .. })
        ));
        assert!(matches!(
            Value::parse_literal("abcdef", &DataType::Char(3)),
            Err(StoreError::ValueTooLong { .. })
        ));
    }

    #[test]
    fn test_comparison() {
        assert_eq!(
            Value::Integer(10).compare(&Value::Integer(20)),
            Some(Ordering::Less)
        );
        assert_eq!(
            Value::Boolean(false).compare(&Value::Boolean(true)),
            Some(Ordering::Less)
        );
        assert_eq!(
            Value::VarChar("abc".into()).compare(&Value::VarChar("abd".into())),
            Some(Ordering::Less)
        );
        assert_eq!(Value::Integer(1).compare(&Value::Double(1.0)), None);
    }

    #[test]
    fn test_negative_zero_is_canonical_zero() {
        let zero = Value::Double(-0.0).canonical();
        assert_eq!(
            zero.compare(&Value::Double(0.0)),
            Some(Ordering::Equal)
        );
        assert_eq!(zero.encode(&DataType::Double).unwrap(), 0f64.to_be_bytes().to_vec());
    }
}
