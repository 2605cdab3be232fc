use std::fmt;

use bytes::{Buf, BufMut};

use crate::common::{Result, StoreError};

/// Attribute types a table schema can declare.
/// Every type encodes to a fixed number of bytes, so records have a fixed width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// 32-bit signed integer: 4 bytes, big-endian two's complement
    Integer,

    /// 64-bit floating point: 8 bytes, big-endian IEEE 754
    Double,

    /// Boolean: 1 byte (0 = false, 1 = true)
    Boolean,

    /// Fixed-length text: exactly n bytes, space-padded
    Char(u16),

    /// Bounded text: n bytes reserved, zero-padded
    VarChar(u16),
}

impl DataType {
    /// Returns the number of bytes a value of this type occupies in a record.
    pub fn width(&self) -> usize {
        match self {
            DataType::Integer => 4,
            DataType::Double => 8,
            DataType::Boolean => 1,
            DataType::Char(n) | DataType::VarChar(n) => *n as usize,
        }
    }

    /// Returns the type tag used in table metadata.
    pub fn type_id(&self) -> u8 {
        match self {
            DataType::Integer => 0,
            DataType::Double => 1,
            DataType::Boolean => 2,
            DataType::Char(_) => 3,
            DataType::VarChar(_) => 4,
        }
    }

    /// Writes the type descriptor for table metadata.
    /// Format: type_id (1 byte) + length (2 bytes, text types only)
    pub fn serialize(&self, dst: &mut impl BufMut) {
        dst.put_u8(self.type_id());
        if let DataType::Char(n) | DataType::VarChar(n) = self {
            dst.put_u16(*n);
        }
    }

    /// Reads a type descriptor written by [`DataType::serialize`].
    pub fn deserialize(src: &mut impl Buf) -> Result<Self> {
        if !src.has_remaining() {
            return Err(StoreError::Corrupted("truncated type descriptor".into()));
        }
        let type_id = src.get_u8();
        match type_id {
            0 => Ok(DataType::Integer),
            1 => Ok(DataType::Double),
            2 => Ok(DataType::Boolean),
            3 | 4 => {
                if src.remaining() < 2 {
                    return Err(StoreError::Corrupted("truncated text length".into()));
                }
                let n = src.get_u16();
                Ok(if type_id == 3 {
                    DataType::Char(n)
                } else {
                    DataType::VarChar(n)
                })
            }
            other => Err(StoreError::Corrupted(format!("unknown type id {}", other))),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Integer => write!(f, "INTEGER"),
            DataType::Double => write!(f, "DOUBLE"),
            DataType::Boolean => write!(f, "BOOLEAN"),
            DataType::Char(n) => write!(f, "CHAR({})", n),
            DataType::VarChar(n) => write!(f, "VARCHAR({})", n),
        }
    }
}
