//! Values produced by field extraction and expression evaluation.

use crate::bits::{Bitstring, Endian};

/// A value bound by a field or computed by an expression.
///
/// Integers of any width are carried as `i64`; a 64-bit unsigned field keeps its bit
/// pattern, so values above `i64::MAX` read back negative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value<'a> {
    Int(i64),
    Bool(bool),
    /// Bytes of a string field or literal. Not required to be UTF-8.
    Str(Vec<u8>),
    /// A view into the matched buffer.
    Bits(Bitstring<'a>),
    Endian(Endian),
    Tuple(Vec<Value<'a>>),
}

impl<'a> Value<'a> {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Str(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_bits(&self) -> Option<Bitstring<'a>> {
        match self {
            Value::Bits(bits) => Some(*bits),
            _ => None,
        }
    }

    /// Short name of the variant, used in type mismatch messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
            Value::Bits(_) => "bitstring",
            Value::Endian(_) => "endian",
            Value::Tuple(_) => "tuple",
        }
    }
}

impl From<i64> for Value<'_> {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<bool> for Value<'_> {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value<'_> {
    fn from(value: &str) -> Self {
        Value::Str(value.as_bytes().to_vec())
    }
}

impl<'a> From<Bitstring<'a>> for Value<'a> {
    fn from(value: Bitstring<'a>) -> Self {
        Value::Bits(value)
    }
}
