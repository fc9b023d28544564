//! Static validation of field lengths.
//!
//! A length of `-1` means "the rest of the buffer" and is allowed for strings and
//! bitstrings only. Lengths that cannot be folded to a constant are left to the
//! runtime checks in [crate::field].

use crate::{errors::CompileError, qualifier::FieldType};

/// Length sentinel for "everything that is left".
pub const REST: i64 = -1;

/// Checks a (possibly unknown) length against the rules of the field type.
pub fn validate(value_type: Option<FieldType>, length: Option<i64>) -> Result<(), CompileError> {
    let value_type = value_type.ok_or(CompileError::MissingType)?;
    let Some(length) = length else {
        return Ok(());
    };

    match value_type {
        FieldType::Int if !(1..=64).contains(&length) => Err(CompileError::LengthRange(format!(
            "int fields must be 1 to 64 bits long, got {length}"
        ))),
        FieldType::String if length != REST && (length <= 0 || length % 8 != 0) => {
            Err(CompileError::LengthRange(format!(
                "string fields must be -1 or a positive multiple of 8 bits long, got {length}"
            )))
        }
        FieldType::Bitstring if length < REST => Err(CompileError::LengthRange(format!(
            "bitstring fields must be -1 or at least 0 bits long, got {length}"
        ))),
        _ => Ok(()),
    }
}

/// Whether a length computed at match time is usable for the field type.
pub(crate) fn accepts(value_type: FieldType, length: i64) -> bool {
    validate(Some(value_type), Some(length)).is_ok()
}
