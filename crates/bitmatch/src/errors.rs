//! Error types for case compilation, bit reading/writing and dispatch.

use std::fmt;

/// A field attribute that qualifiers may set. Each one can be set at most once per field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    Type,
    Sign,
    Endian,
    Check,
    Bind,
    Offset,
    SaveOffset,
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Attribute::Type => "type",
            Attribute::Sign => "sign",
            Attribute::Endian => "endian",
            Attribute::Check => "check",
            Attribute::Bind => "bind",
            Attribute::Offset => "offset",
            Attribute::SaveOffset => "save_offset",
        };
        f.write_str(name)
    }
}

/// Errors produced while turning case descriptions into a [crate::Matcher].
///
/// All of these are fatal: compilation stops at the first one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    /// The expression text could not be parsed.
    #[error("syntax error at column {column}: {message}")]
    Syntax { column: usize, message: String },
    /// A field descriptor does not have the `pattern : length : qualifiers` shape.
    #[error("malformed field `{field}`: {reason}")]
    MalformedField { field: String, reason: String },
    /// Two qualifiers wrote the same attribute.
    #[error("qualifier `{qualifier}` sets the {attribute} attribute a second time")]
    DuplicateAttribute {
        attribute: Attribute,
        qualifier: String,
    },
    /// A qualifier token or call that is not part of the language.
    #[error("unknown qualifier `{0}`")]
    UnknownQualifier(String),
    /// The field spec carries no value type.
    #[error("field has no value type")]
    MissingType,
    /// A statically known length is illegal for the field type.
    #[error("{0}")]
    LengthRange(String),
    /// Bitstring fields only accept a plain name or `_` as pattern.
    #[error("bitstring pattern `{0}` must be a plain binding or `_`")]
    InvalidBitstringPattern(String),
    /// Pattern cannot be matched against values of the field type.
    #[error("pattern `{pattern}` cannot match a {ty} field")]
    InvalidPattern { pattern: String, ty: &'static str },
    /// Wraps another error with the text of the field it came from.
    #[error("in field `{field}`: {source}")]
    InField {
        field: String,
        source: Box<CompileError>,
    },
}

impl CompileError {
    pub(crate) fn syntax(column: usize, message: impl Into<String>) -> Self {
        CompileError::Syntax {
            column,
            message: message.into(),
        }
    }

    pub(crate) fn malformed(field: &str, reason: impl Into<String>) -> Self {
        CompileError::MalformedField {
            field: field.trim().to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn in_field(self, field: &str) -> Self {
        match self {
            CompileError::InField { .. } => self,
            other => CompileError::InField {
                field: field.trim().to_string(),
                source: Box::new(other),
            },
        }
    }

    /// Strips any [CompileError::InField] context and returns the underlying error.
    pub fn root(&self) -> &CompileError {
        match self {
            CompileError::InField { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Errors produced when reading bits out of a [crate::bits::Bitstring].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReadError {
    /// Requested bit range is beyond the end of the view.
    #[error("bit range is out of bounds")]
    OutOfBounds,
    /// More than 64 bits (or zero bits) were requested for one integer.
    #[error("integer width must be between 1 and 64 bits, got {0}")]
    InvalidWidth(usize),
}

/// Errors produced when building a buffer with [crate::bits::BitWriter].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WriteError {
    #[error("integer width must be between 1 and 64 bits, got {0}")]
    InvalidWidth(usize),
    /// Value does not fit in the requested width.
    #[error("value {value} does not fit in {width} bits")]
    InvalidValue { value: i64, width: usize },
}

/// Errors raised while evaluating an expression at match time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    #[error("unbound identifier `{0}`")]
    Unbound(String),
    #[error("`_` cannot be used as a value")]
    Wildcard,
    #[error("unknown function `{0}`")]
    UnknownFunction(String),
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow")]
    Overflow,
    #[error("shift amount {0} is out of range")]
    ShiftOutOfRange(i64),
    #[error(transparent)]
    Read(#[from] ReadError),
}

/// Errors returned by [crate::Matcher::run].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    /// Every case fell through.
    #[error("no case matched the input")]
    NoMatch,
    /// An expression inside a case could not be evaluated.
    #[error(transparent)]
    Eval(#[from] EvalError),
}
