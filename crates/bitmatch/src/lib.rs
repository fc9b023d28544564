//! # bitmatch
//!
//! Pattern matching over bit-level binary data.
//!
//! A match is an ordered list of cases. Each case is a list of fields written as
//! `pattern : length : qualifiers`, plus a body expression. Fields are read one after
//! another from the input, MSB first; the first case whose fields all match has its body
//! evaluated and returned.
//!
//! Qualifiers pick the field type (`int`, `string`, `bitstring`), the sign and the byte
//! order, and can attach `check(e)` guards, `bind(e)` rewrites, `set_offset_at(e)` jumps
//! and `save_offset_to(name)` bindings. A length of `-1` takes the rest of the input, and
//! a lone `_` field ends the case without looking at the remaining bits.
//!
//! ## Example
//!
//! ```
//! use bitmatch::{Matcher, Value};
//!
//! let matcher = Matcher::builder()
//!     .case("1 : 8, len : 8, payload : len * 8 : string, _", "payload")
//!     .case("2 : 8, x : 16 : littleendian, signed", "x")
//!     .case("_", "\"unknown\"")
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(matcher.run_bytes(b"\x01\x02hi!"), Ok(Value::Str(b"hi".to_vec())));
//! assert_eq!(matcher.run_bytes(&[2, 0xfe, 0xff]), Ok(Value::Int(-2)));
//! assert_eq!(matcher.run_bytes(&[9]), Ok(Value::Str(b"unknown".to_vec())));
//! ```

pub mod bits;
pub mod case;
pub mod errors;
pub mod eval;
pub mod expr;
pub mod field;
pub mod length;
pub mod matcher;
pub mod qualifier;
pub mod value;

#[cfg(feature = "serde")]
pub mod serde;

pub use bits::{BitWriter, Bitstring, Endian, Sign};
pub use case::Case;
pub use errors::{CompileError, EvalError, MatchError};
pub use eval::{Env, NoEnv};
pub use expr::Expr;
pub use matcher::Matcher;
pub use value::Value;
