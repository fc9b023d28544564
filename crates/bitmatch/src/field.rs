//! Fields: one `pattern : length : qualifiers` step of a case.
//!
//! A [Field] is what the user wrote. [CompiledField] is the same field after its
//! qualifiers were resolved and its length and pattern validated, ready to be run
//! against a cursor.

use crate::{
    bits::{Bitstring, Endian, Sign},
    errors::{CompileError, EvalError},
    eval::{Env, Scope, eval, evaluate},
    expr::{Expr, UnaryOp},
    length::{self, REST},
    qualifier::{self, Endianness, FieldSpec, FieldType},
    value::Value,
};

/// What a field's extracted value is matched against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    /// `_`: accept and discard.
    Wildcard,
    /// Bind the value to a name.
    Bind(String),
    /// Accept only this integer.
    Int(i64),
    /// Accept only these bytes.
    Str(Vec<u8>),
}

impl TryFrom<&Expr> for Pattern {
    type Error = CompileError;

    fn try_from(expr: &Expr) -> Result<Self, Self::Error> {
        match expr {
            Expr::Wildcard => Ok(Pattern::Wildcard),
            Expr::Ident(name) => Ok(Pattern::Bind(name.clone())),
            Expr::Int(v) => Ok(Pattern::Int(*v)),
            Expr::Str(bytes) => Ok(Pattern::Str(bytes.clone())),
            Expr::Unary(UnaryOp::Neg, inner) => match inner.as_ref() {
                Expr::Int(v) => Ok(Pattern::Int(v.wrapping_neg())),
                _ => Err(CompileError::malformed(
                    &expr.to_string(),
                    "patterns must be a name, `_` or a literal",
                )),
            },
            _ => Err(CompileError::malformed(
                &expr.to_string(),
                "patterns must be a name, `_` or a literal",
            )),
        }
    }
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pattern::Wildcard => f.write_str("_"),
            Pattern::Bind(name) => f.write_str(name),
            Pattern::Int(v) => write!(f, "{v}"),
            Pattern::Str(bytes) => write!(f, "{:?}", String::from_utf8_lossy(bytes)),
        }
    }
}

/// One field as written: a pattern, an optional length and optional qualifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub pattern: Pattern,
    /// Length in bits. `None` only for the `_` field that ends a case early.
    pub length: Option<Expr>,
    /// Resolved qualifiers. `None` means an unsigned big-endian int.
    pub spec: Option<FieldSpec>,
}

impl Field {
    pub fn new(pattern: Pattern, length: Option<Expr>, spec: Option<FieldSpec>) -> Self {
        Field {
            pattern,
            length,
            spec,
        }
    }

    /// The lone `_` that makes a case ignore whatever follows.
    pub fn rest() -> Self {
        Field::new(Pattern::Wildcard, None, None)
    }

    pub fn is_rest(&self) -> bool {
        self.pattern == Pattern::Wildcard && self.length.is_none() && self.spec.is_none()
    }

    /// Parses one `pattern : length : qualifiers` descriptor.
    pub fn parse(text: &str) -> Result<Field, CompileError> {
        let parts = split_top_level(text, &[':']);
        let parse = |part: &str| Expr::parse(part).map_err(|e| e.in_field(text));

        match parts.as_slice() {
            [pattern] => {
                let pattern = parse(pattern)?;
                if pattern == Expr::Wildcard {
                    Ok(Field::rest())
                } else {
                    Err(CompileError::malformed(text, "missing length"))
                }
            }
            [pattern, length] => Ok(Field::new(
                Pattern::try_from(&parse(pattern)?).map_err(|e| e.in_field(text))?,
                Some(parse(length)?),
                Some(FieldSpec::int()),
            )),
            [pattern, length, qualifiers] => {
                let spec = qualifier::resolve(&parse(qualifiers)?)
                    .map_err(|e| e.in_field(text))?
                    .with_defaults();
                Ok(Field::new(
                    Pattern::try_from(&parse(pattern)?).map_err(|e| e.in_field(text))?,
                    Some(parse(length)?),
                    Some(spec),
                ))
            }
            _ => Err(CompileError::malformed(
                text,
                "expected `pattern : length : qualifiers`",
            )),
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.length {
            Some(length) => write!(f, "{} : {}", self.pattern, length),
            None => write!(f, "{}", self.pattern),
        }
    }
}

/// Splits a list of field descriptors.
///
/// Fields are separated by `;` or `,`. A comma-separated item without a `:` (other than a
/// bare `_`) that follows a field which already has qualifiers is another qualifier of
/// that field, so `x : 16 : littleendian, signed` stays one field.
pub fn parse_fields(text: &str) -> Result<Vec<Field>, CompileError> {
    let mut descriptors: Vec<String> = Vec::new();
    let mut previous_has_qualifiers = false;

    for (item, separator) in split_with_separators(text, &[';', ',']) {
        let colons = split_top_level(&item, &[':']).len() - 1;
        let continues = separator == Some(',')
            && previous_has_qualifiers
            && colons == 0
            && item.trim() != "_";

        match descriptors.last_mut() {
            Some(last) if continues => {
                last.push(',');
                last.push_str(&item);
            }
            _ => {
                if item.trim().is_empty() {
                    return Err(CompileError::malformed(text, "empty field"));
                }
                descriptors.push(item);
                previous_has_qualifiers = colons >= 2;
            }
        }
    }

    descriptors.iter().map(|d| Field::parse(d)).collect()
}

/// Splits on `separators` outside parentheses and string literals.
fn split_top_level(text: &str, separators: &[char]) -> Vec<String> {
    split_with_separators(text, separators)
        .into_iter()
        .map(|(item, _)| item)
        .collect()
}

/// Like [split_top_level], also returning the separator that preceded each item.
fn split_with_separators(text: &str, separators: &[char]) -> Vec<(String, Option<char>)> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut preceding = None;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if in_string {
            current.push(c);
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                current.push(c);
            }
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            _ if depth == 0 && separators.contains(&c) => {
                items.push((std::mem::take(&mut current), preceding));
                preceding = Some(c);
            }
            _ => current.push(c),
        }
    }

    items.push((current, preceding));
    items
}

/// A field whose qualifiers, length and pattern passed every compile-time check.
#[derive(Debug, Clone)]
pub struct CompiledField {
    /// The descriptor text, for diagnostics.
    pub source: String,
    pub pattern: Pattern,
    pub value_type: FieldType,
    pub length: Expr,
    /// Length folded at compile time, if it was constant.
    pub static_length: Option<i64>,
    pub sign: Sign,
    pub endian: Endianness,
    pub check: Option<Expr>,
    pub bind: Option<Expr>,
    pub offset: Option<Expr>,
    pub save_offset: Option<String>,
}

impl CompiledField {
    /// Validates `field`. Must not be called for [Field::rest].
    pub fn compile(field: &Field) -> Result<CompiledField, CompileError> {
        let spec = field.spec.clone().unwrap_or_else(FieldSpec::int);
        let length = field
            .length
            .clone()
            .ok_or_else(|| CompileError::malformed(&field.pattern.to_string(), "missing length"))?;
        let static_length = evaluate(&length);

        length::validate(spec.value_type, static_length)?;
        let value_type = spec.value_type.ok_or(CompileError::MissingType)?;

        match (&field.pattern, value_type) {
            (Pattern::Wildcard | Pattern::Bind(_), _) => {}
            (pattern, FieldType::Bitstring) => {
                return Err(CompileError::InvalidBitstringPattern(pattern.to_string()));
            }
            (Pattern::Int(_), FieldType::Int) | (Pattern::Str(_), FieldType::String) => {}
            (pattern, ty) => {
                return Err(CompileError::InvalidPattern {
                    pattern: pattern.to_string(),
                    ty: ty.name(),
                });
            }
        }

        Ok(CompiledField {
            source: field.to_string(),
            pattern: field.pattern.clone(),
            value_type,
            length,
            static_length,
            sign: spec.sign.unwrap_or_default(),
            endian: spec.endian.unwrap_or(Endianness::Big),
            check: spec.check,
            bind: spec.bind,
            offset: spec.offset,
            save_offset: spec.save_offset,
        })
    }

    fn resolve_endian(&self, scope: &Scope<'_, '_>, env: &dyn Env) -> Result<Endian, EvalError> {
        match &self.endian {
            Endianness::Little => Ok(Endian::Little),
            Endianness::Big => Ok(Endian::Big),
            Endianness::Native => Ok(Endian::Native),
            Endianness::Referred(expr) => match eval(expr, scope, env)? {
                Value::Endian(endian) => Ok(endian),
                other => Err(EvalError::TypeMismatch(format!(
                    "endian() expects an endian value, got {}",
                    other.kind()
                ))),
            },
        }
    }

    /// Reads the field's raw value from the front of `cursor`.
    ///
    /// Returns the value and the cursor left for the next field, or `None` when the
    /// buffer is too short or the runtime length is illegal for the type.
    fn extract<'a>(
        &self,
        cursor: Bitstring<'a>,
        length: i64,
        scope: &Scope<'_, 'a>,
        env: &dyn Env,
    ) -> Result<Option<(Value<'a>, Bitstring<'a>)>, EvalError> {
        if !length::accepts(self.value_type, length) {
            return Ok(None);
        }

        let n = if length == REST {
            cursor.len()
        } else {
            length as usize
        };
        if n > cursor.len() {
            return Ok(None);
        }
        let next = cursor.skip(n)?;

        let value = match self.value_type {
            FieldType::Bitstring => Value::Bits(cursor.sub(0, n)?),
            // The rest of the input, last byte zero padded.
            FieldType::String if length == REST => Value::Str(cursor.to_bytes()),
            FieldType::String => Value::Str(cursor.get_bytes(0, n / 8)?),
            FieldType::Int => {
                let endian = self.resolve_endian(scope, env)?;
                Value::Int(cursor.get_int(0, n, self.sign, endian)?)
            }
        };

        Ok(Some((value, next)))
    }

    /// Runs the field against `cursor`, pushing its bindings onto `scope`.
    ///
    /// On success returns the cursor for the next field. `None` means the field did
    /// not match; the caller discards whatever this call pushed.
    pub fn step<'m, 'a>(
        &'m self,
        cursor: Bitstring<'a>,
        origin: usize,
        scope: &mut Scope<'m, 'a>,
        env: &dyn Env,
    ) -> Result<Option<Bitstring<'a>>, EvalError> {
        if let Some(name) = &self.save_offset {
            scope.push(name, Value::Int((cursor.offset() - origin) as i64));
        }

        let length = match self.static_length {
            Some(length) => length,
            None => match eval(&self.length, scope, env)? {
                Value::Int(length) => length,
                other => {
                    return Err(EvalError::TypeMismatch(format!(
                        "length of `{}` must be an int, got {}",
                        self.source,
                        other.kind()
                    )));
                }
            },
        };

        let Some((raw, mut next)) = self.extract(cursor, length, scope, env)? else {
            return Ok(None);
        };

        let value = match (&self.bind, &self.pattern) {
            (Some(bind), Pattern::Bind(name)) => {
                scope.push(name, raw);
                let bound = eval(bind, scope, env)?;
                scope.truncate(scope.len() - 1);
                bound
            }
            (Some(bind), _) => eval(bind, scope, env)?,
            (None, _) => raw,
        };

        if let Pattern::Bind(name) = &self.pattern {
            scope.push(name, value.clone());
        }

        if let Some(check) = &self.check {
            match eval(check, scope, env)? {
                Value::Bool(true) => {}
                Value::Bool(false) => return Ok(None),
                other => {
                    return Err(EvalError::TypeMismatch(format!(
                        "check() expects a bool, got {}",
                        other.kind()
                    )));
                }
            }
        }

        let matched = match &self.pattern {
            Pattern::Wildcard | Pattern::Bind(_) => true,
            Pattern::Int(expected) => value == Value::Int(*expected),
            Pattern::Str(expected) => value.as_bytes() == Some(expected.as_slice()),
        };
        if !matched {
            return Ok(None);
        }

        if let Some(offset) = &self.offset {
            let end = next.offset() + next.len();
            let target = match eval(offset, scope, env)? {
                Value::Int(target) => target,
                other => {
                    return Err(EvalError::TypeMismatch(format!(
                        "set_offset_at() expects an int, got {}",
                        other.kind()
                    )));
                }
            };

            let absolute = usize::try_from(target).ok().map(|t| origin + t);
            match absolute {
                Some(at) if at <= end => {
                    next = Bitstring::from_parts(next.data(), at, end - at)?;
                }
                _ => return Ok(None),
            }
        }

        Ok(Some(next))
    }
}
