//! Expression evaluation.
//!
//! [evaluate] folds constant length expressions while cases are compiled, so that
//! lengths can be validated early. [eval] runs any expression against the bindings
//! made so far in a case plus the caller's [Env].

use std::collections::BTreeMap;

use crate::{
    bits::Endian,
    errors::EvalError,
    expr::{BinOp, Expr, UnaryOp},
    value::Value,
};

/// Caller-supplied context for runtime evaluation.
///
/// Identifiers that no field binds are looked up here, as are calls to functions
/// the engine does not know. Both default to "not found".
pub trait Env {
    fn lookup(&self, _name: &str) -> Option<Value<'static>> {
        None
    }

    /// `None` means the function is unknown to this environment.
    fn call<'a>(&self, _name: &str, _args: &[Value<'a>]) -> Option<Result<Value<'a>, EvalError>> {
        None
    }
}

/// The empty environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEnv;

impl Env for NoEnv {}

impl Env for BTreeMap<String, Value<'static>> {
    fn lookup(&self, name: &str) -> Option<Value<'static>> {
        self.get(name).cloned()
    }
}

/// Bindings made by the fields of one case, innermost last.
#[derive(Debug, Clone, Default)]
pub struct Scope<'m, 'a> {
    entries: Vec<(&'m str, Value<'a>)>,
}

impl<'m, 'a> Scope<'m, 'a> {
    pub fn new() -> Self {
        Scope {
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, name: &'m str, value: Value<'a>) {
        self.entries.push((name, value));
    }

    /// The most recent binding of `name`.
    pub fn get(&self, name: &str) -> Option<&Value<'a>> {
        self.entries
            .iter()
            .rev()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every binding made after the scope had `mark` entries.
    pub fn truncate(&mut self, mark: usize) {
        self.entries.truncate(mark);
    }
}

fn is_arithmetic(op: BinOp) -> bool {
    matches!(
        op,
        BinOp::Add
            | BinOp::Sub
            | BinOp::Mul
            | BinOp::Div
            | BinOp::Mod
            | BinOp::And
            | BinOp::Or
            | BinOp::Xor
            | BinOp::Lsl
            | BinOp::Lsr
            | BinOp::Asr
    )
}

/// Applies an arithmetic or bitwise operator. Overflow is an error, not a wrap.
fn apply_int(op: BinOp, l: i64, r: i64) -> Result<i64, EvalError> {
    let shift = |r: i64| -> Result<u32, EvalError> {
        if (0..64).contains(&r) {
            Ok(r as u32)
        } else {
            Err(EvalError::ShiftOutOfRange(r))
        }
    };

    match op {
        BinOp::Add => l.checked_add(r).ok_or(EvalError::Overflow),
        BinOp::Sub => l.checked_sub(r).ok_or(EvalError::Overflow),
        BinOp::Mul => l.checked_mul(r).ok_or(EvalError::Overflow),
        BinOp::Div if r == 0 => Err(EvalError::DivisionByZero),
        BinOp::Div => l.checked_div(r).ok_or(EvalError::Overflow),
        BinOp::Mod if r == 0 => Err(EvalError::DivisionByZero),
        BinOp::Mod => Ok(l.wrapping_rem(r)),
        BinOp::And => Ok(l & r),
        BinOp::Or => Ok(l | r),
        BinOp::Xor => Ok(l ^ r),
        BinOp::Lsl => Ok(((l as u64) << shift(r)?) as i64),
        BinOp::Lsr => Ok(((l as u64) >> shift(r)?) as i64),
        BinOp::Asr => Ok(l >> shift(r)?),
        other => Err(EvalError::TypeMismatch(format!(
            "`{other:?}` is not an integer operator"
        ))),
    }
}

/// Constant-folds `expr`.
///
/// Returns `None` when the expression mentions anything other than integer literals
/// and the arithmetic/bitwise operators, or when folding would overflow or divide by zero.
pub fn evaluate(expr: &Expr) -> Option<i64> {
    match expr {
        Expr::Int(v) => Some(*v),
        Expr::Unary(UnaryOp::Neg, inner) => evaluate(inner)?.checked_neg(),
        Expr::Binary(op, lhs, rhs) if is_arithmetic(*op) => {
            apply_int(*op, evaluate(lhs)?, evaluate(rhs)?).ok()
        }
        _ => None,
    }
}

fn expect_int(value: &Value<'_>, context: &str) -> Result<i64, EvalError> {
    value.as_int().ok_or_else(|| {
        EvalError::TypeMismatch(format!("{context} expects an int, got {}", value.kind()))
    })
}

fn expect_bool(value: &Value<'_>, context: &str) -> Result<bool, EvalError> {
    value.as_bool().ok_or_else(|| {
        EvalError::TypeMismatch(format!("{context} expects a bool, got {}", value.kind()))
    })
}

fn lookup<'a>(name: &str, scope: &Scope<'_, 'a>, env: &dyn Env) -> Result<Value<'a>, EvalError> {
    if let Some(value) = scope.get(name) {
        return Ok(value.clone());
    }
    if let Some(value) = env.lookup(name) {
        return Ok(value);
    }

    match name {
        "littleendian" => Ok(Value::Endian(Endian::Little)),
        "bigendian" => Ok(Value::Endian(Endian::Big)),
        "nativeendian" => Ok(Value::Endian(Endian::Native)),
        _ => Err(EvalError::Unbound(name.to_string())),
    }
}

fn builtin<'a>(name: &str, args: &[Value<'a>]) -> Result<Value<'a>, EvalError> {
    match (name, args) {
        ("length", [Value::Bits(bits)]) => Ok(Value::Int(bits.len() as i64)),
        ("length", [Value::Str(bytes)]) => Ok(Value::Int(bytes.len() as i64)),
        ("length", _) => Err(EvalError::TypeMismatch(
            "length expects one bitstring or string".to_string(),
        )),
        _ => Err(EvalError::UnknownFunction(name.to_string())),
    }
}

fn compare<'a>(op: BinOp, lhs: Value<'a>, rhs: Value<'a>) -> Result<Value<'a>, EvalError> {
    let result = match op {
        BinOp::Eq => lhs == rhs,
        BinOp::Ne => lhs != rhs,
        _ => {
            let l = expect_int(&lhs, "comparison")?;
            let r = expect_int(&rhs, "comparison")?;
            match op {
                BinOp::Lt => l < r,
                BinOp::Le => l <= r,
                BinOp::Gt => l > r,
                _ => l >= r,
            }
        }
    };
    Ok(Value::Bool(result))
}

/// Evaluates `expr` against the bindings in `scope`, falling back to `env`.
pub fn eval<'a>(expr: &Expr, scope: &Scope<'_, 'a>, env: &dyn Env) -> Result<Value<'a>, EvalError> {
    match expr {
        Expr::Int(v) => Ok(Value::Int(*v)),
        Expr::Str(bytes) => Ok(Value::Str(bytes.clone())),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Wildcard => Err(EvalError::Wildcard),
        Expr::Ident(name) => lookup(name, scope, env),
        Expr::Unary(UnaryOp::Neg, inner) => {
            let v = expect_int(&eval(inner, scope, env)?, "negation")?;
            v.checked_neg().map(Value::Int).ok_or(EvalError::Overflow)
        }
        Expr::Unary(UnaryOp::Not, inner) => {
            let b = expect_bool(&eval(inner, scope, env)?, "not")?;
            Ok(Value::Bool(!b))
        }
        Expr::Binary(BinOp::AndAlso, lhs, rhs) => {
            if !expect_bool(&eval(lhs, scope, env)?, "&&")? {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(expect_bool(&eval(rhs, scope, env)?, "&&")?))
        }
        Expr::Binary(BinOp::OrElse, lhs, rhs) => {
            if expect_bool(&eval(lhs, scope, env)?, "||")? {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(expect_bool(&eval(rhs, scope, env)?, "||")?))
        }
        Expr::Binary(op, lhs, rhs) => {
            let l = eval(lhs, scope, env)?;
            let r = eval(rhs, scope, env)?;
            if is_arithmetic(*op) {
                let context = op.symbol();
                apply_int(*op, expect_int(&l, context)?, expect_int(&r, context)?)
                    .map(Value::Int)
            } else {
                compare(*op, l, r)
            }
        }
        Expr::Call(name, args) => {
            let args = args
                .iter()
                .map(|arg| eval(arg, scope, env))
                .collect::<Result<Vec<_>, _>>()?;
            match env.call(name, &args) {
                Some(result) => result,
                None => builtin(name, &args),
            }
        }
        Expr::Tuple(items) => items
            .iter()
            .map(|item| eval(item, scope, env))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Tuple),
    }
}
