//! Cases: an ordered field list plus the body evaluated when every field matches.

use crate::{
    bits::Bitstring,
    errors::{CompileError, EvalError},
    eval::{Env, Scope, eval},
    expr::Expr,
    field::{CompiledField, Field, parse_fields},
    value::Value,
};

/// One branch of a match, as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Case {
    /// Field list text, kept for diagnostics.
    pub source: String,
    pub fields: Vec<Field>,
    pub body: Expr,
}

impl Case {
    /// Builds a case from already parsed fields.
    pub fn new(fields: Vec<Field>, body: Expr) -> Self {
        let source = fields
            .iter()
            .map(Field::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        Case {
            source,
            fields,
            body,
        }
    }

    /// Parses `fields` (e.g. `"len : 8, payload : len * 8 : string"`) and `body`.
    pub fn parse(fields: &str, body: &str) -> Result<Case, CompileError> {
        Ok(Case {
            source: fields.trim().to_string(),
            fields: parse_fields(fields)?,
            body: Expr::parse(body)?,
        })
    }
}

/// A validated case.
#[derive(Debug, Clone)]
pub struct CompiledCase {
    pub source: String,
    /// Fields up to, not including, the first `_` that ends the case.
    pub fields: Vec<CompiledField>,
    pub body: Expr,
}

impl TryFrom<&Case> for CompiledCase {
    type Error = CompileError;

    fn try_from(case: &Case) -> Result<Self, Self::Error> {
        let fields = case
            .fields
            .iter()
            .take_while(|field| !field.is_rest())
            .map(|field| {
                CompiledField::compile(field).map_err(|e| e.in_field(&field.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CompiledCase {
            source: case.source.clone(),
            fields,
            body: case.body.clone(),
        })
    }
}

impl CompiledCase {
    /// Whether the case matches without looking at the input (`[_]` or no fields).
    pub fn is_unconditional(&self) -> bool {
        self.fields.is_empty()
    }

    /// Runs the fields in order against `bits` and evaluates the body if all of them match.
    ///
    /// Bindings live only as long as this call, so a case that fails part way leaves
    /// nothing behind for the next one.
    pub fn run<'a>(
        &self,
        bits: Bitstring<'a>,
        env: &dyn Env,
    ) -> Result<Option<Value<'a>>, EvalError> {
        let origin = bits.offset();
        let mut scope = Scope::new();
        let mut cursor = bits;

        for field in &self.fields {
            match field.step(cursor, origin, &mut scope, env)? {
                Some(next) => cursor = next,
                None => return Ok(None),
            }
        }

        eval(&self.body, &scope, env).map(Some)
    }
}
