//! Matcher: an ordered set of compiled cases tried against a bitstring.

use crate::{
    bits::Bitstring,
    case::{Case, CompiledCase},
    errors::{CompileError, MatchError},
    eval::{Env, NoEnv},
    value::Value,
};

/// A compiled list of cases. Use [Matcher::compile] or [Matcher::builder] to build one,
/// then [Matcher::run] to match a buffer.
#[derive(Debug, Clone)]
pub struct Matcher {
    /// Compiled cases in declaration order.
    pub cases: Vec<CompiledCase>,
}

/// Where the dispatcher is in its walk over the cases.
enum Dispatch<'a> {
    Running(usize),
    Matched(Value<'a>),
    Exhausted,
}

impl Matcher {
    /// Compiles every case. Fails on the first invalid one.
    pub fn compile(cases: &[Case]) -> Result<Self, CompileError> {
        let cases = cases
            .iter()
            .map(CompiledCase::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { cases })
    }

    pub fn builder() -> MatcherBuilder {
        MatcherBuilder::default()
    }

    /// Matches `bits` with no caller environment.
    pub fn run<'a>(&self, bits: Bitstring<'a>) -> Result<Value<'a>, MatchError> {
        self.run_with(bits, &NoEnv)
    }

    /// Tries each case in order and returns the body value of the first one that matches.
    ///
    /// Fails with [MatchError::NoMatch] when every case falls through, or with
    /// [MatchError::Eval] as soon as an expression cannot be evaluated.
    pub fn run_with<'a>(&self, bits: Bitstring<'a>, env: &dyn Env) -> Result<Value<'a>, MatchError> {
        let mut state = Dispatch::Running(0);

        loop {
            state = match state {
                Dispatch::Running(index) => match self.cases.get(index) {
                    Some(case) => match case.run(bits, env)? {
                        Some(value) => Dispatch::Matched(value),
                        None => Dispatch::Running(index + 1),
                    },
                    None => Dispatch::Exhausted,
                },
                Dispatch::Matched(value) => return Ok(value),
                Dispatch::Exhausted => return Err(MatchError::NoMatch),
            };
        }
    }

    /// Convenience wrapper around [Matcher::run] for a whole byte slice.
    pub fn run_bytes<'a>(&self, data: &'a [u8]) -> Result<Value<'a>, MatchError> {
        self.run(Bitstring::new(data))
    }
}

/// Collects cases as text and compiles them in one go.
#[derive(Debug, Default)]
pub struct MatcherBuilder {
    cases: Vec<(String, String)>,
}

impl MatcherBuilder {
    /// Adds a case: a field list and the body to evaluate when it matches.
    pub fn case(mut self, fields: impl Into<String>, body: impl Into<String>) -> Self {
        self.cases.push((fields.into(), body.into()));
        self
    }

    pub fn build(self) -> Result<Matcher, CompileError> {
        let cases = self
            .cases
            .iter()
            .map(|(fields, body)| Case::parse(fields, body))
            .collect::<Result<Vec<_>, _>>()?;
        Matcher::compile(&cases)
    }
}
