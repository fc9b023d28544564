//! JSON-deserializable matcher description.
//!
//! A [MatcherDef] lists cases in the same text form accepted by [crate::Case::parse].
//! It is meant to be loaded from a file shipped with your application and compiled
//! once with `Matcher::try_from`.

use serde::{Deserialize, Serialize};

use crate::{case::Case, errors::CompileError, matcher::Matcher};

/// Top-level matcher definition: cases in the order they are tried.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MatcherDef {
    pub cases: Vec<CaseDef>,
}

/// One case, written as text.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CaseDef {
    /// Field list, e.g. `"len : 8, payload : len * 8 : string"`.
    pub fields: String,
    /// Expression evaluated when every field matches.
    pub body: String,
}

impl TryFrom<&CaseDef> for Case {
    type Error = CompileError;

    fn try_from(def: &CaseDef) -> Result<Self, Self::Error> {
        Case::parse(&def.fields, &def.body)
    }
}

impl TryFrom<MatcherDef> for Matcher {
    type Error = CompileError;

    fn try_from(def: MatcherDef) -> Result<Self, Self::Error> {
        let cases = def
            .cases
            .iter()
            .map(Case::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Matcher::compile(&cases)
    }
}
