//! Resolution of a field's qualifier list into a [FieldSpec].
//!
//! Qualifiers are either bare tokens (`int`, `signed`, `littleendian`, ...), calls taking
//! an expression (`endian(e)`, `bind(e)`, `check(e)`, `set_offset_at(e)`,
//! `save_offset_to(name)`), or a tuple of those. Tuples are resolved left to right and
//! every attribute may be written once.

use crate::{
    bits::Sign,
    errors::{Attribute, CompileError},
    expr::Expr,
};

/// How the bits of a field are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Fixed-width integer of 1 to 64 bits.
    Int,
    /// Whole bytes.
    String,
    /// A sub-view of the buffer.
    Bitstring,
}

impl FieldType {
    pub fn name(self) -> &'static str {
        match self {
            FieldType::Int => "int",
            FieldType::String => "string",
            FieldType::Bitstring => "bitstring",
        }
    }
}

/// Byte order of an int field, possibly chosen at match time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
    Native,
    /// Evaluated when the field is extracted; must produce an endian value.
    Referred(Expr),
}

/// Everything the qualifiers of one field say about it. Unset attributes are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSpec {
    pub value_type: Option<FieldType>,
    pub sign: Option<Sign>,
    pub endian: Option<Endianness>,
    /// Guard evaluated against the extracted value.
    pub check: Option<Expr>,
    /// Replaces the value bound by the field's pattern.
    pub bind: Option<Expr>,
    /// New cursor position, in bits from the start of the matched buffer.
    pub offset: Option<Expr>,
    /// Name bound to the field's starting offset.
    pub save_offset: Option<String>,
}

impl FieldSpec {
    /// Unsigned big-endian int: the spec of a field written without qualifiers.
    pub fn int() -> Self {
        FieldSpec {
            value_type: Some(FieldType::Int),
            sign: Some(Sign::Unsigned),
            endian: Some(Endianness::Big),
            ..Default::default()
        }
    }

    /// Fills in every unset type, sign and endian attribute with the [FieldSpec::int] default.
    pub fn with_defaults(self) -> Self {
        FieldSpec {
            value_type: self.value_type.or(Some(FieldType::Int)),
            sign: self.sign.or(Some(Sign::Unsigned)),
            endian: self.endian.or(Some(Endianness::Big)),
            ..self
        }
    }
}

fn set_once<T>(
    slot: Option<T>,
    value: T,
    attribute: Attribute,
    qualifier: &Expr,
) -> Result<Option<T>, CompileError> {
    match slot {
        Some(_) => Err(CompileError::DuplicateAttribute {
            attribute,
            qualifier: qualifier.to_string(),
        }),
        None => Ok(Some(value)),
    }
}

/// Resolves a qualifier expression into a fresh [FieldSpec].
pub fn resolve(qualifiers: &Expr) -> Result<FieldSpec, CompileError> {
    resolve_into(FieldSpec::default(), qualifiers)
}

/// Applies one qualifier (or tuple of qualifiers) on top of `spec`.
pub fn resolve_into(spec: FieldSpec, qualifier: &Expr) -> Result<FieldSpec, CompileError> {
    let q = qualifier;
    let unknown = || CompileError::UnknownQualifier(q.to_string());

    match q {
        Expr::Tuple(items) => items.iter().try_fold(spec, resolve_into),
        Expr::Ident(token) => {
            let value_type = |t: FieldType| -> Result<FieldSpec, CompileError> {
                Ok(FieldSpec {
                    value_type: set_once(spec.value_type, t, Attribute::Type, q)?,
                    ..spec.clone()
                })
            };
            let sign = |s: Sign| -> Result<FieldSpec, CompileError> {
                Ok(FieldSpec {
                    sign: set_once(spec.sign, s, Attribute::Sign, q)?,
                    ..spec.clone()
                })
            };
            let endian = |e: Endianness| -> Result<FieldSpec, CompileError> {
                Ok(FieldSpec {
                    endian: set_once(spec.endian.clone(), e, Attribute::Endian, q)?,
                    ..spec.clone()
                })
            };

            match token.as_str() {
                "int" => value_type(FieldType::Int),
                "string" => value_type(FieldType::String),
                "bitstring" => value_type(FieldType::Bitstring),
                "signed" => sign(Sign::Signed),
                "unsigned" => sign(Sign::Unsigned),
                "littleendian" => endian(Endianness::Little),
                "bigendian" => endian(Endianness::Big),
                "nativeendian" => endian(Endianness::Native),
                _ => Err(unknown()),
            }
        }
        Expr::Call(name, args) => match (name.as_str(), args.as_slice()) {
            ("endian", [e]) => Ok(FieldSpec {
                endian: set_once(spec.endian, Endianness::Referred(e.clone()), Attribute::Endian, q)?,
                ..spec
            }),
            ("check", [e]) => Ok(FieldSpec {
                check: set_once(spec.check, e.clone(), Attribute::Check, q)?,
                ..spec
            }),
            ("bind", [e]) => Ok(FieldSpec {
                bind: set_once(spec.bind, e.clone(), Attribute::Bind, q)?,
                ..spec
            }),
            ("set_offset_at", [e]) => Ok(FieldSpec {
                offset: set_once(spec.offset, e.clone(), Attribute::Offset, q)?,
                ..spec
            }),
            ("save_offset_to", [Expr::Ident(var)]) => Ok(FieldSpec {
                save_offset: set_once(spec.save_offset, var.clone(), Attribute::SaveOffset, q)?,
                ..spec
            }),
            _ => Err(unknown()),
        },
        _ => Err(unknown()),
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use proptest::sample::subsequence;

    use super::*;

    fn resolve_text(text: &str) -> Result<FieldSpec, CompileError> {
        resolve(&Expr::parse(text).unwrap())
    }

    #[test]
    fn test_single_qualifier() {
        let spec = resolve_text("signed").unwrap();
        assert_eq!(
            spec,
            FieldSpec {
                sign: Some(Sign::Signed),
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_tuple_of_qualifiers() {
        let spec = resolve_text("int, littleendian, signed, check(x > 1), bind(x * 2)").unwrap();
        assert_eq!(spec.value_type, Some(FieldType::Int));
        assert_eq!(spec.endian, Some(Endianness::Little));
        assert_eq!(spec.sign, Some(Sign::Signed));
        assert_eq!(spec.check, Some(Expr::parse("x > 1").unwrap()));
        assert_eq!(spec.bind, Some(Expr::parse("x * 2").unwrap()));
        assert_eq!(spec.offset, None);
        assert_eq!(spec.save_offset, None);
    }

    #[test]
    fn test_nested_tuples_and_calls() {
        let spec = resolve_text("(string, (endian(e), set_offset_at(32))), save_offset_to(at)")
            .unwrap();
        assert_eq!(spec.value_type, Some(FieldType::String));
        assert_eq!(spec.endian, Some(Endianness::Referred(Expr::ident("e"))));
        assert_eq!(spec.offset, Some(Expr::Int(32)));
        assert_eq!(spec.save_offset, Some("at".to_string()));
    }

    #[test]
    fn test_duplicate_attribute() {
        assert_eq!(
            resolve_text("signed, unsigned").unwrap_err(),
            CompileError::DuplicateAttribute {
                attribute: Attribute::Sign,
                qualifier: "unsigned".to_string(),
            }
        );
        assert!(matches!(
            resolve_text("bigendian, endian(e)").unwrap_err(),
            CompileError::DuplicateAttribute {
                attribute: Attribute::Endian,
                ..
            }
        ));
        assert!(matches!(
            resolve_text("check(a), check(b)").unwrap_err(),
            CompileError::DuplicateAttribute {
                attribute: Attribute::Check,
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_qualifier() {
        assert_eq!(
            resolve_text("int, float").unwrap_err(),
            CompileError::UnknownQualifier("float".to_string())
        );
        assert!(matches!(
            resolve_text("bind(a, b)").unwrap_err(),
            CompileError::UnknownQualifier(_)
        ));
        assert!(matches!(
            resolve_text("save_offset_to(1)").unwrap_err(),
            CompileError::UnknownQualifier(_)
        ));
        assert!(matches!(
            resolve_text("8").unwrap_err(),
            CompileError::UnknownQualifier(_)
        ));
    }

    #[test]
    fn test_defaults() {
        let spec = resolve_text("littleendian").unwrap().with_defaults();
        assert_eq!(spec.value_type, Some(FieldType::Int));
        assert_eq!(spec.sign, Some(Sign::Unsigned));
        assert_eq!(spec.endian, Some(Endianness::Little));
        assert_eq!(FieldSpec::default().with_defaults(), FieldSpec::int());
    }

    /// One qualifier text per attribute category, with the attribute it sets.
    fn category_choices() -> Vec<Vec<(&'static str, Attribute)>> {
        vec![
            vec![
                ("int", Attribute::Type),
                ("string", Attribute::Type),
                ("bitstring", Attribute::Type),
            ],
            vec![("signed", Attribute::Sign), ("unsigned", Attribute::Sign)],
            vec![
                ("littleendian", Attribute::Endian),
                ("bigendian", Attribute::Endian),
                ("nativeendian", Attribute::Endian),
                ("endian(e)", Attribute::Endian),
            ],
            vec![("check(v > 0)", Attribute::Check)],
            vec![("bind(v + 1)", Attribute::Bind)],
            vec![("set_offset_at(16)", Attribute::Offset)],
            vec![("save_offset_to(o)", Attribute::SaveOffset)],
        ]
    }

    fn distinct_qualifiers() -> impl Strategy<Value = Vec<(&'static str, Attribute)>> {
        let categories: Vec<_> = (0..category_choices().len()).collect();
        (subsequence(categories, 1..=7), any::<u64>()).prop_flat_map(|(picked, seed)| {
            let all = category_choices();
            let chosen: Vec<_> = picked
                .iter()
                .map(|&c| all[c][(seed as usize + c) % all[c].len()])
                .collect();
            Just(chosen).prop_shuffle()
        })
    }

    fn is_set(spec: &FieldSpec, attribute: Attribute) -> bool {
        match attribute {
            Attribute::Type => spec.value_type.is_some(),
            Attribute::Sign => spec.sign.is_some(),
            Attribute::Endian => spec.endian.is_some(),
            Attribute::Check => spec.check.is_some(),
            Attribute::Bind => spec.bind.is_some(),
            Attribute::Offset => spec.offset.is_some(),
            Attribute::SaveOffset => spec.save_offset.is_some(),
        }
    }

    const ALL_ATTRIBUTES: [Attribute; 7] = [
        Attribute::Type,
        Attribute::Sign,
        Attribute::Endian,
        Attribute::Check,
        Attribute::Bind,
        Attribute::Offset,
        Attribute::SaveOffset,
    ];

    proptest! {
        #[test]
        fn distinct_categories_resolve(qualifiers in distinct_qualifiers()) {
            let text = qualifiers.iter().map(|(q, _)| *q).collect::<Vec<_>>().join(", ");
            let spec = resolve_text(&text).unwrap();

            for attribute in ALL_ATTRIBUTES {
                let supplied = qualifiers.iter().any(|(_, a)| *a == attribute);
                prop_assert_eq!(is_set(&spec, attribute), supplied);
            }
        }

        #[test]
        fn repeated_category_is_rejected(
            qualifiers in distinct_qualifiers(),
            pick in any::<prop::sample::Index>(),
        ) {
            let (repeat, attribute) = qualifiers[pick.index(qualifiers.len())];
            let mut text = qualifiers.iter().map(|(q, _)| *q).collect::<Vec<_>>();
            text.push(repeat);
            let err = resolve_text(&text.join(", ")).unwrap_err();

            let is_duplicate = matches!(
                err,
                CompileError::DuplicateAttribute { attribute: a, .. } if a == attribute
            );
            prop_assert!(is_duplicate);
        }
    }
}
