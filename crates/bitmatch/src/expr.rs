//! Expressions used for field patterns, lengths, qualifiers and case bodies.
//!
//! The grammar is small and host independent. Precedence, loosest first:
//!
//! | level | operators |
//! |-------|-----------|
//! | 1 | `,` (tuple, top level and inside parentheses) |
//! | 2 | `\|\|` |
//! | 3 | `&&` |
//! | 4 | `=` `==` `<>` `!=` `<` `<=` `>` `>=` |
//! | 5 | `lor` `\|` `lxor` `^` |
//! | 6 | `land` `&` |
//! | 7 | `lsl` `<<` `lsr` `asr` `>>` |
//! | 8 | `+` `-` |
//! | 9 | `*` `/` `mod` `%` |
//! | 10 | unary `-`, `not`, `!` |

use std::fmt;

use crate::errors::CompileError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Lsl,
    Lsr,
    Asr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    AndAlso,
    OrElse,
}

impl BinOp {
    pub(crate) fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "mod",
            BinOp::And => "land",
            BinOp::Or => "lor",
            BinOp::Xor => "lxor",
            BinOp::Lsl => "lsl",
            BinOp::Lsr => "lsr",
            BinOp::Asr => "asr",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::AndAlso => "&&",
            BinOp::OrElse => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Int(i64),
    Str(Vec<u8>),
    Bool(bool),
    Ident(String),
    Wildcard,
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    Tuple(Vec<Expr>),
}

impl Expr {
    /// Parses a complete expression. A top-level comma list becomes a [Expr::Tuple].
    pub fn parse(text: &str) -> Result<Expr, CompileError> {
        let tokens = tokenize(text)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let expr = parser.tuple()?;

        match parser.peek() {
            None => Ok(expr),
            Some(token) => Err(CompileError::syntax(
                token.column,
                format!("unexpected `{}`", token.kind),
            )),
        }
    }

    pub fn ident(name: impl Into<String>) -> Expr {
        Expr::Ident(name.into())
    }

    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Expr {
        Expr::Call(name.into(), args)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Int(v) => write!(f, "{v}"),
            Expr::Str(bytes) => write!(f, "{:?}", String::from_utf8_lossy(bytes)),
            Expr::Bool(b) => write!(f, "{b}"),
            Expr::Ident(name) => f.write_str(name),
            Expr::Wildcard => f.write_str("_"),
            Expr::Unary(UnaryOp::Neg, inner) => write!(f, "-{inner}"),
            Expr::Unary(UnaryOp::Not, inner) => write!(f, "not {inner}"),
            Expr::Binary(op, lhs, rhs) => write!(f, "({lhs} {} {rhs})", op.symbol()),
            Expr::Call(name, args) => {
                write!(f, "{name}(")?;
                write_list(f, args)?;
                f.write_str(")")
            }
            Expr::Tuple(items) => {
                f.write_str("(")?;
                write_list(f, items)?;
                f.write_str(")")
            }
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Int(i64),
    Str(Vec<u8>),
    Ident(String),
    Punct(&'static str),
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Int(v) => write!(f, "{v}"),
            TokenKind::Str(bytes) => write!(f, "{:?}", String::from_utf8_lossy(bytes)),
            TokenKind::Ident(name) => f.write_str(name),
            TokenKind::Punct(p) => f.write_str(p),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    column: usize,
}

const PUNCTUATION: &[&str] = &[
    "==", "!=", "<>", "<=", ">=", "&&", "||", "<<", ">>", "+", "-", "*", "/", "%", "&", "|",
    "^", "=", "<", ">", "!", "(", ")", ",",
];

fn tokenize(text: &str) -> Result<Vec<Token>, CompileError> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let column = i + 1;

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let literal: String = chars[start..i].iter().collect();
            let value = parse_number(&literal).ok_or_else(|| {
                CompileError::syntax(column, format!("invalid integer literal `{literal}`"))
            })?;
            tokens.push(Token {
                kind: TokenKind::Int(value),
                column,
            });
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token {
                kind: TokenKind::Ident(chars[start..i].iter().collect()),
                column,
            });
            continue;
        }

        if c == '"' {
            let (bytes, next) = lex_string(&chars, i)?;
            tokens.push(Token {
                kind: TokenKind::Str(bytes),
                column,
            });
            i = next;
            continue;
        }

        let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
        let punct = PUNCTUATION
            .iter()
            .copied()
            .find(|p| rest.starts_with(*p))
            .ok_or_else(|| CompileError::syntax(column, format!("unexpected character `{c}`")))?;
        tokens.push(Token {
            kind: TokenKind::Punct(punct),
            column,
        });
        i += punct.len();
    }

    Ok(tokens)
}

/// Parses a decimal, `0x`, `0o` or `0b` literal with optional `_` separators.
fn parse_number(literal: &str) -> Option<i64> {
    let cleaned: String = literal.chars().filter(|c| *c != '_').collect();
    let lower = cleaned.to_ascii_lowercase();

    let (digits, radix) = if let Some(hex) = lower.strip_prefix("0x") {
        (hex, 16)
    } else if let Some(oct) = lower.strip_prefix("0o") {
        (oct, 8)
    } else if let Some(bin) = lower.strip_prefix("0b") {
        (bin, 2)
    } else {
        (lower.as_str(), 10)
    };

    if digits.is_empty() {
        return None;
    }

    // Hex and binary literals may spell the full 64-bit pattern.
    if radix == 10 {
        digits.parse::<i64>().ok()
    } else {
        u64::from_str_radix(digits, radix).ok().map(|v| v as i64)
    }
}

fn lex_string(chars: &[char], start: usize) -> Result<(Vec<u8>, usize), CompileError> {
    let mut bytes = Vec::new();
    let mut i = start + 1;

    while i < chars.len() {
        match chars[i] {
            '"' => return Ok((bytes, i + 1)),
            '\\' => {
                let escape = chars
                    .get(i + 1)
                    .ok_or_else(|| CompileError::syntax(i + 1, "unterminated escape"))?;
                let (byte, width) = match escape {
                    'n' => (b'\n', 2),
                    't' => (b'\t', 2),
                    'r' => (b'\r', 2),
                    '0' => (0, 2),
                    '\\' => (b'\\', 2),
                    '"' => (b'"', 2),
                    'x' => {
                        let hex: String = chars.get(i + 2..i + 4).unwrap_or(&[]).iter().collect();
                        let byte = u8::from_str_radix(&hex, 16).map_err(|_| {
                            CompileError::syntax(i + 1, format!("invalid escape `\\x{hex}`"))
                        })?;
                        (byte, 4)
                    }
                    other => {
                        return Err(CompileError::syntax(
                            i + 1,
                            format!("unknown escape `\\{other}`"),
                        ));
                    }
                };
                bytes.push(byte);
                i += width;
            }
            c => {
                let mut buf = [0u8; 4];
                bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                i += 1;
            }
        }
    }

    Err(CompileError::syntax(start + 1, "unterminated string literal"))
}

/// Deepest nesting of prefix operators, parentheses and calls the parser accepts.
const MAX_DEPTH: usize = 100;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn column(&self) -> usize {
        self.peek()
            .map(|t| t.column)
            .or_else(|| self.tokens.last().map(|t| t.column + 1))
            .unwrap_or(1)
    }

    fn eat_punct(&mut self, punct: &str) -> bool {
        if matches!(self.peek(), Some(Token { kind: TokenKind::Punct(p), .. }) if *p == punct) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn expect_punct(&mut self, punct: &str) -> Result<(), CompileError> {
        if self.eat_punct(punct) {
            Ok(())
        } else {
            Err(CompileError::syntax(self.column(), format!("expected `{punct}`")))
        }
    }

    /// Matches the next token against a binary operator table.
    fn eat_op(&mut self, table: &[(&str, BinOp)]) -> Option<BinOp> {
        let token = self.peek()?;
        let text = match &token.kind {
            TokenKind::Punct(p) => *p,
            TokenKind::Ident(name) => name.as_str(),
            _ => return None,
        };
        let op = table.iter().find(|(t, _)| *t == text).map(|(_, op)| *op)?;
        self.pos += 1;
        Some(op)
    }

    fn tuple(&mut self) -> Result<Expr, CompileError> {
        let first = self.or_else()?;
        if !self.eat_punct(",") {
            return Ok(first);
        }

        let mut items = vec![first, self.or_else()?];
        while self.eat_punct(",") {
            items.push(self.or_else()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn left_assoc(
        &mut self,
        table: &[(&str, BinOp)],
        next: fn(&mut Parser) -> Result<Expr, CompileError>,
    ) -> Result<Expr, CompileError> {
        let mut lhs = next(self)?;
        while let Some(op) = self.eat_op(table) {
            let rhs = next(self)?;
            lhs = Expr::binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn or_else(&mut self) -> Result<Expr, CompileError> {
        self.left_assoc(&[("||", BinOp::OrElse)], Parser::and_also)
    }

    fn and_also(&mut self) -> Result<Expr, CompileError> {
        self.left_assoc(&[("&&", BinOp::AndAlso)], Parser::comparison)
    }

    fn comparison(&mut self) -> Result<Expr, CompileError> {
        let lhs = self.bit_or()?;
        let table = [
            ("=", BinOp::Eq),
            ("==", BinOp::Eq),
            ("<>", BinOp::Ne),
            ("!=", BinOp::Ne),
            ("<", BinOp::Lt),
            ("<=", BinOp::Le),
            (">", BinOp::Gt),
            (">=", BinOp::Ge),
        ];
        match self.eat_op(&table) {
            Some(op) => Ok(Expr::binary(op, lhs, self.bit_or()?)),
            None => Ok(lhs),
        }
    }

    fn bit_or(&mut self) -> Result<Expr, CompileError> {
        let table = [
            ("lor", BinOp::Or),
            ("|", BinOp::Or),
            ("lxor", BinOp::Xor),
            ("^", BinOp::Xor),
        ];
        self.left_assoc(&table, Parser::bit_and)
    }

    fn bit_and(&mut self) -> Result<Expr, CompileError> {
        self.left_assoc(&[("land", BinOp::And), ("&", BinOp::And)], Parser::shift)
    }

    fn shift(&mut self) -> Result<Expr, CompileError> {
        let table = [
            ("lsl", BinOp::Lsl),
            ("<<", BinOp::Lsl),
            ("lsr", BinOp::Lsr),
            ("asr", BinOp::Asr),
            (">>", BinOp::Asr),
        ];
        self.left_assoc(&table, Parser::additive)
    }

    fn additive(&mut self) -> Result<Expr, CompileError> {
        self.left_assoc(&[("+", BinOp::Add), ("-", BinOp::Sub)], Parser::multiplicative)
    }

    fn multiplicative(&mut self) -> Result<Expr, CompileError> {
        let table = [
            ("*", BinOp::Mul),
            ("/", BinOp::Div),
            ("mod", BinOp::Mod),
            ("%", BinOp::Mod),
        ];
        self.left_assoc(&table, Parser::unary)
    }

    fn unary(&mut self) -> Result<Expr, CompileError> {
        if self.depth >= MAX_DEPTH {
            return Err(CompileError::syntax(
                self.column(),
                "expression is nested too deeply",
            ));
        }
        self.depth += 1;
        let expr = self.prefixed();
        self.depth -= 1;
        expr
    }

    fn prefixed(&mut self) -> Result<Expr, CompileError> {
        if self.eat_punct("-") {
            return match self.unary()? {
                Expr::Int(v) => Ok(Expr::Int(v.wrapping_neg())),
                inner => Ok(Expr::Unary(UnaryOp::Neg, Box::new(inner))),
            };
        }
        if self.eat_punct("!") {
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(self.unary()?)));
        }
        if matches!(self.peek(), Some(Token { kind: TokenKind::Ident(name), .. }) if name == "not")
        {
            self.pos += 1;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, CompileError> {
        let column = self.column();
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| CompileError::syntax(column, "unexpected end of expression"))?;
        self.pos += 1;

        match token.kind {
            TokenKind::Int(v) => Ok(Expr::Int(v)),
            TokenKind::Str(bytes) => Ok(Expr::Str(bytes)),
            TokenKind::Ident(name) => match name.as_str() {
                "_" => Ok(Expr::Wildcard),
                "true" => Ok(Expr::Bool(true)),
                "false" => Ok(Expr::Bool(false)),
                _ if self.eat_punct("(") => {
                    let mut args = Vec::new();
                    if !self.eat_punct(")") {
                        args.push(self.or_else()?);
                        while self.eat_punct(",") {
                            args.push(self.or_else()?);
                        }
                        self.expect_punct(")")?;
                    }
                    Ok(Expr::Call(name, args))
                }
                _ => Ok(Expr::Ident(name)),
            },
            TokenKind::Punct("(") => {
                let inner = self.tuple()?;
                self.expect_punct(")")?;
                Ok(inner)
            }
            other => Err(CompileError::syntax(
                token.column,
                format!("unexpected `{other}`"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(v: i64) -> Expr {
        Expr::Int(v)
    }

    #[test]
    fn test_precedence() {
        let expr = Expr::parse("1 + 2 * 3").unwrap();
        assert_eq!(
            expr,
            Expr::binary(BinOp::Add, int(1), Expr::binary(BinOp::Mul, int(2), int(3)))
        );
    }

    #[test]
    fn test_keyword_operators() {
        let expr = Expr::parse("x land 0xff lsl 2").unwrap();
        assert_eq!(
            expr,
            Expr::binary(
                BinOp::And,
                Expr::ident("x"),
                Expr::binary(BinOp::Lsl, int(0xff), int(2))
            )
        );
        assert_eq!(
            Expr::parse("a mod b").unwrap(),
            Expr::parse("a % b").unwrap()
        );
    }

    #[test]
    fn test_negative_literal_folds() {
        assert_eq!(Expr::parse("-1").unwrap(), int(-1));
        assert_eq!(
            Expr::parse("-x").unwrap(),
            Expr::Unary(UnaryOp::Neg, Box::new(Expr::ident("x")))
        );
    }

    #[test]
    fn test_calls_and_tuples() {
        let expr = Expr::parse("int, endian(e), check(x > 10)").unwrap();
        assert_eq!(
            expr,
            Expr::Tuple(vec![
                Expr::ident("int"),
                Expr::call("endian", vec![Expr::ident("e")]),
                Expr::call(
                    "check",
                    vec![Expr::binary(BinOp::Gt, Expr::ident("x"), int(10))]
                ),
            ])
        );
        assert_eq!(
            Expr::parse("(a, b)").unwrap(),
            Expr::Tuple(vec![Expr::ident("a"), Expr::ident("b")])
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!(Expr::parse("0b1010").unwrap(), int(10));
        assert_eq!(Expr::parse("1_000").unwrap(), int(1000));
        assert_eq!(Expr::parse("0xFFFF_FFFF_FFFF_FFFF").unwrap(), int(-1));
        assert_eq!(Expr::parse("_").unwrap(), Expr::Wildcard);
        assert_eq!(
            Expr::parse(r#""GIF\x00""#).unwrap(),
            Expr::Str(b"GIF\0".to_vec())
        );
    }

    #[test]
    fn test_syntax_errors() {
        assert!(matches!(
            Expr::parse("1 +").unwrap_err(),
            CompileError::Syntax { .. }
        ));
        assert!(matches!(
            Expr::parse("(1, 2").unwrap_err(),
            CompileError::Syntax { .. }
        ));
        assert_eq!(
            Expr::parse("1 2").unwrap_err(),
            CompileError::syntax(3, "unexpected `2`")
        );
        assert!(Expr::parse("12abc").is_err());
        assert!(Expr::parse("\"open").is_err());
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
        assert!(matches!(
            Expr::parse(&deep).unwrap_err(),
            CompileError::Syntax { .. }
        ));
        assert!(matches!(
            Expr::parse(&format!("{}x", "- ".repeat(10_000))).unwrap_err(),
            CompileError::Syntax { .. }
        ));

        let nested = format!("{}1{}", "(".repeat(50), ")".repeat(50));
        assert_eq!(Expr::parse(&nested).unwrap(), int(1));
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        let expr = Expr::parse("check((x lsr 2) == 3 && not b)").unwrap();
        assert_eq!(Expr::parse(&expr.to_string()).unwrap(), expr);
    }
}
