//! ABAC condition language.
//!
//! A condition is a small boolean expression over dotted attribute paths:
//!
//! ```text
//! subject.userId == resource.ownerId && user.role != 'admin'
//! ```
//!
//! Grammar: `or := and ('||' and)*`, `and := cmp ('&&' cmp)*`,
//! `cmp := operand ('==' | '!=') operand`. Operands are quoted strings,
//! numbers, `true`/`false`/`null`, or dotted paths rooted at one of the
//! three attribute maps. A path that does not resolve makes the whole
//! comparison false, for `!=` as much as for `==`; evaluation never errors.

use serde_json::{Map, Value};
use thiserror::Error;

/// Which attribute map a path starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeRoot {
    Subject,
    Resource,
    Context,
}

/// A dotted path into one of the attribute maps.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributePath {
    pub root: AttributeRoot,
    pub segments: Vec<String>,
}

/// One side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Path(AttributePath),
    Literal(Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
}

/// Parsed condition expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare {
        left: Operand,
        op: CmpOp,
        right: Operand,
    },
    All(Vec<Condition>),
    Any(Vec<Condition>),
}

#[derive(Debug, Error)]
pub enum ConditionParseError {
    #[error("empty condition")]
    Empty,

    #[error("expected a comparison operator in '{0}'")]
    MissingOperator(String),

    #[error("unterminated string literal in '{0}'")]
    UnterminatedString(String),

    #[error("invalid operand '{0}'")]
    InvalidOperand(String),

    #[error("unknown attribute root '{0}'")]
    UnknownRoot(String),
}

/// The three attribute maps a condition is evaluated against. Resource and
/// context are optional; paths into an absent map simply never resolve.
pub struct AttributeMaps<'a> {
    pub subject: &'a Map<String, Value>,
    pub resource: Option<&'a Map<String, Value>>,
    pub context: Option<&'a Map<String, Value>>,
}

/// Parse a condition string into its AST.
pub fn parse(input: &str) -> Result<Condition, ConditionParseError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ConditionParseError::Empty);
    }
    parse_or(input)
}

fn parse_or(input: &str) -> Result<Condition, ConditionParseError> {
    let parts = split_outside_quotes(input, "||")?;
    if parts.len() == 1 {
        return parse_and(&parts[0]);
    }
    let children = parts
        .iter()
        .map(|p| parse_and(p))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Condition::Any(children))
}

fn parse_and(input: &str) -> Result<Condition, ConditionParseError> {
    let parts = split_outside_quotes(input, "&&")?;
    if parts.len() == 1 {
        return parse_compare(&parts[0]);
    }
    let children = parts
        .iter()
        .map(|p| parse_compare(p))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Condition::All(children))
}

fn parse_compare(input: &str) -> Result<Condition, ConditionParseError> {
    let input = input.trim();
    for (token, op) in [("==", CmpOp::Eq), ("!=", CmpOp::Ne)] {
        if let Some(idx) = find_outside_quotes(input, token)? {
            let left = parse_operand(&input[..idx])?;
            let right = parse_operand(&input[idx + token.len()..])?;
            return Ok(Condition::Compare { left, op, right });
        }
    }
    Err(ConditionParseError::MissingOperator(input.to_string()))
}

fn parse_operand(input: &str) -> Result<Operand, ConditionParseError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ConditionParseError::InvalidOperand(input.to_string()));
    }

    // Quoted string literal.
    if let Some(quote) = input.chars().next().filter(|c| *c == '\'' || *c == '"') {
        if input.len() < 2 || !input.ends_with(quote) {
            return Err(ConditionParseError::UnterminatedString(input.to_string()));
        }
        return Ok(Operand::Literal(Value::String(
            input[1..input.len() - 1].to_string(),
        )));
    }

    match input {
        "true" => return Ok(Operand::Literal(Value::Bool(true))),
        "false" => return Ok(Operand::Literal(Value::Bool(false))),
        "null" => return Ok(Operand::Literal(Value::Null)),
        _ => {}
    }

    if let Ok(n) = input.parse::<i64>() {
        return Ok(Operand::Literal(Value::from(n)));
    }
    if let Ok(f) = input.parse::<f64>() {
        return Ok(Operand::Literal(
            serde_json::Number::from_f64(f)
                .map(Value::Number)
                .ok_or_else(|| ConditionParseError::InvalidOperand(input.to_string()))?,
        ));
    }

    // Dotted attribute path.
    let mut segments: Vec<&str> = input.split('.').collect();
    if segments.len() < 2 || segments.iter().any(|s| s.is_empty()) {
        return Err(ConditionParseError::InvalidOperand(input.to_string()));
    }
    let root = match segments.remove(0) {
        "subject" | "user" => AttributeRoot::Subject,
        "resource" => AttributeRoot::Resource,
        "context" | "environment" => AttributeRoot::Context,
        other => return Err(ConditionParseError::UnknownRoot(other.to_string())),
    };
    Ok(Operand::Path(AttributePath {
        root,
        segments: segments.into_iter().map(|s| s.to_string()).collect(),
    }))
}

/// Split on `separator`, ignoring occurrences inside quoted literals.
fn split_outside_quotes(
    input: &str,
    separator: &str,
) -> Result<Vec<String>, ConditionParseError> {
    let mut parts = Vec::new();
    let mut rest = input;
    while let Some(idx) = find_outside_quotes(rest, separator)? {
        parts.push(rest[..idx].to_string());
        rest = &rest[idx + separator.len()..];
    }
    parts.push(rest.to_string());
    Ok(parts)
}

/// Byte index of the first occurrence of `needle` outside quotes.
fn find_outside_quotes(
    input: &str,
    needle: &str,
) -> Result<Option<usize>, ConditionParseError> {
    let bytes = input.as_bytes();
    let needle_bytes = needle.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == q {
                    quote = None;
                }
            }
            None => {
                if b == b'\'' || b == b'"' {
                    quote = Some(b);
                } else if bytes[i..].starts_with(needle_bytes) {
                    return Ok(Some(i));
                }
            }
        }
        i += 1;
    }
    if quote.is_some() {
        return Err(ConditionParseError::UnterminatedString(input.to_string()));
    }
    Ok(None)
}

impl Condition {
    /// Evaluate against the supplied attribute maps. Never errors: an
    /// unresolved path makes its comparison false.
    pub fn evaluate(&self, attrs: &AttributeMaps<'_>) -> bool {
        match self {
            Condition::Compare { left, op, right } => {
                let (Some(lhs), Some(rhs)) = (resolve(left, attrs), resolve(right, attrs))
                else {
                    return false;
                };
                match op {
                    CmpOp::Eq => value_eq(lhs, rhs),
                    CmpOp::Ne => !value_eq(lhs, rhs),
                }
            }
            Condition::All(children) => children.iter().all(|c| c.evaluate(attrs)),
            Condition::Any(children) => children.iter().any(|c| c.evaluate(attrs)),
        }
    }
}

fn resolve<'a>(operand: &'a Operand, attrs: &'a AttributeMaps<'_>) -> Option<&'a Value> {
    match operand {
        Operand::Literal(value) => Some(value),
        Operand::Path(path) => {
            let map = match path.root {
                AttributeRoot::Subject => Some(attrs.subject),
                AttributeRoot::Resource => attrs.resource,
                AttributeRoot::Context => attrs.context,
            }?;
            let mut current = map.get(&path.segments[0])?;
            for segment in &path.segments[1..] {
                current = current.as_object()?.get(segment)?;
            }
            Some(current)
        }
    }
}

/// Value equality with numeric widening, so `42` matches `42.0`.
fn value_eq(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}
