//! A tiny expression language for conditional edges.
//!
//! Grammar (informal):
//!
//! ```text
//! expr       := comparison ( "&&" comparison )*
//! comparison := IDENT "==" STRING
//!             | IDENT "(" NUMBER ")"
//!             | IDENT
//! ```
//!
//! `IDENT == 'literal'` is a string-equality check against a state field.
//! `IDENT(NUMBER)` is a named numeric predicate — the identifier's `_gt`,
//! `_gte`, `_lt`, `_lte`, or `_eq` suffix selects the comparison and the
//! remaining prefix names the state field to read, e.g.
//! `confidence_score_gt(90)` compares `state.confidence_score > 90`. A bare
//! `IDENT` is a presence/truthiness check.
//!
//! Parsed once at compile time into a [`ConditionExpr`] tree — there is no
//! dynamic code execution. An identifier that names neither a known state
//! field nor a recognized predicate suffix evaluates to `false` and reports
//! a warning rather than failing compilation or execution.

use crate::state::State;
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum ConditionExpr {
    Eq { field: String, expected: String },
    Predicate { field: String, op: NumericOp, threshold: f64 },
    Truthy { field: String },
    And(Box<ConditionExpr>, Box<ConditionExpr>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumericOp {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionParseError(pub String);

impl fmt::Display for ConditionParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid condition expression: {}", self.0)
    }
}

impl std::error::Error for ConditionParseError {}

/// Parse a condition string into an AST, once, at compile time.
pub fn parse(source: &str) -> Result<ConditionExpr, ConditionParseError> {
    let clauses: Vec<&str> = source.split("&&").map(str::trim).collect();
    if clauses.iter().any(|c| c.is_empty()) {
        return Err(ConditionParseError(format!("empty clause in '{source}'")));
    }
    let mut parsed = clauses
        .into_iter()
        .map(parse_clause)
        .collect::<Result<Vec<_>, _>>()?
        .into_iter();
    let first = parsed.next().ok_or_else(|| ConditionParseError("empty expression".to_string()))?;
    Ok(parsed.fold(first, |acc, next| ConditionExpr::And(Box::new(acc), Box::new(next))))
}

fn parse_clause(clause: &str) -> Result<ConditionExpr, ConditionParseError> {
    if let Some((lhs, rhs)) = clause.split_once("==") {
        let field = lhs.trim().to_string();
        let expected = unquote(rhs.trim());
        if field.is_empty() {
            return Err(ConditionParseError(format!("missing field in '{clause}'")));
        }
        return Ok(ConditionExpr::Eq { field, expected });
    }
    if let Some(open) = clause.find('(') {
        let close = clause
            .rfind(')')
            .ok_or_else(|| ConditionParseError(format!("unterminated call in '{clause}'")))?;
        let name = clause[..open].trim();
        let arg = clause[open + 1..close].trim();
        let threshold: f64 = arg
            .parse()
            .map_err(|_| ConditionParseError(format!("invalid numeric argument '{arg}' in '{clause}'")))?;
        let (field, op) = split_predicate_name(name)
            .ok_or_else(|| ConditionParseError(format!("unrecognized predicate '{name}'")))?;
        return Ok(ConditionExpr::Predicate { field, op, threshold });
    }
    let field = clause.trim();
    if field.is_empty() {
        return Err(ConditionParseError("empty clause".to_string()));
    }
    Ok(ConditionExpr::Truthy { field: field.to_string() })
}

fn split_predicate_name(name: &str) -> Option<(String, NumericOp)> {
    for (suffix, op) in [
        ("_gte", NumericOp::Gte),
        ("_lte", NumericOp::Lte),
        ("_gt", NumericOp::Gt),
        ("_lt", NumericOp::Lt),
        ("_eq", NumericOp::Eq),
    ] {
        if let Some(field) = name.strip_suffix(suffix) {
            if !field.is_empty() {
                return Some((field.to_string(), op));
            }
        }
    }
    None
}

fn unquote(literal: &str) -> String {
    let trimmed = literal.trim();
    if (trimmed.starts_with('\'') && trimmed.ends_with('\'') && trimmed.len() >= 2)
        || (trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2)
    {
        trimmed[1..trimmed.len() - 1].to_string()
    } else {
        trimmed.to_string()
    }
}

impl ConditionExpr {
    /// Evaluate against `state`. Returns the boolean result and any warnings
    /// accrued from unresolvable identifiers along the way.
    pub fn evaluate(&self, state: &State) -> (bool, Vec<String>) {
        match self {
            ConditionExpr::Eq { field, expected } => match state.get(field) {
                Some(Value::String(s)) => (&s == expected, vec![]),
                Some(other) => (other.to_string().trim_matches('"') == expected, vec![]),
                None => (false, vec![format!("unknown identifier '{field}' evaluated to false")]),
            },
            ConditionExpr::Predicate { field, op, threshold } => match state.get(field).and_then(|v| v.as_f64()) {
                Some(actual) => (compare(actual, *op, *threshold), vec![]),
                None => (false, vec![format!("unknown identifier '{field}' evaluated to false")]),
            },
            ConditionExpr::Truthy { field } => match state.get(field) {
                Some(Value::Bool(b)) => (b, vec![]),
                Some(Value::Null) => (false, vec![]),
                Some(Value::String(s)) => (!s.is_empty(), vec![]),
                Some(_) => (true, vec![]),
                None => (false, vec![format!("unknown identifier '{field}' evaluated to false")]),
            },
            ConditionExpr::And(lhs, rhs) => {
                let (l, mut warnings) = lhs.evaluate(state);
                let (r, more) = rhs.evaluate(state);
                warnings.extend(more);
                (l && r, warnings)
            }
        }
    }
}

fn compare(actual: f64, op: NumericOp, threshold: f64) -> bool {
    match op {
        NumericOp::Gt => actual > threshold,
        NumericOp::Gte => actual >= threshold,
        NumericOp::Lt => actual < threshold,
        NumericOp::Lte => actual <= threshold,
        NumericOp::Eq => (actual - threshold).abs() < f64::EPSILON,
    }
}
