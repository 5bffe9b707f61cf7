//! Comparison operators and their value semantics.

use std::cmp::Ordering;
use std::fmt;

use ripple_core::{PropertyValue, ScalarKind};

/// A field comparison operator, written as a suffix on the field name
/// (`title_CONTAINS`, `budget_GT`). Plain equality has no suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Not,
    In,
    NotIn,
    Lt,
    Lte,
    Gt,
    Gte,
    Contains,
    NotContains,
    StartsWith,
    NotStartsWith,
    EndsWith,
    NotEndsWith,
    Includes,
    NotIncludes,
}

/// Suffix table. Negated forms come first so that `_NOT_IN` is not read as `_IN`.
const SUFFIXES: [(&str, Operator); 15] = [
    ("_NOT_IN", Operator::NotIn),
    ("_NOT_CONTAINS", Operator::NotContains),
    ("_NOT_STARTS_WITH", Operator::NotStartsWith),
    ("_NOT_ENDS_WITH", Operator::NotEndsWith),
    ("_NOT_INCLUDES", Operator::NotIncludes),
    ("_NOT", Operator::Not),
    ("_IN", Operator::In),
    ("_LTE", Operator::Lte),
    ("_LT", Operator::Lt),
    ("_GTE", Operator::Gte),
    ("_GT", Operator::Gt),
    ("_CONTAINS", Operator::Contains),
    ("_STARTS_WITH", Operator::StartsWith),
    ("_ENDS_WITH", Operator::EndsWith),
    ("_INCLUDES", Operator::Includes),
];

impl Operator {
    /// Split `key` into a field name and an operator, if it ends with a known suffix.
    pub fn split_key(key: &str) -> Option<(&str, Operator)> {
        SUFFIXES.iter().find_map(|(suffix, op)| {
            key.strip_suffix(suffix)
                .filter(|field| !field.is_empty())
                .map(|field| (field, *op))
        })
    }

    pub fn suffix(self) -> &'static str {
        match self {
            Self::Eq => "",
            other => SUFFIXES
                .iter()
                .find(|(_, op)| *op == other)
                .map(|(s, _)| *s)
                .unwrap_or(""),
        }
    }

    /// Whether the operator takes a list literal.
    pub fn takes_list(self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }

    /// Whether the operator compares against a single element of a list property.
    pub fn takes_element(self) -> bool {
        matches!(self, Self::Includes | Self::NotIncludes)
    }

    /// Whether the operator is defined for properties of `kind`.
    pub fn applies_to(self, kind: ScalarKind) -> bool {
        match self {
            Self::Eq | Self::Not => true,
            Self::In | Self::NotIn => kind != ScalarKind::List,
            Self::Lt | Self::Lte | Self::Gt | Self::Gte => kind.is_numeric(),
            Self::Contains
            | Self::NotContains
            | Self::StartsWith
            | Self::NotStartsWith
            | Self::EndsWith
            | Self::NotEndsWith => kind.is_textual(),
            Self::Includes | Self::NotIncludes => kind == ScalarKind::List,
        }
    }

    /// Whether a `null` literal is meaningful for this operator.
    pub fn accepts_null(self) -> bool {
        matches!(self, Self::Eq | Self::Not)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eq => f.write_str("="),
            other => f.write_str(other.suffix()),
        }
    }
}

/// Right-hand side of a comparison, already coerced to the property's kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(PropertyValue),
    List(Vec<PropertyValue>),
}

/// Apply `op` to a property value (`None` when absent or null).
pub fn apply(op: Operator, actual: Option<&PropertyValue>, operand: &Operand) -> bool {
    match (op, operand) {
        (Operator::Eq, Operand::Value(PropertyValue::Null)) => actual.is_none(),
        (Operator::Not, Operand::Value(PropertyValue::Null)) => actual.is_some(),
        _ => {
            let Some(actual) = actual else { return false };
            apply_present(op, actual, operand)
        }
    }
}

fn apply_present(op: Operator, actual: &PropertyValue, operand: &Operand) -> bool {
    match (op, operand) {
        (Operator::Eq, Operand::Value(v)) => actual == v,
        (Operator::Not, Operand::Value(v)) => actual != v,
        (Operator::In, Operand::List(items)) => items.contains(actual),
        (Operator::NotIn, Operand::List(items)) => !items.contains(actual),
        (Operator::Lt, Operand::Value(v)) => compare(actual, v) == Some(Ordering::Less),
        (Operator::Lte, Operand::Value(v)) => {
            matches!(compare(actual, v), Some(Ordering::Less | Ordering::Equal))
        }
        (Operator::Gt, Operand::Value(v)) => compare(actual, v) == Some(Ordering::Greater),
        (Operator::Gte, Operand::Value(v)) => {
            matches!(compare(actual, v), Some(Ordering::Greater | Ordering::Equal))
        }
        (Operator::Contains, Operand::Value(v)) => text(actual, v, |a, b| a.contains(b)),
        (Operator::NotContains, Operand::Value(v)) => text(actual, v, |a, b| !a.contains(b)),
        (Operator::StartsWith, Operand::Value(v)) => text(actual, v, |a, b| a.starts_with(b)),
        (Operator::NotStartsWith, Operand::Value(v)) => {
            text(actual, v, |a, b| !a.starts_with(b))
        }
        (Operator::EndsWith, Operand::Value(v)) => text(actual, v, |a, b| a.ends_with(b)),
        (Operator::NotEndsWith, Operand::Value(v)) => text(actual, v, |a, b| !a.ends_with(b)),
        (Operator::Includes, Operand::Value(v)) => match actual {
            PropertyValue::List(items) => items.contains(v),
            _ => false,
        },
        (Operator::NotIncludes, Operand::Value(v)) => match actual {
            PropertyValue::List(items) => !items.contains(v),
            _ => false,
        },
        _ => false,
    }
}

/// Numeric ordering. `BigInt` stays arbitrary precision throughout.
fn compare(a: &PropertyValue, b: &PropertyValue) -> Option<Ordering> {
    match (a, b) {
        (PropertyValue::Int(x), PropertyValue::Int(y)) => Some(x.cmp(y)),
        (PropertyValue::Float(x), PropertyValue::Float(y)) => x.partial_cmp(y),
        (PropertyValue::BigInt(x), PropertyValue::BigInt(y)) => Some(x.cmp(y)),
        (PropertyValue::Int(x), PropertyValue::Float(y)) => (*x as f64).partial_cmp(y),
        (PropertyValue::Float(x), PropertyValue::Int(y)) => x.partial_cmp(&(*y as f64)),
        _ => None,
    }
}

fn text(actual: &PropertyValue, operand: &PropertyValue, f: impl Fn(&str, &str) -> bool) -> bool {
    match (actual.as_text(), operand.as_text()) {
        (Some(a), Some(b)) => f(a, b),
        _ => false,
    }
}
