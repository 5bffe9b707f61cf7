//! Error types for the ripple-filter crate.

use ripple_core::ScalarKind;
use thiserror::Error;

/// A subscription filter that cannot be compiled against its target type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("Operator {operator} is not defined for {field} of type {kind}")]
    InvalidFilterType {
        field: String,
        operator: String,
        kind: ScalarKind,
    },

    #[error("No such property {field} on {owner}")]
    NoSuchProperty { owner: String, field: String },

    #[error("Unknown operator {operator} on {field}")]
    UnknownOperator { field: String, operator: String },

    #[error("Invalid literal for {field}{operator}: {reason}")]
    InvalidLiteral {
        field: String,
        operator: String,
        reason: String,
    },

    #[error("Unknown type in _on: {0}")]
    UnknownType(String),

    #[error("{type_name} is not a concrete member of {target}")]
    NotAMember { type_name: String, target: String },

    #[error("Relationship filter {field} is only allowed on the subscribed type")]
    NestedRelationship { field: String },

    #[error("Malformed filter: {0}")]
    MalformedFilter(String),
}

impl FilterError {
    /// Whether the filter applies an operator to a property kind that does not support it.
    pub fn is_type_mismatch(&self) -> bool {
        matches!(self, Self::InvalidFilterType { .. })
    }
}

pub type Result<T> = std::result::Result<T, FilterError>;
