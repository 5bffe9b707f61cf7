//! ripple-filter: Subscription filters for the Ripple subscription engine.
//!
//! Filters arrive as JSON objects written against a subscription's target
//! type. They are compiled once, at subscribe time, into a typed
//! [`CompiledPredicate`] and evaluated against every candidate event.
//!
//! Supported vocabulary:
//! - Equality (`title: "Matrix"`) and the `_NOT`, `_IN`, `_NOT_IN` suffixes
//! - Numeric ordering (`_LT`, `_LTE`, `_GT`, `_GTE`) on Int, Float and BigInt
//! - Substring operators on String and ID, list operators on List
//! - `AND`, `OR`, `NOT` combinators and `_on` type-scoped blocks
//! - Relationship clauses keyed by relationship field, with `edge` and `node` parts

pub mod compile;
pub mod error;
pub mod operator;
pub mod predicate;

pub use compile::compile;
pub use error::FilterError;
pub use operator::{Operand, Operator};
pub use predicate::{CompiledPredicate, Predicate, Scope};
