//! ripple-core: Shared types, schema registry, and configuration for Ripple.
//!
//! This crate provides the foundational types used across the engine:
//! - The Type Registry (entity types, interface/union membership, relationship kinds)
//! - Typed property values and snapshots
//! - Change events and event-kind sets
//! - Mutation traces handed over by the mutation engine
//! - Configuration management and common error types

pub mod config;
pub mod error;
pub mod events;
pub mod schema;
pub mod trace;
pub mod types;

pub use error::RippleError;
pub use events::{EventId, EventKind, EventKinds, EventPayload, GraphEvent, RelationshipChange};
pub use schema::{EntityType, RelationshipEnd, SchemaDocument, SchemaError, TypeRegistry};
pub use trace::{MutationTrace, TraceRecord, WriteOp};
pub use types::{
    JsonObject, Properties, PropertySnapshot, PropertyValue, RelKindId, ScalarKind, TypeId,
};
