//! Error types for the ripple-engine crate.

use ripple_core::schema::SchemaError;
use ripple_core::trace::WriteOp;
use ripple_core::TypeId;
use ripple_filter::FilterError;
use thiserror::Error;

use crate::registry::{ConnectionId, SubscriptionId};

/// A trace record that could not be turned into events. Fatal to that record only.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BuildError {
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("{op:?} record for {type_name} has no {snapshot} snapshot")]
    MissingSnapshot {
        op: WriteOp,
        type_name: String,
        snapshot: &'static str,
    },

    #[error("{op:?} record for {type_name} has no {attribute}")]
    MissingAttribute {
        op: WriteOp,
        type_name: String,
        attribute: &'static str,
    },

    #[error("Field {field} on {type_name} belongs to {expected}, but the record names {found}")]
    KindMismatch {
        type_name: String,
        field: String,
        expected: String,
        found: String,
    },

    #[error("{type_name} cannot sit at the far end of {relationship}")]
    EndpointMismatch {
        relationship: String,
        type_name: String,
    },
}

/// A payload could not be compiled or shaped for one subscriber.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    #[error("No such field {field} on {type_name}")]
    NoSuchField { type_name: String, field: String },

    #[error("Unknown type in fragment: {0}")]
    UnknownType(String),

    #[error("{type_name} is not a concrete member of {target}")]
    NotAMember { type_name: String, target: String },

    #[error("Required property {type_name}.{field} is missing")]
    MissingRequired { type_name: String, field: String },

    #[error("No projection for concrete {0}")]
    UnexpectedType(TypeId),
}

/// A payload could not be queued for a connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("Unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    #[error("Connection closed: {0}")]
    Closed(ConnectionId),

    #[error("Outbound queue full for {0}")]
    QueueFull(ConnectionId),
}

/// Errors surfaced by the engine facade to the transport layer.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Filter error: {0}")]
    Filter(#[from] FilterError),

    #[error("Payload shape error: {0}")]
    Shape(#[from] ShapeError),

    #[error("Unknown subscription target type: {0}")]
    UnknownTargetType(String),

    #[error("Unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    #[error("Unknown subscription: {0}")]
    UnknownSubscription(SubscriptionId),

    #[error("Background dispatch requires a running tokio runtime")]
    NoRuntime,
}

pub type Result<T> = std::result::Result<T, EngineError>;
