//! Change events produced from committed mutations.
//!
//! Events live for the duration of one commit: they are built from a
//! mutation trace, matched against subscriptions, and dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Properties, PropertySnapshot, RelKindId, TypeId};

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

/// The five kinds of change a subscription can ask for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Create,
    Update,
    Delete,
    CreateRelationship,
    DeleteRelationship,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        Self::Create,
        Self::Update,
        Self::Delete,
        Self::CreateRelationship,
        Self::DeleteRelationship,
    ];

    /// Wire name, as sent in the payload's `event` field.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::CreateRelationship => "CREATE_RELATIONSHIP",
            Self::DeleteRelationship => "DELETE_RELATIONSHIP",
        }
    }

    pub fn is_relationship(self) -> bool {
        matches!(self, Self::CreateRelationship | Self::DeleteRelationship)
    }
}

bitflags::bitflags! {
    /// A set of [`EventKind`]s.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventKinds: u8 {
        const CREATE = 1;
        const UPDATE = 1 << 1;
        const DELETE = 1 << 2;
        const CREATE_RELATIONSHIP = 1 << 3;
        const DELETE_RELATIONSHIP = 1 << 4;

        const NODE = Self::CREATE.bits() | Self::UPDATE.bits() | Self::DELETE.bits();
        const RELATIONSHIP = Self::CREATE_RELATIONSHIP.bits() | Self::DELETE_RELATIONSHIP.bits();
    }
}

impl EventKinds {
    pub fn has(self, kind: EventKind) -> bool {
        self.contains(kind.into())
    }
}

impl From<EventKind> for EventKinds {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Create => Self::CREATE,
            EventKind::Update => Self::UPDATE,
            EventKind::Delete => Self::DELETE,
            EventKind::CreateRelationship => Self::CREATE_RELATIONSHIP,
            EventKind::DeleteRelationship => Self::DELETE_RELATIONSHIP,
        }
    }
}

impl FromIterator<EventKind> for EventKinds {
    fn from_iter<I: IntoIterator<Item = EventKind>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::empty(), |acc, kind| acc | Self::from(kind))
    }
}

/// A relationship write as seen from one declared side.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipChange {
    pub kind: RelKindId,
    /// Field name as declared on the side this event is for.
    pub field: String,
    /// The node on this side.
    pub node: PropertySnapshot,
    pub edge: Properties,
    /// The node on the far side.
    pub other: PropertySnapshot,
}

/// An event built from one committed write.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphEvent {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl GraphEvent {
    pub fn new(timestamp: DateTime<Utc>, payload: EventPayload) -> Self {
        Self {
            id: EventId::new(),
            timestamp,
            payload,
        }
    }

    pub fn kind(&self) -> EventKind {
        match &self.payload {
            EventPayload::NodeCreated { .. } => EventKind::Create,
            EventPayload::NodeUpdated { .. } => EventKind::Update,
            EventPayload::NodeDeleted { .. } => EventKind::Delete,
            EventPayload::RelationshipCreated(_) => EventKind::CreateRelationship,
            EventPayload::RelationshipDeleted(_) => EventKind::DeleteRelationship,
        }
    }

    /// The node a subscription is matched against: the created, updated or
    /// deleted node, or the node on this event's side of a relationship.
    pub fn subject(&self) -> &PropertySnapshot {
        match &self.payload {
            EventPayload::NodeCreated { node } | EventPayload::NodeDeleted { node } => node,
            EventPayload::NodeUpdated { after, .. } => after,
            EventPayload::RelationshipCreated(change)
            | EventPayload::RelationshipDeleted(change) => &change.node,
        }
    }

    /// Concrete type of [`subject`](Self::subject).
    pub fn concrete_type(&self) -> TypeId {
        self.subject().concrete
    }

    pub fn relationship(&self) -> Option<&RelationshipChange> {
        match &self.payload {
            EventPayload::RelationshipCreated(change)
            | EventPayload::RelationshipDeleted(change) => Some(change),
            _ => None,
        }
    }
}

/// The event payload, tagged by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    NodeCreated {
        node: PropertySnapshot,
    },
    NodeUpdated {
        before: PropertySnapshot,
        after: PropertySnapshot,
    },
    NodeDeleted {
        node: PropertySnapshot,
    },
    RelationshipCreated(RelationshipChange),
    RelationshipDeleted(RelationshipChange),
}
