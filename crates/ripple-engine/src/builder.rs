//! Event Builder: committed mutation traces to ordered graph events.
//!
//! The builder flattens a trace into emission order and turns each record
//! into zero or more events:
//! - node writes become one `NodeCreated`/`NodeUpdated`/`NodeDeleted` event,
//!   unless nothing could match it or (for updates) nothing changed;
//! - relationship writes are looked at from each declared side
//!   independently, and produce one event per side that has interested
//!   subscribers.
//!
//! A record that cannot be resolved against the schema is skipped on its
//! own. The rest of the trace is still built.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ripple_core::schema::{RelationshipEnd, RelationshipKind, SchemaError};
use ripple_core::trace::{MutationTrace, TraceRecord, WriteOp};
use ripple_core::{
    EventKind, EventPayload, GraphEvent, JsonObject, PropertySnapshot, RelationshipChange,
    TypeId, TypeRegistry,
};

use crate::error::BuildError;

/// Whether anything is listening for a kind of event on a concrete type.
pub trait Interest {
    fn has_interest(&self, concrete: TypeId, kind: EventKind) -> bool;
}

/// Interest in everything. Builds every event a trace can produce.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllEvents;

impl Interest for AllEvents {
    fn has_interest(&self, _concrete: TypeId, _kind: EventKind) -> bool {
        true
    }
}

/// Result of building one trace.
#[derive(Debug, Default)]
pub struct BuildOutcome {
    pub events: Vec<GraphEvent>,
    /// Records that were skipped, in emission order.
    pub errors: Vec<BuildError>,
    /// Updates dropped because before and after were equal.
    pub suppressed_updates: usize,
}

pub struct EventBuilder {
    types: Arc<TypeRegistry>,
}

impl EventBuilder {
    pub fn new(types: Arc<TypeRegistry>) -> Self {
        Self { types }
    }

    /// Build events for a trace, stamped with the current time.
    pub fn build(&self, trace: &MutationTrace, interest: &dyn Interest) -> BuildOutcome {
        self.build_at(trace, interest, Utc::now())
    }

    /// Build events for a trace, stamping every event with `timestamp`.
    pub fn build_at(
        &self,
        trace: &MutationTrace,
        interest: &dyn Interest,
        timestamp: DateTime<Utc>,
    ) -> BuildOutcome {
        let mut outcome = BuildOutcome::default();

        for record in trace.emission_order() {
            let result = match record.op {
                WriteOp::NodeCreate | WriteOp::NodeUpdate | WriteOp::NodeDelete => {
                    self.node_event(record, interest, timestamp, &mut outcome)
                }
                WriteOp::RelConnect | WriteOp::RelDisconnect => {
                    self.relationship_events(record, interest, timestamp, &mut outcome.events)
                }
            };

            if let Err(error) = result {
                tracing::warn!(
                    op = ?record.op,
                    concrete_type = %record.concrete_type,
                    error = %error,
                    "Skipping trace record"
                );
                outcome.errors.push(error);
            }
        }

        tracing::debug!(
            events = outcome.events.len(),
            errors = outcome.errors.len(),
            suppressed_updates = outcome.suppressed_updates,
            "Mutation trace built"
        );
        outcome
    }

    fn node_event(
        &self,
        record: &TraceRecord,
        interest: &dyn Interest,
        timestamp: DateTime<Utc>,
        outcome: &mut BuildOutcome,
    ) -> Result<(), BuildError> {
        let concrete = self.types.resolve_concrete_type(&record.concrete_type)?.id;
        let kind = match record.op {
            WriteOp::NodeCreate => EventKind::Create,
            WriteOp::NodeUpdate => EventKind::Update,
            _ => EventKind::Delete,
        };
        if !interest.has_interest(concrete, kind) {
            return Ok(());
        }

        let payload = match kind {
            EventKind::Create => EventPayload::NodeCreated {
                node: self.snapshot(record, concrete, record.after.as_ref(), "after")?,
            },
            EventKind::Update => {
                let before = self.snapshot(record, concrete, record.before.as_ref(), "before")?;
                let after = self.snapshot(record, concrete, record.after.as_ref(), "after")?;
                if before.same_properties(&after) {
                    outcome.suppressed_updates += 1;
                    return Ok(());
                }
                EventPayload::NodeUpdated { before, after }
            }
            _ => EventPayload::NodeDeleted {
                node: self.snapshot(record, concrete, record.owner_snapshot(), "before")?,
            },
        };

        outcome.events.push(GraphEvent::new(timestamp, payload));
        Ok(())
    }

    fn relationship_events(
        &self,
        record: &TraceRecord,
        interest: &dyn Interest,
        timestamp: DateTime<Utc>,
        events: &mut Vec<GraphEvent>,
    ) -> Result<(), BuildError> {
        let owner = self.types.resolve_concrete_type(&record.concrete_type)?.id;
        let field_name = record
            .relationship_field
            .as_deref()
            .ok_or_else(|| self.missing_attribute(record, "relationshipField"))?;
        let field = self
            .types
            .relationship_field(owner, field_name)
            .ok_or_else(|| SchemaError::NoSuchRelationshipField {
                type_name: record.concrete_type.clone(),
                field: field_name.to_string(),
            })?;
        let kind = self.relationship_kind(record, field.kind, field_name)?;
        let owner_end = field.end;

        let other_name = record
            .other_end_type
            .as_deref()
            .ok_or_else(|| self.missing_attribute(record, "otherEndType"))?;
        let other = self.types.resolve_concrete_type(other_name)?.id;
        if !self.types.admits(kind.endpoint(owner_end.opposite()), other) {
            return Err(BuildError::EndpointMismatch {
                relationship: kind.name.clone(),
                type_name: other_name.to_string(),
            });
        }

        let event_kind = match record.op {
            WriteOp::RelConnect => EventKind::CreateRelationship,
            _ => EventKind::DeleteRelationship,
        };

        // Owner side first, then the far side. A side without a declared field has no events.
        let sides: Vec<(RelationshipEnd, &str)> = [owner_end, owner_end.opposite()]
            .into_iter()
            .filter_map(|end| kind.field(end).map(|f| (end, f)))
            .filter(|(end, _)| {
                let node_type = if *end == owner_end { owner } else { other };
                interest.has_interest(node_type, event_kind)
            })
            .collect();
        if sides.is_empty() {
            return Ok(());
        }

        let owner_snap = self.snapshot(record, owner, record.owner_snapshot(), "owner")?;
        let other_snap = self.snapshot(record, other, record.other_end.as_ref(), "otherEnd")?;
        let edge = match &record.edge {
            Some(raw) => self.types.edge_properties(kind.id, raw)?,
            None => Default::default(),
        };

        for (end, side_field) in sides {
            let (node, far) = if end == owner_end {
                (owner_snap.clone(), other_snap.clone())
            } else {
                (other_snap.clone(), owner_snap.clone())
            };
            let change = RelationshipChange {
                kind: kind.id,
                field: side_field.to_string(),
                node,
                edge: edge.clone(),
                other: far,
            };
            let payload = match event_kind {
                EventKind::CreateRelationship => EventPayload::RelationshipCreated(change),
                _ => EventPayload::RelationshipDeleted(change),
            };
            events.push(GraphEvent::new(timestamp, payload));
        }
        Ok(())
    }

    /// The kind behind `field`, cross-checked against the record's own `relationshipKind`.
    fn relationship_kind(
        &self,
        record: &TraceRecord,
        resolved: &RelationshipKind,
        field: &str,
    ) -> Result<&RelationshipKind, BuildError> {
        let Some(named) = record.relationship_kind.as_deref() else {
            return Ok(self.types.relationship_kind(resolved.id));
        };
        let declared = self
            .types
            .relationship_kind_by_name(named)
            .ok_or_else(|| SchemaError::NoSuchRelationship(named.to_string()))?;
        if declared.id != resolved.id {
            return Err(BuildError::KindMismatch {
                type_name: record.concrete_type.clone(),
                field: field.to_string(),
                expected: resolved.name.clone(),
                found: named.to_string(),
            });
        }
        Ok(declared)
    }

    fn snapshot(
        &self,
        record: &TraceRecord,
        concrete: TypeId,
        raw: Option<&JsonObject>,
        which: &'static str,
    ) -> Result<PropertySnapshot, BuildError> {
        let raw = raw.ok_or_else(|| BuildError::MissingSnapshot {
            op: record.op,
            type_name: self.types.name(concrete).to_string(),
            snapshot: which,
        })?;
        Ok(self.types.snapshot(concrete, raw)?)
    }

    fn missing_attribute(&self, record: &TraceRecord, attribute: &'static str) -> BuildError {
        BuildError::MissingAttribute {
            op: record.op,
            type_name: record.concrete_type.clone(),
            attribute,
        }
    }
}
