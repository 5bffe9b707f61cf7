//! Payload projection: what a subscriber receives for a matching event.
//!
//! A [`PayloadShape`] is the subscriber's selection set. It is resolved once,
//! at subscribe time, into a [`Projection`] holding the exact field list for
//! every concrete type the payload can carry, so shaping an event is a
//! lookup by concrete type followed by a copy of the selected values.

use std::collections::BTreeMap;

use ripple_core::schema::{EntityType, PropertyDef, RelationshipField};
use ripple_core::{
    EventPayload, GraphEvent, Properties, PropertySnapshot, RelKindId, RelationshipChange, TypeId,
    TypeRegistry,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ShapeError;

/// Selects every property.
pub const ALL_FIELDS: &str = "*";

// ── Selection sets ────────────────────────────────────────────────

/// Node fields to include, with per-type inline fragments.
///
/// An empty selection means every property.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeSelection {
    #[serde(default)]
    pub fields: Vec<String>,
    /// Inline fragments keyed by concrete type name.
    #[serde(default)]
    pub fragments: BTreeMap<String, Vec<String>>,
}

impl NodeSelection {
    pub fn fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            fragments: BTreeMap::new(),
        }
    }

    pub fn with_fragment<I, S>(mut self, type_name: &str, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fragments.insert(
            type_name.to_string(),
            fields.into_iter().map(Into::into).collect(),
        );
        self
    }

    fn selects_everything(&self) -> bool {
        (self.fields.is_empty() && self.fragments.is_empty())
            || self.fields.iter().any(|f| f == ALL_FIELDS)
    }
}

/// Selection under one relationship field.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelationshipSelection {
    /// Edge properties. `None` selects every edge property.
    #[serde(default)]
    pub edge: Option<Vec<String>>,
    /// Selection on the node at the far end.
    #[serde(default)]
    pub node: NodeSelection,
}

/// A subscriber's full selection set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PayloadShape {
    #[serde(flatten)]
    pub node: NodeSelection,
    /// Relationship fields for relationship events. `None` includes every
    /// relationship field of the target type with full selections.
    #[serde(default)]
    pub relationships: Option<BTreeMap<String, RelationshipSelection>>,
}

// ── Compiled projections ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
struct FieldSpec {
    name: String,
    required: bool,
}

impl From<&PropertyDef> for FieldSpec {
    fn from(def: &PropertyDef) -> Self {
        Self {
            name: def.name.clone(),
            required: def.required,
        }
    }
}

#[derive(Debug, Clone)]
struct TypeFields {
    concrete: TypeId,
    type_name: String,
    fields: Vec<FieldSpec>,
}

/// Resolved node selection for a declared (possibly abstract) type.
#[derive(Debug, Clone)]
pub struct NodeProjection {
    /// Emit `__typename`, because the declared type is abstract.
    typename: bool,
    per_type: Vec<TypeFields>,
}

impl NodeProjection {
    pub fn compile(
        types: &TypeRegistry,
        declared: TypeId,
        selection: &NodeSelection,
    ) -> Result<Self, ShapeError> {
        let declared_name = types.name(declared);
        let everything = selection.selects_everything();

        for field in selection.fields.iter().filter(|f| *f != ALL_FIELDS) {
            if types.property(declared, field).is_none() {
                return Err(ShapeError::NoSuchField {
                    type_name: declared_name.to_string(),
                    field: field.clone(),
                });
            }
        }

        let mut fragments = Vec::with_capacity(selection.fragments.len());
        for (type_name, fields) in &selection.fragments {
            let member = types
                .type_id(type_name)
                .ok_or_else(|| ShapeError::UnknownType(type_name.clone()))?;
            let is_node = matches!(types.get(member), EntityType::Node(_));
            if !is_node || !types.admits(declared, member) {
                return Err(ShapeError::NotAMember {
                    type_name: type_name.clone(),
                    target: declared_name.to_string(),
                });
            }
            for field in fields.iter().filter(|f| *f != ALL_FIELDS) {
                if types.property(member, field).is_none() {
                    return Err(ShapeError::NoSuchField {
                        type_name: type_name.clone(),
                        field: field.clone(),
                    });
                }
            }
            fragments.push((member, fields));
        }

        let per_type = types
            .concrete_members(declared)
            .into_iter()
            .map(|concrete| {
                let defs = types.get(concrete).properties();
                let fragment = fragments
                    .iter()
                    .find(|(member, _)| *member == concrete)
                    .map(|(_, fields)| *fields);

                let wanted: Vec<&str> = if everything
                    || fragment.is_some_and(|f| f.iter().any(|n| n == ALL_FIELDS))
                {
                    defs.iter().map(|d| d.name.as_str()).collect()
                } else {
                    selection
                        .fields
                        .iter()
                        .chain(fragment.into_iter().flatten())
                        .map(String::as_str)
                        .collect()
                };

                let mut fields: Vec<FieldSpec> = Vec::with_capacity(wanted.len());
                for name in wanted {
                    if fields.iter().any(|f| f.name == name) {
                        continue;
                    }
                    if let Some(def) = defs.iter().find(|d| d.name == name) {
                        fields.push(def.into());
                    }
                }

                TypeFields {
                    concrete,
                    type_name: types.name(concrete).to_string(),
                    fields,
                }
            })
            .collect();

        Ok(Self {
            typename: types.get(declared).is_abstract(),
            per_type,
        })
    }

    pub fn shape(&self, snapshot: &PropertySnapshot) -> Result<Value, ShapeError> {
        let entry = self
            .per_type
            .iter()
            .find(|t| t.concrete == snapshot.concrete)
            .ok_or(ShapeError::UnexpectedType(snapshot.concrete))?;

        let mut out = Map::with_capacity(entry.fields.len() + 1);
        if self.typename {
            out.insert("__typename".into(), Value::String(entry.type_name.clone()));
        }
        copy_fields(&entry.type_name, &entry.fields, &snapshot.properties, &mut out)?;
        Ok(Value::Object(out))
    }
}

fn copy_fields(
    owner: &str,
    fields: &[FieldSpec],
    properties: &Properties,
    out: &mut Map<String, Value>,
) -> Result<(), ShapeError> {
    for field in fields {
        let value = match properties.get(&field.name).filter(|v| !v.is_null()) {
            Some(v) => v.to_json(),
            None if field.required => {
                return Err(ShapeError::MissingRequired {
                    type_name: owner.to_string(),
                    field: field.name.clone(),
                })
            }
            None => Value::Null,
        };
        out.insert(field.name.clone(), value);
    }
    Ok(())
}

#[derive(Debug, Clone)]
struct RelationshipProjection {
    field: String,
    kind: RelKindId,
    /// Concrete types on which `field` resolves to `kind`.
    owners: Vec<TypeId>,
    kind_name: String,
    edge: Vec<FieldSpec>,
    node: NodeProjection,
}

impl RelationshipProjection {
    fn shape(&self, change: &RelationshipChange) -> Result<Value, ShapeError> {
        let mut out = Map::with_capacity(self.edge.len() + 1);
        copy_fields(&self.kind_name, &self.edge, &change.edge, &mut out)?;
        out.insert("node".into(), self.node.shape(&change.other)?);
        Ok(Value::Object(out))
    }
}

/// A subscription's compiled payload projection.
#[derive(Debug, Clone)]
pub struct Projection {
    target_name: String,
    node: NodeProjection,
    relationships: Vec<RelationshipProjection>,
}

impl Projection {
    pub fn compile(
        types: &TypeRegistry,
        target: TypeId,
        shape: &PayloadShape,
    ) -> Result<Self, ShapeError> {
        let target_name = types.name(target).to_string();
        let node = NodeProjection::compile(types, target, &shape.node)?;

        // Fields declared on the target, then any further fields of its concrete
        // members. Members may reuse a field name for a different kind.
        let members = types.concrete_members(target);
        let mut visible: Vec<(RelationshipField<'_>, Vec<TypeId>)> = Vec::new();
        for field in types.relationship_fields(target) {
            visible.push((field, Vec::new()));
        }
        for &member in &members {
            for field in types.relationship_fields(member) {
                match visible
                    .iter_mut()
                    .find(|(f, _)| f.name == field.name && f.kind.id == field.kind.id)
                {
                    Some((_, owners)) => owners.push(member),
                    None => visible.push((field, vec![member])),
                }
            }
        }

        let default_selection = RelationshipSelection::default();
        if let Some(selected) = &shape.relationships {
            if let Some(unknown) = selected
                .keys()
                .find(|name| !visible.iter().any(|(f, _)| f.name == name.as_str()))
            {
                return Err(ShapeError::NoSuchField {
                    type_name: target_name,
                    field: unknown.clone(),
                });
            }
        }

        let mut relationships = Vec::new();
        for (field, owners) in visible {
            let selection = match &shape.relationships {
                Some(selected) => match selected.get(field.name) {
                    Some(s) => s,
                    None => continue,
                },
                None => &default_selection,
            };

            let kind = field.kind;
            let edge = match &selection.edge {
                None => kind.properties.iter().map(FieldSpec::from).collect(),
                Some(names) if names.iter().any(|n| n == ALL_FIELDS) => {
                    kind.properties.iter().map(FieldSpec::from).collect()
                }
                Some(names) => names
                    .iter()
                    .map(|name| {
                        kind.property(name)
                            .map(FieldSpec::from)
                            .ok_or_else(|| ShapeError::NoSuchField {
                                type_name: kind.name.clone(),
                                field: name.clone(),
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()?,
            };

            relationships.push(RelationshipProjection {
                field: field.name.to_string(),
                kind: kind.id,
                owners,
                kind_name: kind.name.clone(),
                edge,
                node: NodeProjection::compile(types, field.target_type(), &selection.node)?,
            });
        }

        Ok(Self {
            target_name,
            node,
            relationships,
        })
    }

    /// Build the payload for one event.
    ///
    /// Returns `Ok(None)` for a relationship event on a field outside the
    /// subscriber's relationship selection.
    pub fn shape(&self, event: &GraphEvent) -> Result<Option<Value>, ShapeError> {
        let mut out = Map::new();
        out.insert("event".into(), Value::from(event.kind().as_str()));
        out.insert("timestamp".into(), Value::from(event.timestamp.timestamp_millis()));

        match &event.payload {
            EventPayload::NodeCreated { node } => {
                out.insert(format!("created{}", self.target_name), self.node.shape(node)?);
            }
            EventPayload::NodeUpdated { before, after } => {
                out.insert(format!("updated{}", self.target_name), self.node.shape(after)?);
                out.insert("previousState".into(), self.node.shape(before)?);
            }
            EventPayload::NodeDeleted { node } => {
                out.insert(format!("deleted{}", self.target_name), self.node.shape(node)?);
            }
            EventPayload::RelationshipCreated(change)
            | EventPayload::RelationshipDeleted(change) => {
                let Some(involved) = self
                    .relationships
                    .iter()
                    .position(|r| {
                        r.field == change.field
                            && r.kind == change.kind
                            && r.owners.contains(&change.node.concrete)
                    })
                else {
                    return Ok(None);
                };

                // Null out every other selected field the event's owner type declares.
                let owner = change.node.concrete;
                let mut wrapper = Map::with_capacity(self.relationships.len());
                for (i, rel) in self.relationships.iter().enumerate() {
                    if i == involved {
                        wrapper.insert(rel.field.clone(), rel.shape(change)?);
                    } else if rel.owners.contains(&owner) {
                        wrapper.insert(rel.field.clone(), Value::Null);
                    }
                }

                let key = match &event.payload {
                    EventPayload::RelationshipCreated(_) => "createdRelationship",
                    _ => "deletedRelationship",
                };
                out.insert(lower_camel(&self.target_name), self.node.shape(&change.node)?);
                out.insert("relationshipFieldName".into(), Value::from(change.field.as_str()));
                out.insert(key.into(), Value::Object(wrapper));
            }
        }

        Ok(Some(Value::Object(out)))
    }
}

fn lower_camel(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
