//! Type Registry: the static schema of entity types and relationship kinds.
//!
//! The registry is built once from a [`SchemaDocument`] and is immutable
//! afterwards, so it can be shared behind an `Arc` and read from any thread
//! without synchronization.
//!
//! Interface and union membership is resolved at load time into an explicit
//! concrete → abstract table. Nothing downstream ever infers membership from
//! the shape of a value.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::RippleError;
use crate::types::{
    JsonObject, Properties, PropertySnapshot, PropertyValue, RelKindId, ScalarKind, TypeId,
};

/// Errors raised while loading the schema or resolving values against it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("Duplicate type name: {0}")]
    DuplicateType(String),

    #[error("Unknown type: {0}")]
    UnknownType(String),

    #[error("Unknown concrete type: {0}")]
    UnknownConcreteType(String),

    #[error("{type_name} implements {implements}, which is not an interface")]
    NotAnInterface {
        type_name: String,
        implements: String,
    },

    #[error("Union {union} lists {member}, which is not a concrete node type")]
    InvalidUnionMember { union: String, member: String },

    #[error("Interface inheritance cycle through {0}")]
    CyclicInterface(String),

    #[error("Duplicate field {field} on {type_name}")]
    DuplicateField { type_name: String, field: String },

    #[error("{type_name} implements {interface} but does not declare {field}: {kind}")]
    InterfacePropertyMismatch {
        type_name: String,
        interface: String,
        field: String,
        kind: ScalarKind,
    },

    #[error("Duplicate relationship kind: {0}")]
    DuplicateRelationship(String),

    #[error("Relationship {relationship} declares a field on union {union}")]
    FieldOnUnion { relationship: String, union: String },

    #[error("No such relationship kind: {0}")]
    NoSuchRelationship(String),

    #[error("No relationship field {field} on {type_name}")]
    NoSuchRelationshipField { type_name: String, field: String },

    #[error("No such property {field} on {type_name}")]
    NoSuchProperty { type_name: String, field: String },

    #[error("Invalid value for {type_name}.{field}: {reason}")]
    InvalidValue {
        type_name: String,
        field: String,
        reason: String,
    },
}

// ── Schema document ───────────────────────────────────────────────

/// Serializable schema description handed over by the type-generation layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaDocument {
    #[serde(default)]
    pub types: Vec<TypeDecl>,
    #[serde(default)]
    pub relationships: Vec<RelationshipDecl>,
}

/// One declared entity type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TypeDecl {
    Node {
        name: String,
        #[serde(default)]
        implements: Vec<String>,
        #[serde(default)]
        properties: Vec<PropertyDef>,
    },
    Interface {
        name: String,
        #[serde(default)]
        implements: Vec<String>,
        #[serde(default)]
        properties: Vec<PropertyDef>,
    },
    Union {
        name: String,
        members: Vec<String>,
    },
}

impl TypeDecl {
    pub fn name(&self) -> &str {
        match self {
            Self::Node { name, .. } | Self::Interface { name, .. } | Self::Union { name, .. } => {
                name
            }
        }
    }
}

/// A declared property.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PropertyDef {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ScalarKind,
    #[serde(default)]
    pub required: bool,
}

impl PropertyDef {
    pub fn new(name: impl Into<String>, kind: ScalarKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// A declared relationship kind with its two (optional) endpoint fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipDecl {
    pub name: String,
    pub source: String,
    pub target: String,
    /// Field declared on the source type pointing at the target.
    #[serde(default)]
    pub source_field: Option<String>,
    /// Field declared on the target type pointing back at the source.
    #[serde(default)]
    pub target_field: Option<String>,
    #[serde(default)]
    pub properties: Vec<PropertyDef>,
}

// ── Resolved types ────────────────────────────────────────────────

/// A concrete, instantiable node type.
#[derive(Debug, Clone)]
pub struct NodeType {
    pub id: TypeId,
    pub name: String,
    pub properties: Vec<PropertyDef>,
    /// Directly declared interfaces.
    pub implements: Vec<TypeId>,
}

/// An interface. `members` holds every concrete implementor, transitively.
#[derive(Debug, Clone)]
pub struct InterfaceType {
    pub id: TypeId,
    pub name: String,
    pub properties: Vec<PropertyDef>,
    pub implements: Vec<TypeId>,
    pub members: Vec<TypeId>,
}

/// A union of concrete node types.
#[derive(Debug, Clone)]
pub struct UnionType {
    pub id: TypeId,
    pub name: String,
    pub members: Vec<TypeId>,
}

/// Closed set of entity types.
#[derive(Debug, Clone)]
pub enum EntityType {
    Node(NodeType),
    Interface(InterfaceType),
    Union(UnionType),
}

impl EntityType {
    pub fn id(&self) -> TypeId {
        match self {
            Self::Node(t) => t.id,
            Self::Interface(t) => t.id,
            Self::Union(t) => t.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Node(t) => &t.name,
            Self::Interface(t) => &t.name,
            Self::Union(t) => &t.name,
        }
    }

    pub fn is_abstract(&self) -> bool {
        !matches!(self, Self::Node(_))
    }

    /// Declared properties. Unions have none.
    pub fn properties(&self) -> &[PropertyDef] {
        match self {
            Self::Node(t) => &t.properties,
            Self::Interface(t) => &t.properties,
            Self::Union(_) => &[],
        }
    }

    /// Concrete member types. A node type has no members.
    pub fn members(&self) -> &[TypeId] {
        match self {
            Self::Node(_) => &[],
            Self::Interface(t) => &t.members,
            Self::Union(t) => &t.members,
        }
    }
}

/// Which end of a relationship a node sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationshipEnd {
    Source,
    Target,
}

impl RelationshipEnd {
    pub fn opposite(self) -> Self {
        match self {
            Self::Source => Self::Target,
            Self::Target => Self::Source,
        }
    }
}

/// A resolved relationship kind.
#[derive(Debug, Clone)]
pub struct RelationshipKind {
    pub id: RelKindId,
    pub name: String,
    pub source: TypeId,
    pub target: TypeId,
    pub source_field: Option<String>,
    pub target_field: Option<String>,
    pub properties: Vec<PropertyDef>,
}

impl RelationshipKind {
    /// Declared type at one end (possibly abstract).
    pub fn endpoint(&self, end: RelationshipEnd) -> TypeId {
        match end {
            RelationshipEnd::Source => self.source,
            RelationshipEnd::Target => self.target,
        }
    }

    /// Field name declared on the type at one end, if that side is declared.
    pub fn field(&self, end: RelationshipEnd) -> Option<&str> {
        match end {
            RelationshipEnd::Source => self.source_field.as_deref(),
            RelationshipEnd::Target => self.target_field.as_deref(),
        }
    }

    pub fn is_reciprocal(&self) -> bool {
        self.source_field.is_some() && self.target_field.is_some()
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.name == name)
    }
}

/// A relationship field as seen from its owner type.
#[derive(Debug, Clone, Copy)]
pub struct RelationshipField<'a> {
    pub name: &'a str,
    pub kind: &'a RelationshipKind,
    /// The end the owner sits on.
    pub end: RelationshipEnd,
}

impl RelationshipField<'_> {
    /// Declared type of the nodes on the far side of this field.
    pub fn target_type(&self) -> TypeId {
        self.kind.endpoint(self.end.opposite())
    }
}

// ── Registry ──────────────────────────────────────────────────────

/// Immutable schema registry.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    types: Vec<EntityType>,
    by_name: HashMap<String, TypeId>,
    /// Indexed by `TypeId`: every abstract type a concrete type belongs to.
    supertypes: Vec<Vec<TypeId>>,
    kinds: Vec<RelationshipKind>,
    kinds_by_name: HashMap<String, RelKindId>,
    /// Indexed by `TypeId`: relationship fields declared directly on the type.
    declared_fields: Vec<Vec<FieldEntry>>,
    /// Indexed by `TypeId`: own relationship fields, then inherited ones.
    visible_fields: Vec<Vec<FieldEntry>>,
}

type FieldEntry = (String, RelKindId, RelationshipEnd);

impl TypeRegistry {
    /// Build and validate a registry from a schema document.
    pub fn from_document(doc: &SchemaDocument) -> Result<Self, SchemaError> {
        let mut by_name = HashMap::with_capacity(doc.types.len());
        for (i, decl) in doc.types.iter().enumerate() {
            let id = TypeId(i as u32);
            if by_name.insert(decl.name().to_string(), id).is_some() {
                return Err(SchemaError::DuplicateType(decl.name().to_string()));
            }
        }

        let lookup = |name: &str| {
            by_name
                .get(name)
                .copied()
                .ok_or_else(|| SchemaError::UnknownType(name.to_string()))
        };

        let mut types = Vec::with_capacity(doc.types.len());
        for (i, decl) in doc.types.iter().enumerate() {
            let id = TypeId(i as u32);
            let entity = match decl {
                TypeDecl::Node {
                    name,
                    implements,
                    properties,
                } => {
                    check_unique_properties(name, properties)?;
                    EntityType::Node(NodeType {
                        id,
                        name: name.clone(),
                        properties: properties.clone(),
                        implements: resolve_interfaces(name, implements, doc, &lookup)?,
                    })
                }
                TypeDecl::Interface {
                    name,
                    implements,
                    properties,
                } => {
                    check_unique_properties(name, properties)?;
                    EntityType::Interface(InterfaceType {
                        id,
                        name: name.clone(),
                        properties: properties.clone(),
                        implements: resolve_interfaces(name, implements, doc, &lookup)?,
                        members: Vec::new(),
                    })
                }
                TypeDecl::Union { name, members } => {
                    let mut resolved = Vec::with_capacity(members.len());
                    for member in members {
                        let member_id = lookup(member)?;
                        if !matches!(doc.types[member_id.index()], TypeDecl::Node { .. }) {
                            return Err(SchemaError::InvalidUnionMember {
                                union: name.clone(),
                                member: member.clone(),
                            });
                        }
                        resolved.push(member_id);
                    }
                    EntityType::Union(UnionType {
                        id,
                        name: name.clone(),
                        members: resolved,
                    })
                }
            };
            types.push(entity);
        }

        let supertypes = close_memberships(&mut types)?;
        check_interface_conformance(&types, &supertypes)?;

        let mut registry = Self {
            declared_fields: vec![Vec::new(); types.len()],
            visible_fields: Vec::new(),
            types,
            by_name,
            supertypes,
            kinds: Vec::with_capacity(doc.relationships.len()),
            kinds_by_name: HashMap::with_capacity(doc.relationships.len()),
        };

        for decl in &doc.relationships {
            registry.add_relationship(decl)?;
        }
        registry.visible_fields = (0..registry.types.len())
            .map(|i| registry.collect_visible_fields(TypeId(i as u32)))
            .collect();
        registry.check_field_namespaces()?;

        tracing::debug!(
            types = registry.types.len(),
            relationships = registry.kinds.len(),
            "Type registry built"
        );

        Ok(registry)
    }

    /// Parse a JSON schema document from disk and build the registry.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, RippleError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let doc: SchemaDocument = serde_json::from_str(&raw)?;
        Ok(Self::from_document(&doc)?)
    }

    fn add_relationship(&mut self, decl: &RelationshipDecl) -> Result<(), SchemaError> {
        if self.kinds_by_name.contains_key(&decl.name) {
            return Err(SchemaError::DuplicateRelationship(decl.name.clone()));
        }
        let source = self.require(&decl.source)?;
        let target = self.require(&decl.target)?;
        check_unique_properties(&decl.name, &decl.properties)?;

        let id = RelKindId(self.kinds.len() as u32);
        for (owner, field, end) in [
            (source, &decl.source_field, RelationshipEnd::Source),
            (target, &decl.target_field, RelationshipEnd::Target),
        ] {
            let Some(field) = field else { continue };
            if let EntityType::Union(u) = self.get(owner) {
                return Err(SchemaError::FieldOnUnion {
                    relationship: decl.name.clone(),
                    union: u.name.clone(),
                });
            }
            self.declared_fields[owner.index()].push((field.clone(), id, end));
        }

        self.kinds_by_name.insert(decl.name.clone(), id);
        self.kinds.push(RelationshipKind {
            id,
            name: decl.name.clone(),
            source,
            target,
            source_field: decl.source_field.clone(),
            target_field: decl.target_field.clone(),
            properties: decl.properties.clone(),
        });
        Ok(())
    }

    fn collect_visible_fields(&self, id: TypeId) -> Vec<FieldEntry> {
        std::iter::once(id)
            .chain(self.interface_ancestors(id))
            .flat_map(|owner| self.declared_fields[owner.index()].iter().cloned())
            .collect()
    }

    /// Properties and relationship fields share one namespace per type,
    /// including relationship fields inherited from interfaces.
    fn check_field_namespaces(&self) -> Result<(), SchemaError> {
        for entity in &self.types {
            let mut seen: HashSet<&str> =
                entity.properties().iter().map(|p| p.name.as_str()).collect();
            for (field, _, _) in &self.visible_fields[entity.id().index()] {
                if !seen.insert(field.as_str()) {
                    return Err(SchemaError::DuplicateField {
                        type_name: entity.name().to_string(),
                        field: field.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn require(&self, name: &str) -> Result<TypeId, SchemaError> {
        self.type_id(name)
            .ok_or_else(|| SchemaError::UnknownType(name.to_string()))
    }

    // ── Type lookups ─────────────────────────────────────────────

    pub fn type_id(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    /// Resolve an id minted by this registry.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not produced by this registry.
    pub fn get(&self, id: TypeId) -> &EntityType {
        &self.types[id.index()]
    }

    pub fn by_name(&self, name: &str) -> Option<&EntityType> {
        self.type_id(name).map(|id| self.get(id))
    }

    pub fn name(&self, id: TypeId) -> &str {
        self.get(id).name()
    }

    pub fn types(&self) -> impl Iterator<Item = &EntityType> {
        self.types.iter()
    }

    pub fn concrete_types(&self) -> impl Iterator<Item = &NodeType> {
        self.types.iter().filter_map(|t| match t {
            EntityType::Node(n) => Some(n),
            _ => None,
        })
    }

    /// Resolve the concrete type named by a trace record.
    pub fn resolve_concrete_type(&self, type_name: &str) -> Result<&NodeType, SchemaError> {
        match self.by_name(type_name) {
            Some(EntityType::Node(node)) => Ok(node),
            _ => Err(SchemaError::UnknownConcreteType(type_name.to_string())),
        }
    }

    /// Whether `concrete` is a member of the abstract type `abstract_type`.
    pub fn is_member(&self, concrete: TypeId, abstract_type: TypeId) -> bool {
        self.supertypes[concrete.index()].contains(&abstract_type)
    }

    /// Whether a value of `concrete` type is acceptable where `declared` is expected.
    pub fn admits(&self, declared: TypeId, concrete: TypeId) -> bool {
        declared == concrete || self.is_member(concrete, declared)
    }

    /// Every abstract type (interfaces, transitively, and unions) a concrete type belongs to.
    pub fn supertypes(&self, concrete: TypeId) -> &[TypeId] {
        &self.supertypes[concrete.index()]
    }

    /// Concrete types acceptable where `declared` is expected.
    pub fn concrete_members(&self, declared: TypeId) -> Vec<TypeId> {
        match self.get(declared) {
            EntityType::Node(n) => vec![n.id],
            other => other.members().to_vec(),
        }
    }

    fn interface_ancestors(&self, id: TypeId) -> Vec<TypeId> {
        let mut seen = Vec::new();
        let mut queue: VecDeque<TypeId> =
            direct_interfaces(self.get(id)).iter().copied().collect();
        while let Some(next) = queue.pop_front() {
            if seen.contains(&next) {
                continue;
            }
            seen.push(next);
            queue.extend(direct_interfaces(self.get(next)).iter().copied());
        }
        seen
    }

    // ── Properties ───────────────────────────────────────────────

    pub fn property(&self, type_id: TypeId, field: &str) -> Option<&PropertyDef> {
        self.get(type_id).properties().iter().find(|p| p.name == field)
    }

    /// Declared kind of a property.
    pub fn property_kind(&self, type_id: TypeId, field: &str) -> Result<ScalarKind, SchemaError> {
        self.property(type_id, field)
            .map(|p| p.kind)
            .ok_or_else(|| SchemaError::NoSuchProperty {
                type_name: self.name(type_id).to_string(),
                field: field.to_string(),
            })
    }

    /// Coerce a raw JSON object into a typed snapshot of a concrete type.
    pub fn snapshot(
        &self,
        concrete: TypeId,
        raw: &JsonObject,
    ) -> Result<PropertySnapshot, SchemaError> {
        let declared = self.get(concrete).properties();
        let properties = coerce_properties(self.name(concrete), declared, raw)?;
        Ok(PropertySnapshot::new(concrete, properties))
    }

    // ── Relationships ────────────────────────────────────────────

    pub fn relationship_kind(&self, id: RelKindId) -> &RelationshipKind {
        &self.kinds[id.index()]
    }

    pub fn relationship_kind_by_name(&self, name: &str) -> Option<&RelationshipKind> {
        self.kinds_by_name.get(name).map(|id| self.relationship_kind(*id))
    }

    pub fn relationship_kinds(&self) -> impl Iterator<Item = &RelationshipKind> {
        self.kinds.iter()
    }

    /// Every relationship field visible on a type: its own, then those of its interfaces.
    pub fn relationship_fields(&self, type_id: TypeId) -> Vec<RelationshipField<'_>> {
        self.visible_fields[type_id.index()]
            .iter()
            .map(|entry| self.field_view(entry))
            .collect()
    }

    /// Look up one relationship field visible on a type.
    pub fn relationship_field(
        &self,
        type_id: TypeId,
        field: &str,
    ) -> Option<RelationshipField<'_>> {
        self.visible_fields[type_id.index()]
            .iter()
            .find(|(name, _, _)| name == field)
            .map(|entry| self.field_view(entry))
    }

    fn field_view<'a>(&'a self, (name, kind, end): &'a FieldEntry) -> RelationshipField<'a> {
        RelationshipField {
            name,
            kind: self.relationship_kind(*kind),
            end: *end,
        }
    }

    /// Coerce a raw JSON object into typed edge properties.
    pub fn edge_properties(
        &self,
        kind: RelKindId,
        raw: &JsonObject,
    ) -> Result<Properties, SchemaError> {
        let kind = self.relationship_kind(kind);
        coerce_properties(&kind.name, &kind.properties, raw)
    }
}

// ── Load-time helpers ─────────────────────────────────────────────

fn direct_interfaces(entity: &EntityType) -> &[TypeId] {
    match entity {
        EntityType::Node(n) => &n.implements,
        EntityType::Interface(i) => &i.implements,
        EntityType::Union(_) => &[],
    }
}

fn resolve_interfaces(
    type_name: &str,
    implements: &[String],
    doc: &SchemaDocument,
    lookup: &impl Fn(&str) -> Result<TypeId, SchemaError>,
) -> Result<Vec<TypeId>, SchemaError> {
    implements
        .iter()
        .map(|iface| {
            let id = lookup(iface)?;
            match doc.types[id.index()] {
                TypeDecl::Interface { .. } => Ok(id),
                _ => Err(SchemaError::NotAnInterface {
                    type_name: type_name.to_string(),
                    implements: iface.clone(),
                }),
            }
        })
        .collect()
}

fn check_unique_properties(owner: &str, properties: &[PropertyDef]) -> Result<(), SchemaError> {
    let mut seen = HashSet::with_capacity(properties.len());
    for p in properties {
        if !seen.insert(p.name.as_str()) {
            return Err(SchemaError::DuplicateField {
                type_name: owner.to_string(),
                field: p.name.clone(),
            });
        }
    }
    Ok(())
}

/// Walk interface inheritance for every concrete type, record the closure,
/// and fill in interface and union membership.
fn close_memberships(types: &mut [EntityType]) -> Result<Vec<Vec<TypeId>>, SchemaError> {
    // Interface-to-interface edges must be acyclic.
    for entity in types.iter() {
        if let EntityType::Interface(iface) = entity {
            let mut stack: Vec<TypeId> = iface.implements.clone();
            let mut visited = HashSet::new();
            while let Some(next) = stack.pop() {
                if next == iface.id {
                    return Err(SchemaError::CyclicInterface(iface.name.clone()));
                }
                if visited.insert(next) {
                    stack.extend(direct_interfaces(&types[next.index()]).iter().copied());
                }
            }
        }
    }

    let mut supertypes = vec![Vec::new(); types.len()];
    for entity in types.iter() {
        let EntityType::Node(node) = entity else { continue };
        let mut queue: VecDeque<TypeId> = node.implements.iter().copied().collect();
        let closure = &mut supertypes[node.id.index()];
        while let Some(iface) = queue.pop_front() {
            if closure.contains(&iface) {
                continue;
            }
            closure.push(iface);
            queue.extend(direct_interfaces(&types[iface.index()]).iter().copied());
        }
    }
    for entity in types.iter() {
        if let EntityType::Union(u) = entity {
            for member in &u.members {
                if !supertypes[member.index()].contains(&u.id) {
                    supertypes[member.index()].push(u.id);
                }
            }
        }
    }

    for (concrete, abstracts) in supertypes.iter().enumerate() {
        for abstract_id in abstracts {
            if let EntityType::Interface(iface) = &mut types[abstract_id.index()] {
                iface.members.push(TypeId(concrete as u32));
            }
        }
    }

    Ok(supertypes)
}

/// Every property an interface declares must be declared with the same kind
/// on each concrete implementor.
fn check_interface_conformance(
    types: &[EntityType],
    supertypes: &[Vec<TypeId>],
) -> Result<(), SchemaError> {
    for entity in types {
        let EntityType::Node(node) = entity else { continue };
        for abstract_id in &supertypes[node.id.index()] {
            let EntityType::Interface(iface) = &types[abstract_id.index()] else {
                continue;
            };
            for wanted in &iface.properties {
                let conforms = node
                    .properties
                    .iter()
                    .any(|p| p.name == wanted.name && p.kind == wanted.kind);
                if !conforms {
                    return Err(SchemaError::InterfacePropertyMismatch {
                        type_name: node.name.clone(),
                        interface: iface.name.clone(),
                        field: wanted.name.clone(),
                        kind: wanted.kind,
                    });
                }
            }
        }
    }
    Ok(())
}

fn coerce_properties(
    owner: &str,
    defs: &[PropertyDef],
    raw: &JsonObject,
) -> Result<Properties, SchemaError> {
    let mut properties = Properties::new();
    for (name, value) in raw {
        let def = defs
            .iter()
            .find(|d| &d.name == name)
            .ok_or_else(|| SchemaError::NoSuchProperty {
                type_name: owner.to_string(),
                field: name.clone(),
            })?;
        let typed = PropertyValue::from_json(def.kind, value).map_err(|e| {
            SchemaError::InvalidValue {
                type_name: owner.to_string(),
                field: name.clone(),
                reason: e.to_string(),
            }
        })?;
        properties.insert(name.clone(), typed);
    }
    Ok(properties)
}
