//! Compiled predicate trees and their evaluation.
//!
//! A tree is compiled once per subscription and evaluated against every
//! candidate event. Evaluation never allocates and never fails: anything that
//! could go wrong was rejected at compile time.

use ripple_core::{GraphEvent, Properties, PropertySnapshot, RelKindId, RelationshipChange, TypeId};

use crate::operator::{self, Operand, Operator};

/// One node of a compiled filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// All children hold. An empty conjunction is true.
    And(Vec<Predicate>),
    /// At least one child holds. An empty disjunction is false.
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    Compare(Comparison),
    /// `_on`: per-concrete-type sub-predicates. Types without an entry pass.
    TypeScoped(Vec<(TypeId, Predicate)>),
    Relationship(RelationshipClause),
}

/// `field <op> literal` on a node or edge property.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub field: String,
    pub op: Operator,
    pub operand: Operand,
}

/// Constraint on the relationship of a relationship event.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipClause {
    /// Relationship field on the subscribed type.
    pub field: String,
    pub kind: RelKindId,
    pub edge: Option<Box<Predicate>>,
    /// Predicate on the node at the far end.
    pub node: Option<Box<Predicate>>,
}

/// What a predicate is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    /// Concrete type of the node in scope. Edges have none.
    pub concrete: Option<TypeId>,
    pub properties: &'a Properties,
    pub relationship: Option<&'a RelationshipChange>,
}

impl<'a> Scope<'a> {
    pub fn node(snapshot: &'a PropertySnapshot) -> Self {
        Self {
            concrete: Some(snapshot.concrete),
            properties: &snapshot.properties,
            relationship: None,
        }
    }

    pub fn edge(properties: &'a Properties) -> Self {
        Self {
            concrete: None,
            properties,
            relationship: None,
        }
    }

    /// The subscribed-side node of a relationship event, with the relationship attached.
    pub fn relationship(change: &'a RelationshipChange) -> Self {
        Self {
            relationship: Some(change),
            ..Self::node(&change.node)
        }
    }

    /// Scope for matching a subscription filter against an event.
    pub fn event(event: &'a GraphEvent) -> Self {
        match event.relationship() {
            Some(change) => Self::relationship(change),
            None => Self::node(event.subject()),
        }
    }
}

impl Predicate {
    pub fn evaluate(&self, scope: &Scope<'_>) -> bool {
        match self {
            Self::And(children) => children.iter().all(|c| c.evaluate(scope)),
            Self::Or(children) => children.iter().any(|c| c.evaluate(scope)),
            Self::Not(inner) => !inner.evaluate(scope),
            Self::Compare(cmp) => {
                let actual = scope.properties.get(&cmp.field).filter(|v| !v.is_null());
                operator::apply(cmp.op, actual, &cmp.operand)
            }
            Self::TypeScoped(entries) => {
                let Some(concrete) = scope.concrete else {
                    return true;
                };
                entries
                    .iter()
                    .find(|(ty, _)| *ty == concrete)
                    .map_or(true, |(_, p)| p.evaluate(scope))
            }
            Self::Relationship(clause) => match scope.relationship {
                None => true,
                Some(change) => clause.evaluate(change),
            },
        }
    }
}

impl RelationshipClause {
    fn evaluate(&self, change: &RelationshipChange) -> bool {
        if change.kind != self.kind || change.field != self.field {
            return false;
        }
        let edge_ok = self
            .edge
            .as_ref()
            .map_or(true, |p| p.evaluate(&Scope::edge(&change.edge)));
        edge_ok
            && self
                .node
                .as_ref()
                .map_or(true, |p| p.evaluate(&Scope::node(&change.other)))
    }
}

/// A subscription's filter, ready for matching.
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledPredicate {
    /// No filter, or an empty one.
    Always,
    /// The filter failed to compile; nothing ever matches.
    Never,
    Tree(Predicate),
}

impl CompiledPredicate {
    pub fn matches(&self, event: &GraphEvent) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Tree(root) => root.evaluate(&Scope::event(event)),
        }
    }

    pub fn is_never(&self) -> bool {
        matches!(self, Self::Never)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ripple_core::{EventPayload, PropertyValue};

    fn props(pairs: &[(&str, PropertyValue)]) -> Properties {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn eq(field: &str, value: PropertyValue) -> Predicate {
        Predicate::Compare(Comparison {
            field: field.to_string(),
            op: Operator::Eq,
            operand: Operand::Value(value),
        })
    }

    fn name(v: &str) -> PropertyValue {
        PropertyValue::String(v.to_string())
    }

    #[test]
    fn type_scoped_is_vacuous_for_other_types() {
        let snap = PropertySnapshot::new(TypeId(1), props(&[("name", name("Keanu"))]));
        let scoped = Predicate::TypeScoped(vec![(TypeId(2), eq("name", name("Carrie")))]);
        assert!(scoped.evaluate(&Scope::node(&snap)));

        let scoped = Predicate::TypeScoped(vec![(TypeId(1), eq("name", name("Carrie")))]);
        assert!(!scoped.evaluate(&Scope::node(&snap)));
    }

    #[test]
    fn type_scope_does_not_veto_common_field() {
        let snap = PropertySnapshot::new(TypeId(1), props(&[("name", name("Keanu"))]));
        let tree = Predicate::And(vec![
            eq("name", name("Keanu")),
            Predicate::TypeScoped(vec![(TypeId(7), eq("name", name("nobody")))]),
        ]);
        assert!(tree.evaluate(&Scope::node(&snap)));
    }

    #[test]
    fn boolean_combinators() {
        let snap = PropertySnapshot::new(TypeId(0), props(&[("title", name("Matrix"))]));
        let scope = Scope::node(&snap);
        assert!(Predicate::And(vec![]).evaluate(&scope));
        assert!(!Predicate::Or(vec![]).evaluate(&scope));
        assert!(Predicate::Or(vec![eq("title", name("Speed")), eq("title", name("Matrix"))])
            .evaluate(&scope));
        assert!(!Predicate::Not(Box::new(eq("title", name("Matrix")))).evaluate(&scope));
    }

    fn change(field: &str, screen_time: i64) -> RelationshipChange {
        RelationshipChange {
            kind: RelKindId(0),
            field: field.to_string(),
            node: PropertySnapshot::new(TypeId(0), props(&[("title", name("Matrix"))])),
            edge: props(&[("screenTime", PropertyValue::Int(screen_time))]),
            other: PropertySnapshot::new(TypeId(1), props(&[("name", name("Keanu"))])),
        }
    }

    fn clause(field: &str) -> Predicate {
        Predicate::Relationship(RelationshipClause {
            field: field.to_string(),
            kind: RelKindId(0),
            edge: Some(Box::new(Predicate::Compare(Comparison {
                field: "screenTime".to_string(),
                op: Operator::Gt,
                operand: Operand::Value(PropertyValue::Int(100)),
            }))),
            node: Some(Box::new(eq("name", name("Keanu")))),
        })
    }

    #[test]
    fn relationship_clause_checks_edge_and_other_end() {
        let matching = change("actors", 1000);
        assert!(clause("actors").evaluate(&Scope::relationship(&matching)));

        let short = change("actors", 10);
        assert!(!clause("actors").evaluate(&Scope::relationship(&short)));
    }

    #[test]
    fn relationship_clause_on_other_field_is_false() {
        let event = change("directors", 1000);
        assert!(!clause("actors").evaluate(&Scope::relationship(&event)));
    }

    #[test]
    fn relationship_clause_is_vacuous_for_node_events() {
        let snap = PropertySnapshot::new(TypeId(0), props(&[("title", name("Matrix"))]));
        let event = GraphEvent::new(Utc::now(), EventPayload::NodeCreated { node: snap });
        let compiled = CompiledPredicate::Tree(clause("actors"));
        assert!(compiled.matches(&event));
    }

    #[test]
    fn never_matches_nothing() {
        let snap = PropertySnapshot::new(TypeId(0), Properties::new());
        let event = GraphEvent::new(Utc::now(), EventPayload::NodeDeleted { node: snap });
        assert!(!CompiledPredicate::Never.matches(&event));
        assert!(CompiledPredicate::Always.matches(&event));
        assert!(CompiledPredicate::Never.is_never());
    }
}
