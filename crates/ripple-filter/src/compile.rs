//! Filter compiler: JSON filter objects to typed predicate trees.
//!
//! Every field, operator and literal is checked against the Type Registry
//! here, so that evaluation can assume a well-typed tree.

use ripple_core::schema::{EntityType, RelationshipField};
use ripple_core::{PropertyValue, RelKindId, ScalarKind, TypeId, TypeRegistry};
use serde_json::Value;

use crate::error::{FilterError, Result};
use crate::operator::{Operand, Operator};
use crate::predicate::{Comparison, CompiledPredicate, Predicate, RelationshipClause};

/// Compile a subscription filter against its target type.
///
/// An absent, `null` or empty filter matches everything.
pub fn compile(
    registry: &TypeRegistry,
    target: TypeId,
    filter: Option<&Value>,
) -> Result<CompiledPredicate> {
    let filter = match filter {
        None | Some(Value::Null) => return Ok(CompiledPredicate::Always),
        Some(Value::Object(map)) if map.is_empty() => return Ok(CompiledPredicate::Always),
        Some(f) => f,
    };

    let compiler = Compiler { registry };
    let root = compiler.object(
        Source::Node {
            ty: target,
            relationships: true,
        },
        filter,
    )?;
    Ok(CompiledPredicate::Tree(root))
}

/// Where the properties named in a filter object live.
#[derive(Debug, Clone, Copy)]
enum Source {
    Node { ty: TypeId, relationships: bool },
    Edge(RelKindId),
}

struct Compiler<'r> {
    registry: &'r TypeRegistry,
}

impl Compiler<'_> {
    fn object(&self, source: Source, value: &Value) -> Result<Predicate> {
        let Value::Object(map) = value else {
            return Err(FilterError::MalformedFilter(format!(
                "expected an object on {}, found {value}",
                self.owner(source)
            )));
        };

        let mut clauses = Vec::with_capacity(map.len());
        for (key, v) in map {
            clauses.push(self.entry(source, key, v)?);
        }
        Ok(match clauses.len() {
            1 => clauses.remove(0),
            _ => Predicate::And(clauses),
        })
    }

    fn entry(&self, source: Source, key: &str, value: &Value) -> Result<Predicate> {
        match key {
            "AND" => Ok(Predicate::And(self.list(source, key, value)?)),
            "OR" => Ok(Predicate::Or(self.list(source, key, value)?)),
            "NOT" => Ok(Predicate::Not(Box::new(self.object(source, value)?))),
            "_on" => self.type_scoped(source, value),
            _ => self.field(source, key, value),
        }
    }

    fn list(&self, source: Source, key: &str, value: &Value) -> Result<Vec<Predicate>> {
        let Value::Array(items) = value else {
            return Err(FilterError::MalformedFilter(format!(
                "{key} expects a list of filter objects"
            )));
        };
        items.iter().map(|item| self.object(source, item)).collect()
    }

    fn field(&self, source: Source, key: &str, value: &Value) -> Result<Predicate> {
        if let Some(kind) = self.property_kind(source, key) {
            return self.comparison(key, Operator::Eq, kind, value);
        }

        if let Source::Node { ty, relationships } = source {
            if let Some(field) = self.registry.relationship_field(ty, key) {
                if !relationships {
                    return Err(FilterError::NestedRelationship {
                        field: key.to_string(),
                    });
                }
                return self.relationship(field, value);
            }
        }

        if let Some((field, op)) = Operator::split_key(key) {
            return match self.property_kind(source, field) {
                Some(kind) => self.comparison(field, op, kind, value),
                None => Err(self.no_such_property(source, field)),
            };
        }

        // `title_MATCHES` and the like: a real property with a suffix we do not know.
        for (i, _) in key.match_indices('_') {
            let (field, suffix) = key.split_at(i);
            let looks_like_operator = suffix.len() > 1
                && suffix[1..]
                    .chars()
                    .all(|c| c.is_ascii_uppercase() || c == '_');
            if looks_like_operator && self.property_kind(source, field).is_some() {
                return Err(FilterError::UnknownOperator {
                    field: field.to_string(),
                    operator: suffix.to_string(),
                });
            }
        }

        Err(self.no_such_property(source, key))
    }

    fn comparison(
        &self,
        field: &str,
        op: Operator,
        kind: ScalarKind,
        value: &Value,
    ) -> Result<Predicate> {
        if !op.applies_to(kind) {
            return Err(FilterError::InvalidFilterType {
                field: field.to_string(),
                operator: op.to_string(),
                kind,
            });
        }

        let invalid = |reason: String| FilterError::InvalidLiteral {
            field: field.to_string(),
            operator: op.suffix().to_string(),
            reason,
        };

        let operand = if value.is_null() {
            if !op.accepts_null() {
                return Err(invalid("null is only allowed with equality and _NOT".into()));
            }
            Operand::Value(PropertyValue::Null)
        } else if op.takes_list() {
            let Value::Array(items) = value else {
                return Err(invalid("expected a list".into()));
            };
            let values = items
                .iter()
                .map(|item| PropertyValue::from_json(kind, item))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| invalid(e.to_string()))?;
            Operand::List(values)
        } else if op.takes_element() {
            if value.is_array() || value.is_object() {
                return Err(invalid("expected a single list element".into()));
            }
            Operand::Value(
                PropertyValue::from_untyped_json(value).map_err(|e| invalid(e.to_string()))?,
            )
        } else {
            Operand::Value(
                PropertyValue::from_json(kind, value).map_err(|e| invalid(e.to_string()))?,
            )
        };

        Ok(Predicate::Compare(Comparison {
            field: field.to_string(),
            op,
            operand,
        }))
    }

    fn type_scoped(&self, source: Source, value: &Value) -> Result<Predicate> {
        let Source::Node { ty, relationships } = source else {
            return Err(FilterError::MalformedFilter(
                "_on is not allowed on relationship properties".into(),
            ));
        };
        let Value::Object(map) = value else {
            return Err(FilterError::MalformedFilter(
                "_on expects an object keyed by type name".into(),
            ));
        };

        let mut entries = Vec::with_capacity(map.len());
        for (type_name, sub) in map {
            let member = self
                .registry
                .type_id(type_name)
                .ok_or_else(|| FilterError::UnknownType(type_name.clone()))?;
            let is_concrete = matches!(self.registry.get(member), EntityType::Node(_));
            if !is_concrete || !self.registry.admits(ty, member) {
                return Err(FilterError::NotAMember {
                    type_name: type_name.clone(),
                    target: self.registry.name(ty).to_string(),
                });
            }
            let predicate = self.object(
                Source::Node {
                    ty: member,
                    relationships,
                },
                sub,
            )?;
            entries.push((member, predicate));
        }
        Ok(Predicate::TypeScoped(entries))
    }

    fn relationship(&self, field: RelationshipField<'_>, value: &Value) -> Result<Predicate> {
        let Value::Object(map) = value else {
            return Err(FilterError::MalformedFilter(format!(
                "relationship filter {} expects an object with edge and node",
                field.name
            )));
        };

        let mut clause = RelationshipClause {
            field: field.name.to_string(),
            kind: field.kind.id,
            edge: None,
            node: None,
        };
        for (key, sub) in map {
            match key.as_str() {
                "edge" => {
                    clause.edge = Some(Box::new(self.object(Source::Edge(field.kind.id), sub)?));
                }
                "node" => {
                    let other = Source::Node {
                        ty: field.target_type(),
                        relationships: false,
                    };
                    clause.node = Some(Box::new(self.object(other, sub)?));
                }
                other => {
                    return Err(FilterError::MalformedFilter(format!(
                        "unexpected key {other} in relationship filter {}",
                        field.name
                    )));
                }
            }
        }
        Ok(Predicate::Relationship(clause))
    }

    fn property_kind(&self, source: Source, name: &str) -> Option<ScalarKind> {
        match source {
            Source::Node { ty, .. } => self.registry.property(ty, name).map(|p| p.kind),
            Source::Edge(kind) => self
                .registry
                .relationship_kind(kind)
                .property(name)
                .map(|p| p.kind),
        }
    }

    fn owner(&self, source: Source) -> &str {
        match source {
            Source::Node { ty, .. } => self.registry.name(ty),
            Source::Edge(kind) => &self.registry.relationship_kind(kind).name,
        }
    }

    fn no_such_property(&self, source: Source, field: &str) -> FilterError {
        FilterError::NoSuchProperty {
            owner: self.owner(source).to_string(),
            field: field.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ripple_core::{
        EventPayload, GraphEvent, Properties, PropertySnapshot, RelationshipChange, SchemaDocument,
    };
    use serde_json::json;

    fn registry() -> TypeRegistry {
        let doc: SchemaDocument = serde_json::from_value(json!({
            "types": [
                {"kind": "interface", "name": "Reviewer", "properties": [
                    {"name": "reputation", "type": "Int"}
                ]},
                {"kind": "node", "name": "Movie", "properties": [
                    {"name": "title", "type": "String"},
                    {"name": "budget", "type": "BigInt"},
                    {"name": "released", "type": "Boolean"},
                    {"name": "imdbId", "type": "ID"},
                    {"name": "rating", "type": "Float"},
                    {"name": "tags", "type": "List"}
                ]},
                {"kind": "node", "name": "Actor", "properties": [
                    {"name": "name", "type": "String"}
                ]},
                {"kind": "node", "name": "Person", "implements": ["Reviewer"], "properties": [
                    {"name": "name", "type": "String"},
                    {"name": "reputation", "type": "Int"}
                ]},
                {"kind": "node", "name": "Influencer", "implements": ["Reviewer"], "properties": [
                    {"name": "url", "type": "String"},
                    {"name": "reputation", "type": "Int"}
                ]}
            ],
            "relationships": [
                {"name": "ACTED_IN", "source": "Actor", "target": "Movie",
                 "sourceField": "movies", "targetField": "actors",
                 "properties": [{"name": "screenTime", "type": "Int"}]},
                {"name": "REVIEWED", "source": "Reviewer", "target": "Movie",
                 "targetField": "reviewers",
                 "properties": [{"name": "score", "type": "Int"}]}
            ]
        }))
        .unwrap();
        TypeRegistry::from_document(&doc).unwrap()
    }

    fn node_event(reg: &TypeRegistry, type_name: &str, props: serde_json::Value) -> GraphEvent {
        let ty = reg.type_id(type_name).unwrap();
        let node = reg.snapshot(ty, props.as_object().unwrap()).unwrap();
        GraphEvent::new(Utc::now(), EventPayload::NodeCreated { node })
    }

    fn compile_on(
        reg: &TypeRegistry,
        target: &str,
        filter: serde_json::Value,
    ) -> Result<CompiledPredicate> {
        compile(reg, reg.type_id(target).unwrap(), Some(&filter))
    }

    #[test]
    fn empty_filters_always_match() {
        let reg = registry();
        let movie = reg.type_id("Movie").unwrap();
        assert_eq!(compile(&reg, movie, None).unwrap(), CompiledPredicate::Always);
        assert_eq!(compile(&reg, movie, Some(&json!({}))).unwrap(), CompiledPredicate::Always);
        assert_eq!(compile(&reg, movie, Some(&json!(null))).unwrap(), CompiledPredicate::Always);
    }

    #[test]
    fn ordering_on_non_numeric_fails_wholesale() {
        let reg = registry();
        for filter in [
            json!({"title_LT": "M"}),
            json!({"released_GTE": true}),
            json!({"imdbId_GT": "tt01"}),
            json!({"budget_GT": 5, "title_LTE": "Z"}),
        ] {
            let err = compile_on(&reg, "Movie", filter).unwrap_err();
            assert!(err.is_type_mismatch(), "{err}");
        }
    }

    #[test]
    fn bigint_literal_beyond_i64() {
        let reg = registry();
        let compiled =
            compile_on(&reg, "Movie", json!({"budget_GT": "9223372036854775807"})).unwrap();
        let rich = node_event(&reg, "Movie", json!({"budget": "9223372036854775808"}));
        let poor = node_event(&reg, "Movie", json!({"budget": 10}));
        assert!(compiled.matches(&rich));
        assert!(!compiled.matches(&poor));
    }

    #[test]
    fn implicit_conjunction() {
        let reg = registry();
        let compiled = compile_on(
            &reg,
            "Movie",
            json!({"title_STARTS_WITH": "The", "rating_GTE": 8.0}),
        )
        .unwrap();
        assert!(compiled.matches(&node_event(
            &reg,
            "Movie",
            json!({"title": "The Matrix", "rating": 8.7})
        )));
        assert!(!compiled.matches(&node_event(
            &reg,
            "Movie",
            json!({"title": "The Room", "rating": 3.6})
        )));
    }

    #[test]
    fn boolean_combinators_compile() {
        let reg = registry();
        let compiled = compile_on(
            &reg,
            "Movie",
            json!({"OR": [{"title": "Speed"}, {"NOT": {"tags_INCLUDES": "drama"}}]}),
        )
        .unwrap();
        let movie = |props| node_event(&reg, "Movie", props);
        assert!(compiled.matches(&movie(json!({"title": "Speed", "tags": ["drama"]}))));
        assert!(compiled.matches(&movie(json!({"title": "Heat", "tags": ["crime"]}))));
        assert!(!compiled.matches(&movie(json!({"title": "Heat", "tags": ["drama"]}))));
    }

    #[test]
    fn unknown_fields_and_operators() {
        let reg = registry();
        assert!(matches!(
            compile_on(&reg, "Movie", json!({"runtime": 120})),
            Err(FilterError::NoSuchProperty { .. })
        ));
        assert!(matches!(
            compile_on(&reg, "Movie", json!({"runtime_GT": 120})),
            Err(FilterError::NoSuchProperty { .. })
        ));
        assert_eq!(
            compile_on(&reg, "Movie", json!({"title_MATCHES": "M.*"})).unwrap_err(),
            FilterError::UnknownOperator {
                field: "title".to_string(),
                operator: "_MATCHES".to_string()
            }
        );
    }

    #[test]
    fn invalid_literals() {
        let reg = registry();
        assert!(matches!(
            compile_on(&reg, "Movie", json!({"title": 5})),
            Err(FilterError::InvalidLiteral { .. })
        ));
        assert!(matches!(
            compile_on(&reg, "Movie", json!({"title_IN": "Speed"})),
            Err(FilterError::InvalidLiteral { .. })
        ));
        assert!(matches!(
            compile_on(&reg, "Movie", json!({"rating_GT": null})),
            Err(FilterError::InvalidLiteral { .. })
        ));
        assert!(matches!(
            compile_on(&reg, "Movie", json!({"AND": {"title": "x"}})),
            Err(FilterError::MalformedFilter(_))
        ));
    }

    #[test]
    fn null_literal_matches_missing_property() {
        let reg = registry();
        let compiled = compile_on(&reg, "Movie", json!({"title": null})).unwrap();
        assert!(compiled.matches(&node_event(&reg, "Movie", json!({"rating": 1.0}))));
        assert!(!compiled.matches(&node_event(&reg, "Movie", json!({"title": "Heat"}))));
    }

    #[test]
    fn on_blocks_resolve_members() {
        let reg = registry();
        let compiled = compile_on(
            &reg,
            "Reviewer",
            json!({"reputation_GTE": 5, "_on": {"Influencer": {"url_ENDS_WITH": ".com"}}}),
        )
        .unwrap();

        assert!(compiled.matches(&node_event(&reg, "Person", json!({"reputation": 7}))));
        assert!(compiled.matches(&node_event(
            &reg,
            "Influencer",
            json!({"reputation": 7, "url": "a.com"})
        )));
        assert!(!compiled.matches(&node_event(
            &reg,
            "Influencer",
            json!({"reputation": 7, "url": "a.org"})
        )));

        assert_eq!(
            compile_on(&reg, "Reviewer", json!({"_on": {"Actor": {}}})).unwrap_err(),
            FilterError::NotAMember {
                type_name: "Actor".to_string(),
                target: "Reviewer".to_string()
            }
        );
        assert_eq!(
            compile_on(&reg, "Reviewer", json!({"_on": {"Critic": {}}})).unwrap_err(),
            FilterError::UnknownType("Critic".to_string())
        );
    }

    fn relationship_event(reg: &TypeRegistry, field: &str, score: i64, url: &str) -> GraphEvent {
        let movie = reg.type_id("Movie").unwrap();
        let influencer = reg.type_id("Influencer").unwrap();
        let kind = reg.relationship_kind_by_name("REVIEWED").unwrap().id;
        let mut edge = Properties::new();
        edge.insert("score".into(), PropertyValue::Int(score));
        let other = reg
            .snapshot(influencer, json!({"url": url, "reputation": 1}).as_object().unwrap())
            .unwrap();
        GraphEvent::new(
            Utc::now(),
            EventPayload::RelationshipCreated(RelationshipChange {
                kind,
                field: field.to_string(),
                node: PropertySnapshot::new(movie, Properties::new()),
                edge,
                other,
            }),
        )
    }

    #[test]
    fn relationship_clause_with_on_scoped_node() {
        let reg = registry();
        let compiled = compile_on(
            &reg,
            "Movie",
            json!({"reviewers": {
                "edge": {"score_GTE": 7},
                "node": {"_on": {"Influencer": {"url_CONTAINS": "imdb"}}}
            }}),
        )
        .unwrap();

        assert!(compiled.matches(&relationship_event(&reg, "reviewers", 9, "imdb.com")));
        assert!(!compiled.matches(&relationship_event(&reg, "reviewers", 3, "imdb.com")));
        assert!(!compiled.matches(&relationship_event(&reg, "reviewers", 9, "blog.net")));
        // Node events are unaffected by relationship clauses.
        assert!(compiled.matches(&node_event(&reg, "Movie", json!({"title": "Heat"}))));
    }

    #[test]
    fn relationship_clause_shape_errors() {
        let reg = registry();
        assert!(matches!(
            compile_on(&reg, "Movie", json!({"actors": {"edge": {"score": 1}}})),
            Err(FilterError::NoSuchProperty { .. })
        ));
        assert!(matches!(
            compile_on(&reg, "Movie", json!({"actors": {"where": {}}})),
            Err(FilterError::MalformedFilter(_))
        ));
        assert_eq!(
            compile_on(&reg, "Movie", json!({"actors": {"node": {"movies": {}}}})).unwrap_err(),
            FilterError::NestedRelationship {
                field: "movies".to_string()
            }
        );
        assert!(compile_on(&reg, "Movie", json!({"actors": {"edge": {"screenTime_LT": "long"}}}))
            .unwrap_err()
            .to_string()
            .contains("screenTime"));
    }
}
