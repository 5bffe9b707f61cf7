//! Shared fixtures for ripple-engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use ripple_core::config::EngineConfig;
use ripple_core::{SchemaDocument, TypeRegistry};
use ripple_engine::{Outbound, SubscriptionEngine};
use serde_json::json;
use tokio::sync::mpsc;

/// Movie graph used across the integration tests.
///
/// - `Production` interface implemented by `Movie` and `Series`
/// - `Reviewer` interface implemented by `Person` and `Influencer`
/// - `Director` union of `Actor` and `Person`
/// - `ACTED_IN` is reciprocal (`Actor.movies` / `Movie.actors`)
/// - `DIRECTED` and `REVIEWED` are declared only on `Movie`
pub fn movie_schema() -> SchemaDocument {
    serde_json::from_value(json!({
        "types": [
            {"kind": "interface", "name": "Production", "properties": [
                {"name": "title", "type": "String", "required": true}
            ]},
            {"kind": "interface", "name": "Reviewer", "properties": [
                {"name": "reputation", "type": "Int"}
            ]},
            {"kind": "node", "name": "Movie", "implements": ["Production"], "properties": [
                {"name": "title", "type": "String", "required": true},
                {"name": "budget", "type": "BigInt"},
                {"name": "imdbId", "type": "ID"},
                {"name": "released", "type": "Boolean"},
                {"name": "tags", "type": "List"}
            ]},
            {"kind": "node", "name": "Series", "implements": ["Production"], "properties": [
                {"name": "title", "type": "String", "required": true},
                {"name": "episodes", "type": "Int"}
            ]},
            {"kind": "node", "name": "Actor", "properties": [
                {"name": "name", "type": "String", "required": true}
            ]},
            {"kind": "node", "name": "Person", "implements": ["Reviewer"], "properties": [
                {"name": "name", "type": "String"},
                {"name": "reputation", "type": "Int"}
            ]},
            {"kind": "node", "name": "Influencer", "implements": ["Reviewer"], "properties": [
                {"name": "url", "type": "String"},
                {"name": "reputation", "type": "Int"}
            ]},
            {"kind": "union", "name": "Director", "members": ["Actor", "Person"]}
        ],
        "relationships": [
            {"name": "ACTED_IN", "source": "Actor", "target": "Movie",
             "sourceField": "movies", "targetField": "actors",
             "properties": [{"name": "screenTime", "type": "Int"}]},
            {"name": "DIRECTED", "source": "Director", "target": "Movie",
             "targetField": "directors",
             "properties": [{"name": "year", "type": "Int"}]},
            {"name": "REVIEWED", "source": "Reviewer", "target": "Movie",
             "targetField": "reviewers",
             "properties": [{"name": "score", "type": "Int"}]}
        ]
    }))
    .expect("fixture schema parses")
}

pub fn types() -> Arc<TypeRegistry> {
    Arc::new(TypeRegistry::from_document(&movie_schema()).expect("fixture schema is valid"))
}

/// Inline engine with the default configuration.
pub fn engine() -> SubscriptionEngine {
    engine_with(EngineConfig::default())
}

pub fn engine_with(config: EngineConfig) -> SubscriptionEngine {
    SubscriptionEngine::new(types(), config).expect("engine starts")
}

/// Inline engine over a test-local schema.
pub fn engine_for(schema: serde_json::Value) -> SubscriptionEngine {
    let doc: SchemaDocument = serde_json::from_value(schema).expect("schema parses");
    let types = TypeRegistry::from_document(&doc).expect("schema is valid");
    SubscriptionEngine::new(Arc::new(types), EngineConfig::default()).expect("engine starts")
}

/// Everything queued on a connection so far.
pub fn drain(rx: &mut mpsc::Receiver<Outbound>) -> Vec<serde_json::Value> {
    let mut out = Vec::new();
    while let Ok(item) = rx.try_recv() {
        out.push(item.payload);
    }
    out
}
