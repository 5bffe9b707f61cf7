//! Integration tests for nested writes.
//!
//! A single mutation can connect or delete through several levels of the
//! graph. Each level must surface as its own event, in emission order, and
//! only subscribers whose target and kinds apply at that level hear about it.

mod common;

use common::{drain, engine};
use ripple_core::{EventKind, MutationTrace, TraceRecord};
use ripple_engine::SubscribeRequest;
use serde_json::json;

fn movie(title: &str) -> serde_json::Value {
    json!({"title": title})
}

fn actor(name: &str) -> serde_json::Value {
    json!({"name": name})
}

/// Movie(m1) -actors-> Actor(a1) -movies-> Movie(m2) -actors-> Actor(a2) -movies-> Movie(m3)
fn four_level_connect() -> MutationTrace {
    let level4 = TraceRecord::connect("Actor", actor("a2"), "movies", "Movie", movie("m3"))
        .with_edge(json!({"screenTime": 4}));
    let level3 = TraceRecord::connect("Movie", movie("m2"), "actors", "Actor", actor("a2"))
        .with_edge(json!({"screenTime": 3}))
        .with_children(vec![level4]);
    let level2 = TraceRecord::connect("Actor", actor("a1"), "movies", "Movie", movie("m2"))
        .with_edge(json!({"screenTime": 2}))
        .with_children(vec![level3]);
    let level1 = TraceRecord::connect("Movie", movie("m1"), "actors", "Actor", actor("a1"))
        .with_edge(json!({"screenTime": 1}))
        .with_children(vec![level2]);
    MutationTrace::new(vec![TraceRecord::update("Movie", movie("m1"), movie("m1"))
        .with_children(vec![level1])])
}

#[test]
fn every_level_of_a_nested_connect_is_reported() {
    let engine = engine();
    let (actor_conn, mut actor_rx) = engine.open_connection();
    let (movie_conn, mut movie_rx) = engine.open_connection();
    let (filtered_conn, mut filtered_rx) = engine.open_connection();

    engine
        .subscribe(actor_conn, SubscribeRequest::new("Actor", [EventKind::CreateRelationship]))
        .unwrap();
    engine
        .subscribe(movie_conn, SubscribeRequest::new("Movie", [EventKind::CreateRelationship]))
        .unwrap();
    engine
        .subscribe(
            filtered_conn,
            SubscribeRequest::new("Movie", [EventKind::CreateRelationship])
                .with_filter(json!({"title": "m2", "actors": {"node": {"name": "a2"}}})),
        )
        .unwrap();

    let report = engine.on_commit(&four_level_connect());
    // Every edge is reciprocal, so each of the four produces one event per end.
    assert_eq!(report.events, 8);

    let actor_side = drain(&mut actor_rx);
    let seen: Vec<(&str, i64)> = actor_side
        .iter()
        .map(|p| {
            (
                p["actor"]["name"].as_str().unwrap(),
                p["createdRelationship"]["movies"]["screenTime"].as_i64().unwrap(),
            )
        })
        .collect();
    assert_eq!(seen, vec![("a1", 1), ("a1", 2), ("a2", 3), ("a2", 4)]);

    let movie_side = drain(&mut movie_rx);
    let seen: Vec<(&str, &str)> = movie_side
        .iter()
        .map(|p| {
            (
                p["movie"]["title"].as_str().unwrap(),
                p["createdRelationship"]["actors"]["node"]["name"].as_str().unwrap(),
            )
        })
        .collect();
    assert_eq!(seen, vec![("m1", "a1"), ("m2", "a1"), ("m2", "a2"), ("m3", "a2")]);

    let filtered = drain(&mut filtered_rx);
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0]["createdRelationship"]["actors"]["screenTime"], 3);
}

#[test]
fn nested_connect_skips_types_without_subscribers() {
    let engine = engine();
    let (conn, mut rx) = engine.open_connection();
    engine
        .subscribe(conn, SubscribeRequest::new("Actor", [EventKind::CreateRelationship]))
        .unwrap();

    let report = engine.on_commit(&four_level_connect());
    assert_eq!(report.events, 4);
    assert_eq!(drain(&mut rx).len(), 4);
    assert_eq!(engine.metrics().delivered(), 4);
}

#[test]
fn cascading_delete_reports_each_removed_node() {
    let engine = engine();
    let (actor_conn, mut actor_rx) = engine.open_connection();
    let (production_conn, mut production_rx) = engine.open_connection();
    engine
        .subscribe(actor_conn, SubscribeRequest::new("Actor", [EventKind::Delete]))
        .unwrap();
    engine
        .subscribe(
            production_conn,
            SubscribeRequest::new("Production", [EventKind::Delete]),
        )
        .unwrap();

    let trace = MutationTrace::new(vec![TraceRecord::delete("Movie", movie("m1"))
        .with_children(vec![
            TraceRecord::delete("Actor", actor("a1"))
                .with_children(vec![TraceRecord::delete("Movie", movie("m2"))]),
            TraceRecord::delete("Actor", actor("a2")),
            TraceRecord::delete("Person", json!({"name": "p1"})),
        ])]);
    let report = engine.on_commit(&trace);
    // The Person has no subscriber, so no event is built for it.
    assert_eq!(report.events, 4);

    let actors: Vec<_> = drain(&mut actor_rx)
        .into_iter()
        .map(|p| p["deletedActor"]["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(actors, vec!["a1", "a2"]);

    let productions: Vec<_> = drain(&mut production_rx)
        .into_iter()
        .map(|p| {
            assert_eq!(p["event"], "DELETE");
            assert_eq!(p["deletedProduction"]["__typename"], "Movie");
            p["deletedProduction"]["title"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(productions, vec!["m2", "m1"]);
}

#[test]
fn disconnect_inside_delete_comes_before_the_delete() {
    let engine = engine();
    let (conn, mut rx) = engine.open_connection();
    engine
        .subscribe(conn, SubscribeRequest::new("Actor", EventKind::ALL))
        .unwrap();

    engine.on_commit(&MutationTrace::new(vec![TraceRecord::delete("Actor", actor("a1"))
        .with_children(vec![TraceRecord::disconnect(
            "Actor",
            actor("a1"),
            "movies",
            "Movie",
            movie("m1"),
        )])]));

    let events: Vec<_> = drain(&mut rx)
        .into_iter()
        .map(|p| p["event"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(events, vec!["DELETE_RELATIONSHIP", "DELETE"]);
}
