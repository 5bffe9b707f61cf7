//! Integration tests for connection lifecycle and background dispatch.

mod common;

use std::time::Duration;

use common::{drain, engine, engine_with, types};
use ripple_core::config::{DispatchMode, EngineConfig};
use ripple_core::{EventKind, MutationTrace, TraceRecord};
use ripple_engine::{SubscribeRequest, SubscriptionEngine};
use serde_json::json;

fn create_movie(title: &str) -> MutationTrace {
    MutationTrace::new(vec![TraceRecord::create("Movie", json!({"title": title}))])
}

#[tokio::test]
async fn background_dispatch_delivers_in_commit_order() {
    let engine = engine_with(EngineConfig {
        dispatch_mode: DispatchMode::Background,
        ..EngineConfig::default()
    });
    let (conn, mut rx) = engine.open_connection();
    engine
        .subscribe(conn, SubscribeRequest::new("Movie", [EventKind::Create]))
        .unwrap();

    for title in ["Alien", "Aliens", "Alien 3"] {
        let report = engine.on_commit(&create_movie(title));
        assert_eq!(report.events, 1);
    }

    let mut titles = Vec::new();
    for _ in 0..3 {
        let item = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("payload delivered in time")
            .expect("connection still open");
        titles.push(item.payload["createdMovie"]["title"].as_str().unwrap().to_string());
    }
    assert_eq!(titles, vec!["Alien", "Aliens", "Alien 3"]);

    engine.shutdown().await;
}

#[tokio::test]
async fn shutdown_drains_published_events() {
    let engine = engine_with(EngineConfig {
        dispatch_mode: DispatchMode::Background,
        ..EngineConfig::default()
    });
    let (conn, mut rx) = engine.open_connection();
    engine
        .subscribe(conn, SubscribeRequest::new("Movie", [EventKind::Create]))
        .unwrap();

    engine.on_commit(&create_movie("Heat"));
    engine.on_commit(&create_movie("Ronin"));
    engine.shutdown().await;

    assert_eq!(drain(&mut rx).len(), 2);
}

#[test]
fn closing_a_connection_drops_its_subscriptions() {
    let engine = engine();
    let (closing, mut closing_rx) = engine.open_connection();
    let (staying, mut staying_rx) = engine.open_connection();
    for conn in [closing, staying] {
        engine
            .subscribe(conn, SubscribeRequest::new("Movie", [EventKind::Create]))
            .unwrap();
    }
    engine
        .subscribe(closing, SubscribeRequest::new("Actor", EventKind::ALL))
        .unwrap();

    assert_eq!(engine.close_connection(closing), 2);
    assert_eq!(engine.registry().len(), 1);

    engine.on_commit(&create_movie("Speed"));
    assert!(closing_rx.try_recv().is_err());
    assert_eq!(drain(&mut staying_rx).len(), 1);

    let err = engine
        .subscribe(closing, SubscribeRequest::new("Movie", [EventKind::Create]))
        .unwrap_err();
    assert!(matches!(err, ripple_engine::EngineError::UnknownConnection(_)));
}

#[test]
fn dropped_receiver_releases_its_subscriptions() {
    let engine = engine();
    let (conn, rx) = engine.open_connection();
    engine
        .subscribe(conn, SubscribeRequest::new("Movie", [EventKind::Create]))
        .unwrap();
    drop(rx);

    for title in ["Speed", "Heat", "Ronin"] {
        engine.on_commit(&create_movie(title));
    }

    assert!(engine.registry().is_empty());
    // Only the first commit had a subscriber left to build an event for.
    assert_eq!(engine.metrics().events_received(), 1);
    assert_eq!(engine.metrics().delivery_drops(), 1);
}

#[test]
fn full_connection_queue_drops_without_affecting_others() {
    let engine = engine_with(EngineConfig {
        connection_buffer: 1,
        ..EngineConfig::default()
    });
    let (slow, mut slow_rx) = engine.open_connection();
    let (fast, mut fast_rx) = engine.open_connection();
    for conn in [slow, fast] {
        engine
            .subscribe(conn, SubscribeRequest::new("Movie", [EventKind::Create]))
            .unwrap();
    }

    engine.on_commit(&create_movie("One"));
    assert_eq!(drain(&mut fast_rx).len(), 1);
    engine.on_commit(&create_movie("Two"));
    assert_eq!(drain(&mut fast_rx).len(), 1);

    let slow_side = drain(&mut slow_rx);
    assert_eq!(slow_side.len(), 1);
    assert_eq!(slow_side[0]["createdMovie"]["title"], "One");
    assert_eq!(engine.metrics().delivery_drops(), 1);
    assert_eq!(engine.metrics().delivered(), 3);
}

#[test]
fn shape_failure_is_isolated_to_the_subscriber() {
    let engine = engine();
    let (conn, mut rx) = engine.open_connection();
    engine
        .subscribe(conn, SubscribeRequest::new("Movie", [EventKind::Create]))
        .unwrap();

    // `title` is required but absent from the snapshot.
    engine.on_commit(&MutationTrace::new(vec![
        TraceRecord::create("Movie", json!({"released": true})),
        TraceRecord::create("Movie", json!({"title": "Tenet"})),
    ]));

    let payloads = drain(&mut rx);
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0]["createdMovie"]["title"], "Tenet");
    assert_eq!(engine.metrics().shape_failures(), 1);
}

#[test]
fn background_mode_outside_a_runtime_is_an_error() {
    let config = EngineConfig {
        dispatch_mode: DispatchMode::Background,
        ..EngineConfig::default()
    };
    assert!(SubscriptionEngine::new(types(), config).is_err());
}
