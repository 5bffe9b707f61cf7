//! Drives recorded traces through a live engine and collects what each
//! connection would have been sent.

use std::sync::Arc;

use ripple_core::config::{DispatchMode, EngineConfig, InvalidFilterPolicy};
use ripple_core::{MutationTrace, TypeRegistry};
use ripple_engine::{CommitReport, ConnectionId, Outbound, SubscriptionEngine, SubscriptionId};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::input::SubscriptionSpec;

/// One payload as it reached a connection.
#[derive(Debug, Clone, Serialize)]
pub struct Delivered {
    pub connection: String,
    pub subscription: SubscriptionId,
    pub payload: serde_json::Value,
}

/// Totals for a replay run.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport {
    pub commits: usize,
    pub events: usize,
    pub suppressed_updates: usize,
    pub skipped_records: usize,
    #[serde(skip)]
    pub deliveries: Vec<Delivered>,
}

impl ReplayReport {
    fn record(&mut self, commit: &CommitReport) {
        self.commits += 1;
        self.events += commit.events;
        self.suppressed_updates += commit.suppressed_updates;
        self.skipped_records += commit.errors.len();
    }
}

struct Connection {
    name: String,
    id: ConnectionId,
    rx: mpsc::Receiver<Outbound>,
}

pub struct Replay {
    engine: SubscriptionEngine,
    connections: Vec<Connection>,
    report: ReplayReport,
}

impl Replay {
    /// Start an engine and register every subscription on its named connection.
    pub fn new(
        types: Arc<TypeRegistry>,
        config: EngineConfig,
        subscriptions: &[SubscriptionSpec],
    ) -> Result<Self> {
        let engine = SubscriptionEngine::new(types, config)?;
        let mut connections: Vec<Connection> = Vec::new();

        for spec in subscriptions {
            let id = match connections.iter().find(|c| c.name == spec.connection) {
                Some(conn) => conn.id,
                None => {
                    let (id, rx) = engine.open_connection();
                    connections.push(Connection {
                        name: spec.connection.clone(),
                        id,
                        rx,
                    });
                    id
                }
            };
            engine.subscribe(id, spec.request.clone())?;
        }

        tracing::info!(
            connections = connections.len(),
            subscriptions = subscriptions.len(),
            "Replay ready"
        );
        Ok(Self {
            engine,
            connections,
            report: ReplayReport::default(),
        })
    }

    pub fn commit(&mut self, trace: &MutationTrace) -> CommitReport {
        let commit = self.engine.on_commit(trace);
        self.report.record(&commit);
        tracing::debug!(
            commit = self.report.commits,
            events = commit.events,
            skipped = commit.errors.len(),
            "Trace replayed"
        );

        // Inline dispatch has queued everything by now; drain so small buffers don't overflow.
        if self.engine.config().dispatch_mode == DispatchMode::Inline {
            drain(&mut self.connections, &mut self.report.deliveries);
        }
        commit
    }

    /// Stop the engine and collect whatever is still queued.
    pub async fn finish(self) -> ReplayReport {
        let Self {
            engine,
            mut connections,
            mut report,
        } = self;
        engine.shutdown().await;
        drain(&mut connections, &mut report.deliveries);

        tracing::info!(
            commits = report.commits,
            events = report.events,
            deliveries = report.deliveries.len(),
            skipped_records = report.skipped_records,
            "Replay finished"
        );
        report
    }
}

fn drain(connections: &mut [Connection], out: &mut Vec<Delivered>) {
    for conn in connections.iter_mut() {
        while let Ok(item) = conn.rx.try_recv() {
            out.push(Delivered {
                connection: conn.name.clone(),
                subscription: item.subscription,
                payload: item.payload,
            });
        }
    }
}

/// Replay every trace in order.
pub async fn run(
    types: Arc<TypeRegistry>,
    config: EngineConfig,
    subscriptions: &[SubscriptionSpec],
    traces: &[MutationTrace],
) -> Result<ReplayReport> {
    let mut replay = Replay::new(types, config, subscriptions)?;
    for trace in traces {
        replay.commit(trace);
    }
    Ok(replay.finish().await)
}

/// Outcome of compiling one subscription.
#[derive(Debug, Clone, Serialize)]
pub struct Validation {
    pub index: usize,
    pub connection: String,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Validation {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Compile every subscription strictly, without replaying anything.
pub fn validate(
    types: Arc<TypeRegistry>,
    subscriptions: &[SubscriptionSpec],
) -> Result<Vec<Validation>> {
    let config = EngineConfig {
        invalid_filter_policy: InvalidFilterPolicy::Reject,
        dispatch_mode: DispatchMode::Inline,
        ..EngineConfig::default()
    };
    let engine = SubscriptionEngine::new(types, config)?;
    let (conn, _rx) = engine.open_connection();

    Ok(subscriptions
        .iter()
        .enumerate()
        .map(|(index, spec)| Validation {
            index,
            connection: spec.connection.clone(),
            target: spec.request.target.clone(),
            error: engine
                .subscribe(conn, spec.request.clone())
                .err()
                .map(|e| e.to_string()),
        })
        .collect())
}
