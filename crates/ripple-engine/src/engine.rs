//! The subscription engine facade used by the transport layer.
//!
//! Wires the builder, registry, dispatcher and connection hub together:
//!
//! ```text
//! on_commit(trace) ─► EventBuilder ─► EventSink ─► Dispatcher ─► ConnectionHub ─► connection task
//!                         ▲                            │
//!                         └──── SubscriptionRegistry ◄─┘
//! ```

use std::sync::Arc;

use ripple_core::config::{DispatchMode, EngineConfig, InvalidFilterPolicy};
use ripple_core::{EventKind, EventKinds, MutationTrace, TypeRegistry};
use ripple_filter::CompiledPredicate;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::builder::{BuildOutcome, EventBuilder};
use crate::delivery::{ConnectionHub, Outbound};
use crate::dispatcher::{DispatchMetrics, Dispatcher, EventSink, QueuedSink};
use crate::error::{BuildError, EngineError, Result};
use crate::projection::{PayloadShape, Projection};
use crate::registry::{ConnectionId, SubscriptionHandle, SubscriptionRegistry};

/// A subscription request as received from a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    /// Target type name, concrete or abstract.
    pub target: String,
    #[serde(default = "all_kinds")]
    pub kinds: Vec<EventKind>,
    #[serde(default, rename = "where")]
    pub filter: Option<serde_json::Value>,
    #[serde(default)]
    pub shape: PayloadShape,
}

fn all_kinds() -> Vec<EventKind> {
    EventKind::ALL.to_vec()
}

impl SubscribeRequest {
    pub fn new(target: &str, kinds: impl IntoIterator<Item = EventKind>) -> Self {
        Self {
            target: target.to_string(),
            kinds: kinds.into_iter().collect(),
            filter: None,
            shape: PayloadShape::default(),
        }
    }

    pub fn with_filter(mut self, filter: serde_json::Value) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_shape(mut self, shape: PayloadShape) -> Self {
        self.shape = shape;
        self
    }
}

/// What one commit produced.
#[derive(Debug, Default)]
pub struct CommitReport {
    /// Events built and published to the dispatcher.
    pub events: usize,
    pub suppressed_updates: usize,
    /// Trace records that were skipped.
    pub errors: Vec<BuildError>,
}

impl From<&BuildOutcome> for CommitReport {
    fn from(outcome: &BuildOutcome) -> Self {
        Self {
            events: outcome.events.len(),
            suppressed_updates: outcome.suppressed_updates,
            errors: outcome.errors.clone(),
        }
    }
}

pub struct SubscriptionEngine {
    config: EngineConfig,
    types: Arc<TypeRegistry>,
    registry: Arc<SubscriptionRegistry>,
    hub: Arc<ConnectionHub>,
    dispatcher: Arc<Dispatcher>,
    builder: EventBuilder,
    sink: Arc<dyn EventSink>,
    worker: Option<JoinHandle<()>>,
}

impl SubscriptionEngine {
    /// Build an engine. Background dispatch must be created inside a tokio runtime.
    pub fn new(types: Arc<TypeRegistry>, config: EngineConfig) -> Result<Self> {
        let registry = Arc::new(SubscriptionRegistry::new(types.clone()));
        let hub = Arc::new(ConnectionHub::new(config.connection_buffer));
        let dispatcher = Arc::new(Dispatcher::new(registry.clone(), hub.clone()));

        let (sink, worker) = match config.dispatch_mode {
            DispatchMode::Inline => (dispatcher.clone() as Arc<dyn EventSink>, None),
            DispatchMode::Background => {
                if tokio::runtime::Handle::try_current().is_err() {
                    return Err(EngineError::NoRuntime);
                }
                let (sink, task) = QueuedSink::spawn(dispatcher.clone());
                (Arc::new(sink) as Arc<dyn EventSink>, Some(task))
            }
        };

        tracing::info!(
            dispatch_mode = ?config.dispatch_mode,
            invalid_filter_policy = ?config.invalid_filter_policy,
            connection_buffer = config.connection_buffer,
            "Subscription engine started"
        );

        Ok(Self {
            builder: EventBuilder::new(types.clone()),
            config,
            types,
            registry,
            hub,
            dispatcher,
            sink,
            worker,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn types(&self) -> &Arc<TypeRegistry> {
        &self.types
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    pub fn metrics(&self) -> &DispatchMetrics {
        self.dispatcher.metrics()
    }

    // ── Connections ──────────────────────────────────────────────

    pub fn open_connection(&self) -> (ConnectionId, mpsc::Receiver<Outbound>) {
        self.hub.open()
    }

    /// Close a connection and drop all of its subscriptions. Returns how many were dropped.
    ///
    /// The hub is closed first so a concurrent [`subscribe`](Self::subscribe)
    /// either sees the connection gone or is swept up by the unregister.
    pub fn close_connection(&self, connection: ConnectionId) -> usize {
        self.hub.close(connection);
        let removed = self.registry.unregister_connection(connection);
        tracing::info!(connection = %connection, subscriptions = removed, "Connection released");
        removed
    }

    // ── Subscriptions ────────────────────────────────────────────

    /// Register a subscription. It can match events as soon as this returns.
    pub fn subscribe(
        &self,
        connection: ConnectionId,
        request: SubscribeRequest,
    ) -> Result<SubscriptionHandle> {
        if !self.hub.is_open(connection) {
            return Err(EngineError::UnknownConnection(connection));
        }
        let target = self
            .types
            .type_id(&request.target)
            .ok_or_else(|| EngineError::UnknownTargetType(request.target.clone()))?;

        let predicate =
            match ripple_filter::compile(&self.types, target, request.filter.as_ref()) {
                Ok(p) => p,
                Err(e) => match self.config.invalid_filter_policy {
                    InvalidFilterPolicy::Reject => return Err(e.into()),
                    InvalidFilterPolicy::NeverMatch => {
                        tracing::warn!(
                            connection = %connection,
                            target = %request.target,
                            error = %e,
                            "Invalid filter; subscription will never match"
                        );
                        CompiledPredicate::Never
                    }
                },
            };
        let projection = Projection::compile(&self.types, target, &request.shape)?;
        let kinds: EventKinds = request.kinds.iter().copied().collect();

        let handle = self
            .registry
            .register(connection, target, kinds, predicate, projection);
        if !self.hub.is_open(connection) {
            // Closed while compiling.
            self.registry.unregister(handle);
            return Err(EngineError::UnknownConnection(connection));
        }
        tracing::info!(
            subscription = %handle.id,
            connection = %connection,
            target = %request.target,
            "Subscription registered"
        );
        Ok(handle)
    }

    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<()> {
        match self.registry.unregister(handle) {
            Some(_) => {
                tracing::info!(subscription = %handle.id, "Subscription removed");
                Ok(())
            }
            None => Err(EngineError::UnknownSubscription(handle.id)),
        }
    }

    // ── Commits ──────────────────────────────────────────────────

    /// Build events for a committed trace and hand them to the dispatcher.
    ///
    /// In inline mode every payload is queued on its connection by the time
    /// this returns. Errors never propagate back into the mutation.
    pub fn on_commit(&self, trace: &MutationTrace) -> CommitReport {
        let outcome = self.builder.build(trace, self.registry.as_ref());
        let report = CommitReport::from(&outcome);
        for event in outcome.events {
            self.sink.publish(event);
        }
        report
    }

    /// Stop accepting events and wait for the background dispatch task to
    /// drain what was already published. A no-op in inline mode.
    pub async fn shutdown(self) {
        let Self { sink, worker, .. } = self;
        drop(sink);
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                tracing::warn!(error = %e, "Dispatch task failed");
            }
        }
    }
}
