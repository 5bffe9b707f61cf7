//! Dispatcher: matches events against subscriptions and fans out payloads.
//!
//! For each event, in emission order, the dispatcher walks the candidate
//! subscriptions from the registry, evaluates each compiled predicate, shapes
//! the payload of every match and hands it to the delivery channel. Failures
//! are isolated per subscriber: a payload that cannot be shaped or queued for
//! one subscription does not affect the others.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ripple_core::GraphEvent;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::delivery::DeliveryChannel;
use crate::error::DeliveryError;
use crate::registry::SubscriptionRegistry;

/// Receives built events, in emission order.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: GraphEvent);
}

// ── Metrics ───────────────────────────────────────────────────────

/// Dispatch counters, updated lock-free.
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    pub events_received: AtomicU64,
    pub candidates_evaluated: AtomicU64,
    pub matched: AtomicU64,
    pub delivered: AtomicU64,
    pub shape_failures: AtomicU64,
    pub delivery_drops: AtomicU64,
}

impl DispatchMetrics {
    pub fn events_received(&self) -> u64 {
        self.events_received.load(Ordering::Relaxed)
    }

    pub fn candidates_evaluated(&self) -> u64 {
        self.candidates_evaluated.load(Ordering::Relaxed)
    }

    pub fn matched(&self) -> u64 {
        self.matched.load(Ordering::Relaxed)
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn shape_failures(&self) -> u64 {
        self.shape_failures.load(Ordering::Relaxed)
    }

    pub fn delivery_drops(&self) -> u64 {
        self.delivery_drops.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            events_received: self.events_received(),
            candidates_evaluated: self.candidates_evaluated(),
            matched: self.matched(),
            delivered: self.delivered(),
            shape_failures: self.shape_failures(),
            delivery_drops: self.delivery_drops(),
        }
    }
}

/// Serializable copy of [`DispatchMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub events_received: u64,
    pub candidates_evaluated: u64,
    pub matched: u64,
    pub delivered: u64,
    pub shape_failures: u64,
    pub delivery_drops: u64,
}

// ── Dispatcher ────────────────────────────────────────────────────

/// Per-event result of [`Dispatcher::dispatch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub matched: usize,
    pub delivered: usize,
}

pub struct Dispatcher {
    registry: Arc<SubscriptionRegistry>,
    channel: Arc<dyn DeliveryChannel>,
    metrics: Arc<DispatchMetrics>,
}

impl Dispatcher {
    pub fn new(registry: Arc<SubscriptionRegistry>, channel: Arc<dyn DeliveryChannel>) -> Self {
        Self {
            registry,
            channel,
            metrics: Arc::new(DispatchMetrics::default()),
        }
    }

    pub fn metrics(&self) -> &Arc<DispatchMetrics> {
        &self.metrics
    }

    /// Match one event against its candidates and deliver to every match.
    pub fn dispatch(&self, event: &GraphEvent) -> DispatchSummary {
        self.metrics.events_received.fetch_add(1, Ordering::Relaxed);
        let mut summary = DispatchSummary::default();
        let mut gone = Vec::new();
        let kind = event.kind();

        self.registry
            .for_each_candidate(event.concrete_type(), kind, |sub| {
                self.metrics
                    .candidates_evaluated
                    .fetch_add(1, Ordering::Relaxed);
                if !sub.predicate.matches(event) {
                    return;
                }
                summary.matched += 1;
                self.metrics.matched.fetch_add(1, Ordering::Relaxed);

                let payload = match sub.projection.shape(event) {
                    Ok(Some(payload)) => payload,
                    Ok(None) => {
                        tracing::debug!(
                            subscription = %sub.id,
                            event = %event.id.0,
                            "Relationship field not selected; nothing to deliver"
                        );
                        return;
                    }
                    Err(e) => {
                        self.metrics.shape_failures.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(
                            subscription = %sub.id,
                            event = %event.id.0,
                            error = %e,
                            "Failed to shape payload"
                        );
                        return;
                    }
                };

                match self.channel.deliver(sub.handle(), payload) {
                    Ok(()) => {
                        summary.delivered += 1;
                        self.metrics.delivered.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        self.metrics.delivery_drops.fetch_add(1, Ordering::Relaxed);
                        match e {
                            DeliveryError::QueueFull(_) => tracing::warn!(
                                subscription = %sub.id,
                                connection = %sub.connection,
                                "Outbound queue full; dropping payload"
                            ),
                            DeliveryError::Closed(conn)
                            | DeliveryError::UnknownConnection(conn) => {
                                tracing::debug!(
                                    subscription = %sub.id,
                                    error = %e,
                                    "Dropping payload for closed connection"
                                );
                                if !gone.contains(&conn) {
                                    gone.push(conn);
                                }
                            }
                        }
                    }
                }
            });

        // Receivers dropped without an explicit close leave their
        // subscriptions behind; release them here.
        for conn in gone {
            let removed = self.registry.unregister_connection(conn);
            tracing::info!(
                connection = %conn,
                subscriptions = removed,
                "Connection receiver dropped; subscriptions released"
            );
        }

        tracing::debug!(
            event = %event.id.0,
            kind = event.kind().as_str(),
            matched = summary.matched,
            delivered = summary.delivered,
            "Event dispatched"
        );
        summary
    }
}

impl EventSink for Dispatcher {
    fn publish(&self, event: GraphEvent) {
        self.dispatch(&event);
    }
}

// ── Background hand-off ───────────────────────────────────────────

/// Event sink that hands events to a spawned dispatch task.
///
/// The queue is unbounded so that publishing never waits on slow
/// subscribers. The task exits once every sink clone has been dropped.
#[derive(Clone)]
pub struct QueuedSink {
    tx: mpsc::UnboundedSender<GraphEvent>,
}

impl QueuedSink {
    /// Spawn the dispatch task on the current tokio runtime.
    pub fn spawn(dispatcher: Arc<Dispatcher>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<GraphEvent>();
        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                dispatcher.dispatch(&event);
            }
            tracing::info!("Dispatch task stopped");
        });
        (Self { tx }, task)
    }
}

impl EventSink for QueuedSink {
    fn publish(&self, event: GraphEvent) {
        if self.tx.send(event).is_err() {
            tracing::warn!("Dispatch task is gone; dropping event");
        }
    }
}
