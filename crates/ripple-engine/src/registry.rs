//! Subscription Registry: the concurrent store of active subscriptions.
//!
//! The registry is read on every committed write and mutated only when a
//! client subscribes, unsubscribes or disconnects. Reads load an immutable
//! snapshot through [`ArcSwap`]; writers clone the snapshot, apply their
//! change and swap it in. An iteration that is already running keeps the
//! snapshot it started with, so registration and removal never block or
//! disturb matching.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use ripple_core::{EventKind, EventKinds, TypeId, TypeRegistry};
use ripple_filter::CompiledPredicate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::builder::Interest;
use crate::projection::Projection;

// ── Identifiers ───────────────────────────────────────────────────

/// Unique subscription identifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Unique identifier of a client connection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// What the transport holds on to after subscribing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    pub connection: ConnectionId,
}

// ── Subscription ──────────────────────────────────────────────────

/// An active subscription. Immutable once registered.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub connection: ConnectionId,
    /// Target type, concrete or abstract.
    pub target: TypeId,
    pub kinds: EventKinds,
    pub predicate: Arc<CompiledPredicate>,
    pub projection: Arc<Projection>,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    pub fn handle(&self) -> SubscriptionHandle {
        SubscriptionHandle {
            id: self.id,
            connection: self.connection,
        }
    }
}

// ── Snapshot ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
struct RegistrySnapshot {
    by_id: HashMap<SubscriptionId, Arc<Subscription>>,
    /// Target type → subscriptions in registration order.
    by_target: HashMap<TypeId, Vec<Arc<Subscription>>>,
    by_connection: HashMap<ConnectionId, Vec<SubscriptionId>>,
}

impl RegistrySnapshot {
    fn insert(&mut self, sub: Arc<Subscription>) {
        self.by_target
            .entry(sub.target)
            .or_default()
            .push(Arc::clone(&sub));
        self.by_connection
            .entry(sub.connection)
            .or_default()
            .push(sub.id);
        self.by_id.insert(sub.id, sub);
    }

    fn remove(&mut self, id: SubscriptionId) -> Option<Arc<Subscription>> {
        let sub = self.by_id.remove(&id)?;

        if let Some(list) = self.by_target.get_mut(&sub.target) {
            list.retain(|s| s.id != id);
            if list.is_empty() {
                self.by_target.remove(&sub.target);
            }
        }
        if let Some(ids) = self.by_connection.get_mut(&sub.connection) {
            ids.retain(|s| *s != id);
            if ids.is_empty() {
                self.by_connection.remove(&sub.connection);
            }
        }
        Some(sub)
    }

    /// Subscriptions whose target admits `concrete`: the concrete type's own,
    /// then those of each abstract type it belongs to.
    fn targets<'a>(
        &'a self,
        types: &'a TypeRegistry,
        concrete: TypeId,
    ) -> impl Iterator<Item = &'a Arc<Subscription>> + 'a {
        std::iter::once(concrete)
            .chain(types.supertypes(concrete).iter().copied())
            .filter_map(|ty| self.by_target.get(&ty))
            .flatten()
    }
}

// ── Registry ──────────────────────────────────────────────────────

/// Registry of all active subscriptions.
pub struct SubscriptionRegistry {
    types: Arc<TypeRegistry>,
    snap: ArcSwap<RegistrySnapshot>,
    /// Serializes writers so that no copy-on-write update is lost.
    writer: Mutex<()>,
}

impl SubscriptionRegistry {
    pub fn new(types: Arc<TypeRegistry>) -> Self {
        Self {
            types,
            snap: ArcSwap::from_pointee(RegistrySnapshot::default()),
            writer: Mutex::new(()),
        }
    }

    pub fn types(&self) -> &Arc<TypeRegistry> {
        &self.types
    }

    /// Register a subscription. It is visible to matching as soon as this returns.
    pub fn register(
        &self,
        connection: ConnectionId,
        target: TypeId,
        kinds: EventKinds,
        predicate: CompiledPredicate,
        projection: Projection,
    ) -> SubscriptionHandle {
        let sub = Arc::new(Subscription {
            id: SubscriptionId::new(),
            connection,
            target,
            kinds,
            predicate: Arc::new(predicate),
            projection: Arc::new(projection),
            created_at: Utc::now(),
        });
        let handle = sub.handle();

        self.update(|snap| snap.insert(sub));

        tracing::debug!(
            subscription = %handle.id,
            connection = %connection,
            target = %self.types.name(target),
            "Subscription added to registry"
        );
        handle
    }

    /// Remove one subscription. Returns it if it was registered.
    pub fn unregister(&self, handle: SubscriptionHandle) -> Option<Arc<Subscription>> {
        let mut removed = None;
        self.update(|snap| {
            if snap
                .by_id
                .get(&handle.id)
                .is_some_and(|s| s.connection == handle.connection)
            {
                removed = snap.remove(handle.id);
            }
        });
        removed
    }

    /// Remove every subscription of a connection in one swap. Returns how many were removed.
    pub fn unregister_connection(&self, connection: ConnectionId) -> usize {
        let mut count = 0;
        self.update(|snap| {
            let ids = snap.by_connection.get(&connection).cloned().unwrap_or_default();
            for id in ids {
                if snap.remove(id).is_some() {
                    count += 1;
                }
            }
        });
        count
    }

    fn update(&self, f: impl FnOnce(&mut RegistrySnapshot)) {
        let _guard = self.writer.lock();
        let mut next = RegistrySnapshot::clone(&self.snap.load());
        f(&mut next);
        self.snap.store(Arc::new(next));
    }

    /// Visit every subscription that could match an event of `kind` on a node
    /// of type `concrete`, against one consistent snapshot.
    pub fn for_each_candidate(
        &self,
        concrete: TypeId,
        kind: EventKind,
        mut f: impl FnMut(&Arc<Subscription>),
    ) {
        let snap = self.snap.load_full();
        for sub in snap.targets(&self.types, concrete) {
            if sub.kinds.has(kind) {
                f(sub);
            }
        }
    }

    /// Collected form of [`for_each_candidate`](Self::for_each_candidate).
    pub fn candidates(&self, concrete: TypeId, kind: EventKind) -> Vec<Arc<Subscription>> {
        let mut out = Vec::new();
        self.for_each_candidate(concrete, kind, |sub| out.push(Arc::clone(sub)));
        out
    }

    /// Whether any subscription could match an event of `kind` on `concrete`.
    pub fn has_interest(&self, concrete: TypeId, kind: EventKind) -> bool {
        let snap = self.snap.load();
        let found = snap
            .targets(&self.types, concrete)
            .any(|sub| sub.kinds.has(kind));
        found
    }

    pub fn get(&self, id: SubscriptionId) -> Option<Arc<Subscription>> {
        self.snap.load().by_id.get(&id).cloned()
    }

    pub fn connection_subscriptions(&self, connection: ConnectionId) -> usize {
        self.snap
            .load()
            .by_connection
            .get(&connection)
            .map_or(0, Vec::len)
    }

    pub fn len(&self) -> usize {
        self.snap.load().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Interest for SubscriptionRegistry {
    fn has_interest(&self, concrete: TypeId, kind: EventKind) -> bool {
        SubscriptionRegistry::has_interest(self, concrete, kind)
    }
}
