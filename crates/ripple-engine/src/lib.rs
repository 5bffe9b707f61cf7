//! ripple-engine: Event construction, matching and delivery for Ripple.
//!
//! The engine sits behind the mutation API. On every commit it receives the
//! mutation trace, builds a flat stream of typed events from it, matches each
//! event against the active subscriptions and queues a shaped payload on the
//! connection of every subscriber whose filter matches.

pub mod builder;
pub mod delivery;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod projection;
pub mod registry;

pub use builder::{AllEvents, BuildOutcome, EventBuilder, Interest};
pub use delivery::{ConnectionHub, DeliveryChannel, Outbound};
pub use dispatcher::{DispatchMetrics, DispatchStats, Dispatcher, EventSink, QueuedSink};
pub use engine::{CommitReport, SubscribeRequest, SubscriptionEngine};
pub use error::{BuildError, DeliveryError, EngineError, ShapeError};
pub use projection::{NodeSelection, PayloadShape, Projection, RelationshipSelection};
pub use registry::{
    ConnectionId, Subscription, SubscriptionHandle, SubscriptionId, SubscriptionRegistry,
};
