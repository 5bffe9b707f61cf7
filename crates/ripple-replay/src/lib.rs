//! ripple-replay: Offline replay of mutation traces through the subscription engine.
//!
//! Loads a schema, a set of subscriptions and recorded mutation traces, runs
//! the traces through a real [`ripple_engine::SubscriptionEngine`] and
//! reports every payload each connection would have received.

pub mod error;
pub mod input;
pub mod replay;

pub use error::ReplayError;
pub use input::{load_schema, load_subscriptions, load_traces, SubscriptionSpec};
pub use replay::{run, validate, Delivered, Replay, ReplayReport, Validation};
