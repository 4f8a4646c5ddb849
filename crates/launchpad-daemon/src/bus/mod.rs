//! Log broadcast bus.
//!
//! Per-project publish/subscribe for captured process output. Subscribers
//! only see chunks published after they joined; there is no replay.

mod channel;
mod types;

pub use channel::LogBus;
pub use types::{BusStats, LogChunk, OutputStream, Subscription, SubscriptionId};
