//! Deployment events: types, the bus and the subscriber pipeline.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over a bounded `tokio::sync::mpsc` channel
//! - [`EventPipeline`] listener task that forwards bus traffic to a
//!   [`SubscriberSet`](crate::subscribers::SubscriberSet)
//!
//! ## Quick reference
//! - **Publishers**: `EnvironmentWatcher`, `UpdateOrchestrator`.
//! - **Consumers**: the pipeline listener, which fans out to subscribers.

mod bus;
mod event;

pub use bus::{Bus, EventPipeline};
pub use event::{Event, EventKind};
