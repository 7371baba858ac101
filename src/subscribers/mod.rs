//! # Event subscribers.
//!
//! The [`Subscribe`] trait and the [`SubscriberSet`] fan-out that feeds each
//! subscriber from its own bounded queue.
//!
//! ```text
//! Watcher ── publish(Event) ──► Bus ──► pipeline listener ──► SubscriberSet::emit
//!                                                               │
//!                                                 ┌─────────────┼───────────┐
//!                                                 ▼             ▼           ▼
//!                                             LogWriter      Custom        ...
//! ```

mod embedded;
mod set;
mod subscribe;

pub use embedded::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;

pub(crate) use set::panic_message;
