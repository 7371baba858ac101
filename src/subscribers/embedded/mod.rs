//! # Built-in subscribers
//!
//! - [`LogWriter`]: renders events as structured `tracing` log lines.

mod log;

pub use log::LogWriter;
