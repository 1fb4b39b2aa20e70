//! Observability subsystem.
//!
//! Structured `tracing` events from every subsystem, rendered by the
//! subscriber installed in `logging.rs`. Each request produces one
//! info-level request line from the dispatcher.

pub mod logging;
