//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (id, open-connection tracking)
//!     → sniff.rs (first request head)
//!         CONNECT → hijack.rs (raw connection handed to the tunnel)
//!         other   → rewind.rs (buffered bytes replayed) → hyper
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - The serving layer always supports raw takeover

pub mod connection;
pub mod hijack;
pub mod listener;
pub mod rewind;
pub mod sniff;

pub use hijack::{Hijacker, RawConnection, ServeCapabilities};
pub use listener::{Listener, ListenerError};
