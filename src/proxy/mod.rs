//! Proxy core.
//!
//! # Data Flow
//! ```text
//! dispatch.rs (single entry point)
//!     → auth.rs (Proxy-Authorization gate, 407 on failure)
//!     → CONNECT: tunnel.rs → relay.rs
//!     → other:   forward.rs → transport.rs
//! ```

pub mod auth;
pub mod dispatch;
pub mod forward;
pub mod relay;
pub mod transport;
pub mod tunnel;

pub use auth::{AuthGate, Credential};
pub use dispatch::{ClientConn, Dispatched, Dispatcher};
pub use forward::ForwardHandler;
pub use transport::{transport_fn, HyperTransport, Transport, TransportError};
pub use tunnel::TunnelHandler;
