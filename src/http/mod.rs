//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (sniff first head, raw CONNECT or hyper + Axum)
//!     → proxy::dispatch (auth, tunnel or forward)
//!     → response.rs (locally generated responses, raw serialization)
//!     → Send to client
//! ```

pub mod response;
pub mod server;

pub use server::HttpServer;
