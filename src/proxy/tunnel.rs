//! CONNECT tunnel handling.
//!
//! # Data Flow
//! ```text
//! CONNECT host:port
//!     → hijack raw client connection
//!     → write "HTTP/1.0 200 Connection Established\r\n\r\n"
//!     → dial host:port
//!     → relay(client, origin)
//! ```
//!
//! # Design Decisions
//! - Acknowledge first, dial second. A failed dial can only be signalled
//!   by closing the connection
//! - The acknowledgement is written byte-exact, bypassing any HTTP encoder

use axum::{body::Body, http::Request};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::error::ProxyError;
use crate::net::hijack::Hijacker;
use crate::proxy::relay::relay;

/// Literal tunnel-established acknowledgement.
pub const CONNECTION_ESTABLISHED: &[u8] = b"HTTP/1.0 200 Connection Established\r\n\r\n";

/// Handles CONNECT requests.
#[derive(Debug, Clone, Default)]
pub struct TunnelHandler;

impl TunnelHandler {
    pub fn new() -> Self {
        Self
    }

    /// Take over the client connection and tunnel it to the CONNECT target.
    ///
    /// Errors are only returned before the connection is hijacked, while a
    /// regular response can still be written. Everything after the
    /// takeover ends in a closed connection.
    pub async fn handle(&self, request: Request<Body>, hijacker: Hijacker) -> Result<(), ProxyError> {
        let target = request
            .uri()
            .authority()
            .map(|authority| authority.to_string())
            .ok_or_else(|| ProxyError::InvalidTarget(request.uri().to_string()))?;

        let mut client = hijacker.hijack().ok_or(ProxyError::CapabilityMissing)?;

        if let Err(e) = client.write_all(CONNECTION_ESTABLISHED).await {
            tracing::debug!(tunnel_target = %target, error = %e, "Client went away before tunnel ack");
            return Ok(());
        }

        let origin = match TcpStream::connect(&target).await {
            Ok(origin) => origin,
            Err(e) => {
                tracing::debug!(tunnel_target = %target, error = %e, "Dial failed, closing tunnel");
                let _ = client.shutdown().await;
                return Ok(());
            }
        };

        match relay(client, origin).await {
            Ok(bytes) => tracing::debug!(tunnel_target = %target, bytes_to_client = bytes, "Tunnel closed"),
            Err(e) => tracing::debug!(tunnel_target = %target, error = %e, "Tunnel aborted"),
        }
        Ok(())
    }
}
