//! Per-request entry point.
//!
//! Auth gate first, then the request line is logged, then the request is
//! routed by method: CONNECT to the tunnel handler, everything else to the
//! forward handler.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header::HOST, Method, Request, Response, StatusCode},
    response::IntoResponse,
};

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::http::response::status_response;
use crate::net::hijack::{Hijacker, ServeCapabilities};
use crate::proxy::auth::AuthGate;
use crate::proxy::forward::ForwardHandler;
use crate::proxy::transport::Transport;
use crate::proxy::tunnel::TunnelHandler;

/// The client side of a request, as seen by the dispatcher.
#[derive(Debug, Clone)]
pub struct ClientConn {
    /// Peer address as reported by the serving layer (`ip:port`).
    pub remote_addr: String,
    /// Raw takeover handle for this connection.
    pub hijacker: Hijacker,
}

impl ClientConn {
    pub fn new(remote_addr: impl Into<String>, hijacker: Hijacker) -> Self {
        Self {
            remote_addr: remote_addr.into(),
            hijacker,
        }
    }
}

/// Outcome of dispatching one request.
#[derive(Debug)]
pub enum Dispatched {
    /// A response for the serving layer to write.
    Response(Response<Body>),
    /// The raw connection was taken over; nothing left to write.
    Tunneled,
}

impl IntoResponse for Dispatched {
    fn into_response(self) -> axum::response::Response {
        match self {
            Dispatched::Response(response) => response,
            Dispatched::Tunneled => StatusCode::OK.into_response(),
        }
    }
}

/// Routes inbound requests through auth to the tunnel or forward path.
pub struct Dispatcher {
    auth: AuthGate,
    forward: ForwardHandler,
    tunnel: TunnelHandler,
}

impl Dispatcher {
    /// Build a dispatcher for a serving layer with `capabilities`.
    ///
    /// Fails with [`ProxyError::CapabilityMissing`] if the serving layer
    /// cannot hand over raw connections, since CONNECT would be unusable.
    pub fn new(
        config: &ProxyConfig,
        transport: Arc<dyn Transport>,
        capabilities: ServeCapabilities,
    ) -> Result<Self, ProxyError> {
        if !capabilities.raw_takeover {
            return Err(ProxyError::CapabilityMissing);
        }

        Ok(Self {
            auth: AuthGate::new(config.auth.encoded_credential()),
            forward: ForwardHandler::new(transport),
            tunnel: TunnelHandler::new(),
        })
    }

    pub fn auth(&self) -> &AuthGate {
        &self.auth
    }

    /// Handle one inbound request.
    pub async fn serve(&self, request: Request<Body>, conn: ClientConn) -> Dispatched {
        if !self.auth.check(&request) {
            tracing::debug!(remote_addr = %conn.remote_addr, "Proxy authentication failed");
            return Dispatched::Response(AuthGate::challenge());
        }

        tracing::info!(
            method = %request.method(),
            host = %request_host(&request),
            remote_addr = %conn.remote_addr,
            "Received request"
        );

        if request.method() == Method::CONNECT {
            return match self.tunnel.handle(request, conn.hijacker).await {
                Ok(()) => Dispatched::Tunneled,
                Err(ProxyError::CapabilityMissing) => {
                    tracing::error!(
                        remote_addr = %conn.remote_addr,
                        "CONNECT reached a connection that cannot be taken over"
                    );
                    Dispatched::Response(status_response(StatusCode::INTERNAL_SERVER_ERROR))
                }
                Err(e) => {
                    tracing::warn!(remote_addr = %conn.remote_addr, error = %e, "Rejecting CONNECT");
                    Dispatched::Response(status_response(StatusCode::BAD_REQUEST))
                }
            };
        }

        Dispatched::Response(self.forward.handle(request, &conn.remote_addr).await)
    }
}

/// Host named by the request: URI authority, else the `Host` header.
fn request_host<B>(request: &Request<B>) -> &str {
    request
        .uri()
        .authority()
        .map(|authority| authority.as_str())
        .or_else(|| request.headers().get(HOST).and_then(|h| h.to_str().ok()))
        .unwrap_or("")
}
