//! HTTP server setup and connection serving.
//!
//! # Responsibilities
//! - Create the Axum router in front of the dispatcher
//! - Accept connections and give each its own task
//! - Sniff the first request head: CONNECT goes to the dispatcher with
//!   the raw connection attached, everything else is served by hyper
//! - Drain open connections on shutdown
//!
//! # Design Decisions
//! - hyper serves one request per connection, so every CONNECT is seen
//!   by the sniffer and can be answered byte-exact
//! - Refused CONNECTs are answered raw, since hyper never owned the socket

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Method, Request},
    response::{IntoResponse, Response},
    Router,
};
use bytes::BytesMut;
use hyper::{body::Incoming, server::conn::http1, service::service_fn};
use hyper_util::rt::TokioIo;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tower::ServiceExt;
use tower_http::trace::TraceLayer;

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::http::response::{write_raw_response, RAW_BAD_REQUEST};
use crate::net::connection::{ConnectionGuard, ConnectionTracker, TrackedStream};
use crate::net::hijack::{Hijacker, ServeCapabilities};
use crate::net::listener::{ConnectionPermit, Listener, ListenerError};
use crate::net::rewind::Rewind;
use crate::net::sniff::{self, SniffError};
use crate::proxy::dispatch::{ClientConn, Dispatched, Dispatcher};
use crate::proxy::transport::{HyperTransport, Transport};

/// Initial buffer for the first request head.
const HEAD_BUFFER_CAPACITY: usize = 8 * 1024;

/// HTTP server for the forward proxy.
pub struct HttpServer {
    config: ProxyConfig,
    dispatcher: Arc<Dispatcher>,
    router: Router,
    tracker: ConnectionTracker,
}

impl HttpServer {
    /// Create a server that dials origins directly.
    pub fn new(config: ProxyConfig) -> Result<Self, ProxyError> {
        Self::with_transport(config, Arc::new(HyperTransport::new()))
    }

    /// Create a server that sends forwarded requests through `transport`.
    pub fn with_transport(
        config: ProxyConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ProxyError> {
        let dispatcher = Arc::new(Dispatcher::new(&config, transport, ServeCapabilities::FULL)?);
        let router = Self::build_router(dispatcher.clone());

        Ok(Self {
            config,
            dispatcher,
            router,
            tracker: ConnectionTracker::new(),
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(dispatcher: Arc<Dispatcher>) -> Router {
        Router::new()
            .fallback(proxy_handler)
            .with_state(dispatcher)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server until `shutdown` fires, then drain open connections.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ListenerError> {
        let addr = listener.local_addr().map_err(ListenerError::Accept)?;
        tracing::info!(
            address = %addr,
            auth_enabled = self.dispatcher.auth().is_enabled(),
            "HTTP server starting"
        );

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer, permit) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            tracing::warn!(error = %e, "Accept failed");
                            tokio::time::sleep(Duration::from_millis(100)).await;
                            continue;
                        }
                    };

                    let guard = self.tracker.track();
                    let dispatcher = self.dispatcher.clone();
                    let router = self.router.clone();
                    tokio::spawn(async move {
                        tracing::trace!(connection_id = %guard.id(), peer_addr = %peer, "Serving connection");
                        serve_connection(stream, peer, permit, guard, dispatcher, router).await;
                    });
                }
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received");
                    break;
                }
            }
        }

        let grace = Duration::from_secs(self.config.listener.shutdown_grace_secs);
        if tokio::time::timeout(grace, self.tracker.wait_idle()).await.is_err() {
            tracing::warn!(
                open_connections = self.tracker.active_count(),
                "Shutdown grace period elapsed with connections still open"
            );
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Serve one client connection.
///
/// `permit` and `guard` are released when this returns, except for a
/// CONNECT, where they move into the raw connection and live as long as
/// the tunnel holds it.
async fn serve_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    permit: ConnectionPermit,
    guard: ConnectionGuard,
    dispatcher: Arc<Dispatcher>,
    router: Router,
) {
    let mut buf = BytesMut::with_capacity(HEAD_BUFFER_CAPACITY);
    let head = match sniff::read_head(&mut stream, &mut buf).await {
        Ok(Some(head)) => head,
        Ok(None) => {
            tracing::trace!(peer_addr = %peer, "Connection closed before a request");
            return;
        }
        Err(e @ (SniffError::Incomplete | SniffError::Io(_))) => {
            tracing::debug!(peer_addr = %peer, error = %e, "Connection dropped while reading request");
            return;
        }
        Err(e) => {
            tracing::debug!(peer_addr = %peer, error = %e, "Bad request head");
            let _ = stream.write_all(RAW_BAD_REQUEST).await;
            let _ = stream.shutdown().await;
            return;
        }
    };

    if head.method == Method::CONNECT {
        // bytes pipelined after the head belong to the tunnel
        let trailing = buf.split_off(head.len).freeze();
        let raw = TrackedStream::new(Rewind::new(trailing, stream), permit, guard);
        let hijacker = Hijacker::new(Box::new(raw));
        let request = head.into_request(Body::empty());

        let dispatched = dispatcher
            .serve(request, ClientConn::new(peer.to_string(), hijacker.clone()))
            .await;

        if let Dispatched::Response(response) = dispatched {
            if let Some(mut conn) = hijacker.hijack() {
                if let Err(e) = write_raw_response(&mut conn, response).await {
                    tracing::debug!(peer_addr = %peer, error = %e, "Failed to write CONNECT response");
                }
                let _ = conn.shutdown().await;
            }
        }
        return;
    }

    let io = TokioIo::new(Rewind::new(buf.freeze(), stream));
    let service = service_fn(move |mut request: Request<Incoming>| {
        request.extensions_mut().insert(ConnectInfo(peer));
        router.clone().oneshot(request)
    });

    if let Err(e) = http1::Builder::new()
        .keep_alive(false)
        .title_case_headers(true)
        .serve_connection(io, service)
        .await
    {
        tracing::debug!(peer_addr = %peer, error = %e, "Connection error");
    }
}

/// Entry point for requests served by hyper. These connections cannot be
/// taken over.
async fn proxy_handler(
    State(dispatcher): State<Arc<Dispatcher>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    dispatcher
        .serve(request, ClientConn::new(peer.to_string(), Hijacker::unavailable()))
        .await
        .into_response()
}
