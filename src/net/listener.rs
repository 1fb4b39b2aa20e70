//! Client-facing TCP listener.
//!
//! # Responsibilities
//! - Bind the proxy's listen address (`host:port` or bare `:port`)
//! - Hand out accepted client sockets together with a connection slot
//!
//! # Design Decisions
//! - A slot is claimed before `accept`, so at the limit clients queue in
//!   the kernel backlog instead of being accepted and dropped
//! - The slot travels with the connection task and frees itself on drop

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::ListenerConfig;

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("cannot listen on configured address: {0}")]
    Bind(io::Error),
    #[error("accepting client connection failed: {0}")]
    Accept(io::Error),
}

/// Listener for proxy clients, capped at `max_connections` open sockets.
pub struct Listener {
    tcp: TcpListener,
    slots: Arc<Semaphore>,
}

impl Listener {
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let addr = config.listen_addr();
        let tcp = TcpListener::bind(addr.as_str())
            .await
            .map_err(ListenerError::Bind)?;
        tracing::debug!(
            address = %config.bind_address,
            max_connections = config.max_connections,
            "Listener bound"
        );

        Ok(Self {
            tcp,
            slots: Arc::new(Semaphore::new(config.max_connections)),
        })
    }

    /// Wait for a free slot, then for the next client.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        let slot = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|e| ListenerError::Accept(io::Error::other(e)))?;

        let (stream, peer) = self.tcp.accept().await.map_err(ListenerError::Accept)?;
        tracing::trace!(
            peer_addr = %peer,
            free_slots = self.slots.available_permits(),
            "Client accepted"
        );

        Ok((stream, peer, ConnectionPermit::new(slot)))
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.tcp.local_addr()
    }

    #[cfg(test)]
    fn available_permits(&self) -> usize {
        self.slots.available_permits()
    }
}

/// One occupied connection slot; released on drop.
#[derive(Debug)]
pub struct ConnectionPermit {
    _slot: OwnedSemaphorePermit,
}

impl ConnectionPermit {
    pub(crate) fn new(slot: OwnedSemaphorePermit) -> Self {
        Self { _slot: slot }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback(max_connections: usize) -> ListenerConfig {
        ListenerConfig {
            bind_address: "127.0.0.1:0".into(),
            max_connections,
            ..ListenerConfig::default()
        }
    }

    #[tokio::test]
    async fn each_client_holds_a_slot() {
        let listener = Listener::bind(&loopback(2)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        assert_eq!(listener.available_permits(), 2);

        let _client = TcpStream::connect(addr).await.unwrap();
        let (_stream, _, permit) = listener.accept().await.unwrap();
        assert_eq!(listener.available_permits(), 1);

        drop(permit);
        assert_eq!(listener.available_permits(), 2);
    }

    #[tokio::test]
    async fn full_listener_waits_for_a_slot() {
        let listener = Listener::bind(&loopback(1)).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let _first = TcpStream::connect(addr).await.unwrap();
        let (_stream, _, permit) = listener.accept().await.unwrap();
        let _second = TcpStream::connect(addr).await.unwrap();

        let blocked =
            tokio::time::timeout(std::time::Duration::from_millis(100), listener.accept()).await;
        assert!(blocked.is_err());

        drop(permit);
        assert!(listener.accept().await.is_ok());
    }

    #[tokio::test]
    async fn hostname_is_resolved_at_bind() {
        let config = ListenerConfig {
            bind_address: "localhost:0".into(),
            ..ListenerConfig::default()
        };
        let listener = Listener::bind(&config).await.unwrap();
        let addr = listener.local_addr().unwrap();
        assert!(addr.ip().is_loopback());
        assert_ne!(addr.port(), 0);
    }

    #[tokio::test]
    async fn unparseable_address_fails_to_bind() {
        let config = ListenerConfig {
            bind_address: "not an address".into(),
            ..ListenerConfig::default()
        };
        assert!(matches!(
            Listener::bind(&config).await,
            Err(ListenerError::Bind(_))
        ));
    }
}
