//! Raw connection takeover.
//!
//! # Responsibilities
//! - Advertise whether the serving layer can hand out raw connections
//! - Carry the raw client connection alongside a request until a handler
//!   claims it
//!
//! # Design Decisions
//! - The capability is checked once, when the dispatcher is built
//! - Whoever calls [`Hijacker::hijack`] first owns the connection; the
//!   serving layer only writes a response if nobody took it

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncRead, AsyncWrite};

/// Byte stream that can be owned by a tunnel.
pub trait RawIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> RawIo for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// A client connection removed from HTTP processing.
pub type RawConnection = Box<dyn RawIo>;

/// What the serving layer can do for the handlers it drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServeCapabilities {
    /// Handlers may take exclusive ownership of the client connection.
    pub raw_takeover: bool,
}

impl ServeCapabilities {
    pub const FULL: Self = Self { raw_takeover: true };
    pub const BUFFERED_ONLY: Self = Self { raw_takeover: false };
}

/// Handle through which a handler claims the raw client connection.
#[derive(Clone, Default)]
pub struct Hijacker {
    slot: Arc<Mutex<Option<RawConnection>>>,
}

impl Hijacker {
    /// A handle holding `conn` until it is hijacked.
    pub fn new(conn: RawConnection) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(conn))),
        }
    }

    /// A handle for connections hyper owns; hijacking always fails.
    pub fn unavailable() -> Self {
        Self::default()
    }

    /// Take the raw connection. Returns `None` if it was already taken
    /// or never available.
    pub fn hijack(&self) -> Option<RawConnection> {
        self.slot.lock().ok().and_then(|mut slot| slot.take())
    }
}

impl std::fmt::Debug for Hijacker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let available = self
            .slot
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false);
        f.debug_struct("Hijacker").field("available", &available).finish()
    }
}
