//! Error types shared by the proxy core.

use thiserror::Error;

/// Errors raised while setting up the proxy or dispatching a request.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The serving layer cannot hand over raw client connections,
    /// so CONNECT tunnels are impossible.
    #[error("serving layer does not support raw connection takeover")]
    CapabilityMissing,

    /// The request does not name an origin we can reach.
    #[error("cannot resolve request target: {0}")]
    InvalidTarget(String),
}
