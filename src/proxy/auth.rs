//! Proxy authorization gate.
//!
//! # Responsibilities
//! - Hold the single configured credential (base64 of `user:pass`)
//! - Check `Proxy-Authorization: Basic <credential>` on each request
//! - Build the 407 challenge sent when the check fails
//!
//! # Design Decisions
//! - Stateless predicate; the encoded credential is computed once at startup
//! - Byte-for-byte comparison against the encoded form, no decoding per request
//! - An empty credential disables the gate entirely

use axum::{
    body::Body,
    http::{
        header::{PROXY_AUTHENTICATE, PROXY_AUTHORIZATION},
        HeaderValue, Request, Response, StatusCode,
    },
};
use base64::{engine::general_purpose::STANDARD, Engine};

/// Scheme prefix expected in front of the encoded credential.
pub const BASIC_PREFIX: &[u8] = b"Basic ";

/// Challenge sent with every 407.
pub const BASIC_CHALLENGE: &str = "Basic realm=\"*\"";

/// A pre-encoded basic-auth credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Encode a `user:pass` pair the way clients send it.
    pub fn from_user_pass(user_pass: &str) -> Self {
        Self(STANDARD.encode(user_pass))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Gate in front of both the forward and tunnel paths.
#[derive(Debug, Clone, Default)]
pub struct AuthGate {
    credential: Option<Credential>,
}

impl AuthGate {
    /// Create a gate. `None` or an empty credential disables auth.
    pub fn new(credential: Option<Credential>) -> Self {
        Self {
            credential: credential.filter(|c| !c.0.is_empty()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.credential.is_some()
    }

    /// Returns true if the request may proceed.
    pub fn check<B>(&self, request: &Request<B>) -> bool {
        let Some(credential) = &self.credential else {
            return true;
        };

        request
            .headers()
            .get(PROXY_AUTHORIZATION)
            .and_then(|value| value.as_bytes().strip_prefix(BASIC_PREFIX))
            .is_some_and(|presented| presented == credential.as_str().as_bytes())
    }

    /// The `407 Proxy Authentication Required` response.
    pub fn challenge() -> Response<Body> {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::PROXY_AUTHENTICATION_REQUIRED;
        response
            .headers_mut()
            .insert(PROXY_AUTHENTICATE, HeaderValue::from_static(BASIC_CHALLENGE));
        response
    }
}
