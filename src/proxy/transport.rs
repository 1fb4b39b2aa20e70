//! Upstream transport capability.
//!
//! The forward handler never talks to the network itself; it hands the
//! rewritten request to a [`Transport`]. The default is a hyper-util
//! client dialing origins directly. Tests and alternative upstream
//! strategies plug in their own implementation.

use std::future::Future;

use axum::{
    body::Body,
    http::{Request, Response},
    BoxError,
};
use futures_util::future::BoxFuture;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;

/// Failure to obtain a response from upstream.
#[derive(Debug, Error)]
#[error("upstream request failed: {source}")]
pub struct TransportError {
    #[source]
    source: BoxError,
}

impl TransportError {
    pub fn new(source: impl Into<BoxError>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

/// Issues one outbound HTTP request and returns the upstream response.
pub trait Transport: Send + Sync + 'static {
    fn round_trip(
        &self,
        request: Request<Body>,
    ) -> BoxFuture<'static, Result<Response<Body>, TransportError>>;
}

/// Default transport: pooled HTTP/1 client over plain TCP.
#[derive(Clone)]
pub struct HyperTransport {
    client: Client<HttpConnector, Body>,
}

impl HyperTransport {
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { client }
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HyperTransport {
    fn round_trip(
        &self,
        request: Request<Body>,
    ) -> BoxFuture<'static, Result<Response<Body>, TransportError>> {
        let client = self.client.clone();
        Box::pin(async move {
            let response = client.request(request).await.map_err(TransportError::new)?;
            Ok(response.map(Body::new))
        })
    }
}

/// Transport backed by an async closure.
#[derive(Clone)]
pub struct TransportFn<F> {
    f: F,
}

/// Build a [`Transport`] from a closure.
pub fn transport_fn<F, Fut>(f: F) -> TransportFn<F>
where
    F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response<Body>, TransportError>> + Send + 'static,
{
    TransportFn { f }
}

impl<F, Fut> Transport for TransportFn<F>
where
    F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response<Body>, TransportError>> + Send + 'static,
{
    fn round_trip(
        &self,
        request: Request<Body>,
    ) -> BoxFuture<'static, Result<Response<Body>, TransportError>> {
        Box::pin((self.f)(request))
    }
}
