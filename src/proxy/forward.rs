//! Plain HTTP forwarding.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → outbound copy (headers deep-cloned, body moved, target resolved)
//!     → X-Forwarded-For appended
//!     → Transport::round_trip
//!     → upstream headers/status copied, body streamed back
//! ```
//!
//! # Design Decisions
//! - No retries: a failed round trip is a 502 and nothing else
//! - Body is streamed, never buffered
//! - Hop-by-hop headers are passed through untouched

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{
        header::HOST,
        request::Parts,
        uri::{Authority, Scheme},
        HeaderMap, HeaderName, HeaderValue, Request, Response, StatusCode, Uri,
    },
};

use crate::error::ProxyError;
use crate::http::response::status_response;
use crate::proxy::transport::Transport;

/// Client-identifying header maintained by the proxy.
pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Handles every non-CONNECT request.
#[derive(Clone)]
pub struct ForwardHandler {
    transport: Arc<dyn Transport>,
}

impl ForwardHandler {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Forward `request` upstream and build the client response.
    pub async fn handle(&self, request: Request<Body>, remote_addr: &str) -> Response<Body> {
        let (parts, body) = request.into_parts();

        let mut outbound = match outbound_request(&parts, body) {
            Ok(outbound) => outbound,
            Err(e) => {
                tracing::warn!(uri = %parts.uri, error = %e, "Rejecting request without a usable target");
                return status_response(StatusCode::BAD_REQUEST);
            }
        };
        append_forwarded_for(outbound.headers_mut(), remote_addr);

        let target = outbound.uri().clone();
        match self.transport.round_trip(outbound).await {
            Ok(upstream) => {
                tracing::debug!(
                    upstream_uri = %target,
                    status = %upstream.status(),
                    "Upstream responded"
                );
                client_response(upstream)
            }
            Err(e) => {
                tracing::warn!(upstream_uri = %target, error = %e, "Upstream error");
                status_response(StatusCode::BAD_GATEWAY)
            }
        }
    }
}

/// Derive the request sent upstream.
///
/// The header map is cloned so the outbound copy never shares state with
/// `parts`; the body is moved.
pub fn outbound_request(parts: &Parts, body: Body) -> Result<Request<Body>, ProxyError> {
    let uri = resolve_target(parts)?;

    let mut outbound = Request::new(body);
    *outbound.method_mut() = parts.method.clone();
    *outbound.uri_mut() = uri;
    *outbound.version_mut() = parts.version;
    *outbound.headers_mut() = parts.headers.clone();
    Ok(outbound)
}

/// Absolute-form targets are used as is. Origin-form targets are
/// resolved against the `Host` header.
fn resolve_target(parts: &Parts) -> Result<Uri, ProxyError> {
    let uri = &parts.uri;
    if uri.scheme().is_some() && uri.authority().is_some() {
        return Ok(uri.clone());
    }

    let authority = match uri.authority() {
        Some(authority) => authority.clone(),
        None => parts
            .headers
            .get(HOST)
            .and_then(|host| Authority::try_from(host.as_bytes()).ok())
            .ok_or_else(|| ProxyError::InvalidTarget(uri.to_string()))?,
    };
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

    Uri::builder()
        .scheme(uri.scheme().cloned().unwrap_or(Scheme::HTTP))
        .authority(authority)
        .path_and_query(path_and_query)
        .build()
        .map_err(|_| ProxyError::InvalidTarget(uri.to_string()))
}

/// Append the caller's IP to `X-Forwarded-For`.
///
/// Prior values are joined with `", "` and the result replaces them. An
/// address that does not parse as `ip:port` leaves the headers untouched.
pub fn append_forwarded_for(headers: &mut HeaderMap, remote_addr: &str) {
    let Ok(addr) = remote_addr.parse::<SocketAddr>() else {
        tracing::debug!(remote_addr, "Unparseable remote address, skipping X-Forwarded-For");
        return;
    };

    let mut value = Vec::new();
    for prior in headers.get_all(&X_FORWARDED_FOR) {
        if !value.is_empty() {
            value.extend_from_slice(b", ");
        }
        value.extend_from_slice(prior.as_bytes());
    }
    if !value.is_empty() {
        value.extend_from_slice(b", ");
    }
    value.extend_from_slice(addr.ip().to_string().as_bytes());

    if let Ok(value) = HeaderValue::from_bytes(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

/// Copy upstream headers value by value, then the status, then attach
/// the streaming body.
fn client_response(upstream: Response<Body>) -> Response<Body> {
    let (parts, body) = upstream.into_parts();

    let mut response = Response::new(body);
    let headers = response.headers_mut();
    for (name, value) in parts.headers.iter() {
        headers.append(name.clone(), value.clone());
    }
    *response.status_mut() = parts.status;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::transport::{transport_fn, TransportError};
    use axum::http::{header, Method};
    use std::sync::Mutex;

    fn handler_returning(
        status: StatusCode,
        headers: Vec<(&'static str, &'static str)>,
        body: &'static str,
    ) -> ForwardHandler {
        ForwardHandler::new(Arc::new(transport_fn(move |_req: Request<Body>| {
            let headers = headers.clone();
            async move {
                let mut builder = Response::builder().status(status);
                for (name, value) in headers {
                    builder = builder.header(name, value);
                }
                Ok::<_, TransportError>(builder.body(Body::from(body)).unwrap())
            }
        })))
    }

    /// Transport that records the outbound request headers and URI.
    fn recording_handler() -> (ForwardHandler, Arc<Mutex<Option<(Uri, HeaderMap)>>>) {
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        let handler = ForwardHandler::new(Arc::new(transport_fn(move |req: Request<Body>| {
            *sink.lock().unwrap() = Some((req.uri().clone(), req.headers().clone()));
            async { Ok::<_, TransportError>(Response::new(Body::empty())) }
        })));
        (handler, seen)
    }

    async fn body_string(response: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn canned_response_is_reproduced() {
        let handler = handler_returning(
            StatusCode::CREATED,
            vec![
                ("content-type", "text/plain"),
                ("set-cookie", "a=1"),
                ("set-cookie", "b=2"),
                ("x-upstream", "yes"),
            ],
            "hello from origin",
        );
        let request = Request::builder()
            .uri("http://origin.test/resource")
            .body(Body::empty())
            .unwrap();

        let response = handler.handle(request, "192.0.2.10:4000").await;

        assert_eq!(response.status(), StatusCode::CREATED);
        let cookies: Vec<_> = response.headers().get_all(header::SET_COOKIE).iter().collect();
        assert_eq!(cookies, vec!["a=1", "b=2"]);
        assert_eq!(response.headers()["content-type"], "text/plain");
        assert_eq!(response.headers()["x-upstream"], "yes");
        assert_eq!(body_string(response).await, "hello from origin");
    }

    #[tokio::test]
    async fn empty_upstream_body_is_fine() {
        let handler = handler_returning(StatusCode::NO_CONTENT, vec![], "");
        let request = Request::builder()
            .uri("http://origin.test/")
            .body(Body::empty())
            .unwrap();

        let response = handler.handle(request, "192.0.2.10:4000").await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(body_string(response).await, "");
    }

    #[tokio::test]
    async fn transport_error_is_bad_gateway() {
        let handler = ForwardHandler::new(Arc::new(transport_fn(|_req: Request<Body>| async {
            Err::<Response<Body>, _>(TransportError::new("connection refused"))
        })));
        let request = Request::builder()
            .uri("http://unreachable.test/")
            .body(Body::empty())
            .unwrap();

        let response = handler.handle(request, "192.0.2.10:4000").await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(body_string(response).await, "");
    }

    #[tokio::test]
    async fn forwarded_for_is_set_from_remote_addr() {
        let (handler, seen) = recording_handler();
        let request = Request::builder()
            .uri("http://origin.test/")
            .body(Body::empty())
            .unwrap();

        handler.handle(request, "203.0.113.5:54321").await;

        let (_, headers) = seen.lock().unwrap().take().unwrap();
        assert_eq!(headers[X_FORWARDED_FOR], "203.0.113.5");
    }

    #[tokio::test]
    async fn forwarded_for_appends_to_prior_value() {
        let (handler, seen) = recording_handler();
        let request = Request::builder()
            .uri("http://origin.test/")
            .header("x-forwarded-for", "10.0.0.1")
            .body(Body::empty())
            .unwrap();

        handler.handle(request, "203.0.113.5:54321").await;

        let (_, headers) = seen.lock().unwrap().take().unwrap();
        let values: Vec<_> = headers.get_all(X_FORWARDED_FOR).iter().collect();
        assert_eq!(values, vec!["10.0.0.1, 203.0.113.5"]);
    }

    #[test]
    fn forwarded_for_joins_multiple_prior_values() {
        let mut headers = HeaderMap::new();
        headers.append(X_FORWARDED_FOR, HeaderValue::from_static("10.0.0.1"));
        headers.append(X_FORWARDED_FOR, HeaderValue::from_static("10.0.0.2"));

        append_forwarded_for(&mut headers, "[2001:db8::1]:443");

        let values: Vec<_> = headers.get_all(X_FORWARDED_FOR).iter().collect();
        assert_eq!(values, vec!["10.0.0.1, 10.0.0.2, 2001:db8::1"]);
    }

    #[test]
    fn unparseable_remote_addr_leaves_headers_alone() {
        let mut headers = HeaderMap::new();
        append_forwarded_for(&mut headers, "not-an-address");
        assert!(headers.get(X_FORWARDED_FOR).is_none());

        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static("10.0.0.1"));
        append_forwarded_for(&mut headers, "@");
        assert_eq!(headers[X_FORWARDED_FOR], "10.0.0.1");
    }

    #[test]
    fn outbound_headers_do_not_alias_inbound() {
        let (mut parts, body) = Request::builder()
            .method(Method::POST)
            .uri("http://origin.test/submit")
            .header("x-trace", "inbound")
            .body(Body::empty())
            .unwrap()
            .into_parts();

        let mut outbound = outbound_request(&parts, body).unwrap();
        outbound
            .headers_mut()
            .insert("x-trace", HeaderValue::from_static("outbound"));
        parts
            .headers
            .insert("x-only-inbound", HeaderValue::from_static("1"));

        assert_eq!(parts.headers["x-trace"], "inbound");
        assert_eq!(outbound.headers()["x-trace"], "outbound");
        assert!(outbound.headers().get("x-only-inbound").is_none());
        assert_eq!(outbound.method(), Method::POST);
    }

    #[tokio::test]
    async fn origin_form_is_resolved_against_host() {
        let (handler, seen) = recording_handler();
        let request = Request::builder()
            .uri("/search?q=rust")
            .header(HOST, "origin.test:8081")
            .body(Body::empty())
            .unwrap();

        handler.handle(request, "203.0.113.5:54321").await;

        let (uri, _) = seen.lock().unwrap().take().unwrap();
        assert_eq!(uri, "http://origin.test:8081/search?q=rust");
    }

    #[tokio::test]
    async fn missing_target_is_bad_request() {
        let (handler, seen) = recording_handler();
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();

        let response = handler.handle(request, "203.0.113.5:54321").await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(seen.lock().unwrap().is_none());
    }
}
