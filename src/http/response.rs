//! Response construction and raw serialization.
//!
//! # Responsibilities
//! - Build the empty-bodied status responses the proxy generates itself
//! - Serialize a response straight onto a raw connection when the
//!   connection is not owned by hyper (CONNECT requests that were refused)

use axum::{
    body::Body,
    http::{
        header::{CONNECTION, CONTENT_LENGTH},
        Response, StatusCode,
    },
};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Upper bound on locally generated bodies written raw.
const MAX_RAW_BODY_BYTES: usize = 64 * 1024;

/// Minimal reply for a request head we could not parse.
pub const RAW_BAD_REQUEST: &[u8] =
    b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

/// A response with the given status and no body.
pub fn status_response(status: StatusCode) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}

/// Write `response` onto a connection outside of hyper, then flush.
///
/// The body is collected first so a `Content-Length` can be sent; this
/// is only used for small locally generated responses.
pub async fn write_raw_response<W>(writer: &mut W, response: Response<Body>) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let (parts, body) = response.into_parts();
    let body = axum::body::to_bytes(body, MAX_RAW_BODY_BYTES)
        .await
        .map_err(std::io::Error::other)?;

    let mut head = Vec::with_capacity(256);
    head.extend_from_slice(
        format!(
            "HTTP/1.1 {} {}\r\n",
            parts.status.as_u16(),
            parts.status.canonical_reason().unwrap_or("")
        )
        .as_bytes(),
    );
    for (name, value) in parts.headers.iter() {
        if name == CONTENT_LENGTH || name == CONNECTION {
            continue;
        }
        head.extend_from_slice(name.as_str().as_bytes());
        head.extend_from_slice(b": ");
        head.extend_from_slice(value.as_bytes());
        head.extend_from_slice(b"\r\n");
    }
    head.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
    head.extend_from_slice(b"Connection: close\r\n\r\n");

    writer.write_all(&head).await?;
    writer.write_all(&body).await?;
    writer.flush().await
}
