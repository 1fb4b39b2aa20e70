//! First request head detection.
//!
//! # Responsibilities
//! - Read from a fresh connection until one full request head is buffered
//! - Parse it into method, target, version and headers
//!
//! # Design Decisions
//! - Bounded: a head larger than [`MAX_HEAD_BYTES`] is rejected
//! - Bytes past the head stay in the buffer for the next consumer

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Request, Uri, Version};
use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Upper bound on a request head.
pub const MAX_HEAD_BYTES: usize = 64 * 1024;

const MAX_HEADERS: usize = 100;

#[derive(Debug, Error)]
pub enum SniffError {
    #[error("request head exceeds {MAX_HEAD_BYTES} bytes")]
    TooLarge,

    #[error("malformed request head: {0}")]
    Malformed(String),

    #[error("connection closed mid-head")]
    Incomplete,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<httparse::Error> for SniffError {
    fn from(e: httparse::Error) -> Self {
        SniffError::Malformed(e.to_string())
    }
}

/// A parsed request line and header block.
#[derive(Debug)]
pub struct RequestHead {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
    /// Length of the head in the buffer, including the blank line.
    pub len: usize,
}

impl RequestHead {
    /// Build a request from this head with the given body.
    pub fn into_request<B>(self, body: B) -> Request<B> {
        let mut request = Request::new(body);
        *request.method_mut() = self.method;
        *request.uri_mut() = self.uri;
        *request.version_mut() = self.version;
        *request.headers_mut() = self.headers;
        request
    }

    fn from_parsed(parsed: &httparse::Request<'_, '_>, len: usize) -> Result<Self, SniffError> {
        let method = parsed
            .method
            .ok_or_else(|| SniffError::Malformed("missing method".into()))?;
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|e| SniffError::Malformed(e.to_string()))?;

        let uri = parsed
            .path
            .ok_or_else(|| SniffError::Malformed("missing request target".into()))?
            .parse::<Uri>()
            .map_err(|e| SniffError::Malformed(e.to_string()))?;

        let version = match parsed.version {
            Some(0) => Version::HTTP_10,
            _ => Version::HTTP_11,
        };

        let mut headers = HeaderMap::with_capacity(parsed.headers.len());
        for header in parsed.headers.iter() {
            let name = HeaderName::from_bytes(header.name.as_bytes())
                .map_err(|e| SniffError::Malformed(e.to_string()))?;
            let value = HeaderValue::from_bytes(header.value)
                .map_err(|e| SniffError::Malformed(e.to_string()))?;
            headers.append(name, value);
        }

        Ok(Self {
            method,
            uri,
            version,
            headers,
            len,
        })
    }
}

/// Read until `buf` holds a complete request head and parse it.
///
/// Returns `Ok(None)` if the peer closed before sending anything.
pub async fn read_head<S>(stream: &mut S, buf: &mut BytesMut) -> Result<Option<RequestHead>, SniffError>
where
    S: AsyncRead + Unpin,
{
    loop {
        if !buf.is_empty() {
            let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
            let mut parsed = httparse::Request::new(&mut headers);
            if let httparse::Status::Complete(len) = parsed.parse(buf)? {
                return RequestHead::from_parsed(&parsed, len).map(Some);
            }
        }

        if buf.len() >= MAX_HEAD_BYTES {
            return Err(SniffError::TooLarge);
        }

        if stream.read_buf(buf).await? == 0 {
            return if buf.is_empty() {
                Ok(None)
            } else {
                Err(SniffError::Incomplete)
            };
        }
    }
}
