//! Bidirectional byte relay for CONNECT tunnels.

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

/// Copy bytes between `a` and `b` until the `b → a` direction finishes.
///
/// `a → b` runs on a spawned task and is not joined: once `b → a` ends
/// this returns and the other direction drains on its own. Each direction
/// shuts down its write side when its reader hits EOF or errors, so the
/// peer sees the close and the remaining direction terminates too.
///
/// Returns the number of bytes copied `b → a`.
pub async fn relay<A, B>(a: A, b: B) -> std::io::Result<u64>
where
    A: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    B: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (mut a_read, mut a_write) = tokio::io::split(a);
    let (mut b_read, mut b_write) = tokio::io::split(b);

    tokio::spawn(async move {
        match pipe(&mut a_read, &mut b_write).await {
            Ok(bytes) => tracing::trace!(bytes, "Relay a -> b finished"),
            Err(e) => tracing::debug!(error = %e, "Relay a -> b aborted"),
        }
    });

    pipe(&mut b_read, &mut a_write).await
}

async fn pipe<R, W>(reader: &mut R, writer: &mut W) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let copied = tokio::io::copy(reader, writer).await;
    // peer may already be gone
    let _ = writer.shutdown().await;
    copied
}
