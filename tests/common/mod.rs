//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use pxy::config::{AuthConfig, ListenerConfig, ProxyConfig};
use pxy::net::{Listener, ListenerError};
use pxy::{HttpServer, Shutdown};

/// Body every mock origin response carries.
pub const ORIGIN_BODY: &str = "hello from origin";

/// A proxy running on an ephemeral port.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<Result<(), ListenerError>>,
}

/// Proxy config bound to an ephemeral loopback port.
pub fn test_config(credential: Option<&str>) -> ProxyConfig {
    ProxyConfig {
        listener: ListenerConfig {
            bind_address: "127.0.0.1:0".to_string(),
            max_connections: 64,
            shutdown_grace_secs: 1,
        },
        auth: AuthConfig {
            credential: credential.map(str::to_string),
        },
        ..ProxyConfig::default()
    }
}

/// Start the proxy in the background.
pub async fn start_proxy(config: ProxyConfig) -> TestProxy {
    let listener = Listener::bind(&config.listener).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(config).unwrap();

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    let handle = tokio::spawn(async move { server.run(listener, receiver).await });

    TestProxy {
        addr,
        shutdown,
        handle,
    }
}

/// Start a mock origin. Every response carries two `Set-Cookie` values and
/// echoes the request's `X-Forwarded-For` in `X-Seen-Forwarded-For`.
pub async fn start_mock_origin() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let Some(forwarded_for) = read_forwarded_for(&mut socket).await else {
                            return;
                        };
                        let response = format!(
                            "HTTP/1.1 200 OK\r\n\
                             Content-Type: text/plain\r\n\
                             Set-Cookie: a=1\r\n\
                             Set-Cookie: b=2\r\n\
                             X-Seen-Forwarded-For: {}\r\n\
                             Content-Length: {}\r\n\
                             Connection: close\r\n\r\n{}",
                            forwarded_for,
                            ORIGIN_BODY.len(),
                            ORIGIN_BODY
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Read one request head and return its `X-Forwarded-For` value, or `-`.
async fn read_forwarded_for(socket: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);

        let mut headers = [httparse::EMPTY_HEADER; 64];
        let mut request = httparse::Request::new(&mut headers);
        if request.parse(&buf).ok()?.is_complete() {
            let value = request
                .headers
                .iter()
                .find(|h| h.name.eq_ignore_ascii_case("x-forwarded-for"))
                .map(|h| String::from_utf8_lossy(h.value).into_owned())
                .unwrap_or_else(|| "-".to_string());
            return Some(value);
        }
    }
}

/// Start a TCP server that echoes everything back.
pub async fn start_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    tokio::spawn(async move {
                        let (mut reader, mut writer) = socket.into_split();
                        let _ = tokio::io::copy(&mut reader, &mut writer).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// An address nothing is listening on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// HTTP client that sends everything through the proxy.
pub fn proxied_client(proxy: reqwest::Proxy) -> reqwest::Client {
    reqwest::Client::builder()
        .proxy(proxy)
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

/// Read until the peer closes, with a timeout.
pub async fn read_until_close(stream: &mut TcpStream) -> Vec<u8> {
    let mut out = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut out))
        .await
        .expect("peer did not close in time")
        .unwrap();
    out
}
