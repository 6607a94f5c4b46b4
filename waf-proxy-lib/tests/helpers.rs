//! Shared test helpers
#![allow(dead_code)]

use std::convert::Infallible;
use std::io::Write;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub type TestResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Generate valid self-signed certificates for `localhost` using rcgen
///
/// The returned files are deleted when dropped.
pub fn create_valid_test_cert(
) -> Result<(NamedTempFile, NamedTempFile), Box<dyn std::error::Error + Send + Sync>> {
    let rcgen::CertifiedKey { cert, signing_key } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string()])?;

    let mut cert_file = NamedTempFile::new()?;
    cert_file.write_all(cert.pem().as_bytes())?;
    let mut key_file = NamedTempFile::new()?;
    key_file.write_all(signing_key.serialize_pem().as_bytes())?;

    Ok((cert_file, key_file))
}

/// Backend that answers every request with its headers as `name: value` lines
/// and echoes the request body in an `x-echo-body-len` header
pub async fn spawn_echo_backend() -> Result<SocketAddr, Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let svc = service_fn(|req: Request<Incoming>| async move {
                    let (parts, body) = req.into_parts();
                    let body_len = body.collect().await.map(|b| b.to_bytes().len()).unwrap_or(0);
                    let mut lines = format!("path: {}\n", parts.uri);
                    for (name, value) in &parts.headers {
                        lines.push_str(&format!(
                            "{}: {}\n",
                            name,
                            value.to_str().unwrap_or("<binary>")
                        ));
                    }
                    let resp = Response::builder()
                        .header("x-echo-body-len", body_len.to_string())
                        .body(Full::new(Bytes::from(lines)))
                        .unwrap_or_else(|e| panic!("{e}"));
                    Ok::<_, Infallible>(resp)
                });
                let _ = ConnBuilder::new(TokioExecutor::new())
                    .serve_connection(TokioIo::new(stream), svc)
                    .await;
            });
        }
    });

    Ok(addr)
}

/// Backend that accepts WebSocket upgrades and echoes raw bytes on the
/// upgraded connection
///
/// The 101 response carries the received `x-request-id` and
/// `x-forwarded-proto` back as `x-echo-request-id` / `x-echo-proto`.
pub async fn spawn_upgrade_echo_backend(
) -> Result<SocketAddr, Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let svc = service_fn(|mut req: Request<Incoming>| async move {
                    let mut resp = Response::builder()
                        .status(101)
                        .header("upgrade", "websocket")
                        .header("connection", "upgrade");
                    for (from, to) in [("x-request-id", "x-echo-request-id"), ("x-forwarded-proto", "x-echo-proto")] {
                        if let Some(value) = req.headers().get(from) {
                            resp = resp.header(to, value.clone());
                        }
                    }

                    let on_upgrade = hyper::upgrade::on(&mut req);
                    tokio::spawn(async move {
                        let Ok(upgraded) = on_upgrade.await else { return };
                        let mut io = TokioIo::new(upgraded);
                        let mut buf = [0u8; 1024];
                        while let Ok(n) = io.read(&mut buf).await {
                            if n == 0 || io.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    });

                    resp.body(Full::new(Bytes::new()))
                });
                let _ = ConnBuilder::new(TokioExecutor::new())
                    .serve_connection_with_upgrades(TokioIo::new(stream), svc)
                    .await;
            });
        }
    });

    Ok(addr)
}

/// Read a raw HTTP/1.1 response head byte by byte, leaving anything after
/// the blank line unread
pub async fn read_response_head(
    stream: &mut TcpStream,
) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
    let mut head = Vec::new();
    while !head.ends_with(b"\r\n\r\n") {
        head.push(stream.read_u8().await?);
        if head.len() > 16 * 1024 {
            return Err("response head too large".into());
        }
    }
    Ok(String::from_utf8(head)?)
}

/// Parse the echo backend's response body back into header pairs
pub fn echoed_header<'a>(body: &'a str, name: &str) -> Option<&'a str> {
    body.lines().find_map(|line| {
        let (n, v) = line.split_once(": ")?;
        (n == name).then_some(v)
    })
}

pub async fn wait_until_listening(addr: SocketAddr) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::net::TcpStream::connect(addr).await.is_err() {
        assert!(tokio::time::Instant::now() < deadline, "server did not start");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
