//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// A request as seen by a mock endpoint.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub body: Vec<u8>,
}

/// Requests received so far, in arrival order.
pub type Journal = Arc<Mutex<Vec<Recorded>>>;

/// Start a programmable HTTP endpoint on an ephemeral loopback port.
///
/// `f` receives the 0-based request number and returns status and body.
pub async fn start_programmable_backend<F, Fut>(f: F) -> (SocketAddr, Journal)
where
    F: Fn(usize) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, Vec<u8>)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let journal: Journal = Arc::default();
    let f = Arc::new(f);

    let recorded = journal.clone();
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    let f = f.clone();
                    let recorded = recorded.clone();
                    tokio::spawn(async move {
                        serve(socket, f, recorded).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    (addr, journal)
}

async fn serve<F, Fut>(mut socket: TcpStream, f: Arc<F>, journal: Journal)
where
    F: Fn(usize) -> Fut,
    Fut: Future<Output = (u16, Vec<u8>)>,
{
    let Some(request) = read_request(&mut socket).await else {
        return;
    };
    let index = {
        let mut journal = journal.lock().unwrap();
        journal.push(request);
        journal.len() - 1
    };

    let (status, body) = f(index).await;
    let reason = match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    };
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        reason,
        body.len()
    );
    let _ = socket.write_all(head.as_bytes()).await;
    let _ = socket.write_all(&body).await;
    let _ = socket.shutdown().await;
}

async fn read_request(socket: &mut TcpStream) -> Option<Recorded> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.lines();
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    let length = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let end = buf.len().min(header_end + length);

    Some(Recorded {
        method,
        path,
        body: buf[header_end..end].to_vec(),
    })
}

/// Mock admin endpoint that fails the first `failures` requests with 503.
pub async fn start_flaky_admin(failures: usize) -> (SocketAddr, Journal) {
    start_programmable_backend(move |index| async move {
        if index < failures {
            (503, b"not ready".to_vec())
        } else {
            (200, Vec::new())
        }
    })
    .await
}

/// Serve `payload` for every request.
pub async fn start_file_server(payload: Vec<u8>) -> (SocketAddr, Journal) {
    let payload = Arc::new(payload);
    start_programmable_backend(move |_| {
        let payload = payload.clone();
        async move { (200, payload.as_ref().clone()) }
    })
    .await
}

/// Write an executable shell script at `dir/name`.
pub fn fake_binary(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
