/*
 * server.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Staffetta, a toolkit for line-oriented TCP dialogues.
 *
 * Staffetta is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Staffetta is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Staffetta.  If not, see <http://www.gnu.org/licenses/>.
 */

//! HTTP GET file server.
//!
//! Each accepted connection carries one request and is served by its own task. A missing
//! resource gets a bare `404` status line and blank line: no `Content-Length`, no body.
//! Found files are sent with their exact size.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::body::send_fixed;
use crate::config::{ServerConfig, TransportConfig};
use crate::error::{Error, Result};
use crate::frame::{read_block, read_single_line};
use crate::net::accept_transport;
use crate::protocol::http::request::{Method, RequestLine};
use crate::protocol::http::response::Status;
use crate::protocol::Protocol;
use crate::transport::LineTransport;
use crate::uri::resolve_request_path;

/// Pause after a failed accept before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Read-only state shared by all connection tasks.
#[derive(Debug)]
struct Shared {
    root: PathBuf,
    transport: TransportConfig,
}

/// Serves files under a root directory.
#[derive(Debug, Clone)]
pub struct HttpServer {
    shared: Arc<Shared>,
}

impl HttpServer {
    pub fn new(server: &ServerConfig, transport: TransportConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                root: server.root.clone(),
                transport,
            }),
        }
    }

    pub fn root(&self) -> &Path {
        &self.shared.root
    }

    /// Accept connections until `shutdown` completes. Tasks already running finish on their own.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = &listener;
        let config = &self.shared.transport;
        self.run(
            move || async move {
                let transport = accept_transport(listener, Protocol::Http, config).await?;
                let remote = transport
                    .get_ref()
                    .peer_addr()
                    .map(|a| a.to_string())
                    .unwrap_or_default();
                Ok::<_, Error>((transport, remote))
            },
            shutdown,
        )
        .await
    }

    async fn run<A, Fut, S, F>(&self, mut accept: A, shutdown: F) -> Result<()>
    where
        A: FnMut() -> Fut,
        Fut: Future<Output = Result<(LineTransport<S>, String)>>,
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("server stopping");
                    return Ok(());
                }
                accepted = accept() => {
                    let (transport, remote) = match accepted {
                        Ok(a) => a,
                        Err(e) => {
                            warn!(error = %e, "accept failed");
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                            continue;
                        }
                    };
                    let shared = Arc::clone(&self.shared);
                    tokio::spawn(async move {
                        match serve_connection(transport, &shared.root).await {
                            Ok(bytes) => debug!(remote = %remote, bytes, "request served"),
                            Err(e) => warn!(remote = %remote, error = %e, "request failed"),
                        }
                    });
                }
            }
        }
    }
}

/// Answer one request on `transport`, then close it. Returns the body size sent.
pub async fn serve_connection<S>(mut transport: LineTransport<S>, root: &Path) -> Result<u64>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let result = respond(&mut transport, root).await;
    let closed = transport.close().await;
    let sent = result?;
    closed?;
    Ok(sent)
}

async fn respond<S>(transport: &mut LineTransport<S>, root: &Path) -> Result<u64>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let line = read_single_line(transport).await?;
    let request = match RequestLine::parse(&line) {
        Ok(r) => r,
        Err(e) => {
            refuse(transport, Status::BadRequest).await?;
            return Err(e);
        }
    };
    if request.method != Method::Get {
        refuse(transport, Status::NotImplemented).await?;
        return Err(Error::violation(format!("unsupported method {}", request.method)));
    }
    let Some((mut file, len)) = open_resource(root, &request.target).await else {
        refuse(transport, Status::NotFound).await?;
        return Err(Error::ResourceNotFound(request.target));
    };
    read_block(transport).await?;
    let ok = Status::Ok.status_line();
    let length = format!("Content-Length: {}", len);
    let date = format!("Date: {}", http_date());
    debug!(status = %ok, length = len, ">>");
    transport.send_lines(&[ok.as_str(), length.as_str(), date.as_str(), ""]).await?;
    send_fixed(&mut file, transport, len).await
}

/// Status line and blank line only. The rest of the request is then read and discarded so the
/// peer's pending headers do not turn our close into a reset.
async fn refuse<S>(transport: &mut LineTransport<S>, status: Status) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let line = status.status_line();
    debug!(status = %line, ">>");
    transport.send_lines(&[line.as_str(), ""]).await?;
    let _ = read_block(transport).await;
    Ok(())
}

/// Open the regular file the target names, with its size.
async fn open_resource(root: &Path, target: &str) -> Option<(File, u64)> {
    let path = resolve_request_path(root, target)?;
    let file = File::open(&path).await.ok()?;
    let meta = file.metadata().await.ok()?;
    if !meta.is_file() {
        return None;
    }
    Some((file, meta.len()))
}

fn http_date() -> String {
    chrono::Utc::now()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

    async fn exchange(root: &Path, request: &'static [u8]) -> (Result<u64>, Vec<u8>) {
        let (a, mut peer) = duplex(64 * 1024);
        let transport =
            LineTransport::new(a, &TransportConfig::default()).with_line_ending(Protocol::Http.line_ending());
        peer.write_all(request).await.unwrap();
        let result = serve_connection(transport, root).await;
        let mut out = Vec::new();
        peer.read_to_end(&mut out).await.unwrap();
        (result, out)
    }

    #[tokio::test]
    async fn serves_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), b"hello").unwrap();
        let (result, out) = exchange(dir.path(), b"GET /hello.txt HTTP/1.1\r\nHost: x\r\n\r\n").await;
        assert_eq!(result.unwrap(), 5);
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\nContent-Length: 5\r\nDate: "));
        assert!(text.ends_with("\r\n\r\nhello"));
    }

    #[tokio::test]
    async fn missing_file_is_bare_404() {
        let dir = tempfile::tempdir().unwrap();
        let (result, out) = exchange(dir.path(), b"GET /nope HTTP/1.1\r\nHost: x\r\n\r\n").await;
        assert!(matches!(result, Err(Error::ResourceNotFound(t)) if t == "/nope"));
        assert_eq!(out, b"HTTP/1.1 404 Not Found\r\n\r\n");
    }

    #[tokio::test]
    async fn directory_and_parent_paths_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let (result, _) = exchange(dir.path(), b"GET /sub HTTP/1.1\r\n\r\n").await;
        assert!(matches!(result, Err(Error::ResourceNotFound(_))));
        let (result, _) = exchange(dir.path(), b"GET /sub/../../etc/passwd HTTP/1.1\r\n\r\n").await;
        assert!(matches!(result, Err(Error::ResourceNotFound(_))));
    }

    #[tokio::test]
    async fn other_methods_are_not_implemented() {
        let dir = tempfile::tempdir().unwrap();
        let (result, out) = exchange(dir.path(), b"POST /x HTTP/1.1\r\n\r\n").await;
        assert!(matches!(result, Err(Error::ProtocolViolation(_))));
        assert_eq!(out, b"HTTP/1.1 501 Not Implemented\r\n\r\n");
    }

    #[tokio::test]
    async fn failed_accepts_are_spaced_out() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            root: dir.path().to_path_buf(),
            ..ServerConfig::default()
        };
        let server = HttpServer::new(&config, TransportConfig::default());
        let mut attempts = 0u32;
        let result = server
            .run(
                || {
                    attempts += 1;
                    async { Err::<(LineTransport<DuplexStream>, String), _>(Error::closed()) }
                },
                tokio::time::sleep(Duration::from_millis(250)),
            )
            .await;
        assert!(result.is_ok());
        assert!(attempts >= 1);
        assert!(attempts <= 4, "{} accept attempts in 250ms", attempts);
    }

    #[tokio::test]
    async fn garbage_request_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let (result, out) = exchange(dir.path(), b"HELLO\r\n\r\n").await;
        assert!(matches!(result, Err(Error::ProtocolViolation(_))));
        assert_eq!(out, b"HTTP/1.1 400 Bad Request\r\n\r\n");
    }
}
