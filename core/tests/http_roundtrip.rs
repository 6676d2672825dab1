/*
 * http_roundtrip.rs
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

//! HTTP GET server and client talking over loopback.

use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use staffetta_core::config::{ServerConfig, TransportConfig};
use staffetta_core::protocol::http::{HttpClient, HttpServer};
use staffetta_core::{net, Error};

struct RunningServer {
    port: u16,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl RunningServer {
    async fn start(root: &Path) -> Self {
        let listener = net::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server_config = ServerConfig {
            bind: format!("127.0.0.1:{}", port),
            root: root.to_path_buf(),
        };
        let server = HttpServer::new(&server_config, TransportConfig::default());
        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            server
                .serve(listener, async {
                    let _ = stopped.await;
                })
                .await
                .unwrap();
        });
        Self { port, stop, handle }
    }

    async fn shutdown(self) {
        let _ = self.stop.send(());
        self.handle.await.unwrap();
    }
}

fn pattern(n: usize) -> Vec<u8> {
    (0..n).map(|i| (i * 7 % 256) as u8).collect()
}

#[tokio::test]
async fn round_trip_preserves_bytes_for_several_sizes() {
    let dir = tempfile::tempdir().unwrap();
    let sizes = [0usize, 1, 70_000];
    for n in sizes {
        std::fs::write(dir.path().join(format!("file{}.bin", n)), pattern(n)).unwrap();
    }
    let server = RunningServer::start(dir.path()).await;
    let client = HttpClient::new(TransportConfig::default());
    for n in sizes {
        let path = format!("/file{}.bin", n);
        let (response, body) = client.get_to_vec("127.0.0.1", server.port, &path).await.unwrap();
        assert_eq!(response.code(), 200);
        assert_eq!(response.head.content_length(), Some(n as u64));
        assert!(response.head.header("Date").is_some());
        assert_eq!(body, pattern(n), "size {}", n);
    }
    server.shutdown().await;
}

#[tokio::test]
async fn not_found_has_no_length_and_no_body() {
    let dir = tempfile::tempdir().unwrap();
    let server = RunningServer::start(dir.path()).await;

    let mut raw = TcpStream::connect(("127.0.0.1", server.port)).await.unwrap();
    raw.write_all(b"GET /missing.html HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();
    let mut reply = Vec::new();
    timeout(Duration::from_secs(5), raw.read_to_end(&mut reply))
        .await
        .expect("server kept the connection open")
        .unwrap();
    assert_eq!(reply, b"HTTP/1.1 404 Not Found\r\n\r\n");

    let client = HttpClient::new(TransportConfig::default());
    let (response, body) = timeout(
        Duration::from_secs(5),
        client.get_to_vec("127.0.0.1", server.port, "/missing.html"),
    )
    .await
    .expect("client hung on a bodiless response")
    .unwrap();
    assert_eq!(response.code(), 404);
    assert_eq!(response.head.header("Content-Length"), None);
    assert!(body.is_empty());
    server.shutdown().await;
}

#[tokio::test]
async fn get_to_file_commits_only_on_success() {
    let served = tempfile::tempdir().unwrap();
    std::fs::write(served.path().join("page.html"), b"<p>hi</p>").unwrap();
    let server = RunningServer::start(served.path()).await;
    let downloads = tempfile::tempdir().unwrap();
    let client = HttpClient::new(TransportConfig::default());

    let dest = downloads.path().join("page.html");
    let (response, written) = client
        .get_to_file("127.0.0.1", server.port, "/page.html", &dest)
        .await
        .unwrap();
    assert_eq!(response.body_len, 9);
    assert_eq!(written, dest);
    assert_eq!(std::fs::read(&dest).unwrap(), b"<p>hi</p>");

    let missing = downloads.path().join("missing.html");
    let err = client
        .get_to_file("127.0.0.1", server.port, "/missing.html", &missing)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Rejected { .. }));
    assert!(!missing.exists());
    assert!(!downloads.path().join("missing.html.part").exists());
    server.shutdown().await;
}

#[tokio::test]
async fn name_with_space_is_fetched() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("my file.txt"), b"spaced").unwrap();
    let server = RunningServer::start(dir.path()).await;
    let client = HttpClient::new(TransportConfig::default());
    let (response, body) = client
        .get_to_vec("127.0.0.1", server.port, "/my file.txt")
        .await
        .unwrap();
    assert_eq!(response.code(), 200);
    assert_eq!(body, b"spaced");
    server.shutdown().await;
}
