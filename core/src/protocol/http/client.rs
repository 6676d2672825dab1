/*
 * client.rs
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

//! HTTP GET client. One request per connection; the connection is closed afterwards.

use std::path::{Path, PathBuf};

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::body::{transfer, FileSink};
use crate::config::TransportConfig;
use crate::error::{Error, Result};
use crate::frame::{read_frame, Frame, FrameMode};
use crate::net::connect_transport;
use crate::protocol::http::request::RequestLine;
use crate::protocol::http::response::{HttpResponse, ResponseHead};
use crate::protocol::Protocol;
use crate::transport::LineTransport;
use crate::uri::{encode_request_path, host_header};

/// A single GET exchange over an already open connection.
pub struct HttpClientSession<S> {
    transport: LineTransport<S>,
}

impl<S> HttpClientSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(transport: LineTransport<S>) -> Self {
        Self { transport }
    }

    /// Send `GET <path>` (percent-encoded where needed) with a `Host` header, read the head, copy the body into `sink`.
    /// The connection is closed whatever the outcome.
    pub async fn get<W>(mut self, host: &str, path: &str, sink: &mut W) -> Result<HttpResponse>
    where
        W: AsyncWrite + Unpin,
    {
        let result = self.exchange(host, path, sink).await;
        if let Err(e) = &result {
            warn!(path = %path, error = %e, "GET failed");
        }
        let _ = self.transport.close().await;
        result
    }

    async fn exchange<W>(&mut self, host: &str, path: &str, sink: &mut W) -> Result<HttpResponse>
    where
        W: AsyncWrite + Unpin,
    {
        let request = RequestLine::get(encode_request_path(path)).to_string();
        let host_line = format!("Host: {}", host);
        debug!(request = %request, host = %host, ">>");
        self.transport.send_lines(&[request.as_str(), host_line.as_str(), ""]).await?;
        let block = read_frame(&mut self.transport, FrameMode::Head)
            .await
            .and_then(Frame::into_block)?;
        let head = ResponseHead::from_block(block)?;
        let body_len = transfer(&mut self.transport, head.body_frame(), sink).await?;
        info!(code = head.status.code, bytes = body_len, "GET complete");
        Ok(HttpResponse { head, body_len })
    }
}

/// Connects per request.
#[derive(Debug, Clone, Default)]
pub struct HttpClient {
    config: TransportConfig,
}

impl HttpClient {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }

    pub async fn get<W>(&self, host: &str, port: u16, path: &str, sink: &mut W) -> Result<HttpResponse>
    where
        W: AsyncWrite + Unpin,
    {
        let transport = connect_transport(Protocol::Http, host, port, &self.config).await?;
        HttpClientSession::new(transport)
            .get(&host_header(host, port), path, sink)
            .await
    }

    pub async fn get_to_vec(&self, host: &str, port: u16, path: &str) -> Result<(HttpResponse, Vec<u8>)> {
        let mut body = Vec::new();
        let response = self.get(host, port, path, &mut body).await?;
        Ok((response, body))
    }

    /// Download into `dest`. The file only appears once the whole body arrived with a 2xx status;
    /// any other status is reported as `Rejected` and nothing is written.
    pub async fn get_to_file(
        &self,
        host: &str,
        port: u16,
        path: &str,
        dest: &Path,
    ) -> Result<(HttpResponse, PathBuf)> {
        let mut sink = FileSink::create(dest).await?;
        let response = match self.get(host, port, path, sink.file()).await {
            Ok(response) => response,
            Err(e) => {
                let _ = sink.discard().await;
                return Err(e);
            }
        };
        if !response.is_success() {
            let _ = sink.discard().await;
            return Err(Error::Rejected {
                command: format!("GET {}", path),
                reply: response.head.status.to_string(),
            });
        }
        let written = sink.commit().await?;
        Ok((response, written))
    }
}
