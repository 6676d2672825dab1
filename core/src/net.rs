/*
 * net.rs
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

//! TCP connection helpers: connect with a timeout and wrap the stream in a [`LineTransport`]
//! with the line ending of the protocol spoken over it.

use std::io;

use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::info;

use crate::config::TransportConfig;
use crate::error::{Error, Result};
use crate::protocol::Protocol;
use crate::transport::LineTransport;

/// Connect to host:port within the configured connect timeout.
pub async fn connect(host: &str, port: u16, config: &TransportConfig) -> Result<TcpStream> {
    let addr = format!("{}:{}", host, port);
    let tcp = timeout(config.connect_timeout(), TcpStream::connect(&addr))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "TCP connect timed out"))??;
    tcp.set_nodelay(true)?;
    info!(
        local = %tcp.local_addr()?,
        remote = %tcp.peer_addr()?,
        "connection established"
    );
    Ok(tcp)
}

/// Connect and wrap for `protocol`.
pub async fn connect_transport(
    protocol: Protocol,
    host: &str,
    port: u16,
    config: &TransportConfig,
) -> Result<LineTransport<TcpStream>> {
    let tcp = connect(host, port, config).await?;
    Ok(LineTransport::new(tcp, config).with_line_ending(protocol.line_ending()))
}

/// Bind a listening socket.
pub async fn bind(addr: &str) -> Result<TcpListener> {
    let listener = TcpListener::bind(addr).await.map_err(Error::from)?;
    info!(local = %listener.local_addr()?, "listening");
    Ok(listener)
}

/// Accept one connection and wrap it for `protocol`.
pub async fn accept_transport(
    listener: &TcpListener,
    protocol: Protocol,
    config: &TransportConfig,
) -> Result<LineTransport<TcpStream>> {
    let (tcp, remote) = listener.accept().await?;
    info!(local = %tcp.local_addr()?, remote = %remote, "connection accepted");
    Ok(LineTransport::new(tcp, config).with_line_ending(protocol.line_ending()))
}
