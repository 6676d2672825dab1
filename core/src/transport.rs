/*
 * transport.rs
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

//! Line transport: line-buffered reads and line-terminated writes over any async byte stream.
//!
//! Reads split on `\n` and drop a trailing `\r`, so peers may use either convention.
//! Writes use the configured [`LineEnding`]. Bytes left in the read buffer after a line
//! stay available to [`LineTransport::read_chunk`], which body transfer uses.

use std::future::Future;
use std::io;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::debug;

use crate::config::TransportConfig;
use crate::error::{Error, Result};

const READ_CHUNK: usize = 8192;

/// Terminator appended by `send_line`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnding {
    Lf,
    CrLf,
}

impl LineEnding {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            LineEnding::Lf => b"\n",
            LineEnding::CrLf => b"\r\n",
        }
    }
}

/// One connection, owned by a single dialogue. Closed at most once via [`LineTransport::close`].
pub struct LineTransport<S> {
    stream: S,
    read_buf: BytesMut,
    line_ending: LineEnding,
    max_line_length: usize,
    io_timeout: Option<Duration>,
    closed: bool,
}

impl<S> LineTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, config: &TransportConfig) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(READ_CHUNK),
            line_ending: LineEnding::Lf,
            max_line_length: config.max_line_length,
            io_timeout: config.io_timeout(),
            closed: false,
        }
    }

    pub fn with_line_ending(mut self, line_ending: LineEnding) -> Self {
        self.line_ending = line_ending;
        self
    }

    pub fn line_ending(&self) -> LineEnding {
        self.line_ending
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::Connection(io::Error::new(
                io::ErrorKind::NotConnected,
                "connection already closed",
            )))
        } else {
            Ok(())
        }
    }

    async fn with_timeout<T, F>(io_timeout: Option<Duration>, op: F) -> Result<T>
    where
        F: Future<Output = io::Result<T>>,
    {
        let result = match io_timeout {
            Some(d) => timeout(d, op).await.map_err(|_| {
                Error::Connection(io::Error::new(io::ErrorKind::TimedOut, "I/O timed out"))
            })?,
            None => op.await,
        };
        Ok(result?)
    }

    /// Pull more bytes into the read buffer. Returns 0 at end of stream.
    async fn fill(&mut self) -> Result<usize> {
        self.read_buf.reserve(READ_CHUNK);
        let stream = &mut self.stream;
        let buf = &mut self.read_buf;
        Self::with_timeout(self.io_timeout, stream.read_buf(buf)).await
    }

    fn encode_line(&self, out: &mut Vec<u8>, text: &str) -> Result<()> {
        if text.contains(['\r', '\n']) {
            return Err(Error::violation("line contains an embedded terminator"));
        }
        out.extend_from_slice(text.as_bytes());
        out.extend_from_slice(self.line_ending.as_bytes());
        Ok(())
    }

    /// Write one line plus terminator in a single write, then flush.
    pub async fn send_line(&mut self, text: &str) -> Result<()> {
        self.send_lines(&[text]).await
    }

    /// Write several lines as one write, then flush.
    pub async fn send_lines<T: AsRef<str>>(&mut self, lines: &[T]) -> Result<()> {
        self.ensure_open()?;
        let mut out = Vec::with_capacity(lines.iter().map(|l| l.as_ref().len() + 2).sum());
        for line in lines {
            self.encode_line(&mut out, line.as_ref())?;
        }
        self.write_bytes(&out).await
    }

    /// Write raw bytes (body data) and flush.
    pub async fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.ensure_open()?;
        let stream = &mut self.stream;
        Self::with_timeout(self.io_timeout, async move {
            stream.write_all(data).await?;
            stream.flush().await
        })
        .await
    }

    /// Next line without its terminator, or `None` once the peer has closed and nothing is buffered.
    /// An unterminated fragment before end of stream is returned as the last line.
    pub async fn read_line(&mut self) -> Result<Option<String>> {
        self.ensure_open()?;
        let mut scanned = 0;
        loop {
            if let Some(pos) = self.read_buf[scanned..].iter().position(|&b| b == b'\n') {
                let end = scanned + pos;
                let raw = self.read_buf.split_to(end + 1);
                let mut content = &raw[..end];
                if content.last() == Some(&b'\r') {
                    content = &content[..content.len() - 1];
                }
                if content.len() > self.max_line_length {
                    return Err(Error::violation(format!(
                        "line exceeds {} bytes",
                        self.max_line_length
                    )));
                }
                return Ok(Some(String::from_utf8_lossy(content).into_owned()));
            }
            scanned = self.read_buf.len();
            // +1 leaves room for a '\r' that has not yet been followed by its '\n'
            if scanned > self.max_line_length + 1 {
                return Err(Error::violation(format!(
                    "line exceeds {} bytes",
                    self.max_line_length
                )));
            }
            if self.fill().await? == 0 {
                if self.read_buf.is_empty() {
                    return Ok(None);
                }
                let raw = self.read_buf.split();
                let content = raw.strip_suffix(b"\r").unwrap_or(&raw[..]);
                if content.len() > self.max_line_length {
                    return Err(Error::violation(format!(
                        "line exceeds {} bytes",
                        self.max_line_length
                    )));
                }
                return Ok(Some(String::from_utf8_lossy(content).into_owned()));
            }
        }
    }

    /// Up to `max` raw bytes, buffered data first. `None` at end of stream.
    pub async fn read_chunk(&mut self, max: usize) -> Result<Option<Bytes>> {
        self.ensure_open()?;
        if max == 0 {
            return Ok(Some(Bytes::new()));
        }
        if self.read_buf.is_empty() && self.fill().await? == 0 {
            return Ok(None);
        }
        let n = max.min(self.read_buf.len());
        Ok(Some(self.read_buf.split_to(n).freeze()))
    }

    /// Shut the connection down. Later calls are no-ops; later reads and writes fail.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.read_buf.clear();
        debug!("closing connection");
        match self.stream.shutdown().await {
            Ok(()) => Ok(()),
            // peer already gone: the connection is closed either way
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
