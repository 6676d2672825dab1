/*
 * body.rs
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

//! Body transfer between a connection and a sink or source.
//!
//! Two framings: an explicit byte count (HTTP `Content-Length`) or lines up to a `.` line
//! (POP3 RETR). A failed transfer leaves the sink partially written; write to a [`FileSink`]
//! and commit only on success.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::{Error, Result};
use crate::transport::LineTransport;

const CHUNK: usize = 8192;

/// How the end of a body is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFrame {
    /// Exactly this many bytes.
    Fixed(u64),
    /// Lines until one consisting solely of `.`.
    SentinelTerminated,
}

/// Copy the body described by `frame` from the connection into `sink`. Returns bytes written.
pub async fn transfer<S, W>(
    transport: &mut LineTransport<S>,
    frame: BodyFrame,
    sink: &mut W,
) -> Result<u64>
where
    S: AsyncRead + AsyncWrite + Unpin,
    W: AsyncWrite + Unpin,
{
    let n = match frame {
        BodyFrame::Fixed(len) => copy_fixed(transport, sink, len).await?,
        BodyFrame::SentinelTerminated => copy_until_terminator(transport, sink).await?,
    };
    sink.flush().await?;
    debug!(?frame, bytes = n, "body transferred");
    Ok(n)
}

/// Exactly `n` bytes; the stream ending first is a protocol violation.
pub async fn transfer_fixed<S, W>(
    transport: &mut LineTransport<S>,
    sink: &mut W,
    n: u64,
) -> Result<u64>
where
    S: AsyncRead + AsyncWrite + Unpin,
    W: AsyncWrite + Unpin,
{
    transfer(transport, BodyFrame::Fixed(n), sink).await
}

/// Lines up to the first `.` line, each written with `\n`. The terminator is not copied.
pub async fn transfer_until_terminator<S, W>(
    transport: &mut LineTransport<S>,
    sink: &mut W,
) -> Result<u64>
where
    S: AsyncRead + AsyncWrite + Unpin,
    W: AsyncWrite + Unpin,
{
    transfer(transport, BodyFrame::SentinelTerminated, sink).await
}

async fn copy_fixed<S, W>(transport: &mut LineTransport<S>, sink: &mut W, n: u64) -> Result<u64>
where
    S: AsyncRead + AsyncWrite + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut remaining = n;
    while remaining > 0 {
        let want = remaining.min(CHUNK as u64) as usize;
        let chunk = match transport.read_chunk(want).await? {
            Some(chunk) => chunk,
            None => {
                return Err(Error::violation(format!(
                    "body ended after {} of {} bytes",
                    n - remaining,
                    n
                )))
            }
        };
        sink.write_all(&chunk).await?;
        remaining -= chunk.len() as u64;
    }
    Ok(n)
}

async fn copy_until_terminator<S, W>(transport: &mut LineTransport<S>, sink: &mut W) -> Result<u64>
where
    S: AsyncRead + AsyncWrite + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut written = 0u64;
    loop {
        let line = match transport.read_line().await? {
            Some(line) => line,
            None => return Err(Error::violation("end of stream before \".\" terminator")),
        };
        if line == "." {
            return Ok(written);
        }
        sink.write_all(line.as_bytes()).await?;
        sink.write_all(b"\n").await?;
        written += line.len() as u64 + 1;
    }
}

/// Send exactly `n` bytes from `source` over the connection; a short source is a protocol violation.
pub async fn send_fixed<R, S>(
    source: &mut R,
    transport: &mut LineTransport<S>,
    n: u64,
) -> Result<u64>
where
    R: AsyncRead + Unpin,
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; CHUNK];
    let mut remaining = n;
    while remaining > 0 {
        let want = remaining.min(CHUNK as u64) as usize;
        let got = source.read(&mut buf[..want]).await?;
        if got == 0 {
            return Err(Error::violation(format!(
                "source ended after {} of {} bytes",
                n - remaining,
                n
            )));
        }
        transport.write_bytes(&buf[..got]).await?;
        remaining -= got as u64;
    }
    Ok(n)
}

/// Temporary file next to its destination; renamed into place by [`FileSink::commit`].
pub struct FileSink {
    file: File,
    part_path: PathBuf,
    final_path: PathBuf,
}

impl FileSink {
    pub async fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let final_path = path.as_ref().to_path_buf();
        let mut name = final_path
            .file_name()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "destination has no file name"))?
            .to_os_string();
        name.push(".part");
        let part_path = final_path.with_file_name(name);
        let file = File::create(&part_path).await?;
        Ok(Self {
            file,
            part_path,
            final_path,
        })
    }

    pub fn file(&mut self) -> &mut File {
        &mut self.file
    }

    /// Flush and move the temporary file onto the destination.
    pub async fn commit(mut self) -> io::Result<PathBuf> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        drop(self.file);
        fs::rename(&self.part_path, &self.final_path).await?;
        Ok(self.final_path)
    }

    /// Remove the temporary file; the destination is untouched.
    pub async fn discard(self) -> io::Result<()> {
        drop(self.file);
        match fs::remove_file(&self.part_path).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportConfig;
    use tokio::io::{duplex, DuplexStream};

    fn pair() -> (LineTransport<DuplexStream>, DuplexStream) {
        let (a, b) = duplex(256 * 1024);
        (LineTransport::new(a, &TransportConfig::default()), b)
    }

    #[tokio::test]
    async fn fixed_copies_exact_bytes_for_several_sizes() {
        for n in [0usize, 1, 7, CHUNK, CHUNK + 1, 70_000] {
            let (mut t, mut peer) = pair();
            let data: Vec<u8> = (0..n).map(|i| (i % 251) as u8).collect();
            peer.write_all(&data).await.unwrap();
            peer.write_all(b"trailing").await.unwrap();
            let mut sink = Vec::new();
            let copied = transfer_fixed(&mut t, &mut sink, n as u64).await.unwrap();
            assert_eq!(copied, n as u64);
            assert_eq!(sink, data, "size {}", n);
        }
    }

    #[tokio::test]
    async fn fixed_short_stream_is_violation() {
        let (mut t, mut peer) = pair();
        peer.write_all(b"abc").await.unwrap();
        drop(peer);
        let mut sink = Vec::new();
        let err = transfer_fixed(&mut t, &mut sink, 10).await.unwrap_err();
        assert!(matches!(err, Error::ProtocolViolation(_)));
    }

    #[tokio::test]
    async fn sentinel_stops_at_first_dot_line() {
        let (mut t, mut peer) = pair();
        peer.write_all(b"Subject: hi\r\n\r\n..not a terminator\r\n. \r\nend\r\n.\r\nafter\r\n")
            .await
            .unwrap();
        let mut sink = Vec::new();
        let n = transfer_until_terminator(&mut t, &mut sink).await.unwrap();
        let expected = b"Subject: hi\n\n..not a terminator\n. \nend\n";
        assert_eq!(sink, expected);
        assert_eq!(n, expected.len() as u64);
        assert_eq!(t.read_line().await.unwrap().as_deref(), Some("after"));
    }

    #[tokio::test]
    async fn sentinel_missing_is_violation() {
        let (mut t, mut peer) = pair();
        peer.write_all(b"line one\nline two\n").await.unwrap();
        drop(peer);
        let mut sink = Vec::new();
        let err = transfer(&mut t, BodyFrame::SentinelTerminated, &mut sink)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProtocolViolation(_)));
    }

    #[tokio::test]
    async fn send_fixed_rejects_short_source() {
        let (mut t, _peer) = pair();
        let mut source: &[u8] = b"12345";
        let err = send_fixed(&mut source, &mut t, 6).await.unwrap_err();
        assert!(matches!(err, Error::ProtocolViolation(_)));
    }

    #[tokio::test]
    async fn send_fixed_writes_exactly_n() {
        let (mut t, mut peer) = pair();
        let mut source: &[u8] = b"0123456789";
        assert_eq!(send_fixed(&mut source, &mut t, 4).await.unwrap(), 4);
        t.close().await.unwrap();
        let mut got = Vec::new();
        peer.read_to_end(&mut got).await.unwrap();
        assert_eq!(got, b"0123");
    }

    #[tokio::test]
    async fn file_sink_commit_and_discard() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("page.html");

        let mut sink = FileSink::create(&dest).await.unwrap();
        sink.file().write_all(b"<html/>").await.unwrap();
        assert!(!dest.exists());
        let path = sink.commit().await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"<html/>");
        assert!(!dir.path().join("page.html.part").exists());

        let mut sink = FileSink::create(&dest).await.unwrap();
        sink.file().write_all(b"partial").await.unwrap();
        sink.discard().await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"<html/>");
        assert!(!dir.path().join("page.html.part").exists());
    }
}
