/*
 * frame.rs
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

//! Response frame reader: single acknowledgement lines and header/listing blocks.
//!
//! Block mode stops at a blank line (end of an HTTP-style header block, a body may follow)
//! or at a line that is exactly `.` (end of a POP3-style listing). Head mode is block mode
//! for a response head: the peer may also end it by closing once the first line is in.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::body::BodyFrame;
use crate::error::{Error, Result};
use crate::transport::LineTransport;

const CONTENT_LENGTH: &str = "content-length";

/// How the driver expects the next response to be framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameMode {
    SingleLine,
    Block,
    Head,
}

/// Which terminator closed a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockEnd {
    Blank,
    Sentinel,
    /// Peer closed after at least one line (head mode only).
    Eof,
}

/// Lines of a block, terminator excluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderBlock {
    pub lines: Vec<String>,
    pub end: BlockEnd,
    /// Last `Content-Length` seen in the block.
    pub content_length: Option<u64>,
}

impl HeaderBlock {
    /// Value of the first `name: value` line, name compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.lines.iter().find_map(|line| {
            let (n, v) = line.split_once(':')?;
            n.trim().eq_ignore_ascii_case(name).then(|| v.trim())
        })
    }

    /// Body following the block: the declared length, or nothing.
    pub fn body_frame(&self) -> BodyFrame {
        BodyFrame::Fixed(self.content_length.unwrap_or(0))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Line(String),
    Block(HeaderBlock),
}

impl Frame {
    pub fn into_line(self) -> Result<String> {
        match self {
            Frame::Line(line) => Ok(line),
            Frame::Block(_) => Err(Error::violation("expected a single line, got a block")),
        }
    }

    pub fn into_block(self) -> Result<HeaderBlock> {
        match self {
            Frame::Block(block) => Ok(block),
            Frame::Line(_) => Err(Error::violation("expected a block, got a single line")),
        }
    }
}

/// Parse a `Content-Length` header line. `Ok(None)` for any other line.
pub fn parse_content_length(line: &str) -> Result<Option<u64>> {
    let Some((name, value)) = line.split_once(':') else {
        return Ok(None);
    };
    if !name.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
        return Ok(None);
    }
    let value = value.trim();
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::violation(format!("malformed Content-Length: {:?}", value)));
    }
    value
        .parse::<u64>()
        .map(Some)
        .map_err(|_| Error::violation(format!("Content-Length out of range: {}", value)))
}

/// Read one response in the given mode.
pub async fn read_frame<S>(transport: &mut LineTransport<S>, mode: FrameMode) -> Result<Frame>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match mode {
        FrameMode::SingleLine => read_single_line(transport).await.map(Frame::Line),
        FrameMode::Block => read_lines(transport, false).await.map(Frame::Block),
        FrameMode::Head => read_lines(transport, true).await.map(Frame::Block),
    }
}

/// Exactly one line. The peer closing instead of answering is a connection error.
pub async fn read_single_line<S>(transport: &mut LineTransport<S>) -> Result<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match transport.read_line().await? {
        Some(line) => {
            debug!(line = %line, "<<");
            Ok(line)
        }
        None => Err(Error::closed()),
    }
}

/// Lines until a blank line or a `.` line.
pub async fn read_block<S>(transport: &mut LineTransport<S>) -> Result<HeaderBlock>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    read_lines(transport, false).await
}

async fn read_lines<S>(transport: &mut LineTransport<S>, eof_ends: bool) -> Result<HeaderBlock>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut lines = Vec::new();
    let mut content_length = None;
    loop {
        let line = match transport.read_line().await? {
            Some(line) => line,
            None if eof_ends && !lines.is_empty() => {
                return Ok(HeaderBlock {
                    lines,
                    end: BlockEnd::Eof,
                    content_length,
                })
            }
            None => {
                return Err(Error::violation(
                    "end of stream before block terminator",
                ))
            }
        };
        debug!(line = %line, "<<");
        if line.is_empty() {
            return Ok(HeaderBlock {
                lines,
                end: BlockEnd::Blank,
                content_length,
            });
        }
        if line == "." {
            return Ok(HeaderBlock {
                lines,
                end: BlockEnd::Sentinel,
                content_length,
            });
        }
        if let Some(n) = parse_content_length(&line)? {
            content_length = Some(n);
        }
        lines.push(line);
    }
}
