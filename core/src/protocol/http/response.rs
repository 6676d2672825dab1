/*
 * response.rs
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

//! HTTP response head: status line and header block.

use std::fmt;

use crate::body::BodyFrame;
use crate::error::{Error, Result};
use crate::frame::{BlockEnd, HeaderBlock};
use crate::protocol::http::request::HTTP_VERSION;

/// Statuses the server sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    BadRequest,
    NotFound,
    NotImplemented,
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::BadRequest => 400,
            Status::NotFound => 404,
            Status::NotImplemented => 501,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::BadRequest => "Bad Request",
            Status::NotFound => "Not Found",
            Status::NotImplemented => "Not Implemented",
        }
    }

    pub fn status_line(self) -> String {
        format!("{} {} {}", HTTP_VERSION, self.code(), self.reason())
    }
}

/// `HTTP/1.1 200 OK`, parsed. Leading whitespace and a missing reason are tolerated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub version: String,
    pub code: u16,
    pub reason: String,
}

impl StatusLine {
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim_start();
        let mut parts = line.splitn(3, ' ');
        let version = parts.next().unwrap_or_default();
        if !version.starts_with("HTTP/") {
            return Err(Error::violation(format!("malformed status line: {:?}", line)));
        }
        let code = parts
            .next()
            .filter(|c| c.len() == 3 && c.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|c| c.parse::<u16>().ok())
            .ok_or_else(|| Error::violation(format!("malformed status code: {:?}", line)))?;
        Ok(Self {
            version: version.to_string(),
            code,
            reason: parts.next().unwrap_or_default().trim().to_string(),
        })
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.version, self.code, self.reason)
    }
}

/// Status line plus the header lines that followed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: StatusLine,
    pub headers: HeaderBlock,
}

impl ResponseHead {
    /// Split a head block into status line and headers. The head ends at a blank line
    /// or where the peer closed.
    pub fn from_block(mut block: HeaderBlock) -> Result<Self> {
        if block.end == BlockEnd::Sentinel {
            return Err(Error::violation("response head ended with \".\" instead of a blank line"));
        }
        if block.lines.is_empty() {
            return Err(Error::violation("empty response head"));
        }
        let first = block.lines.remove(0);
        let status = StatusLine::parse(&first)?;
        Ok(Self {
            status,
            headers: block,
        })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.header(name)
    }

    pub fn content_length(&self) -> Option<u64> {
        self.headers.content_length
    }

    pub fn body_frame(&self) -> BodyFrame {
        self.headers.body_frame()
    }
}

/// A completed GET: head plus the number of body bytes written to the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub head: ResponseHead,
    pub body_len: u64,
}

impl HttpResponse {
    pub fn code(&self) -> u16 {
        self.head.status.code
    }

    pub fn is_success(&self) -> bool {
        self.head.status.is_success()
    }
}
