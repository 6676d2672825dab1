/*
 * error.rs
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

//! Errors shared by the transport, framing, body transfer and every dialogue.

use std::io;

use thiserror::Error;

/// Failure of a dialogue step. Every variant aborts the current step and is returned to the caller.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport-level fault: refused, reset, closed mid-operation, timed out.
    #[error("connection error: {0}")]
    Connection(#[from] io::Error),

    /// Malformed line, bad length header, missing terminator, short body.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// POP3 USER or PASS rejected by the server.
    #[error("authentication failed: {0}")]
    AuthenticationFailure(String),

    /// HTTP server side: the requested resource does not exist under the root.
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    /// The peer answered a command with a negative reply.
    #[error("{command} rejected: {reply}")]
    Rejected { command: String, reply: String },

    /// The command is not allowed in the current dialogue state; nothing was sent.
    #[error("{command} not permitted in {state} state")]
    NotPermitted {
        command: &'static str,
        state: &'static str,
    },

    /// Invalid or unreadable configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn violation(msg: impl Into<String>) -> Self {
        Self::ProtocolViolation(msg.into())
    }

    /// Connection closed by the peer while a response was still expected.
    pub fn closed() -> Self {
        Self::Connection(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed",
        ))
    }

    /// Fatal errors leave the peer in an unknown mid-dialogue state: the owner must close the connection.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::ProtocolViolation(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
