/*
 * mod.rs
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

//! Dialogue drivers. Each protocol is a small state machine over the shared
//! [`LineTransport`](crate::transport::LineTransport), frame reader and body transfer.

pub mod http;
pub mod pop3;
pub mod smtp;

use std::fmt;

use crate::transport::LineEnding;

/// Protocol variant of a dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Smtp,
    Pop3,
    Http,
}

impl Protocol {
    pub fn default_port(self) -> u16 {
        match self {
            Protocol::Smtp => 25,
            Protocol::Pop3 => 110,
            Protocol::Http => 80,
        }
    }

    /// Terminator written after each command or response line.
    pub fn line_ending(self) -> LineEnding {
        match self {
            Protocol::Smtp | Protocol::Pop3 => LineEnding::Lf,
            Protocol::Http => LineEnding::CrLf,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Protocol::Smtp => "SMTP",
            Protocol::Pop3 => "POP3",
            Protocol::Http => "HTTP",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
