/*
 * lib.rs
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

//! Staffetta core: line-oriented request/response dialogues over TCP.
//!
//! A [`LineTransport`](transport::LineTransport) carries lines and raw bytes, the
//! [`frame`] reader turns lines into single-line or block responses, [`body`] moves
//! fixed-length or `.`-terminated bodies, and the drivers under [`protocol`] sequence
//! the SMTP, POP3 and HTTP GET dialogues on top of them.

pub mod body;
pub mod config;
pub mod error;
pub mod frame;
pub mod net;
pub mod protocol;
pub mod transport;
pub mod uri;

pub use config::Config;
pub use error::{Error, Result};
pub use protocol::Protocol;
pub use transport::{LineEnding, LineTransport};
