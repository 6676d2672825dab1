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

//! HTTP/1.1 GET: a client that fetches one resource per connection and a server
//! that serves files from a root directory.

mod client;
mod request;
mod response;
mod server;

pub use client::{HttpClient, HttpClientSession};
pub use request::{Method, RequestLine, HTTP_VERSION};
pub use response::{HttpResponse, ResponseHead, Status, StatusLine};
pub use server::{serve_connection, HttpServer};
