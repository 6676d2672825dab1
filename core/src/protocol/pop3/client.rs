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

//! POP3 mailbox client: USER/PASS, STAT, LIST, RETR, DELE, QUIT.

use std::path::{Path, PathBuf};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::body::{transfer, BodyFrame, FileSink};
use crate::config::TransportConfig;
use crate::error::{Error, Result};
use crate::frame::{read_frame, read_single_line, BlockEnd, Frame, FrameMode};
use crate::net::connect_transport;
use crate::protocol::Protocol;
use crate::transport::LineTransport;

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pop3State {
    /// Before USER and PASS have both succeeded.
    Authorization,
    /// LIST, STAT, RETR and DELE permitted.
    Transaction,
    /// QUIT sent; the server commits deletions and closes.
    Update,
}

impl Pop3State {
    fn name(self) -> &'static str {
        match self {
            Pop3State::Authorization => "Authorization",
            Pop3State::Transaction => "Transaction",
            Pop3State::Update => "Update",
        }
    }
}

/// STAT response: message count and total size in octets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatResponse {
    pub count: u32,
    pub total_size: u64,
}

/// LIST entry: message number and size in octets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListEntry {
    pub msg_no: u32,
    pub size: u64,
}

/// LIST result: the lines between the status line and the `.` terminator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub lines: Vec<String>,
}

impl Listing {
    /// Number of lines preceding the terminator.
    pub fn count(&self) -> usize {
        self.lines.len()
    }

    /// Lines of the form `<msg_no> <size>`; other lines are skipped.
    pub fn entries(&self) -> impl Iterator<Item = ListEntry> + '_ {
        self.lines.iter().filter_map(|line| {
            let mut sp = line.split_whitespace();
            let msg_no = sp.next()?.parse().ok()?;
            let size = sp.next()?.parse().ok()?;
            Some(ListEntry { msg_no, size })
        })
    }
}

fn is_ok(line: &str) -> bool {
    line.starts_with("+OK")
}

/// POP3 session over one connection.
pub struct Pop3Session<S> {
    transport: LineTransport<S>,
    state: Pop3State,
}

impl<S> Pop3Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Read the greeting (+OK) on a fresh connection; the session starts in Authorization.
    pub async fn open(transport: LineTransport<S>) -> Result<Self> {
        let mut session = Self {
            transport,
            state: Pop3State::Authorization,
        };
        let greeting = match read_single_line(&mut session.transport).await {
            Ok(line) => line,
            Err(e) => return session.fail(e).await,
        };
        if !is_ok(&greeting) {
            let e = Error::Rejected {
                command: "greeting".to_string(),
                reply: greeting,
            };
            let _ = session.transport.close().await;
            return Err(e);
        }
        Ok(session)
    }

    pub fn state(&self) -> Pop3State {
        self.state
    }

    async fn fail<T>(&mut self, e: Error) -> Result<T> {
        if e.is_fatal() {
            warn!(state = self.state.name(), error = %e, "POP3 dialogue aborted");
            let _ = self.transport.close().await;
        }
        Err(e)
    }

    fn require(&self, command: &'static str, state: Pop3State) -> Result<()> {
        if self.state == state {
            Ok(())
        } else {
            Err(Error::NotPermitted {
                command,
                state: self.state.name(),
            })
        }
    }

    /// Send one command and read its status line. `shown` is what gets logged.
    async fn command(&mut self, cmd: &str, shown: &str) -> Result<String> {
        debug!(command = %shown, ">>");
        if let Err(e) = self.transport.send_line(cmd).await {
            return self.fail(e).await;
        }
        match read_single_line(&mut self.transport).await {
            Ok(line) => Ok(line),
            Err(e) => self.fail(e).await,
        }
    }

    /// Like `command`, but a `-ERR` status becomes `Rejected`.
    async fn command_ok(&mut self, cmd: &str) -> Result<String> {
        let status = self.command(cmd, cmd).await?;
        if is_ok(&status) {
            Ok(status)
        } else {
            Err(Error::Rejected {
                command: cmd.to_string(),
                reply: status,
            })
        }
    }

    /// USER then PASS. Either being refused leaves the session in Authorization.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        self.require("USER", Pop3State::Authorization)?;
        let user = format!("USER {}", username);
        let status = self.command(&user, &user).await?;
        if !is_ok(&status) {
            return Err(Error::AuthenticationFailure(status));
        }
        let status = self.command(&format!("PASS {}", password), "PASS ****").await?;
        if !is_ok(&status) {
            return Err(Error::AuthenticationFailure(status));
        }
        self.state = Pop3State::Transaction;
        info!(user = %username, "entered transaction state");
        Ok(())
    }

    /// STAT: message count and mailbox size.
    pub async fn stat(&mut self) -> Result<StatResponse> {
        self.require("STAT", Pop3State::Transaction)?;
        let status = self.command_ok("STAT").await?;
        let mut parts = status["+OK".len()..].split_whitespace();
        let count: Option<u32> = parts.next().and_then(|s| s.parse().ok());
        let total_size: Option<u64> = parts.next().and_then(|s| s.parse().ok());
        match (count, total_size) {
            (Some(count), Some(total_size)) => Ok(StatResponse { count, total_size }),
            _ => self
                .fail(Error::violation(format!("malformed STAT reply: {}", status)))
                .await,
        }
    }

    /// LIST: status line, then listing lines up to `.`.
    pub async fn list(&mut self) -> Result<Listing> {
        self.require("LIST", Pop3State::Transaction)?;
        self.command_ok("LIST").await?;
        let block = match read_frame(&mut self.transport, FrameMode::Block)
            .await
            .and_then(Frame::into_block)
        {
            Ok(block) => block,
            Err(e) => return self.fail(e).await,
        };
        if block.end != BlockEnd::Sentinel {
            return self
                .fail(Error::violation("LIST response ended without \".\""))
                .await;
        }
        Ok(Listing { lines: block.lines })
    }

    /// RETR: message `msg_no` copied into `sink` up to the `.` line. Returns bytes written.
    pub async fn retr<W>(&mut self, msg_no: u32, sink: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        self.require("RETR", Pop3State::Transaction)?;
        self.command_ok(&format!("RETR {}", msg_no)).await?;
        match transfer(&mut self.transport, BodyFrame::SentinelTerminated, sink).await {
            Ok(n) => Ok(n),
            Err(e) => self.fail(e).await,
        }
    }

    pub async fn retr_to_vec(&mut self, msg_no: u32) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.retr(msg_no, &mut out).await?;
        Ok(out)
    }

    /// RETR into `dest`. The file only appears once the terminator arrived; on any failure
    /// the partial download is removed.
    pub async fn retr_to_file(&mut self, msg_no: u32, dest: &Path) -> Result<(u64, PathBuf)> {
        let mut sink = FileSink::create(dest).await?;
        let len = match self.retr(msg_no, sink.file()).await {
            Ok(len) => len,
            Err(e) => {
                let _ = sink.discard().await;
                return Err(e);
            }
        };
        let written = sink.commit().await?;
        Ok((len, written))
    }

    /// DELE: mark `msg_no` for deletion at QUIT.
    pub async fn dele(&mut self, msg_no: u32) -> Result<()> {
        self.require("DELE", Pop3State::Transaction)?;
        self.command_ok(&format!("DELE {}", msg_no)).await?;
        Ok(())
    }

    /// QUIT: enter Update. The caller then closes the session.
    pub async fn quit(&mut self) -> Result<()> {
        if self.state == Pop3State::Update {
            return Err(Error::NotPermitted {
                command: "QUIT",
                state: self.state.name(),
            });
        }
        let status = self.command("QUIT", "QUIT").await?;
        self.state = Pop3State::Update;
        if !is_ok(&status) {
            warn!(reply = %status, "QUIT not acknowledged");
        }
        Ok(())
    }

    pub async fn close(mut self) -> Result<()> {
        self.transport.close().await
    }
}

/// Connect and read the greeting.
pub async fn connect_pop3(
    host: &str,
    port: u16,
    config: &TransportConfig,
) -> Result<Pop3Session<TcpStream>> {
    let transport = connect_transport(Protocol::Pop3, host, port, config).await?;
    Pop3Session::open(transport).await
}
