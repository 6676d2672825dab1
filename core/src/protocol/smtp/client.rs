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

//! SMTP submission client: greeting, EHLO, MAIL FROM, RCPT TO, DATA, message content, QUIT.
//!
//! One-shot: every failure moves the session to [`SmtpState::Failed`] and closes the connection.

use std::borrow::Cow;
use std::fmt;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::config::TransportConfig;
use crate::error::Error;
use crate::frame::{read_frame, Frame, FrameMode};
use crate::net::connect_transport;
use crate::protocol::smtp::dot_stuffer::stuff_body;
use crate::protocol::smtp::OutgoingMail;
use crate::protocol::Protocol;
use crate::transport::LineTransport;

/// Dialogue state. Advances by exactly one state per acknowledged command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpState {
    /// Greeting accepted.
    Connected,
    /// EHLO accepted.
    Greeted,
    /// MAIL FROM accepted.
    SenderSet,
    /// At least one RCPT TO accepted.
    RecipientSet,
    /// DATA answered with 354.
    DataStarted,
    /// Message content accepted.
    Sent,
    Failed,
}

impl SmtpState {
    fn name(self) -> &'static str {
        match self {
            SmtpState::Connected => "Connected",
            SmtpState::Greeted => "Greeted",
            SmtpState::SenderSet => "SenderSet",
            SmtpState::RecipientSet => "RecipientSet",
            SmtpState::DataStarted => "DataStarted",
            SmtpState::Sent => "Sent",
            SmtpState::Failed => "Failed",
        }
    }
}

/// Dialogue step at which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpStep {
    Connect,
    Greeting,
    Ehlo,
    MailFrom,
    RcptTo,
    Data,
    Content,
    Quit,
}

impl SmtpStep {
    fn command(self) -> &'static str {
        match self {
            SmtpStep::Connect => "connect",
            SmtpStep::Greeting => "greeting",
            SmtpStep::Ehlo => "EHLO",
            SmtpStep::MailFrom => "MAIL FROM",
            SmtpStep::RcptTo => "RCPT TO",
            SmtpStep::Data => "DATA",
            SmtpStep::Content => "message content",
            SmtpStep::Quit => "QUIT",
        }
    }
}

impl fmt::Display for SmtpStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command())
    }
}

/// Failed submission: the step, the last command sent and the last reply received.
#[derive(Debug, Error)]
#[error("SMTP {step} failed: {source}")]
pub struct SmtpFailure {
    pub step: SmtpStep,
    pub command: Option<String>,
    pub reply: Option<String>,
    #[source]
    pub source: Error,
}

/// One reply; continuation lines (`250-...`) are folded in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpReply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl SmtpReply {
    pub fn message(&self) -> &str {
        self.lines.last().map(|s| s.as_str()).unwrap_or("")
    }
}

impl fmt::Display for SmtpReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.message())
    }
}

/// Split `250-text` / `250 text` into code, continuation flag and text.
fn parse_reply_line(line: &str) -> Result<(u16, bool, &str), Error> {
    let bytes = line.as_bytes();
    if bytes.len() < 3 || !bytes[..3].iter().all(u8::is_ascii_digit) {
        return Err(Error::violation(format!("malformed SMTP reply: {:?}", line)));
    }
    let code: u16 = line[..3]
        .parse()
        .map_err(|_| Error::violation(format!("malformed SMTP reply: {:?}", line)))?;
    let more = match bytes.get(3) {
        Some(b'-') => true,
        Some(b' ') | None => false,
        Some(_) => return Err(Error::violation(format!("malformed SMTP reply: {:?}", line))),
    };
    Ok((code, more, line.get(4..).unwrap_or("").trim()))
}

async fn read_reply<S>(transport: &mut LineTransport<S>) -> Result<SmtpReply, Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut lines = Vec::new();
    let mut first_code = None;
    loop {
        let line = read_frame(transport, FrameMode::SingleLine)
            .await
            .and_then(Frame::into_line)?;
        let (code, more, text) = parse_reply_line(&line)?;
        if *first_code.get_or_insert(code) != code {
            return Err(Error::violation(format!(
                "reply code changed inside multi-line reply: {}",
                line
            )));
        }
        lines.push(text.to_string());
        if !more {
            return Ok(SmtpReply { code, lines });
        }
    }
}

fn envelope_address(addr: &str) -> &str {
    let addr = addr.trim();
    addr.strip_prefix('<')
        .and_then(|a| a.strip_suffix('>'))
        .unwrap_or(addr)
}

/// SMTP session over one connection.
pub struct SmtpSession<S> {
    transport: LineTransport<S>,
    state: SmtpState,
    last_command: Option<String>,
    last_reply: Option<String>,
}

impl<S> SmtpSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Read the server greeting (2xx) on a fresh connection.
    pub async fn open(transport: LineTransport<S>) -> Result<Self, SmtpFailure> {
        let mut session = Self {
            transport,
            state: SmtpState::Connected,
            last_command: None,
            last_reply: None,
        };
        let reply = match read_reply(&mut session.transport).await {
            Ok(reply) => reply,
            Err(e) => return session.fail(SmtpStep::Greeting, e).await,
        };
        session.last_reply = Some(reply.to_string());
        if !(200..300).contains(&reply.code) {
            let e = Error::Rejected {
                command: SmtpStep::Greeting.command().to_string(),
                reply: reply.to_string(),
            };
            return session.fail(SmtpStep::Greeting, e).await;
        }
        Ok(session)
    }

    pub fn state(&self) -> SmtpState {
        self.state
    }

    pub fn last_reply(&self) -> Option<&str> {
        self.last_reply.as_deref()
    }

    /// Close the connection after a failure. Never fails.
    async fn fail<T>(&mut self, step: SmtpStep, source: Error) -> Result<T, SmtpFailure> {
        self.state = SmtpState::Failed;
        let _ = self.transport.close().await;
        warn!(%step, error = %source, "SMTP dialogue failed");
        Err(SmtpFailure {
            step,
            command: self.last_command.clone(),
            reply: self.last_reply.clone(),
            source,
        })
    }

    /// Send `lines`, require a reply accepted by `accept`, then move to `next`.
    async fn step<T: AsRef<str>>(
        &mut self,
        step: SmtpStep,
        allowed: &[SmtpState],
        lines: &[T],
        accept: fn(u16) -> bool,
        next: SmtpState,
    ) -> Result<SmtpReply, SmtpFailure> {
        if !allowed.contains(&self.state) {
            return Err(SmtpFailure {
                step,
                command: None,
                reply: None,
                source: Error::NotPermitted {
                    command: step.command(),
                    state: self.state.name(),
                },
            });
        }
        let command = match lines {
            [single] => single.as_ref().to_string(),
            _ => step.command().to_string(),
        };
        debug!(command = %command, ">>");
        self.last_command = Some(command.clone());
        if let Err(e) = self.transport.send_lines(lines).await {
            return self.fail(step, e).await;
        }
        let reply = match read_reply(&mut self.transport).await {
            Ok(reply) => reply,
            Err(e) => return self.fail(step, e).await,
        };
        self.last_reply = Some(reply.to_string());
        if !accept(reply.code) {
            let e = Error::Rejected {
                command,
                reply: reply.to_string(),
            };
            return self.fail(step, e).await;
        }
        self.state = next;
        Ok(reply)
    }

    /// EHLO; the reply lines list the server's extensions.
    pub async fn ehlo(&mut self, hostname: &str) -> Result<SmtpReply, SmtpFailure> {
        let cmd = format!("EHLO {}", hostname);
        self.step(
            SmtpStep::Ehlo,
            &[SmtpState::Connected],
            &[cmd],
            is_completion,
            SmtpState::Greeted,
        )
        .await
    }

    pub async fn mail_from(&mut self, sender: &str) -> Result<SmtpReply, SmtpFailure> {
        let cmd = format!("MAIL FROM:<{}>", envelope_address(sender));
        self.step(
            SmtpStep::MailFrom,
            &[SmtpState::Greeted],
            &[cmd],
            is_completion,
            SmtpState::SenderSet,
        )
        .await
    }

    /// RCPT TO; may be repeated for several recipients.
    pub async fn rcpt_to(&mut self, recipient: &str) -> Result<SmtpReply, SmtpFailure> {
        let cmd = format!("RCPT TO:<{}>", envelope_address(recipient));
        self.step(
            SmtpStep::RcptTo,
            &[SmtpState::SenderSet, SmtpState::RecipientSet],
            &[cmd],
            is_completion,
            SmtpState::RecipientSet,
        )
        .await
    }

    /// DATA; the server must answer 354.
    pub async fn data(&mut self) -> Result<SmtpReply, SmtpFailure> {
        self.step(
            SmtpStep::Data,
            &[SmtpState::RecipientSet],
            &["DATA"],
            |code| code == 354,
            SmtpState::DataStarted,
        )
        .await
    }

    /// `Subject:` header, blank separator, dot-stuffed body lines and the `.` terminator, in one write.
    pub async fn send_content(&mut self, subject: &str, body: &str) -> Result<SmtpReply, SmtpFailure> {
        let mut lines: Vec<Cow<'_, str>> = Vec::new();
        lines.push(Cow::Owned(format!("Subject: {}", subject)));
        lines.push(Cow::Borrowed(""));
        lines.extend(stuff_body(body));
        lines.push(Cow::Borrowed("."));
        self.step(
            SmtpStep::Content,
            &[SmtpState::DataStarted],
            &lines,
            is_completion,
            SmtpState::Sent,
        )
        .await
    }

    /// Whole submission: EHLO, MAIL FROM, RCPT TO for each recipient, DATA, content.
    pub async fn send_mail(&mut self, hostname: &str, mail: &OutgoingMail) -> Result<(), SmtpFailure> {
        self.ehlo(hostname).await?;
        self.mail_from(&mail.from).await?;
        if mail.to.is_empty() {
            return self
                .fail(SmtpStep::RcptTo, Error::violation("no recipients"))
                .await;
        }
        for rcpt in &mail.to {
            self.rcpt_to(rcpt).await?;
        }
        self.data().await?;
        self.send_content(&mail.subject, &mail.body).await?;
        info!(from = %mail.from, recipients = mail.to.len(), "message accepted");
        Ok(())
    }

    /// QUIT and close. The reply is read but not required.
    pub async fn quit(mut self) -> Result<(), Error> {
        if self.transport.is_closed() {
            return Ok(());
        }
        debug!(command = "QUIT", ">>");
        self.transport.send_line("QUIT").await?;
        if let Ok(reply) = read_reply(&mut self.transport).await {
            debug!(reply = %reply, "QUIT acknowledged");
        }
        self.transport.close().await
    }

    /// Close without QUIT.
    pub async fn close(mut self) -> Result<(), Error> {
        self.transport.close().await
    }
}

fn is_completion(code: u16) -> bool {
    (200..300).contains(&code)
}

/// Connect, submit one message, QUIT.
pub async fn send_mail_async(
    host: &str,
    port: u16,
    config: &TransportConfig,
    ehlo_hostname: &str,
    mail: &OutgoingMail,
) -> Result<(), SmtpFailure> {
    let transport: LineTransport<TcpStream> =
        match connect_transport(Protocol::Smtp, host, port, config).await {
            Ok(t) => t,
            Err(source) => {
                return Err(SmtpFailure {
                    step: SmtpStep::Connect,
                    command: None,
                    reply: None,
                    source,
                })
            }
        };
    let mut session = SmtpSession::open(transport).await?;
    session.send_mail(ehlo_hostname, mail).await?;
    session.quit().await.map_err(|source| SmtpFailure {
        step: SmtpStep::Quit,
        command: Some("QUIT".to_string()),
        reply: None,
        source,
    })
}
