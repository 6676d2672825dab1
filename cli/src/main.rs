/*
 * main.rs
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

//! staffetta: send mail over SMTP, read a POP3 mailbox, fetch or serve files over HTTP.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tokio::io::AsyncWriteExt;
use tracing::info;

use staffetta_core::config::{default_config_path, EndpointConfig};
use staffetta_core::protocol::http::{HttpClient, HttpServer};
use staffetta_core::protocol::pop3::{connect_pop3, Pop3Session};
use staffetta_core::protocol::smtp::{send_mail_async, OutgoingMail};
use staffetta_core::uri::HttpUrl;
use staffetta_core::{net, Config, Protocol};

#[derive(Parser, Debug)]
#[command(name = "staffetta")]
#[command(about = "Line-oriented TCP dialogues: SMTP, POP3 and HTTP GET", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ~/.staffetta/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

/// Overrides for the configured endpoint.
#[derive(Args, Debug)]
struct Endpoint {
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
}

impl Endpoint {
    fn resolve(&self, configured: &EndpointConfig) -> (String, u16) {
        (
            self.host.clone().unwrap_or_else(|| configured.host.clone()),
            self.port.unwrap_or(configured.port),
        )
    }
}

#[derive(Args, Debug)]
struct Mailbox {
    #[command(flatten)]
    endpoint: Endpoint,
    #[arg(short, long)]
    user: String,
    #[arg(short, long)]
    password: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit one message over SMTP
    SendMail {
        #[command(flatten)]
        endpoint: Endpoint,
        #[arg(long)]
        from: String,
        /// Recipient; repeat for several
        #[arg(long, required = true)]
        to: Vec<String>,
        #[arg(long, default_value = "")]
        subject: String,
        /// Message body; read from stdin when omitted
        #[arg(long)]
        body: Option<String>,
        /// Name announced in EHLO
        #[arg(long, default_value = "localhost")]
        ehlo: String,
    },
    /// List the messages in a POP3 mailbox
    List {
        #[command(flatten)]
        mailbox: Mailbox,
    },
    /// Retrieve one message from a POP3 mailbox
    Retrieve {
        #[command(flatten)]
        mailbox: Mailbox,
        msg_no: u32,
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delete one message from a POP3 mailbox
    Delete {
        #[command(flatten)]
        mailbox: Mailbox,
        msg_no: u32,
    },
    /// Fetch an http:// URL
    Get {
        url: String,
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Serve files from a directory
    Serve {
        #[arg(long)]
        bind: Option<String>,
        #[arg(long)]
        root: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::SendMail {
            endpoint,
            from,
            to,
            subject,
            body,
            ehlo,
        } => {
            let (host, port) = endpoint.resolve(config.endpoint(Protocol::Smtp));
            let body = match body {
                Some(body) => body,
                None => read_stdin().await?,
            };
            let mail = OutgoingMail {
                from,
                to,
                subject,
                body,
            };
            send_mail_async(&host, port, &config.transport, &ehlo, &mail).await?;
            info!(host = %host, "message sent");
        }
        Command::List { mailbox } => {
            let mut session = open_mailbox(&config, &mailbox).await?;
            let listing = session.list().await?;
            let mut stdout = tokio::io::stdout();
            for line in &listing.lines {
                stdout.write_all(format!("{}\n", line).as_bytes()).await?;
            }
            stdout.flush().await?;
            finish(session).await?;
        }
        Command::Retrieve {
            mailbox,
            msg_no,
            output,
        } => {
            let mut session = open_mailbox(&config, &mailbox).await?;
            match output {
                Some(path) => {
                    let (bytes, written) = session.retr_to_file(msg_no, &path).await?;
                    info!(path = %written.display(), bytes, "saved");
                }
                None => {
                    session.retr(msg_no, &mut tokio::io::stdout()).await?;
                }
            }
            finish(session).await?;
        }
        Command::Delete { mailbox, msg_no } => {
            let mut session = open_mailbox(&config, &mailbox).await?;
            session.dele(msg_no).await?;
            finish(session).await?;
        }
        Command::Get { url, output } => {
            let url = HttpUrl::parse(&url)?;
            let client = HttpClient::new(config.transport.clone());
            match output {
                Some(path) => {
                    let (_, written) = client
                        .get_to_file(&url.host, url.port, &url.path, &path)
                        .await?;
                    info!(path = %written.display(), "saved");
                }
                None => {
                    let mut stdout = tokio::io::stdout();
                    let response = client.get(&url.host, url.port, &url.path, &mut stdout).await?;
                    if !response.is_success() {
                        bail!("{}", response.head.status);
                    }
                }
            }
        }
        Command::Serve { bind, root } => {
            let mut server_config = config.server.clone();
            if let Some(bind) = bind {
                server_config.bind = bind;
            }
            if let Some(root) = root {
                server_config.root = root;
            }
            if !server_config.root.is_dir() {
                bail!("{} is not a directory", server_config.root.display());
            }
            let listener = net::bind(&server_config.bind).await?;
            let server = HttpServer::new(&server_config, config.transport.clone());
            info!(root = %server.root().display(), "serving files");
            server
                .serve(listener, async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await?;
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => match default_config_path() {
            Some(p) => p,
            None => return Ok(Config::default()),
        },
    };
    Config::load(&path).with_context(|| format!("loading {}", path.display()))
}

async fn read_stdin() -> anyhow::Result<String> {
    let mut body = String::new();
    tokio::io::AsyncReadExt::read_to_string(&mut tokio::io::stdin(), &mut body).await?;
    Ok(body)
}

async fn open_mailbox(
    config: &Config,
    mailbox: &Mailbox,
) -> anyhow::Result<Pop3Session<tokio::net::TcpStream>> {
    let (host, port) = mailbox.endpoint.resolve(config.endpoint(Protocol::Pop3));
    let mut session = connect_pop3(&host, port, &config.transport).await?;
    session.login(&mailbox.user, &mailbox.password).await?;
    Ok(session)
}

async fn finish(mut session: Pop3Session<tokio::net::TcpStream>) -> anyhow::Result<()> {
    session.quit().await?;
    session.close().await?;
    Ok(())
}
