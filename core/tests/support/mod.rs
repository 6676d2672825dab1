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

//! Scripted TCP peer for dialogue tests: accepts one connection on 127.0.0.1 and plays
//! a fixed script of lines to send and lines to expect.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::timeout;

const STEP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub enum Step {
    /// Write the line followed by CRLF.
    Send(&'static str),
    /// Read one line and check it starts with the prefix.
    Expect(&'static str),
    /// Read lines up to and including a line that is exactly `.`.
    ExpectDotBlock,
    /// Drop the connection without reading anything more.
    Hangup,
}

pub struct ScriptedPeer {
    addr: SocketAddr,
    handle: JoinHandle<Vec<String>>,
}

impl ScriptedPeer {
    pub async fn start(script: Vec<Step>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut lines = BufReader::new(read).lines();
            let mut received = Vec::new();
            for step in script {
                match step {
                    Step::Send(line) => {
                        write.write_all(format!("{}\r\n", line).as_bytes()).await.unwrap();
                    }
                    Step::Expect(prefix) => {
                        let line = next_line(&mut lines).await;
                        assert!(
                            line.starts_with(prefix),
                            "expected {:?}, got {:?}",
                            prefix,
                            line
                        );
                        received.push(line);
                    }
                    Step::ExpectDotBlock => loop {
                        let line = next_line(&mut lines).await;
                        let done = line == ".";
                        received.push(line);
                        if done {
                            break;
                        }
                    },
                    Step::Hangup => return received,
                }
            }
            // script done: keep whatever else the client sends until it closes
            while let Ok(Ok(Some(line))) = timeout(STEP_TIMEOUT, lines.next_line()).await {
                received.push(line);
            }
            received
        });
        Self { addr, handle }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Lines the peer read, in order.
    pub async fn received(self) -> Vec<String> {
        self.handle.await.unwrap()
    }
}

async fn next_line<R>(lines: &mut tokio::io::Lines<R>) -> String
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    timeout(STEP_TIMEOUT, lines.next_line())
        .await
        .expect("peer timed out waiting for a line")
        .unwrap()
        .expect("client closed the connection early")
}
