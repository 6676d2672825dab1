/*
 * pop3_dialogue.rs
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

//! POP3 mailbox dialogue against a scripted server.

mod support;

use staffetta_core::config::TransportConfig;
use staffetta_core::protocol::pop3::{connect_pop3, Pop3State};
use staffetta_core::Error;
use support::{ScriptedPeer, Step};

#[tokio::test]
async fn bad_password_stays_in_authorization() {
    let peer = ScriptedPeer::start(vec![
        Step::Send("+OK POP3 ready"),
        Step::Expect("USER alice"),
        Step::Send("+OK"),
        Step::Expect("PASS wrong"),
        Step::Send("-ERR invalid password"),
    ])
    .await;
    let mut session = connect_pop3("127.0.0.1", peer.port(), &TransportConfig::default())
        .await
        .unwrap();
    let err = session.login("alice", "wrong").await.unwrap_err();
    assert!(matches!(err, Error::AuthenticationFailure(ref r) if r.starts_with("-ERR")));
    assert_eq!(session.state(), Pop3State::Authorization);

    // refused locally: nothing reaches the server
    assert!(matches!(session.list().await, Err(Error::NotPermitted { command: "LIST", .. })));
    assert!(matches!(session.retr_to_vec(1).await, Err(Error::NotPermitted { .. })));
    session.close().await.unwrap();

    let received = peer.received().await;
    assert_eq!(received, vec!["USER alice", "PASS wrong"]);
}

#[tokio::test]
async fn transaction_list_retrieve_delete_quit() {
    let peer = ScriptedPeer::start(vec![
        Step::Send("+OK POP3 ready"),
        Step::Expect("USER alice"),
        Step::Send("+OK"),
        Step::Expect("PASS secret"),
        Step::Send("+OK maildrop locked"),
        Step::Expect("LIST"),
        Step::Send("+OK 2 messages"),
        Step::Send("1 120"),
        Step::Send("2 340"),
        Step::Send("."),
        Step::Expect("RETR 2"),
        Step::Send("+OK 340 octets"),
        Step::Send("Subject: hello"),
        Step::Send(""),
        Step::Send("..leading dot kept as sent"),
        Step::Send("bye"),
        Step::Send("."),
        Step::Expect("DELE 2"),
        Step::Send("+OK marked"),
        Step::Expect("DELE 7"),
        Step::Send("-ERR no such message"),
        Step::Expect("QUIT"),
        Step::Send("+OK bye"),
    ])
    .await;
    let mut session = connect_pop3("127.0.0.1", peer.port(), &TransportConfig::default())
        .await
        .unwrap();
    session.login("alice", "secret").await.unwrap();
    assert_eq!(session.state(), Pop3State::Transaction);

    let listing = session.list().await.unwrap();
    assert_eq!(listing.count(), 2);
    assert_eq!(listing.entries().map(|e| e.size).sum::<u64>(), 460);

    let body = session.retr_to_vec(2).await.unwrap();
    assert_eq!(body, b"Subject: hello\n\n..leading dot kept as sent\nbye\n");

    session.dele(2).await.unwrap();
    assert!(matches!(session.dele(7).await, Err(Error::Rejected { .. })));
    assert_eq!(session.state(), Pop3State::Transaction);

    session.quit().await.unwrap();
    assert_eq!(session.state(), Pop3State::Update);
    session.close().await.unwrap();

    let received = peer.received().await;
    assert_eq!(received.last().map(String::as_str), Some("QUIT"));
}

#[tokio::test]
async fn connection_lost_during_retrieve_is_fatal() {
    let peer = ScriptedPeer::start(vec![
        Step::Send("+OK"),
        Step::Expect("USER"),
        Step::Send("+OK"),
        Step::Expect("PASS"),
        Step::Send("+OK"),
        Step::Expect("RETR 1"),
        Step::Send("+OK"),
        Step::Send("first line"),
        Step::Hangup,
    ])
    .await;
    let mut session = connect_pop3("127.0.0.1", peer.port(), &TransportConfig::default())
        .await
        .unwrap();
    session.login("alice", "secret").await.unwrap();
    let err = session.retr_to_vec(1).await.unwrap_err();
    assert!(matches!(err, Error::ProtocolViolation(_)));
    assert!(err.is_fatal());
    peer.received().await;
}
