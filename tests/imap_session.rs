/*
 * imap_session.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Busta, an email protocol engine library.
 *
 * Busta is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Busta is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Busta.  If not, see <http://www.gnu.org/licenses/>.
 */

//! IMAP session tests against a scripted server on an in-memory duplex
//! stream.

use std::sync::Arc;

use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

use busta::protocol::imap::{
    ImapClient, MetaDataEntry, SelectionState, ServerInfo, StoreAction, UpgradeFuture,
};
use busta::{EventBus, MailEvent};

fn client(io: DuplexStream) -> ImapClient<DuplexStream> {
    client_with_bus(io, EventBus::new())
}

fn client_with_bus(io: DuplexStream, bus: EventBus) -> ImapClient<DuplexStream> {
    ImapClient::with_stream(io, ServerInfo::new("imap.example.org", 143, false), bus)
}

/// Read one CRLF-terminated line from the client side.
async fn expect_line(server: &mut DuplexStream, expected: &str) {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        server.read_exact(&mut byte).await.expect("client closed");
        line.push(byte[0]);
        if line.ends_with(b"\r\n") {
            break;
        }
    }
    let text = String::from_utf8_lossy(&line[..line.len() - 2]).into_owned();
    assert_eq!(text, expected);
}

async fn send(server: &mut DuplexStream, text: &str) {
    server.write_all(text.as_bytes()).await.unwrap();
}

#[tokio::test]
async fn login_list_select_inbox() {
    let (io, mut server) = duplex(4096);
    let client = Arc::new(client(io));
    send(&mut server, "* OK IMAP4rev1 ready\r\n").await;

    let driver = {
        let client = client.clone();
        tokio::spawn(async move {
            let login = client.login("user", "pass").await.unwrap();
            assert!(login.is_ok());
            assert!(client.has_capability("IDLE"));

            let selected = client.select_mailbox_by_path("INBOX").await.unwrap();
            let mailbox = selected.result.unwrap();
            assert_eq!(mailbox.messages_exists, 172);
            assert_eq!(mailbox.messages_recent, 1);
            assert_eq!(mailbox.uid_validity, Some(3857529045));
            assert_eq!(mailbox.uid_next, Some(4392));
            assert_eq!(mailbox.selection, SelectionState::Selected);
        })
    };

    expect_line(&mut server, "a0 LOGIN user pass").await;
    send(&mut server, "a0 OK [CAPABILITY IMAP4rev1 IDLE] logged in\r\n").await;

    expect_line(&mut server, "a1 LIST \"\" \"\"").await;
    send(&mut server, "* LIST (\\Noselect) \"/\" \"\"\r\na1 OK done\r\n").await;

    expect_line(&mut server, "a2 SELECT INBOX").await;
    send(
        &mut server,
        "* 172 EXISTS\r\n\
         * 1 RECENT\r\n\
         * OK [UIDVALIDITY 3857529045] UIDs valid\r\n\
         * OK [UIDNEXT 4392] Predicted next UID\r\n\
         a2 OK [READ-WRITE] Selected\r\n",
    )
    .await;

    driver.await.unwrap();
    assert_eq!(client.path_separator(), Some('/'));
    assert_eq!(
        client.selected_mailbox().unwrap().messages_exists,
        172
    );
}

async fn select_quickly(
    client: &Arc<ImapClient<DuplexStream>>,
    server: &mut DuplexStream,
) {
    let driver = {
        let client = client.clone();
        tokio::spawn(async move {
            client.select_mailbox_by_path("INBOX").await.unwrap();
        })
    };
    expect_line(server, "a0 LIST \"\" \"\"").await;
    send(server, "* LIST (\\Noselect) \"/\" \"\"\r\na0 OK done\r\n").await;
    expect_line(server, "a1 SELECT INBOX").await;
    send(server, "* 3 EXISTS\r\na1 OK [READ-WRITE] Selected\r\n").await;
    driver.await.unwrap();
}

#[tokio::test]
async fn fetch_with_literal_body() {
    let (io, mut server) = duplex(4096);
    let client = Arc::new(client(io));
    select_quickly(&client, &mut server).await;

    let driver = {
        let client = client.clone();
        tokio::spawn(async move {
            let fetched = client.fetch_message(1, "BODY.PEEK[]").await.unwrap();
            let messages = fetched.result.unwrap();
            assert_eq!(messages.len(), 1);
            let msg = &messages[0];
            assert_eq!(msg.sequence_id, Some(1));
            assert_eq!(msg.decoded_body().unwrap(), b"Hello world");
        })
    };

    expect_line(&mut server, "a2 FETCH 1 BODY.PEEK[]").await;
    send(
        &mut server,
        "* 1 FETCH (BODY[] {11}\r\nHello world)\r\na2 OK FETCH completed\r\n",
    )
    .await;
    driver.await.unwrap();
}

#[tokio::test]
async fn idle_cycle_fires_exists_event() {
    let (io, mut server) = duplex(4096);
    let bus = EventBus::new();
    let (event_tx, event_rx) = std::sync::mpsc::channel();
    bus.subscribe(move |event| {
        if let MailEvent::Exists(n) = event {
            let _ = event_tx.send(*n);
        }
    });
    let client = Arc::new(client_with_bus(io, bus));
    select_quickly(&client, &mut server).await;

    let idle = client.idle_start().unwrap();

    expect_line(&mut server, "a2 IDLE").await;
    send(&mut server, "+ idling\r\n").await;
    send(&mut server, "* 173 EXISTS\r\n").await;

    // The unsolicited EXISTS reaches the bus while IDLE is pending.
    let n = tokio::task::spawn_blocking(move || {
        event_rx
            .recv_timeout(std::time::Duration::from_secs(5))
            .unwrap()
    })
    .await
    .unwrap();
    assert_eq!(n, 173);

    let driver = tokio::spawn(async move {
        let response = idle.done().await.unwrap();
        assert!(response.is_ok());
    });
    expect_line(&mut server, "DONE").await;
    send(&mut server, "a2 OK IDLE terminated\r\n").await;
    driver.await.unwrap();

    assert_eq!(client.selected_mailbox().unwrap().messages_exists, 173);
}

#[tokio::test]
async fn store_adds_flags_and_returns_messages() {
    let (io, mut server) = duplex(4096);
    let client = Arc::new(client(io));
    select_quickly(&client, &mut server).await;

    let driver = {
        let client = client.clone();
        tokio::spawn(async move {
            let stored = client
                .store("2:4", &["\\Seen"], StoreAction::Add, false)
                .await
                .unwrap();
            let messages = stored.result.unwrap();
            assert_eq!(messages.len(), 3);
            for msg in &messages {
                assert!(msg.flags.iter().any(|f| f == "\\Seen"));
            }
        })
    };

    expect_line(&mut server, "a2 STORE 2:4 +FLAGS (\\Seen)").await;
    send(
        &mut server,
        "* 2 FETCH (FLAGS (\\Seen))\r\n\
         * 3 FETCH (FLAGS (\\Seen \\Answered))\r\n\
         * 4 FETCH (FLAGS (\\Seen))\r\n\
         a2 OK STORE completed\r\n",
    )
    .await;
    driver.await.unwrap();
}

#[tokio::test]
async fn setmetadata_uses_literal_continuation() {
    let (io, mut server) = duplex(4096);
    let client = Arc::new(client(io));

    let value = b"a note with \"quotes\" in it".to_vec();
    let driver = {
        let client = client.clone();
        tokio::spawn(async move {
            let response = client
                .set_meta_data(MetaDataEntry {
                    mailbox_name: "INBOX".into(),
                    entry: "/private/comment".into(),
                    value: Some(b"a note with \"quotes\" in it".to_vec()),
                })
                .await
                .unwrap();
            assert!(response.is_ok());
        })
    };

    expect_line(
        &mut server,
        &format!("a0 SETMETADATA INBOX (/private/comment {{{}}}", value.len()),
    )
    .await;
    send(&mut server, "+ ready for literal\r\n").await;
    expect_line(&mut server, "a note with \"quotes\" in it)").await;
    send(&mut server, "a0 OK SETMETADATA complete\r\n").await;
    driver.await.unwrap();
}

#[tokio::test]
async fn getmetadata_parses_literal_values() {
    let (io, mut server) = duplex(4096);
    let client = Arc::new(client(io));

    let driver = {
        let client = client.clone();
        tokio::spawn(async move {
            let response = client
                .get_meta_data("/private/comment", "INBOX", Default::default())
                .await
                .unwrap();
            let entries = response.result.unwrap();
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].entry, "/private/comment");
            assert_eq!(entries[0].value.as_deref(), Some(&b"Hello\r\nworld"[..]));
        })
    };

    expect_line(&mut server, "a0 GETMETADATA INBOX (/private/comment)").await;
    send(
        &mut server,
        "* METADATA \"INBOX\" (/private/comment {12}\r\nHello\r\nworld)\r\na0 OK done\r\n",
    )
    .await;
    driver.await.unwrap();
}

#[tokio::test]
async fn commands_complete_in_submission_order() {
    let (io, mut server) = duplex(4096);
    let client = Arc::new(client(io));

    let driver = {
        let client = client.clone();
        tokio::spawn(async move {
            let (a, b) = tokio::join!(client.capability(), client.noop());
            let caps = a.unwrap().result.unwrap();
            assert_eq!(caps, vec!["IMAP4REV1"]);
            assert!(b.unwrap().is_ok());
        })
    };

    expect_line(&mut server, "a0 CAPABILITY").await;
    send(&mut server, "* CAPABILITY IMAP4rev1\r\na0 OK done\r\n").await;
    expect_line(&mut server, "a1 NOOP").await;
    send(&mut server, "a1 OK done\r\n").await;
    driver.await.unwrap();
}

#[tokio::test]
async fn unknown_tag_is_dropped() {
    let (io, mut server) = duplex(4096);
    let client = Arc::new(client(io));

    let driver = {
        let client = client.clone();
        tokio::spawn(async move {
            let response = client.noop().await.unwrap();
            assert!(response.is_ok());
        })
    };

    expect_line(&mut server, "a0 NOOP").await;
    // A stale tagged response first; the client must ignore it.
    send(&mut server, "a99 OK stale\r\na0 OK done\r\n").await;
    driver.await.unwrap();
}

#[tokio::test]
async fn fetch_without_selection_fails_precondition() {
    let (io, _server) = duplex(4096);
    let client = client(io);
    let err = client.fetch_message(1, "BODY.PEEK[]").await.unwrap_err();
    assert!(matches!(
        err,
        busta::EngineError::PreconditionFailed(_)
    ));
}

#[tokio::test]
async fn copy_reports_copyuid() {
    let (io, mut server) = duplex(4096);
    let client = Arc::new(client(io));
    select_quickly(&client, &mut server).await;

    let driver = {
        let client = client.clone();
        tokio::spawn(async move {
            let target = busta::protocol::imap::Mailbox::new("Archive", Some('/'));
            let response = client.copy("2:4", &target).await.unwrap();
            let generic = response.result.unwrap();
            let copy_uid = generic.copy_uid.unwrap();
            assert_eq!(copy_uid.uid_validity, 38505);
            assert_eq!(copy_uid.dest_uids, "3956:3958");
        })
    };

    expect_line(&mut server, "a2 COPY 2:4 Archive").await;
    send(&mut server, "a2 OK [COPYUID 38505 304,319:320 3956:3958] Done\r\n").await;
    driver.await.unwrap();
}

#[tokio::test]
async fn append_uses_literal_continuation() {
    let (io, mut server) = duplex(4096);
    let client = Arc::new(client(io));

    let message = b"From: a@x\r\n\r\nhi\r\n";
    let driver = {
        let client = client.clone();
        tokio::spawn(async move {
            let response = client
                .append_message("INBOX", b"From: a@x\r\n\r\nhi\r\n", &["\\Seen"])
                .await
                .unwrap();
            let generic = response.result.unwrap();
            assert_eq!(generic.append_uid.unwrap().uid, 3955);
        })
    };

    expect_line(
        &mut server,
        &format!("a0 APPEND INBOX (\\Seen) {{{}}}", message.len()),
    )
    .await;
    send(&mut server, "+ go ahead\r\n").await;
    let mut payload = vec![0u8; message.len() + 2];
    server.read_exact(&mut payload).await.unwrap();
    assert_eq!(&payload[..message.len()], message);
    assert_eq!(&payload[message.len()..], b"\r\n");
    send(&mut server, "a0 OK [APPENDUID 38505 3955] done\r\n").await;
    driver.await.unwrap();
}

#[tokio::test]
async fn starttls_discards_pipelined_plaintext() {
    let (io, mut server) = duplex(4096);
    let bus = EventBus::new();
    let (event_tx, event_rx) = std::sync::mpsc::channel();
    bus.subscribe(move |event| {
        if let MailEvent::Exists(n) = event {
            let _ = event_tx.send(*n);
        }
    });
    let client = Arc::new(client_with_bus(io, bus));

    let driver = {
        let client = client.clone();
        tokio::spawn(async move {
            let response = client
                .start_tls_with(Box::new(
                    |s: DuplexStream| -> UpgradeFuture<DuplexStream> {
                        Box::pin(async move { Ok(s) })
                    },
                ))
                .await
                .unwrap();
            assert!(response.is_ok());
        })
    };

    expect_line(&mut server, "a0 STARTTLS").await;
    // Attacker-appended plaintext trailing the OK in the same chunk;
    // it must be discarded, not dispatched.
    send(
        &mut server,
        "a0 OK begin TLS\r\n* 999 EXISTS\r\n* BYE injected\r\n",
    )
    .await;
    // The client re-learns capabilities on the upgraded transport.
    expect_line(&mut server, "a1 CAPABILITY").await;
    send(&mut server, "* CAPABILITY IMAP4rev1 AUTH=PLAIN\r\na1 OK done\r\n").await;
    driver.await.unwrap();

    assert!(event_rx.try_recv().is_err(), "injected EXISTS was dispatched");
    assert!(client.has_capability("AUTH=PLAIN"));
    assert!(client.is_alive());
}

#[tokio::test]
async fn bye_fails_inflight_command() {
    let (io, mut server) = duplex(4096);
    let bus = EventBus::new();
    let (lost_tx, lost_rx) = std::sync::mpsc::channel();
    bus.subscribe(move |event| {
        if matches!(event, MailEvent::ConnectionLost) {
            let _ = lost_tx.send(());
        }
    });
    let client = Arc::new(client_with_bus(io, bus));

    let driver = {
        let client = client.clone();
        tokio::spawn(async move {
            let err = client.noop().await.unwrap_err();
            assert!(matches!(err, busta::EngineError::Bye(_)));
        })
    };

    expect_line(&mut server, "a0 NOOP").await;
    send(&mut server, "* BYE server shutting down\r\n").await;
    driver.await.unwrap();
    tokio::task::spawn_blocking(move || {
        lost_rx
            .recv_timeout(std::time::Duration::from_secs(5))
            .unwrap()
    })
    .await
    .unwrap();
}
