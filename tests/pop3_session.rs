/*
 * pop3_session.rs
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

//! POP3 session tests against a scripted server.

use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

use busta::protocol::pop3::{Pop3Client, Pop3Error};

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
async fn user_pass_stat_list_retr_quit() {
    let (io, mut server) = duplex(4096);
    let mut client = Pop3Client::with_stream(io);

    let driver = tokio::spawn(async move {
        client.read_greeting().await.unwrap();
        client.login("mrose", "secret").await.unwrap();

        let stat = client.stat().await.unwrap();
        assert_eq!(stat.count, 2);
        assert_eq!(stat.total_size, 320);

        let listing = client.list(None).await.unwrap();
        assert_eq!(listing.len(), 2);
        assert_eq!(listing[0].msg_no, 1);
        assert_eq!(listing[0].size, 120);

        let message = client.retr(1).await.unwrap();
        assert_eq!(message, b"From: a@x\r\n\r\n.a dotted line\r\n");

        client.dele(1).await.unwrap();
        client.quit().await.unwrap();
    });

    send(&mut server, "+OK POP3 server ready\r\n").await;
    expect_line(&mut server, "USER mrose").await;
    send(&mut server, "+OK mrose is welcome\r\n").await;
    expect_line(&mut server, "PASS secret").await;
    send(&mut server, "+OK logged in\r\n").await;
    expect_line(&mut server, "STAT").await;
    send(&mut server, "+OK 2 320\r\n").await;
    expect_line(&mut server, "LIST").await;
    send(&mut server, "+OK 2 messages\r\n1 120\r\n2 200\r\n.\r\n").await;
    expect_line(&mut server, "RETR 1").await;
    // The leading dot in the body arrives stuffed.
    send(
        &mut server,
        "+OK 120 octets\r\nFrom: a@x\r\n\r\n..a dotted line\r\n.\r\n",
    )
    .await;
    expect_line(&mut server, "DELE 1").await;
    send(&mut server, "+OK marked\r\n").await;
    expect_line(&mut server, "QUIT").await;
    send(&mut server, "+OK bye\r\n").await;

    driver.await.unwrap();
}

#[tokio::test]
async fn apop_uses_greeting_timestamp() {
    let (io, mut server) = duplex(4096);
    let mut client = Pop3Client::with_stream(io);

    let driver = tokio::spawn(async move {
        client.read_greeting().await.unwrap();
        client.apop("mrose", "tanstaaf").await.unwrap();
    });

    // RFC 1939 §7 worked example.
    send(
        &mut server,
        "+OK POP3 server ready <1896.697170952@dbc.mtview.ca.us>\r\n",
    )
    .await;
    expect_line(
        &mut server,
        "APOP mrose c4c9334bac560ecc979e58001b3e22fb",
    )
    .await;
    send(&mut server, "+OK maildrop has 1 message\r\n").await;
    driver.await.unwrap();
}

#[tokio::test]
async fn top_and_uidl() {
    let (io, mut server) = duplex(4096);
    let mut client = Pop3Client::with_stream(io);

    let driver = tokio::spawn(async move {
        client.read_greeting().await.unwrap();

        let uidls = client.uidl(None).await.unwrap();
        assert_eq!(uidls.len(), 2);
        assert_eq!(uidls[1].uidl, "QhdPYR:00WBw1Ph7x7");

        let head = client.top(1, 0).await.unwrap();
        assert_eq!(head, b"Subject: hi\r\n\r\n");
    });

    send(&mut server, "+OK ready\r\n").await;
    expect_line(&mut server, "UIDL").await;
    send(
        &mut server,
        "+OK\r\n1 whqtswO00WBw418f9t5JxYwZ\r\n2 QhdPYR:00WBw1Ph7x7\r\n.\r\n",
    )
    .await;
    expect_line(&mut server, "TOP 1 0").await;
    send(&mut server, "+OK\r\nSubject: hi\r\n\r\n.\r\n").await;
    driver.await.unwrap();
}

#[tokio::test]
async fn err_reply_surfaces_as_error() {
    let (io, mut server) = duplex(4096);
    let mut client = Pop3Client::with_stream(io);

    let driver = tokio::spawn(async move {
        client.read_greeting().await.unwrap();
        let err = client.retr(99).await.unwrap_err();
        assert!(matches!(err, Pop3Error::Err(_)));
    });

    send(&mut server, "+OK ready\r\n").await;
    expect_line(&mut server, "RETR 99").await;
    send(&mut server, "-ERR no such message\r\n").await;
    driver.await.unwrap();
}
