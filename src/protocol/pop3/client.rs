/*
 * client.rs
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

//! POP3 client (RFC 1939). Authorization with USER/PASS or APOP, then
//! STAT/LIST/UIDL/RETR/TOP/DELE/NOOP/RSET, then QUIT to enter the
//! update state. Multi-line bodies are de-stuffed by the framer.

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::EngineError;
use crate::framer::{read_unit, Framer, FramerMode, Pop3Reply, Unit};
use crate::net::MailStream;
use crate::sasl;

/// POP3 failure: a `-ERR` status or a session-level error.
#[derive(Debug)]
pub enum Pop3Error {
    Err(String),
    Engine(EngineError),
}

impl std::fmt::Display for Pop3Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pop3Error::Err(m) => write!(f, "-ERR {}", m),
            Pop3Error::Engine(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for Pop3Error {}

impl From<EngineError> for Pop3Error {
    fn from(e: EngineError) -> Self {
        Pop3Error::Engine(e)
    }
}

impl From<std::io::Error> for Pop3Error {
    fn from(e: std::io::Error) -> Self {
        Pop3Error::Engine(e.into())
    }
}

/// STAT: message count and total size in octets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pop3Stat {
    pub count: u32,
    pub total_size: u64,
}

/// One LIST entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pop3ListEntry {
    pub msg_no: u32,
    pub size: u64,
}

/// One UIDL entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pop3UidlEntry {
    pub msg_no: u32,
    pub uidl: String,
}

/// POP3 session over any duplex byte stream.
pub struct Pop3Client<S = MailStream> {
    stream: S,
    framer: Framer,
    /// `<...>` msg-id from the greeting, used for APOP.
    apop_timestamp: Option<String>,
}

impl Pop3Client<MailStream> {
    pub async fn connect(host: &str, port: u16, is_secure: bool) -> Result<Self, Pop3Error> {
        let stream = MailStream::connect(host, port, is_secure).await?;
        Ok(Self::with_stream(stream))
    }
}

impl<S> Pop3Client<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn with_stream(stream: S) -> Self {
        Self {
            stream,
            framer: Framer::new(FramerMode::Pop3),
            apop_timestamp: None,
        }
    }

    async fn read_reply(&mut self) -> Result<Pop3Reply, Pop3Error> {
        match read_unit(&mut self.stream, &mut self.framer).await? {
            Unit::Pop3(reply) => Ok(reply),
            _ => unreachable!("framer is in POP3 mode"),
        }
    }

    async fn command(&mut self, line: &str, multiline: bool) -> Result<Pop3Reply, Pop3Error> {
        debug!(command = %line.split_whitespace().next().unwrap_or(""), "pop3 send");
        if multiline {
            self.framer.expect_pop3_body();
        }
        self.stream.write_all(line.as_bytes()).await?;
        self.stream.write_all(b"\r\n").await?;
        self.stream.flush().await?;
        let reply = self.read_reply().await?;
        if reply.ok {
            Ok(reply)
        } else {
            Err(Pop3Error::Err(reply.line))
        }
    }

    /// Read the `+OK` greeting, keeping any APOP timestamp.
    pub async fn read_greeting(&mut self) -> Result<(), Pop3Error> {
        let reply = self.read_reply().await?;
        if !reply.ok {
            return Err(Pop3Error::Err(reply.line));
        }
        if let (Some(start), Some(end)) = (reply.line.find('<'), reply.line.rfind('>')) {
            if start < end {
                self.apop_timestamp = Some(reply.line[start..=end].to_string());
            }
        }
        Ok(())
    }

    /// USER then PASS. The password is never traced.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<(), Pop3Error> {
        self.command(&format!("USER {}", username), false).await?;
        debug!("pop3 send PASS (redacted)");
        self.stream.write_all(b"PASS ").await?;
        self.stream.write_all(password.as_bytes()).await?;
        self.stream.write_all(b"\r\n").await?;
        self.stream.flush().await?;
        let reply = self.read_reply().await?;
        if reply.ok {
            Ok(())
        } else {
            Err(Pop3Error::Err(reply.line))
        }
    }

    /// APOP: digest of the greeting timestamp and the shared secret.
    pub async fn apop(&mut self, username: &str, secret: &str) -> Result<(), Pop3Error> {
        let timestamp = self.apop_timestamp.clone().ok_or_else(|| {
            EngineError::precondition("server greeting carried no APOP timestamp")
        })?;
        let digest = sasl::apop_digest(&timestamp, secret);
        self.command(&format!("APOP {} {}", username, digest), false)
            .await?;
        Ok(())
    }

    /// STAT.
    pub async fn stat(&mut self) -> Result<Pop3Stat, Pop3Error> {
        let reply = self.command("STAT", false).await?;
        let mut words = reply.line.split_whitespace();
        let count = words.next().and_then(|w| w.parse().ok()).unwrap_or(0);
        let total_size = words.next().and_then(|w| w.parse().ok()).unwrap_or(0);
        Ok(Pop3Stat { count, total_size })
    }

    /// LIST, either for one message or for all.
    pub async fn list(&mut self, msg: Option<u32>) -> Result<Vec<Pop3ListEntry>, Pop3Error> {
        match msg {
            Some(n) => {
                let reply = self.command(&format!("LIST {}", n), false).await?;
                Ok(parse_scan_listing(&reply.line)
                    .map(|(msg_no, size)| {
                        vec![Pop3ListEntry {
                            msg_no,
                            size: size.parse().unwrap_or(0),
                        }]
                    })
                    .unwrap_or_default())
            }
            None => {
                let reply = self.command("LIST", true).await?;
                let body = reply.body.unwrap_or_default();
                Ok(body_lines(&body)
                    .filter_map(|line| parse_scan_listing(line))
                    .map(|(msg_no, size)| Pop3ListEntry {
                        msg_no,
                        size: size.parse().unwrap_or(0),
                    })
                    .collect())
            }
        }
    }

    /// UIDL, either for one message or for all.
    pub async fn uidl(&mut self, msg: Option<u32>) -> Result<Vec<Pop3UidlEntry>, Pop3Error> {
        match msg {
            Some(n) => {
                let reply = self.command(&format!("UIDL {}", n), false).await?;
                Ok(parse_scan_listing(&reply.line)
                    .map(|(msg_no, uidl)| {
                        vec![Pop3UidlEntry {
                            msg_no,
                            uidl: uidl.to_string(),
                        }]
                    })
                    .unwrap_or_default())
            }
            None => {
                let reply = self.command("UIDL", true).await?;
                let body = reply.body.unwrap_or_default();
                Ok(body_lines(&body)
                    .filter_map(parse_scan_listing)
                    .map(|(msg_no, uidl)| Pop3UidlEntry {
                        msg_no,
                        uidl: uidl.to_string(),
                    })
                    .collect())
            }
        }
    }

    /// RETR: the full message.
    pub async fn retr(&mut self, msg_no: u32) -> Result<Vec<u8>, Pop3Error> {
        let reply = self.command(&format!("RETR {}", msg_no), true).await?;
        Ok(reply.body.unwrap_or_default())
    }

    /// TOP: headers plus the first `lines` body lines.
    pub async fn top(&mut self, msg_no: u32, lines: u32) -> Result<Vec<u8>, Pop3Error> {
        let reply = self
            .command(&format!("TOP {} {}", msg_no, lines), true)
            .await?;
        Ok(reply.body.unwrap_or_default())
    }

    /// DELE: mark for deletion at QUIT.
    pub async fn dele(&mut self, msg_no: u32) -> Result<(), Pop3Error> {
        self.command(&format!("DELE {}", msg_no), false).await?;
        Ok(())
    }

    pub async fn noop(&mut self) -> Result<(), Pop3Error> {
        self.command("NOOP", false).await?;
        Ok(())
    }

    /// RSET: unmark deletions.
    pub async fn rset(&mut self) -> Result<(), Pop3Error> {
        self.command("RSET", false).await?;
        Ok(())
    }

    /// QUIT: enter the update state; the server commits deletions.
    pub async fn quit(&mut self) -> Result<(), Pop3Error> {
        let _ = self.command("QUIT", false).await;
        Ok(())
    }
}

fn body_lines(body: &[u8]) -> impl Iterator<Item = &str> {
    body.split(|&b| b == b'\n')
        .filter_map(|l| std::str::from_utf8(l).ok())
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.is_empty())
}

/// `<msg-no> <rest>` scan listing used by LIST and UIDL.
fn parse_scan_listing(line: &str) -> Option<(u32, &str)> {
    let mut words = line.splitn(2, ' ');
    let msg_no = words.next()?.trim().parse().ok()?;
    Some((msg_no, words.next().unwrap_or("").trim()))
}
