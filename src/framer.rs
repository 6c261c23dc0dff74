/*
 * framer.rs
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

//! Response framer: turns the raw byte stream into protocol response
//! units. Push bytes in with receive(), pull complete units with
//! next_unit(); incomplete input stays buffered for the next call.
//!
//! IMAP units are logical lines that may embed octet-counted literals
//! `{N}` mid-line (binary-safe, may contain CRLF). SMTP replies span
//! one or more `DDD-`/`DDD ` lines. POP3 replies are single `+OK`/`-ERR`
//! lines, optionally followed by a dot-stuffed multi-line body.

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::EngineError;

/// Default cap on buffered bytes without a complete unit.
const DEFAULT_BUFFER_CAP: usize = 64 * 1024 * 1024;

/// Framing discipline, set by the owning client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramerMode {
    Imap,
    Smtp,
    Pop3,
}

/// One IMAP response unit: the first-line text before any literal, plus
/// zero or more (literal bytes, text after the literal) pairs. Downstream
/// parsers access literal bytes without re-scanning the wire form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImapUnit {
    pub head: String,
    pub parts: Vec<(Vec<u8>, String)>,
}

impl ImapUnit {
    pub fn line(head: impl Into<String>) -> Self {
        Self {
            head: head.into(),
            parts: Vec::new(),
        }
    }

    /// Full text with each literal's slot elided; handy for parsers that
    /// only care about line structure.
    pub fn joined_text(&self) -> String {
        let mut s = self.head.clone();
        for (_, text) in &self.parts {
            s.push_str(text);
        }
        s
    }
}

/// One SMTP reply: three-digit code and the text of each reply line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpReply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl SmtpReply {
    pub fn message(&self) -> &str {
        self.lines.last().map(String::as_str).unwrap_or("")
    }

    pub fn is_positive(&self) -> bool {
        (200..300).contains(&self.code)
    }

    pub fn is_transient(&self) -> bool {
        (400..500).contains(&self.code)
    }

    pub fn is_permanent(&self) -> bool {
        self.code >= 500
    }
}

/// One POP3 reply: status line plus an optional de-stuffed body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pop3Reply {
    pub ok: bool,
    /// Status line text after `+OK ` / `-ERR ` (may be empty).
    pub line: String,
    pub body: Option<Vec<u8>>,
}

/// A complete response unit in the framer's current mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unit {
    Imap(ImapUnit),
    Smtp(SmtpReply),
    Pop3(Pop3Reply),
}

/// Incremental response framer. Owns its read buffer.
pub struct Framer {
    mode: FramerMode,
    buf: BytesMut,
    cap: usize,
    /// POP3 only: the next `+OK` reply is followed by a multi-line body.
    pop3_body_armed: bool,
}

impl Framer {
    pub fn new(mode: FramerMode) -> Self {
        Self {
            mode,
            buf: BytesMut::with_capacity(4096),
            cap: DEFAULT_BUFFER_CAP,
            pop3_body_armed: false,
        }
    }

    pub fn with_cap(mode: FramerMode, cap: usize) -> Self {
        let mut f = Self::new(mode);
        f.cap = cap;
        f
    }

    pub fn mode(&self) -> FramerMode {
        self.mode
    }

    /// Discard buffered bytes, e.g. after a TLS upgrade re-binds the
    /// framer to a new byte stream.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.pop3_body_armed = false;
    }

    /// POP3: declare that the next positive reply carries a multi-line
    /// body (LIST/RETR/TOP/UIDL without argument).
    pub fn expect_pop3_body(&mut self) {
        self.pop3_body_armed = true;
    }

    /// Feed bytes from the transport.
    pub fn receive(&mut self, bytes: &[u8]) -> Result<(), EngineError> {
        if self.buf.len() + bytes.len() > self.cap {
            return Err(EngineError::ProtocolOverflow);
        }
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    /// Pull the next complete unit, or None if more bytes are needed.
    pub fn next_unit(&mut self) -> Result<Option<Unit>, EngineError> {
        match self.mode {
            FramerMode::Imap => Ok(self.next_imap_unit()?.map(Unit::Imap)),
            FramerMode::Smtp => Ok(self.next_smtp_reply()?.map(Unit::Smtp)),
            FramerMode::Pop3 => Ok(self.next_pop3_reply()?.map(Unit::Pop3)),
        }
    }

    fn next_imap_unit(&mut self) -> Result<Option<ImapUnit>, EngineError> {
        // (line_start, line_end, literal range) per segment; the last
        // segment carries no literal.
        let mut segments: Vec<(usize, usize, Option<(usize, usize)>)> = Vec::new();
        let mut pos = 0;
        let consumed = loop {
            let rel = match find_crlf(&self.buf[pos..]) {
                Some(i) => i,
                None => return Ok(None),
            };
            let line_end = pos + rel;
            match trailing_literal_len(&self.buf[pos..line_end]) {
                Some(n) => {
                    let lit_start = line_end + 2;
                    let lit_end = lit_start.checked_add(n).ok_or(EngineError::ProtocolOverflow)?;
                    if lit_end > self.cap {
                        return Err(EngineError::ProtocolOverflow);
                    }
                    if self.buf.len() < lit_end {
                        return Ok(None);
                    }
                    segments.push((pos, line_end, Some((lit_start, lit_end))));
                    pos = lit_end;
                }
                None => {
                    segments.push((pos, line_end, None));
                    break line_end + 2;
                }
            }
        };

        let head = String::from_utf8_lossy(&self.buf[segments[0].0..segments[0].1]).into_owned();
        let mut parts = Vec::with_capacity(segments.len() - 1);
        for w in segments.windows(2) {
            let (_, _, lit) = w[0];
            let (start, end, _) = w[1];
            let (ls, le) = lit.expect("every non-final segment ends in a literal");
            parts.push((
                self.buf[ls..le].to_vec(),
                String::from_utf8_lossy(&self.buf[start..end]).into_owned(),
            ));
        }
        let _ = self.buf.split_to(consumed);
        Ok(Some(ImapUnit { head, parts }))
    }

    fn next_smtp_reply(&mut self) -> Result<Option<SmtpReply>, EngineError> {
        let mut pos = 0;
        let mut code: Option<u16> = None;
        let mut lines = Vec::new();
        loop {
            let rel = match find_crlf(&self.buf[pos..]) {
                Some(i) => i,
                None => return Ok(None),
            };
            let line_end = pos + rel;
            let line = &self.buf[pos..line_end];
            if line.len() < 3 || !line[..3].iter().all(u8::is_ascii_digit) {
                return Err(EngineError::protocol(format!(
                    "malformed SMTP reply line: {}",
                    String::from_utf8_lossy(line)
                )));
            }
            let this_code: u16 = std::str::from_utf8(&line[..3]).unwrap().parse().unwrap();
            match code {
                None => code = Some(this_code),
                Some(c) if c != this_code => {
                    return Err(EngineError::protocol(format!(
                        "inconsistent SMTP reply codes {} and {}",
                        c, this_code
                    )));
                }
                Some(_) => {}
            }
            let continuation = line.get(3) == Some(&b'-');
            let text = line.get(4..).unwrap_or(&[]);
            lines.push(String::from_utf8_lossy(text).trim().to_string());
            pos = line_end + 2;
            if !continuation {
                let _ = self.buf.split_to(pos);
                return Ok(Some(SmtpReply {
                    code: code.unwrap(),
                    lines,
                }));
            }
        }
    }

    fn next_pop3_reply(&mut self) -> Result<Option<Pop3Reply>, EngineError> {
        let status_end = match find_crlf(&self.buf) {
            Some(i) => i,
            None => return Ok(None),
        };
        let status = String::from_utf8_lossy(&self.buf[..status_end]).into_owned();
        let (ok, line) = if let Some(rest) = status.strip_prefix("+OK") {
            (true, rest.trim_start().to_string())
        } else if let Some(rest) = status.strip_prefix("-ERR") {
            (false, rest.trim_start().to_string())
        } else {
            return Err(EngineError::protocol(format!(
                "malformed POP3 status line: {}",
                status
            )));
        };

        if !(ok && self.pop3_body_armed) {
            let _ = self.buf.split_to(status_end + 2);
            self.pop3_body_armed = false;
            return Ok(Some(Pop3Reply {
                ok,
                line,
                body: None,
            }));
        }

        // Multi-line body until a line holding only "."; unstuff a
        // leading ".." to ".".
        let mut body = Vec::new();
        let mut pos = status_end + 2;
        loop {
            let rel = match find_crlf(&self.buf[pos..]) {
                Some(i) => i,
                None => return Ok(None),
            };
            let line_end = pos + rel;
            let content = &self.buf[pos..line_end];
            if content == b"." {
                let _ = self.buf.split_to(line_end + 2);
                self.pop3_body_armed = false;
                return Ok(Some(Pop3Reply {
                    ok,
                    line,
                    body: Some(body),
                }));
            }
            let unstuffed = if content.starts_with(b"..") {
                &content[1..]
            } else {
                content
            };
            body.extend_from_slice(unstuffed);
            body.extend_from_slice(b"\r\n");
            pos = line_end + 2;
        }
    }
}

/// Read units from a stream through the framer until one is complete.
pub async fn read_unit<S>(stream: &mut S, framer: &mut Framer) -> Result<Unit, EngineError>
where
    S: AsyncRead + Unpin,
{
    loop {
        if let Some(unit) = framer.next_unit()? {
            return Ok(unit);
        }
        let mut chunk = [0u8; 4096];
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(EngineError::ConnectionLost);
        }
        framer.receive(&chunk[..n])?;
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Literal marker on the last non-whitespace token of the line: `{N}` or
/// LITERAL+ `{N+}`. Only an end-of-line marker continues the unit.
fn trailing_literal_len(line: &[u8]) -> Option<usize> {
    let mut end = line.len();
    while end > 0 && (line[end - 1] == b' ' || line[end - 1] == b'\t') {
        end -= 1;
    }
    let line = &line[..end];
    if !line.ends_with(b"}") {
        return None;
    }
    let open = line.iter().rposition(|&b| b == b'{')?;
    let mut digits = &line[open + 1..line.len() - 1];
    if digits.ends_with(b"+") {
        digits = &digits[..digits.len() - 1];
    }
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn imap_unit(framer: &mut Framer) -> Option<ImapUnit> {
        match framer.next_unit().unwrap() {
            Some(Unit::Imap(u)) => Some(u),
            None => None,
            other => panic!("unexpected unit {:?}", other),
        }
    }

    #[test]
    fn simple_imap_line() {
        let mut f = Framer::new(FramerMode::Imap);
        f.receive(b"* OK IMAP4rev1 ready\r\n").unwrap();
        let u = imap_unit(&mut f).unwrap();
        assert_eq!(u.head, "* OK IMAP4rev1 ready");
        assert!(u.parts.is_empty());
        assert!(imap_unit(&mut f).is_none());
    }

    #[test]
    fn literal_with_embedded_crlf() {
        let mut f = Framer::new(FramerMode::Imap);
        f.receive(b"* 1 FETCH (BODY[] {14}\r\nline1\r\nline2\r\n)\r\n")
            .unwrap();
        let u = imap_unit(&mut f).unwrap();
        assert_eq!(u.head, "* 1 FETCH (BODY[] {14}");
        assert_eq!(u.parts.len(), 1);
        assert_eq!(u.parts[0].0, b"line1\r\nline2\r\n");
        assert_eq!(u.parts[0].1, ")");
    }

    #[test]
    fn literal_split_across_pushes() {
        let mut f = Framer::new(FramerMode::Imap);
        f.receive(b"* 1 FETCH (BODY[] {11}\r\nHel").unwrap();
        assert!(imap_unit(&mut f).is_none());
        f.receive(b"lo world)").unwrap();
        assert!(imap_unit(&mut f).is_none());
        f.receive(b"\r\n").unwrap();
        let u = imap_unit(&mut f).unwrap();
        assert_eq!(u.parts[0].0, b"Hello world");
        assert_eq!(u.parts[0].1, ")");
    }

    #[test]
    fn two_literals_in_one_unit() {
        let mut f = Framer::new(FramerMode::Imap);
        f.receive(b"* METADATA INBOX (/private/comment {3}\r\nfoo /shared/x {2}\r\nhi)\r\n")
            .unwrap();
        let u = imap_unit(&mut f).unwrap();
        assert_eq!(u.parts.len(), 2);
        assert_eq!(u.parts[0].0, b"foo");
        assert_eq!(u.parts[1].0, b"hi");
        assert_eq!(u.parts[1].1, ")");
    }

    #[test]
    fn non_trailing_brace_is_not_a_literal() {
        let mut f = Framer::new(FramerMode::Imap);
        f.receive(b"* OK {weird} text\r\n").unwrap();
        let u = imap_unit(&mut f).unwrap();
        assert_eq!(u.head, "* OK {weird} text");
        assert!(u.parts.is_empty());
    }

    #[test]
    fn literal_plus_marker() {
        let mut f = Framer::new(FramerMode::Imap);
        f.receive(b"* 2 FETCH (BODY[] {3+}\r\nabc)\r\n").unwrap();
        let u = imap_unit(&mut f).unwrap();
        assert_eq!(u.parts[0].0, b"abc");
    }

    #[test]
    fn zero_length_literal() {
        let mut f = Framer::new(FramerMode::Imap);
        f.receive(b"* 3 FETCH (BODY[] {0}\r\n)\r\n").unwrap();
        let u = imap_unit(&mut f).unwrap();
        assert_eq!(u.parts[0].0, b"");
        assert_eq!(u.parts[0].1, ")");
    }

    #[test]
    fn overflow_fails_session() {
        let mut f = Framer::with_cap(FramerMode::Imap, 16);
        let err = f.receive(b"this line is longer than the cap\r\n");
        assert!(matches!(err, Err(EngineError::ProtocolOverflow)));
    }

    #[test]
    fn oversized_literal_fails_before_buffering() {
        let mut f = Framer::with_cap(FramerMode::Imap, 64);
        f.receive(b"* 1 FETCH (BODY[] {4096}\r\n").unwrap();
        assert!(matches!(
            f.next_unit(),
            Err(EngineError::ProtocolOverflow)
        ));
    }

    #[test]
    fn smtp_single_line() {
        let mut f = Framer::new(FramerMode::Smtp);
        f.receive(b"250 OK\r\n").unwrap();
        match f.next_unit().unwrap().unwrap() {
            Unit::Smtp(r) => {
                assert_eq!(r.code, 250);
                assert_eq!(r.lines, vec!["OK"]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn smtp_multi_line() {
        let mut f = Framer::new(FramerMode::Smtp);
        f.receive(b"250-mail.example.org\r\n250-SIZE 52428800\r\n250 PIPELINING\r\n")
            .unwrap();
        match f.next_unit().unwrap().unwrap() {
            Unit::Smtp(r) => {
                assert_eq!(r.code, 250);
                assert_eq!(r.lines.len(), 3);
                assert_eq!(r.message(), "PIPELINING");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn smtp_inconsistent_codes() {
        let mut f = Framer::new(FramerMode::Smtp);
        f.receive(b"250-first\r\n550 second\r\n").unwrap();
        assert!(matches!(f.next_unit(), Err(EngineError::Protocol(_))));
    }

    #[test]
    fn pop3_status_only() {
        let mut f = Framer::new(FramerMode::Pop3);
        f.receive(b"+OK 2 messages\r\n").unwrap();
        match f.next_unit().unwrap().unwrap() {
            Unit::Pop3(r) => {
                assert!(r.ok);
                assert_eq!(r.line, "2 messages");
                assert!(r.body.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn pop3_body_with_dot_unstuffing() {
        let mut f = Framer::new(FramerMode::Pop3);
        f.expect_pop3_body();
        f.receive(b"+OK message follows\r\nHello\r\n..leading dot\r\n.\r\n")
            .unwrap();
        match f.next_unit().unwrap().unwrap() {
            Unit::Pop3(r) => {
                assert_eq!(r.body.unwrap(), b"Hello\r\n.leading dot\r\n");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn read_unit_pulls_from_stream() {
        use tokio_test::io::Builder;

        let mut mock = Builder::new()
            .read(b"* 1 FETCH (BODY[] {5}\r\n")
            .read(b"hello")
            .read(b")\r\n")
            .build();
        let mut framer = Framer::new(FramerMode::Imap);
        match read_unit(&mut mock, &mut framer).await.unwrap() {
            Unit::Imap(u) => {
                assert_eq!(u.parts[0].0, b"hello");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn read_unit_reports_eof_as_connection_lost() {
        use tokio_test::io::Builder;

        let mut mock = Builder::new().read(b"* OK partial").build();
        let mut framer = Framer::new(FramerMode::Imap);
        let err = read_unit(&mut mock, &mut framer).await.unwrap_err();
        assert!(matches!(err, EngineError::ConnectionLost));
    }

    #[test]
    fn pop3_err_has_no_body_even_when_armed() {
        let mut f = Framer::new(FramerMode::Pop3);
        f.expect_pop3_body();
        f.receive(b"-ERR no such message\r\n").unwrap();
        match f.next_unit().unwrap().unwrap() {
            Unit::Pop3(r) => {
                assert!(!r.ok);
                assert!(r.body.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
