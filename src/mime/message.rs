/*
 * message.rs
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

//! MIME message tree. Leaf bodies keep their raw transfer-encoded bytes
//! so that parse followed by emit reproduces the original octets;
//! decoding is applied on demand. Multipart nodes carry their boundary,
//! preamble and epilogue for the same reason.

use chrono::{DateTime, FixedOffset};

use crate::mime::charset;
use crate::mime::content_type::{parse_content_type, ContentDisposition, ContentType};
use crate::mime::header::{emit_headers, parse_headers, Header};
use crate::mime::rfc2047;
use crate::mime::{base64, quoted_printable};

/// Message body: a leaf of raw (still transfer-encoded) bytes, or a
/// multipart container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Raw(Vec<u8>),
    Multipart {
        boundary: String,
        preamble: Vec<u8>,
        parts: Vec<MimeMessage>,
        epilogue: Vec<u8>,
    },
}

/// A parsed MIME entity: ordered headers, body, and the IMAP-derived
/// identity fields filled in by FETCH responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimeMessage {
    pub headers: Vec<Header>,
    pub body: Body,
    pub sequence_id: Option<u32>,
    pub uid: Option<u32>,
    pub flags: Vec<String>,
    pub internal_date: Option<DateTime<FixedOffset>>,
    pub size: Option<u32>,
}

impl Default for MimeMessage {
    fn default() -> Self {
        Self {
            headers: Vec::new(),
            body: Body::Raw(Vec::new()),
            sequence_id: None,
            uid: None,
            flags: Vec::new(),
            internal_date: None,
            size: None,
        }
    }
}

impl MimeMessage {
    /// Parse a complete RFC 822 / MIME entity.
    pub fn parse(bytes: &[u8]) -> Self {
        let (headers, body_start) = parse_headers(bytes);
        let body_bytes = &bytes[body_start..];
        let content_type = headers
            .iter()
            .find(|h| h.is("Content-Type"))
            .and_then(|h| parse_content_type(&h.value_text()));

        let body = match content_type
            .as_ref()
            .filter(|ct| ct.is_primary_type("multipart"))
            .and_then(|ct| ct.boundary().map(str::to_string))
        {
            Some(boundary) => match split_multipart(body_bytes, &boundary) {
                Some((preamble, part_spans, epilogue)) => Body::Multipart {
                    boundary,
                    preamble,
                    parts: part_spans.iter().map(|p| MimeMessage::parse(p)).collect(),
                    epilogue,
                },
                // Boundary never appears: treat as a leaf.
                None => Body::Raw(body_bytes.to_vec()),
            },
            None => Body::Raw(body_bytes.to_vec()),
        };

        Self {
            headers,
            body,
            ..Self::default()
        }
    }

    /// Serialize the tree with CRLF line endings. For a message parsed
    /// from canonical bytes with no transformation applied, this
    /// reproduces the input.
    pub fn emit(&self) -> Vec<u8> {
        let mut out = Vec::new();
        emit_headers(&self.headers, &mut out);
        out.extend_from_slice(b"\r\n");
        self.emit_body(&mut out);
        out
    }

    fn emit_body(&self, out: &mut Vec<u8>) {
        match &self.body {
            Body::Raw(bytes) => out.extend_from_slice(bytes),
            Body::Multipart {
                boundary,
                preamble,
                parts,
                epilogue,
            } => {
                if !preamble.is_empty() {
                    out.extend_from_slice(preamble);
                    out.extend_from_slice(b"\r\n");
                }
                for part in parts {
                    out.extend_from_slice(b"--");
                    out.extend_from_slice(boundary.as_bytes());
                    out.extend_from_slice(b"\r\n");
                    out.extend_from_slice(&part.emit());
                    out.extend_from_slice(b"\r\n");
                }
                out.extend_from_slice(b"--");
                out.extend_from_slice(boundary.as_bytes());
                out.extend_from_slice(b"--\r\n");
                out.extend_from_slice(epilogue);
            }
        }
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .iter()
            .find(|h| h.is(name))
            .map(Header::value_text)
    }

    /// Header value with RFC 2047 encoded-words expanded.
    pub fn decoded_header(&self, name: &str) -> Option<String> {
        self.header(name)
            .map(|v| rfc2047::decode_encoded_words(&v))
    }

    pub fn from(&self) -> Option<String> {
        self.decoded_header("From")
    }

    pub fn to(&self) -> Option<String> {
        self.decoded_header("To")
    }

    pub fn subject(&self) -> Option<String> {
        self.decoded_header("Subject")
    }

    pub fn content_type(&self) -> Option<ContentType> {
        self.header("Content-Type")
            .and_then(|v| parse_content_type(&v))
    }

    pub fn content_disposition(&self) -> Option<ContentDisposition> {
        self.header("Content-Disposition")
            .and_then(|v| crate::mime::content_type::parse_content_disposition(&v))
    }

    /// `type/subtype` of this entity; `text/plain` when absent
    /// (RFC 2045 default).
    pub fn media_type(&self) -> String {
        self.content_type()
            .map(|ct| ct.media_type())
            .unwrap_or_else(|| "text/plain".to_string())
    }

    pub fn is_multipart(&self) -> bool {
        matches!(self.body, Body::Multipart { .. })
    }

    pub fn parts(&self) -> &[MimeMessage] {
        match &self.body {
            Body::Multipart { parts, .. } => parts,
            Body::Raw(_) => &[],
        }
    }

    /// Leaf body with its Content-Transfer-Encoding undone. Multipart
    /// nodes have no decodable body of their own.
    pub fn decoded_body(&self) -> Option<Vec<u8>> {
        let raw = match &self.body {
            Body::Raw(bytes) => bytes,
            Body::Multipart { .. } => return None,
        };
        let cte = self
            .header("Content-Transfer-Encoding")
            .unwrap_or_default()
            .trim()
            .to_lowercase();
        Some(match cte.as_str() {
            "quoted-printable" => quoted_printable::decode_to_vec(raw),
            "base64" => base64::decode_to_vec(raw),
            // 7bit, 8bit, binary, or absent.
            _ => raw.clone(),
        })
    }

    /// Decoded body as text using the Content-Type charset parameter.
    pub fn body_text(&self) -> Option<String> {
        let decoded = self.decoded_body()?;
        let cs = self
            .content_type()
            .and_then(|ct| ct.charset().map(str::to_string))
            .unwrap_or_else(|| "us-ascii".to_string());
        Some(charset::decode(&decoded, &cs))
    }

    /// First descendant leaf of the given media type, depth-first.
    pub fn find_media_type(&self, media_type: &str) -> Option<&MimeMessage> {
        if !self.is_multipart() {
            if self.media_type() == media_type {
                return Some(self);
            }
            return None;
        }
        self.parts()
            .iter()
            .find_map(|p| p.find_media_type(media_type))
    }

    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.headers.push(Header::new(name, value));
    }

    pub fn set_header(&mut self, name: &str, value: impl Into<Vec<u8>>) {
        let value = value.into();
        match self.headers.iter_mut().find(|h| h.is(name)) {
            Some(h) => h.value = value,
            None => self.headers.push(Header::new(name, value)),
        }
    }
}

/// Split a multipart body on its boundary delimiters. Returns
/// (preamble, raw part slices, epilogue), or None when no delimiter
/// line occurs.
fn split_multipart<'a>(
    body: &'a [u8],
    boundary: &str,
) -> Option<(Vec<u8>, Vec<&'a [u8]>, Vec<u8>)> {
    // (line start, start of next line, closing?)
    let mut delimiters: Vec<(usize, usize, bool)> = Vec::new();
    let mut pos = 0;
    while pos < body.len() {
        let next = match body[pos..].iter().position(|&b| b == b'\n') {
            Some(i) => pos + i + 1,
            None => body.len(),
        };
        let mut line_end = next;
        while line_end > pos && (body[line_end - 1] == b'\n' || body[line_end - 1] == b'\r') {
            line_end -= 1;
        }
        if let Some(closing) = classify_delimiter(&body[pos..line_end], boundary) {
            let is_close = closing;
            delimiters.push((pos, next, is_close));
            if is_close {
                break;
            }
        }
        pos = next;
    }
    if delimiters.is_empty() {
        return None;
    }

    let first = delimiters[0].0;
    let preamble = body[..strip_preceding_crlf(body, first)].to_vec();

    let mut parts = Vec::new();
    for w in delimiters.windows(2) {
        let (_, content_start, closing) = w[0];
        if closing {
            break;
        }
        let (next_start, _, _) = w[1];
        let content_end = strip_preceding_crlf(body, next_start).max(content_start);
        parts.push(&body[content_start..content_end]);
    }

    let last = *delimiters.last().unwrap();
    let epilogue = if last.2 {
        body[last.1..].to_vec()
    } else {
        // Unterminated multipart: everything after the last delimiter is
        // one final part.
        parts.push(&body[last.1..]);
        Vec::new()
    };

    Some((preamble, parts, epilogue))
}

/// Some(false) for `--boundary`, Some(true) for `--boundary--`,
/// None otherwise. Trailing transport padding is tolerated.
fn classify_delimiter(line: &[u8], boundary: &str) -> Option<bool> {
    let rest = line.strip_prefix(b"--")?;
    let rest = rest.strip_prefix(boundary.as_bytes())?;
    let rest: &[u8] = match rest.strip_prefix(b"--") {
        Some(tail) => {
            if tail.iter().all(|&b| b == b' ' || b == b'\t') {
                return Some(true);
            }
            tail
        }
        None => rest,
    };
    if rest.iter().all(|&b| b == b' ' || b == b'\t') {
        Some(false)
    } else {
        None
    }
}

fn strip_preceding_crlf(body: &[u8], pos: usize) -> usize {
    if pos >= 2 && &body[pos - 2..pos] == b"\r\n" {
        pos - 2
    } else if pos >= 1 && body[pos - 1] == b'\n' {
        pos - 1
    } else {
        pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE: &[u8] =
        b"From: a@x\r\nSubject: hi\r\nContent-Type: text/plain; charset=utf-8\r\n\r\nHello, world.\r\n";

    const MULTI: &[u8] = b"MIME-Version: 1.0\r\n\
Content-Type: multipart/alternative; boundary=sep\r\n\
\r\n\
--sep\r\n\
Content-Type: text/plain\r\n\
\r\n\
Plain body.\r\n\
--sep\r\n\
Content-Type: text/html\r\n\
\r\n\
<p>Html body.</p>\r\n\
--sep--\r\n";

    #[test]
    fn plain_message_round_trips_bytes() {
        let msg = MimeMessage::parse(SIMPLE);
        assert_eq!(msg.emit(), SIMPLE);
        assert_eq!(msg.subject().as_deref(), Some("hi"));
        assert_eq!(msg.body_text().as_deref(), Some("Hello, world.\r\n"));
    }

    #[test]
    fn multipart_round_trips_bytes() {
        let msg = MimeMessage::parse(MULTI);
        assert!(msg.is_multipart());
        assert_eq!(msg.parts().len(), 2);
        assert_eq!(msg.emit(), MULTI);
    }

    #[test]
    fn round_trip_law_holds() {
        for bytes in [SIMPLE, MULTI] {
            let once = MimeMessage::parse(bytes);
            let twice = MimeMessage::parse(&once.emit());
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn preamble_and_epilogue_preserved() {
        let raw = b"Content-Type: multipart/mixed; boundary=b1\r\n\r\n\
This is the preamble.\r\n\
--b1\r\n\
\r\n\
inner\r\n\
--b1--\r\n\
This is the epilogue.\r\n";
        let msg = MimeMessage::parse(raw);
        assert_eq!(msg.emit(), raw);
        let once = MimeMessage::parse(&msg.emit());
        assert_eq!(once, msg);
    }

    #[test]
    fn nested_multipart() {
        let raw = b"Content-Type: multipart/mixed; boundary=outer\r\n\r\n\
--outer\r\n\
Content-Type: multipart/alternative; boundary=inner\r\n\
\r\n\
--inner\r\n\
Content-Type: text/plain\r\n\
\r\n\
deep\r\n\
--inner--\r\n\
--outer--\r\n";
        let msg = MimeMessage::parse(raw);
        assert_eq!(msg.parts().len(), 1);
        assert_eq!(msg.parts()[0].parts().len(), 1);
        assert_eq!(
            msg.parts()[0].parts()[0].body_text().as_deref(),
            Some("deep")
        );
        assert_eq!(msg.emit(), raw);
    }

    #[test]
    fn quoted_printable_body_decodes() {
        let raw = b"Content-Type: text/plain; charset=iso-8859-1\r\n\
Content-Transfer-Encoding: quoted-printable\r\n\
\r\n\
caf=E9 au lait=\r\n\
 continued";
        let msg = MimeMessage::parse(raw);
        assert_eq!(
            msg.body_text().as_deref(),
            Some("café au lait continued")
        );
    }

    #[test]
    fn base64_body_decodes() {
        let raw = b"Content-Type: application/octet-stream\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
SGVsbG8h\r\n";
        let msg = MimeMessage::parse(raw);
        assert_eq!(msg.decoded_body().unwrap(), b"Hello!");
    }

    #[test]
    fn encoded_word_subject() {
        let raw = b"Subject: =?UTF-8?Q?Gr=C3=BC=C3=9Fe?=\r\n\r\n";
        let msg = MimeMessage::parse(raw);
        assert_eq!(msg.subject().as_deref(), Some("Grüße"));
    }

    #[test]
    fn find_media_type_descends() {
        let msg = MimeMessage::parse(MULTI);
        let html = msg.find_media_type("text/html").unwrap();
        assert_eq!(html.body_text().as_deref(), Some("<p>Html body.</p>"));
    }

    #[test]
    fn boundary_absent_from_body_is_leaf() {
        let raw = b"Content-Type: multipart/mixed; boundary=nope\r\n\r\njust text\r\n";
        let msg = MimeMessage::parse(raw);
        assert!(!msg.is_multipart());
    }
}
