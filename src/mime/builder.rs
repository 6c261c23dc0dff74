/*
 * builder.rs
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

//! Message builder: assemble a MIME tree from plain text, HTML and
//! attachments. Headers are emitted in canonical order, bodies are
//! transfer-encoded so no emitted line exceeds the RFC 5322 limit, and
//! generated boundaries are checked against part content.

use chrono::{DateTime, FixedOffset, Utc};

use crate::mime::base64;
use crate::mime::message::{Body, MimeMessage};
use crate::mime::quoted_printable;
use crate::mime::rfc2047;

/// Hard cap on emitted line length (RFC 5322 §2.1.1).
const MAX_LINE: usize = 998;

/// An attachment to include in a built message.
#[derive(Debug, Clone)]
pub struct AttachmentPart {
    pub filename: Option<String>,
    pub media_type: String,
    pub content: Vec<u8>,
}

/// Builds an RFC 5322 / MIME message tree.
#[derive(Default)]
pub struct MessageBuilder {
    from: Vec<String>,
    to: Vec<String>,
    cc: Vec<String>,
    bcc: Vec<String>,
    subject: Option<String>,
    date: Option<DateTime<FixedOffset>>,
    message_id: Option<String>,
    text_plain: Option<String>,
    text_html: Option<String>,
    attachments: Vec<AttachmentPart>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from(mut self, addr: impl Into<String>) -> Self {
        self.from.push(addr.into());
        self
    }

    pub fn to(mut self, addr: impl Into<String>) -> Self {
        self.to.push(addr.into());
        self
    }

    pub fn cc(mut self, addr: impl Into<String>) -> Self {
        self.cc.push(addr.into());
        self
    }

    pub fn bcc(mut self, addr: impl Into<String>) -> Self {
        self.bcc.push(addr.into());
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn date(mut self, date: DateTime<FixedOffset>) -> Self {
        self.date = Some(date);
        self
    }

    pub fn message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.text_plain = Some(body.into());
        self
    }

    pub fn html(mut self, body: impl Into<String>) -> Self {
        self.text_html = Some(body.into());
        self
    }

    pub fn attach(mut self, attachment: AttachmentPart) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Assemble the tree. Returns a message whose emit() output is ready
    /// for APPEND or SMTP DATA.
    pub fn build(self) -> MimeMessage {
        let mut content = match (&self.text_plain, &self.text_html) {
            (Some(plain), Some(html)) => {
                let parts = vec![text_part(plain, "text/plain"), text_part(html, "text/html")];
                multipart("multipart/alternative", parts)
            }
            (None, Some(html)) => text_part(html, "text/html"),
            (plain, None) => text_part(plain.as_deref().unwrap_or(""), "text/plain"),
        };

        if !self.attachments.is_empty() {
            let mut parts = vec![content];
            for att in &self.attachments {
                parts.push(attachment_part(att));
            }
            content = multipart("multipart/mixed", parts);
        }

        let mut headers = MimeMessage::default();
        append_address(&mut headers, "From", &self.from);
        append_address(&mut headers, "To", &self.to);
        append_address(&mut headers, "Cc", &self.cc);
        append_address(&mut headers, "Bcc", &self.bcc);
        if let Some(subject) = &self.subject {
            headers.add_header("Subject", rfc2047::encode_header_value(subject));
        }
        let date = self
            .date
            .unwrap_or_else(|| Utc::now().fixed_offset());
        headers.add_header("Date", date.to_rfc2822());
        if let Some(id) = &self.message_id {
            headers.add_header("Message-ID", id.clone());
        }
        headers.add_header("MIME-Version", "1.0");

        // Graft the top-level content headers onto the root entity.
        let mut root = headers;
        for h in content.headers {
            root.headers.push(h);
        }
        root.body = content.body;
        root
    }
}

fn append_address(msg: &mut MimeMessage, name: &str, addrs: &[String]) {
    if addrs.is_empty() {
        return;
    }
    let encoded: Vec<String> = addrs
        .iter()
        .map(|a| rfc2047::encode_header_value(a))
        .collect();
    msg.add_header(name, encoded.join(", "));
}

/// Leaf text entity: 7bit when the content is plain ASCII with short
/// lines, quoted-printable otherwise.
fn text_part(text: &str, media_type: &str) -> MimeMessage {
    let canonical = canonicalize_newlines(text);
    let needs_encoding = !canonical.is_ascii()
        || canonical
            .split(|&b: &u8| b == b'\n')
            .any(|l| l.len() > MAX_LINE - 2);
    let mut part = MimeMessage::default();
    part.add_header(
        "Content-Type",
        format!("{}; charset=utf-8", media_type),
    );
    if needs_encoding {
        part.add_header("Content-Transfer-Encoding", "quoted-printable");
        part.body = Body::Raw(quoted_printable::encode(&canonical));
    } else {
        part.add_header("Content-Transfer-Encoding", "7bit");
        part.body = Body::Raw(canonical);
    }
    part
}

fn attachment_part(att: &AttachmentPart) -> MimeMessage {
    let mut part = MimeMessage::default();
    part.add_header("Content-Type", att.media_type.clone());
    if let Some(name) = &att.filename {
        part.add_header(
            "Content-Disposition",
            format!(
                "attachment; filename=\"{}\"",
                name.replace('\\', "\\\\").replace('"', "\\\"")
            ),
        );
    } else {
        part.add_header("Content-Disposition", "attachment");
    }
    part.add_header("Content-Transfer-Encoding", "base64");
    part.body = Body::Raw(base64::encode_wrapped(&att.content));
    part
}

fn multipart(media_type: &str, parts: Vec<MimeMessage>) -> MimeMessage {
    let boundary = generate_boundary(&parts);
    let mut msg = MimeMessage::default();
    msg.add_header(
        "Content-Type",
        format!("{}; boundary=\"{}\"", media_type, boundary),
    );
    msg.body = Body::Multipart {
        boundary,
        preamble: Vec::new(),
        parts,
        epilogue: Vec::new(),
    };
    msg
}

/// Counter-derived boundary, re-rolled until it occurs verbatim in no
/// part's serialization.
fn generate_boundary(parts: &[MimeMessage]) -> String {
    let serialized: Vec<Vec<u8>> = parts.iter().map(MimeMessage::emit).collect();
    let pid = std::process::id();
    let mut counter = 0u32;
    loop {
        let candidate = format!("=_busta_{}_{:04}", pid, counter);
        let collides = serialized.iter().any(|bytes| {
            bytes
                .windows(candidate.len())
                .any(|w| w == candidate.as_bytes())
        });
        if !collides {
            return candidate;
        }
        counter += 1;
    }
}

fn canonicalize_newlines(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() + 16);
    let mut chars = text.bytes().peekable();
    while let Some(b) = chars.next() {
        match b {
            b'\r' => {
                out.extend_from_slice(b"\r\n");
                if chars.peek() == Some(&b'\n') {
                    chars.next();
                }
            }
            b'\n' => out.extend_from_slice(b"\r\n"),
            other => out.push(other),
        }
    }
    out
}
