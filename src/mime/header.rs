/*
 * header.rs
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

//! Message header fields: ordered `name: value` list with RFC 5322
//! unfolding on parse. Names compare case-insensitively; values keep
//! their raw bytes (charset decisions belong to the caller).

/// One header field. `value` is unfolded raw bytes after the colon,
/// with the optional single leading space stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: Vec<u8>,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// Value as text: UTF-8 when valid, ISO-8859-1 otherwise.
    pub fn value_text(&self) -> String {
        match std::str::from_utf8(&self.value) {
            Ok(s) => s.to_string(),
            Err(_) => self.value.iter().map(|&b| b as char).collect(),
        }
    }
}

/// Parse a header block. Returns the fields and the offset of the first
/// body byte (past the blank separator line). A message with no blank
/// line is all headers.
pub fn parse_headers(bytes: &[u8]) -> (Vec<Header>, usize) {
    let mut headers = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let (line_end, next) = line_span(bytes, pos);
        let line = &bytes[pos..line_end];
        if line.is_empty() {
            return (headers, next);
        }
        if line[0] == b' ' || line[0] == b'\t' {
            // Continuation of the previous field: leading whitespace run
            // collapses to a single space.
            if let Some(last) = headers.last_mut() {
                let trimmed = line
                    .iter()
                    .position(|&b| b != b' ' && b != b'\t')
                    .map(|i| &line[i..])
                    .unwrap_or(&[]);
                last.value.push(b' ');
                last.value.extend_from_slice(trimmed);
            }
            pos = next;
            continue;
        }
        match line.iter().position(|&b| b == b':') {
            Some(colon) if colon > 0 => {
                let name = String::from_utf8_lossy(&line[..colon]).into_owned();
                let mut value = &line[colon + 1..];
                if value.first() == Some(&b' ') {
                    value = &value[1..];
                }
                headers.push(Header::new(name, value));
            }
            _ => {
                // Not a header field; treat everything from here as body.
                return (headers, pos);
            }
        }
        pos = next;
    }
    (headers, bytes.len())
}

/// Serialize a header block (no terminating blank line).
pub fn emit_headers(headers: &[Header], out: &mut Vec<u8>) {
    for h in headers {
        out.extend_from_slice(h.name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(&h.value);
        out.extend_from_slice(b"\r\n");
    }
}

/// (end of line content, start of next line); tolerates bare LF.
fn line_span(bytes: &[u8], start: usize) -> (usize, usize) {
    match bytes[start..].iter().position(|&b| b == b'\n') {
        Some(i) => {
            let nl = start + i;
            let end = if nl > start && bytes[nl - 1] == b'\r' {
                nl - 1
            } else {
                nl
            };
            (end, nl + 1)
        }
        None => (bytes.len(), bytes.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_order() {
        let (headers, body) =
            parse_headers(b"From: a@x\r\nTo: b@y\r\nSubject: hi\r\n\r\nbody");
        assert_eq!(headers.len(), 3);
        assert_eq!(headers[0].name, "From");
        assert_eq!(headers[2].value, b"hi");
        assert_eq!(body, 35);
    }

    #[test]
    fn unfolds_continuation_lines() {
        let (headers, _) =
            parse_headers(b"Subject: a long\r\n   folded subject\r\n\r\n");
        assert_eq!(headers[0].value, b"a long folded subject");
    }

    #[test]
    fn no_space_after_colon() {
        let (headers, _) = parse_headers(b"X-Test:value\r\n\r\n");
        assert_eq!(headers[0].value, b"value");
    }

    #[test]
    fn headers_only_message() {
        let (headers, body) = parse_headers(b"From: a@x\r\n");
        assert_eq!(headers.len(), 1);
        assert_eq!(body, 11);
    }

    #[test]
    fn emit_matches_canonical_form() {
        let headers = vec![
            Header::new("From", b"a@x".to_vec()),
            Header::new("Subject", b"hi".to_vec()),
        ];
        let mut out = Vec::new();
        emit_headers(&headers, &mut out);
        assert_eq!(out, b"From: a@x\r\nSubject: hi\r\n");
    }
}
