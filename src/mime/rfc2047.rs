/*
 * rfc2047.rs
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

//! RFC 2047 encoded-words in unstructured header values:
//! `=?charset?Q?text?=` and `=?charset?B?text?=`. Whitespace between
//! adjacent encoded words of the same charset and encoding is elided on
//! decode; the encoder emits Q or B words for non-ASCII header text.

use crate::mime::{base64, charset, quoted_printable};

/// Expand all encoded-words in a header value.
pub fn decode_encoded_words(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let bytes = s.as_bytes();
    let mut pos = 0;
    // Charset+encoding of the last decoded word; used for interword
    // whitespace elision.
    let mut prev_key: Option<String> = None;

    while pos < bytes.len() {
        match find_word(bytes, pos) {
            Some(word) => {
                let key = format!(
                    "{}/{}",
                    word.charset.to_ascii_lowercase(),
                    word.encoding.to_ascii_lowercase()
                );
                let literal = &s[pos..word.start];
                let elide = prev_key.as_deref() == Some(key.as_str())
                    && !literal.is_empty()
                    && literal.chars().all(char::is_whitespace);
                if !elide {
                    out.push_str(literal);
                }
                out.push_str(&word.decoded);
                pos = word.end;
                prev_key = Some(key);
            }
            None => {
                out.push_str(&s[pos..]);
                break;
            }
        }
    }
    out
}

struct DecodedWord {
    start: usize,
    end: usize,
    charset: String,
    encoding: char,
    decoded: String,
}

/// Find and decode the next well-formed encoded-word at or after `from`.
fn find_word(bytes: &[u8], from: usize) -> Option<DecodedWord> {
    let mut search = from;
    loop {
        let rel = bytes[search..].windows(2).position(|w| w == b"=?")?;
        let start = search + rel;
        if let Some(word) = decode_word_at(bytes, start) {
            return Some(word);
        }
        search = start + 2;
    }
}

fn decode_word_at(bytes: &[u8], start: usize) -> Option<DecodedWord> {
    let rest = &bytes[start + 2..];
    let q1 = rest.iter().position(|&b| b == b'?')?;
    let charset = std::str::from_utf8(&rest[..q1]).ok()?.trim();
    if charset.is_empty() {
        return None;
    }
    // Strip an RFC 2231 language tag (charset*lang).
    let charset = charset.split('*').next().unwrap_or(charset);
    let encoding = *rest.get(q1 + 1)? as char;
    if *rest.get(q1 + 2)? != b'?' {
        return None;
    }
    let payload_start = q1 + 3;
    let payload_rel = rest[payload_start..]
        .windows(2)
        .position(|w| w == b"?=")?;
    let payload = &rest[payload_start..payload_start + payload_rel];
    let raw = match encoding.to_ascii_lowercase() {
        'b' => decode_b(payload),
        'q' => decode_q(payload),
        _ => return None,
    };
    Some(DecodedWord {
        start,
        end: start + 2 + payload_start + payload_rel + 2,
        charset: charset.to_string(),
        encoding,
        decoded: charset::decode(&raw, charset),
    })
}

fn decode_b(payload: &[u8]) -> Vec<u8> {
    let mut dst = vec![0u8; payload.len() / 4 * 3 + 3];
    let mut src_pos = 0;
    let mut dst_pos = 0;
    let dst_len = dst.len();
    base64::decode(payload, &mut src_pos, &mut dst, &mut dst_pos, dst_len, true);
    dst.truncate(dst_pos);
    dst
}

/// Q encoding: `_` means space, the rest is quoted-printable.
fn decode_q(payload: &[u8]) -> Vec<u8> {
    let unscored: Vec<u8> = payload
        .iter()
        .map(|&b| if b == b'_' { b' ' } else { b })
        .collect();
    let mut dst = vec![0u8; unscored.len()];
    let mut src_pos = 0;
    let mut dst_pos = 0;
    let dst_len = dst.len();
    quoted_printable::decode(&unscored, &mut src_pos, &mut dst, &mut dst_pos, dst_len, true);
    dst.truncate(dst_pos);
    dst
}

fn q_safe(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'!' | b'*' | b'+' | b'-' | b'/')
}

/// Encode a header value for emission: ASCII text passes through,
/// anything else becomes a UTF-8 Q encoded-word (B when the Q form
/// would balloon).
pub fn encode_header_value(s: &str) -> String {
    if s.is_ascii() && !s.contains("=?") {
        return s.to_string();
    }
    let bytes = s.as_bytes();
    let escapes = bytes.iter().filter(|&&b| !q_safe(b) && b != b' ').count();
    if escapes * 3 > bytes.len() {
        return format!(
            "=?UTF-8?B?{}?=",
            String::from_utf8_lossy(&base64::encode(bytes))
        );
    }
    let mut payload = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        if b == b' ' {
            payload.push('_');
        } else if q_safe(b) {
            payload.push(b as char);
        } else {
            payload.push('=');
            payload.push(char::from_digit((b >> 4) as u32, 16).unwrap().to_ascii_uppercase());
            payload.push(char::from_digit((b & 15) as u32, 16).unwrap().to_ascii_uppercase());
        }
    }
    format!("=?UTF-8?Q?{}?=", payload)
}
