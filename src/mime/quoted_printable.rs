/*
 * quoted_printable.rs
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

//! Quoted-Printable transfer encoding (RFC 2045 §6.7). `=XX` hex
//! escapes, `=CRLF` soft line breaks, 76-column encoded lines. The
//! decoder is incremental: an `=` that may still complete into an
//! escape or soft break stays unconsumed until more input arrives or
//! the stream ends.

const HEX_DECODE: [i8; 256] = {
    let mut t = [-1i8; 256];
    let mut i = 0u8;
    while i < 10 {
        t[(b'0' + i) as usize] = i as i8;
        i += 1;
    }
    let mut i = 0u8;
    while i < 6 {
        t[(b'A' + i) as usize] = (10 + i) as i8;
        t[(b'a' + i) as usize] = (10 + i) as i8;
        i += 1;
    }
    t
};

const HEX_ENCODE: &[u8] = b"0123456789ABCDEF";

/// Decode quoted-printable from `src` into `dst`, at most `max_decode`
/// output bytes. Handles `=XX` and soft line breaks (`=CRLF`, `=LF`);
/// a malformed escape passes through literally. An incomplete `=` at
/// the end of `src` is left unconsumed unless `end_of_stream`.
/// Returns the number of bytes consumed from `src`.
pub fn decode(
    src: &[u8],
    src_pos: &mut usize,
    dst: &mut [u8],
    dst_pos: &mut usize,
    max_decode: usize,
    end_of_stream: bool,
) -> usize {
    let start = *src_pos;
    let dst_limit = (*dst_pos + max_decode).min(dst.len());

    while *src_pos < src.len() && *dst_pos < dst_limit {
        let b = src[*src_pos];
        if b != b'=' {
            dst[*dst_pos] = b;
            *dst_pos += 1;
            *src_pos += 1;
            continue;
        }
        let remaining = src.len() - *src_pos;
        if remaining >= 3 {
            let h1 = src[*src_pos + 1];
            let h2 = src[*src_pos + 2];
            let v1 = HEX_DECODE[h1 as usize];
            let v2 = HEX_DECODE[h2 as usize];
            if v1 >= 0 && v2 >= 0 {
                dst[*dst_pos] = ((v1 << 4) | v2) as u8;
                *dst_pos += 1;
                *src_pos += 3;
            } else if h1 == b'\r' && h2 == b'\n' {
                *src_pos += 3;
            } else if h1 == b'\n' {
                *src_pos += 2;
            } else {
                dst[*dst_pos] = b;
                *dst_pos += 1;
                *src_pos += 1;
            }
        } else if remaining == 2 {
            let next = src[*src_pos + 1];
            if next == b'\n' {
                *src_pos += 2;
            } else if end_of_stream {
                dst[*dst_pos] = b;
                *dst_pos += 1;
                *src_pos += 1;
            } else {
                // `=X` may complete into `=XX` or `=CRLF`; wait.
                break;
            }
        } else {
            if end_of_stream {
                dst[*dst_pos] = b;
                *dst_pos += 1;
                *src_pos += 1;
            } else {
                break;
            }
        }
    }
    *src_pos - start
}

/// Decode a complete quoted-printable body in one call.
pub fn decode_to_vec(src: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; src.len()];
    let mut src_pos = 0;
    let mut dst_pos = 0;
    let out_len = out.len();
    decode(src, &mut src_pos, &mut out, &mut dst_pos, out_len, true);
    out.truncate(dst_pos);
    out
}

fn needs_escape(b: u8) -> bool {
    !(b == b'\t' || (0x20..0x7f).contains(&b) && b != b'=')
}

/// Encode a message body: escape `=` and non-printables, protect
/// trailing whitespace before hard breaks, soft-wrap encoded lines at
/// 76 characters. Input CRLFs are preserved as hard breaks.
pub fn encode(src: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(src.len() + src.len() / 8);
    let mut col = 0;
    let mut pos = 0;
    while pos < src.len() {
        if src[pos] == b'\r' && src.get(pos + 1) == Some(&b'\n') {
            // Trailing space or tab before a hard break must be escaped.
            if let Some(&last) = out.last() {
                if (last == b' ' || last == b'\t') && !out.ends_with(b"\r\n") {
                    let ws = out.pop().unwrap();
                    out.push(b'=');
                    out.push(HEX_ENCODE[(ws >> 4) as usize]);
                    out.push(HEX_ENCODE[(ws & 15) as usize]);
                }
            }
            out.extend_from_slice(b"\r\n");
            col = 0;
            pos += 2;
            continue;
        }
        let b = src[pos];
        let width = if needs_escape(b) { 3 } else { 1 };
        // Keep room for a trailing soft-break marker.
        if col + width > 75 {
            out.extend_from_slice(b"=\r\n");
            col = 0;
        }
        if needs_escape(b) {
            out.push(b'=');
            out.push(HEX_ENCODE[(b >> 4) as usize]);
            out.push(HEX_ENCODE[(b & 15) as usize]);
        } else {
            out.push(b);
        }
        col += width;
        pos += 1;
    }
    out
}
