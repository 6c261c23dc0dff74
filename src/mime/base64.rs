/*
 * base64.rs
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

//! Base64 transfer encoding (RFC 2045 §6.8). The decoder is
//! incremental: it consumes only complete 4-character quanta, leaves
//! the remainder for the next call, and bounds its output. The encoder
//! wraps at 76 columns for message bodies.

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

const DECODE: [i8; 256] = {
    let mut t = [-1i8; 256];
    t[b' ' as usize] = -2;
    t[b'\t' as usize] = -2;
    t[b'\r' as usize] = -2;
    t[b'\n' as usize] = -2;
    let mut i = 0u8;
    while i < 26 {
        t[(b'A' + i) as usize] = i as i8;
        t[(b'a' + i) as usize] = (26 + i) as i8;
        i += 1;
    }
    let mut i = 0u8;
    while i < 10 {
        t[(b'0' + i) as usize] = (52 + i) as i8;
        i += 1;
    }
    t[b'+' as usize] = 62;
    t[b'/' as usize] = 63;
    t
};

const WHITESPACE: i8 = -2;

/// Decode base64 from `src` into `dst`, at most `max_decode` output
/// bytes. Whitespace is skipped, `=` ends the data. Only complete
/// quanta are consumed; an incomplete trailing quantum stays in `src`
/// unless `end_of_stream`, which flushes the remaining bits.
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
    let mut quantum: u32 = 0;
    let mut bits: u32 = 0;
    // Position after the last quantum actually written out; anything
    // beyond it is re-offered on the next call.
    let mut committed = *src_pos;
    let mut saw_padding = false;

    while *src_pos < src.len() {
        let b = src[*src_pos];
        *src_pos += 1;
        let v = DECODE[b as usize];
        if v >= 0 {
            quantum = (quantum << 6) | (v as u32);
            bits += 6;
            if bits == 24 {
                if *dst_pos + 3 <= dst_limit {
                    dst[*dst_pos] = (quantum >> 16) as u8;
                    dst[*dst_pos + 1] = (quantum >> 8) as u8;
                    dst[*dst_pos + 2] = quantum as u8;
                    *dst_pos += 3;
                    committed = *src_pos;
                    quantum = 0;
                    bits = 0;
                } else {
                    break;
                }
            }
        } else if v == WHITESPACE {
            if bits == 0 {
                committed = *src_pos;
            }
        } else if b == b'=' {
            saw_padding = true;
            break;
        }
        // Any other byte is not base64; skip it like whitespace rather
        // than failing the whole body.
    }

    if (saw_padding || end_of_stream) && bits >= 8 && *dst_pos < dst_limit {
        dst[*dst_pos] = (quantum >> (bits - 8)) as u8;
        *dst_pos += 1;
        if bits >= 16 && *dst_pos < dst_limit {
            dst[*dst_pos] = (quantum >> (bits - 16)) as u8;
            *dst_pos += 1;
        }
        committed = *src_pos;
    }

    *src_pos = committed;
    committed - start
}

/// Decode a complete base64 body in one call.
pub fn decode_to_vec(src: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; src.len() / 4 * 3 + 3];
    let mut src_pos = 0;
    let mut dst_pos = 0;
    let out_len = out.len();
    decode(src, &mut src_pos, &mut out, &mut dst_pos, out_len, true);
    out.truncate(dst_pos);
    out
}

/// Encode without line breaks (AUTH exchanges, encoded-words).
pub fn encode(src: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity((src.len() + 2) / 3 * 4);
    for chunk in src.chunks(3) {
        let n = (chunk[0] as usize) << 16
            | (chunk.get(1).copied().unwrap_or(0) as usize) << 8
            | chunk.get(2).copied().unwrap_or(0) as usize;
        out.push(ALPHABET[n >> 18]);
        out.push(ALPHABET[(n >> 12) & 63]);
        out.push(if chunk.len() > 1 {
            ALPHABET[(n >> 6) & 63]
        } else {
            b'='
        });
        out.push(if chunk.len() > 2 {
            ALPHABET[n & 63]
        } else {
            b'='
        });
    }
    out
}

/// Encode a message body: CRLF line breaks every 76 output characters.
pub fn encode_wrapped(src: &[u8]) -> Vec<u8> {
    let encoded = encode(src);
    let mut out = Vec::with_capacity(encoded.len() + encoded.len() / 76 * 2 + 2);
    for chunk in encoded.chunks(76) {
        out.extend_from_slice(chunk);
        out.extend_from_slice(b"\r\n");
    }
    out
}
