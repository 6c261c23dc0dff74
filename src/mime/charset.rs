/*
 * charset.rs
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

//! Charset conversion: US-ASCII, UTF-8 and ISO-8859-1. Unknown charsets
//! fall back to lossy UTF-8.

/// Decode body or header bytes in the named charset.
pub fn decode(bytes: &[u8], charset: &str) -> String {
    match normalize(charset) {
        Charset::Ascii | Charset::Utf8 | Charset::Other => {
            String::from_utf8_lossy(bytes).into_owned()
        }
        Charset::Latin1 => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// Encode a string in the named charset. Characters outside ISO-8859-1
/// become `?` when that charset is requested.
pub fn encode(s: &str, charset: &str) -> Vec<u8> {
    match normalize(charset) {
        Charset::Ascii => s
            .chars()
            .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
            .collect(),
        Charset::Latin1 => s
            .chars()
            .map(|c| if (c as u32) <= 0xFF { c as u8 } else { b'?' })
            .collect(),
        Charset::Utf8 | Charset::Other => s.as_bytes().to_vec(),
    }
}

enum Charset {
    Ascii,
    Utf8,
    Latin1,
    Other,
}

fn normalize(charset: &str) -> Charset {
    match charset.trim().to_ascii_lowercase().as_str() {
        "us-ascii" | "ascii" => Charset::Ascii,
        "utf-8" | "utf8" => Charset::Utf8,
        "iso-8859-1" | "iso_8859-1" | "latin1" | "latin-1" => Charset::Latin1,
        _ => Charset::Other,
    }
}
