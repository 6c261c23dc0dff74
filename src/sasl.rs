/*
 * sasl.rs
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

//! Authentication helpers: PLAIN initial response, LOGIN challenge
//! responses, POP3 APOP digest, and the base64 wire form used by
//! AUTH exchanges.

use md5::{Digest, Md5};

#[derive(Debug)]
pub struct SaslError {
    pub message: String,
}

impl SaslError {
    pub fn invalid(msg: &str) -> Self {
        Self {
            message: msg.to_string(),
        }
    }
}

impl std::fmt::Display for SaslError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for SaslError {}

/// PLAIN initial response: authzid NUL authcid NUL password (RFC 4616).
pub fn initial_response_plain(
    authzid: &str,
    authcid: &str,
    password: &str,
) -> Result<Vec<u8>, SaslError> {
    if authcid.contains('\0') || password.contains('\0') {
        return Err(SaslError::invalid("NUL in PLAIN credentials"));
    }
    let mut out = Vec::with_capacity(authzid.len() + authcid.len() + password.len() + 2);
    out.extend_from_slice(authzid.as_bytes());
    out.push(0);
    out.extend_from_slice(authcid.as_bytes());
    out.push(0);
    out.extend_from_slice(password.as_bytes());
    Ok(out)
}

/// LOGIN: first challenge is "Username:", second is "Password:".
pub fn login_respond_to_challenge(
    challenge_b64: &str,
    authcid: &str,
    password: &str,
) -> Result<Vec<u8>, SaslError> {
    let decoded = base64_decode(challenge_b64)?;
    let s = String::from_utf8_lossy(&decoded).to_lowercase();
    if s.contains("username") {
        Ok(base64_encode(authcid.as_bytes()))
    } else if s.contains("password") {
        Ok(base64_encode(password.as_bytes()))
    } else {
        Err(SaslError::invalid("unexpected LOGIN challenge"))
    }
}

/// APOP digest (RFC 1939 §7): lowercase hex MD5 of timestamp ++ secret,
/// where timestamp is the `<...>` msg-id from the server greeting.
pub fn apop_digest(timestamp: &str, secret: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(timestamp.as_bytes());
    hasher.update(secret.as_bytes());
    bytes_to_hex(&hasher.finalize())
}

pub fn base64_encode(b: &[u8]) -> Vec<u8> {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut out = Vec::with_capacity((b.len() + 2) / 3 * 4);
    for chunk in b.chunks(3) {
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

pub fn base64_decode(encoded: &str) -> Result<Vec<u8>, SaslError> {
    let encoded = encoded.trim();
    let mut out = Vec::with_capacity(encoded.len() * 3 / 4);
    let mut n = 0u32;
    let mut bits = 0u8;
    for b in encoded.bytes() {
        let v = match b {
            b'A'..=b'Z' => (b - b'A') as u32,
            b'a'..=b'z' => (b - b'a' + 26) as u32,
            b'0'..=b'9' => (b - b'0' + 52) as u32,
            b'+' => 62,
            b'/' => 63,
            b'=' => continue,
            _ => return Err(SaslError::invalid("invalid base64")),
        };
        n = (n << 6) | v;
        bits += 6;
        if bits >= 8 {
            bits -= 8;
            out.push((n >> bits) as u8);
        }
    }
    Ok(out)
}

fn bytes_to_hex(b: &[u8]) -> String {
    const HEX: &[u8] = b"0123456789abcdef";
    let mut s = String::with_capacity(b.len() * 2);
    for &x in b {
        s.push(HEX[(x >> 4) as usize] as char);
        s.push(HEX[(x & 15) as usize] as char);
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_initial_response() {
        let r = initial_response_plain("", "user", "pass").unwrap();
        assert_eq!(r, b"\0user\0pass");
    }

    #[test]
    fn login_challenges() {
        let user_challenge = String::from_utf8(base64_encode(b"Username:")).unwrap();
        let r = login_respond_to_challenge(&user_challenge, "tim", "secret").unwrap();
        assert_eq!(base64_decode(std::str::from_utf8(&r).unwrap()).unwrap(), b"tim");
        let pass_challenge = String::from_utf8(base64_encode(b"Password:")).unwrap();
        let r = login_respond_to_challenge(&pass_challenge, "tim", "secret").unwrap();
        assert_eq!(
            base64_decode(std::str::from_utf8(&r).unwrap()).unwrap(),
            b"secret"
        );
    }

    #[test]
    fn apop_rfc_example() {
        // RFC 1939 §7 worked example.
        let digest = apop_digest(
            "<1896.697170952@dbc.mtview.ca.us>",
            "tanstaaf",
        );
        assert_eq!(digest, "c4c9334bac560ecc979e58001b3e22fb");
    }

    #[test]
    fn base64_round_trip() {
        let data = b"any carnal pleasure.";
        let enc = base64_encode(data);
        let dec = base64_decode(std::str::from_utf8(&enc).unwrap()).unwrap();
        assert_eq!(dec, data);
    }
}
