/*
 * content_type.rs
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

//! Structured headers: Content-Type (RFC 2045) and Content-Disposition
//! (RFC 2183), with quoted parameter values and RFC 2231
//! continuation/charset extended parameters.

use std::collections::HashMap;

use crate::mime::charset;

/// Checks if a character is valid in an RFC 2045 token.
#[inline]
pub fn is_token_char(c: u8) -> bool {
    matches!(c,
        b'0'..=b'9' | b'A'..=b'Z' | b'a'..=b'z' |
        b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' |
        b'^' | b'_' | b'`' | b'{' | b'|' | b'}' | b'~'
    )
}

/// Checks if the string is a valid RFC 2045 token (1+ token chars).
pub fn is_token(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(is_token_char)
}

/// Checks if a character is valid in a MIME boundary (RFC 2046).
#[inline]
pub fn is_boundary_char(c: u8) -> bool {
    matches!(c,
        b'0'..=b'9' | b'A'..=b'Z' | b'a'..=b'z' |
        b'\'' | b'(' | b')' | b'+' | b'_' | b',' | b'-' | b'.' |
        b'/' | b':' | b'=' | b'?' | b' '
    )
}

/// Validates a MIME boundary: 1-70 chars from the boundary set, not
/// ending in a space (RFC 2046).
pub fn is_valid_boundary(boundary: &str) -> bool {
    let b = boundary.as_bytes();
    (1..=70).contains(&b.len())
        && b.iter().copied().all(is_boundary_char)
        && !boundary.ends_with(' ')
}

/// A single `name=value` header parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    name: String,
    value: String,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

/// Parsed Content-Type value: type/subtype plus a parameter map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    primary_type: String,
    sub_type: String,
    parameters: HashMap<String, String>,
}

impl ContentType {
    pub fn new(
        primary_type: impl Into<String>,
        sub_type: impl Into<String>,
        parameters: Vec<Parameter>,
    ) -> Self {
        Self {
            primary_type: primary_type.into(),
            sub_type: sub_type.into(),
            parameters: parameters
                .into_iter()
                .map(|p| (p.name.to_lowercase(), p.value))
                .collect(),
        }
    }

    pub fn primary_type(&self) -> &str {
        &self.primary_type
    }

    pub fn sub_type(&self) -> &str {
        &self.sub_type
    }

    /// `type/subtype`, lowercased.
    pub fn media_type(&self) -> String {
        format!(
            "{}/{}",
            self.primary_type.to_lowercase(),
            self.sub_type.to_lowercase()
        )
    }

    pub fn is_primary_type(&self, t: &str) -> bool {
        self.primary_type.eq_ignore_ascii_case(t)
    }

    pub fn is_mime_type(&self, primary: &str, sub: &str) -> bool {
        self.is_primary_type(primary) && self.sub_type.eq_ignore_ascii_case(sub)
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn boundary(&self) -> Option<&str> {
        self.parameter("boundary").filter(|b| is_valid_boundary(b))
    }

    pub fn charset(&self) -> Option<&str> {
        self.parameter("charset")
    }
}

/// Parsed Content-Disposition value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDisposition {
    disposition_type: String,
    parameters: HashMap<String, String>,
}

impl ContentDisposition {
    pub fn disposition_type(&self) -> &str {
        &self.disposition_type
    }

    pub fn is_attachment(&self) -> bool {
        self.disposition_type.eq_ignore_ascii_case("attachment")
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn filename(&self) -> Option<&str> {
        self.parameter("filename")
    }
}

/// Parse a Content-Type header value.
pub fn parse_content_type(value: &str) -> Option<ContentType> {
    let value = value.trim();
    let (type_part, params_part) = split_value(value);
    let slash = type_part.find('/')?;
    let primary = type_part[..slash].trim();
    let sub = type_part[slash + 1..].trim();
    if !is_token(primary) || !is_token(sub) {
        return None;
    }
    Some(ContentType::new(
        primary,
        sub,
        parse_parameter_list(params_part),
    ))
}

/// Parse a Content-Disposition header value.
pub fn parse_content_disposition(value: &str) -> Option<ContentDisposition> {
    let value = value.trim();
    let (disp_part, params_part) = split_value(value);
    if !is_token(disp_part) {
        return None;
    }
    Some(ContentDisposition {
        disposition_type: disp_part.to_string(),
        parameters: parse_parameter_list(params_part)
            .into_iter()
            .map(|p| (p.name.to_lowercase(), p.value))
            .collect(),
    })
}

fn split_value(value: &str) -> (&str, &str) {
    match value.find(';') {
        Some(i) => (value[..i].trim(), value[i + 1..].trim()),
        None => (value, ""),
    }
}

/// Parse a semicolon-separated parameter list (`name=value`,
/// `name="value"`), then fold RFC 2231 extended parameters
/// (`name*0*=`, `name*1=`, `name*=charset'lang'pct-encoded`).
pub fn parse_parameter_list(params_part: &str) -> Vec<Parameter> {
    let raw = parse_raw_parameters(params_part);
    fold_rfc2231(raw)
}

fn parse_raw_parameters(params_part: &str) -> Vec<Parameter> {
    let mut parameters = Vec::new();
    let bytes = params_part.as_bytes();
    let len = bytes.len();
    let mut pos = 0;

    while pos < len {
        while pos < len && (bytes[pos] == b';' || bytes[pos].is_ascii_whitespace()) {
            pos += 1;
        }
        if pos >= len {
            break;
        }
        let eq = match bytes[pos..].iter().position(|&b| b == b'=') {
            Some(i) => pos + i,
            None => break,
        };
        let name = params_part[pos..eq].trim();
        pos = eq + 1;
        let value = if pos < len && bytes[pos] == b'"' {
            pos += 1;
            let mut v = String::new();
            while pos < len {
                let c = bytes[pos];
                if c == b'\\' && pos + 1 < len {
                    v.push(bytes[pos + 1] as char);
                    pos += 2;
                } else if c == b'"' {
                    pos += 1;
                    break;
                } else {
                    v.push(c as char);
                    pos += 1;
                }
            }
            v
        } else {
            let end = bytes[pos..]
                .iter()
                .position(|&b| b == b';')
                .map(|i| pos + i)
                .unwrap_or(len);
            let v = params_part[pos..end].trim().to_string();
            pos = end;
            v
        };
        if !name.is_empty() {
            parameters.push(Parameter::new(name, value));
        }
    }
    parameters
}

/// Fold `name*N[*]` continuations in section order and decode
/// `charset'lang'` percent-encoded extended values.
fn fold_rfc2231(raw: Vec<Parameter>) -> Vec<Parameter> {
    // (base name, section index, extended?) for continuations; plain
    // parameters pass straight through in order.
    let mut out: Vec<Parameter> = Vec::new();
    let mut continued: Vec<(String, Vec<(u32, bool, String)>)> = Vec::new();

    for p in raw {
        match parse_2231_name(&p.name) {
            Some((base, section, extended)) => {
                match continued.iter_mut().find(|(b, _)| *b == base) {
                    Some((_, sections)) => sections.push((section, extended, p.value)),
                    None => continued.push((base, vec![(section, extended, p.value)])),
                }
            }
            None => out.push(p),
        }
    }

    for (base, mut sections) in continued {
        sections.sort_by_key(|(n, _, _)| *n);
        let mut value = String::new();
        let mut cs: Option<String> = None;
        for (i, (_, extended, segment)) in sections.into_iter().enumerate() {
            if extended {
                let segment = if i == 0 {
                    // charset'language'value prefix on the first section.
                    let mut it = segment.splitn(3, '\'');
                    match (it.next(), it.next(), it.next()) {
                        (Some(c), Some(_lang), Some(rest)) => {
                            if !c.is_empty() {
                                cs = Some(c.to_string());
                            }
                            rest.to_string()
                        }
                        _ => segment,
                    }
                } else {
                    segment
                };
                let decoded = percent_decode(segment.as_bytes());
                value.push_str(&charset::decode(
                    &decoded,
                    cs.as_deref().unwrap_or("utf-8"),
                ));
            } else {
                value.push_str(&segment);
            }
        }
        out.push(Parameter::new(base, value));
    }
    out
}

/// `name*0` / `name*0*` / `name*` → (base, section, extended).
fn parse_2231_name(name: &str) -> Option<(String, u32, bool)> {
    let star = name.find('*')?;
    let base = &name[..star];
    let rest = &name[star + 1..];
    if rest.is_empty() {
        // name*= single-section extended value.
        return Some((base.to_string(), 0, true));
    }
    let (digits, extended) = match rest.strip_suffix('*') {
        Some(d) => (d, true),
        None => (rest, false),
    };
    let section: u32 = digits.parse().ok()?;
    Some((base.to_string(), section, extended))
}

fn percent_decode(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut pos = 0;
    while pos < bytes.len() {
        if bytes[pos] == b'%' && pos + 2 < bytes.len() + 1 {
            let hex = bytes.get(pos + 1..pos + 3);
            if let Some(hex) = hex {
                if let Ok(v) = u8::from_str_radix(std::str::from_utf8(hex).unwrap_or(""), 16) {
                    out.push(v);
                    pos += 3;
                    continue;
                }
            }
        }
        out.push(bytes[pos]);
        pos += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_content_type() {
        let ct = parse_content_type("text/plain; charset=utf-8").unwrap();
        assert_eq!(ct.media_type(), "text/plain");
        assert_eq!(ct.charset(), Some("utf-8"));
    }

    #[test]
    fn quoted_boundary_parameter() {
        let ct = parse_content_type("multipart/mixed; boundary=\"=_sep 42\"").unwrap();
        assert_eq!(ct.boundary(), Some("=_sep 42"));
    }

    #[test]
    fn quoted_value_with_escapes() {
        let cd = parse_content_disposition(
            "attachment; filename=\"quo\\\"ted.txt\"",
        )
        .unwrap();
        assert_eq!(cd.filename(), Some("quo\"ted.txt"));
    }

    #[test]
    fn rfc2231_continuation() {
        let cd = parse_content_disposition(
            "attachment; filename*0=\"long-file\"; filename*1=\"-name.txt\"",
        )
        .unwrap();
        assert_eq!(cd.filename(), Some("long-file-name.txt"));
    }

    #[test]
    fn rfc2231_charset_extended_value() {
        let ct = parse_content_type(
            "application/x-stuff; title*=iso-8859-1'en'%A3%20rates",
        )
        .unwrap();
        assert_eq!(ct.parameter("title"), Some("£ rates"));
    }

    #[test]
    fn rfc2231_mixed_sections() {
        let ct = parse_content_type(
            "application/x-stuff; title*0*=us-ascii'en'This%20is%20; title*1=plain",
        )
        .unwrap();
        assert_eq!(ct.parameter("title"), Some("This is plain"));
    }

    #[test]
    fn invalid_type_rejected() {
        assert!(parse_content_type("not a type").is_none());
    }

    #[test]
    fn boundary_validation() {
        assert!(is_valid_boundary("simple-boundary"));
        assert!(!is_valid_boundary(""));
        assert!(!is_valid_boundary(&"x".repeat(71)));
        assert!(!is_valid_boundary("ends with space "));
    }
}
