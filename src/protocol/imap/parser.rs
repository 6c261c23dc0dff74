/*
 * parser.rs
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

//! Per-command response parsers. Each parser consumes the untagged
//! units it declares interest in (accepts_untagged), accumulates a
//! typed result, and is finished with the tagged line. Atoms are ASCII,
//! quoted strings carry backslash escapes, literal bytes stay raw.

use chrono::{DateTime, FixedOffset};

use crate::framer::ImapUnit;
use crate::mime::{parse_headers, Body, MimeMessage};
use crate::protocol::imap::types::{
    AppendUid, CopyUid, GenericImapResult, Mailbox, MetaDataEntry, Response, SelectionState,
    Status,
};

/// A parsed tagged status line: `<tag> <STATUS> [CODE] text`.
#[derive(Debug, Clone)]
pub struct TaggedLine {
    pub tag: String,
    pub status: Status,
    pub code: Option<String>,
    pub message: String,
}

/// Parse a tagged line head. Returns None for untagged/continuation
/// lines or anything that does not follow the grammar.
pub fn parse_tagged(head: &str) -> Option<TaggedLine> {
    let mut sp = head.splitn(2, ' ');
    let tag = sp.next()?.to_string();
    if tag.is_empty() || tag == "*" || tag == "+" {
        return None;
    }
    let rest = sp.next()?.trim_start();
    let (status_word, after) = match rest.find(' ') {
        Some(i) => (&rest[..i], rest[i + 1..].trim_start()),
        None => (rest, ""),
    };
    let status = match status_word.to_uppercase().as_str() {
        "OK" => Status::Ok,
        "NO" => Status::No,
        "BAD" => Status::Bad,
        "BYE" => Status::Bye,
        _ => return None,
    };
    let (code, message) = split_response_code(after);
    Some(TaggedLine {
        tag,
        status,
        code,
        message,
    })
}

/// Split `[CODE ...] text` into (code, text).
fn split_response_code(s: &str) -> (Option<String>, String) {
    if let Some(rest) = s.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            let code = rest[..end].to_string();
            let message = rest[end + 1..].trim_start().to_string();
            return (Some(code), message);
        }
    }
    (None, s.to_string())
}

/// Numeric argument of a response code or untagged OK hint, e.g.
/// `code_number("UIDVALIDITY 3857529045", "UIDVALIDITY")`.
pub fn code_number(code: &str, name: &str) -> Option<u64> {
    let rest = code.trim().strip_prefix(name)?.trim_start();
    rest.split_whitespace().next()?.parse().ok()
}

fn parse_flag_tokens(s: &str) -> Vec<String> {
    s.split_whitespace().map(str::to_string).collect()
}

// ---------------------------------------------------------------------
// Token walker for parenthesized response payloads.

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Atom(String),
    Quoted(String),
    Literal(Vec<u8>),
    Open,
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Atom(String),
    Quoted(String),
    Literal(Vec<u8>),
    List(Vec<Node>),
}

impl Node {
    fn is_nil(&self) -> bool {
        matches!(self, Node::Atom(a) if a.eq_ignore_ascii_case("NIL"))
    }

    fn as_text(&self) -> Option<String> {
        match self {
            Node::Atom(a) if !a.eq_ignore_ascii_case("NIL") => Some(a.clone()),
            Node::Quoted(q) => Some(q.clone()),
            Node::Literal(l) => Some(String::from_utf8_lossy(l).into_owned()),
            _ => None,
        }
    }

    fn as_bytes(&self) -> Option<Vec<u8>> {
        match self {
            Node::Quoted(q) => Some(q.as_bytes().to_vec()),
            Node::Literal(l) => Some(l.clone()),
            Node::Atom(a) if !a.eq_ignore_ascii_case("NIL") => Some(a.as_bytes().to_vec()),
            _ => None,
        }
    }

    fn as_u32(&self) -> Option<u32> {
        match self {
            Node::Atom(a) => a.parse().ok(),
            _ => None,
        }
    }

    fn as_list(&self) -> Option<&[Node]> {
        match self {
            Node::List(l) => Some(l),
            _ => None,
        }
    }
}

/// Tokenize a whole unit, splicing literal bytes into the token stream
/// in place of their `{N}` announcements.
fn tokenize_unit(unit: &ImapUnit) -> Vec<Token> {
    let mut tokens = Vec::new();
    tokenize_text(&unit.head, !unit.parts.is_empty(), &mut tokens);
    for (i, (literal, text)) in unit.parts.iter().enumerate() {
        tokens.push(Token::Literal(literal.clone()));
        tokenize_text(text, i + 1 < unit.parts.len(), &mut tokens);
    }
    tokens
}

fn tokenize_text(text: &str, ends_with_literal: bool, tokens: &mut Vec<Token>) {
    let text = if ends_with_literal {
        strip_literal_marker(text)
    } else {
        text
    };
    let bytes = text.as_bytes();
    let mut pos = 0;
    while pos < bytes.len() {
        match bytes[pos] {
            b' ' | b'\t' => pos += 1,
            b'(' => {
                tokens.push(Token::Open);
                pos += 1;
            }
            b')' => {
                tokens.push(Token::Close);
                pos += 1;
            }
            b'"' => {
                let mut value = String::new();
                pos += 1;
                while pos < bytes.len() {
                    match bytes[pos] {
                        b'\\' if pos + 1 < bytes.len() => {
                            value.push(bytes[pos + 1] as char);
                            pos += 2;
                        }
                        b'"' => {
                            pos += 1;
                            break;
                        }
                        b => {
                            value.push(b as char);
                            pos += 1;
                        }
                    }
                }
                tokens.push(Token::Quoted(value));
            }
            _ => {
                // Atom; a bracket group (BODY[HEADER.FIELDS (FROM TO)])
                // is consumed whole, spaces and parens included.
                let start = pos;
                while pos < bytes.len() {
                    match bytes[pos] {
                        b'[' => {
                            while pos < bytes.len() && bytes[pos] != b']' {
                                pos += 1;
                            }
                            if pos < bytes.len() {
                                pos += 1;
                            }
                        }
                        b' ' | b'\t' | b'(' | b')' | b'"' => break,
                        _ => pos += 1,
                    }
                }
                tokens.push(Token::Atom(text[start..pos].to_string()));
            }
        }
    }
}

/// Drop a trailing `{N}` literal announcement from a text segment.
fn strip_literal_marker(text: &str) -> &str {
    let trimmed = text.trim_end();
    if trimmed.ends_with('}') {
        if let Some(open) = trimmed.rfind('{') {
            return &text[..open];
        }
    }
    text
}

fn build_nodes(tokens: &[Token], pos: &mut usize) -> Vec<Node> {
    let mut nodes = Vec::new();
    while *pos < tokens.len() {
        match &tokens[*pos] {
            Token::Open => {
                *pos += 1;
                nodes.push(Node::List(build_nodes(tokens, pos)));
            }
            Token::Close => {
                *pos += 1;
                return nodes;
            }
            Token::Atom(a) => {
                nodes.push(Node::Atom(a.clone()));
                *pos += 1;
            }
            Token::Quoted(q) => {
                nodes.push(Node::Quoted(q.clone()));
                *pos += 1;
            }
            Token::Literal(l) => {
                nodes.push(Node::Literal(l.clone()));
                *pos += 1;
            }
        }
    }
    nodes
}

fn parse_unit_nodes(unit: &ImapUnit) -> Vec<Node> {
    let tokens = tokenize_unit(unit);
    let mut pos = 0;
    build_nodes(&tokens, &mut pos)
}

// ---------------------------------------------------------------------
// Untagged unit classification shared by parsers and the scheduler.

/// Mailbox-state event carried by an unsolicited untagged response.
#[derive(Debug, Clone)]
pub enum StateEvent {
    Exists(u32),
    Recent(u32),
    Expunge(u32),
    Fetch { seq: u32, message: MimeMessage },
    Capabilities(String),
    Bye(String),
}

/// Classify an untagged unit that no command parser claimed.
pub fn parse_state_event(unit: &ImapUnit) -> Option<StateEvent> {
    let rest = unit.head.strip_prefix("* ")?.trim_start();
    if let Some(text) = rest.strip_prefix("BYE") {
        return Some(StateEvent::Bye(text.trim().to_string()));
    }
    if let Some(text) = rest.strip_prefix("CAPABILITY ") {
        return Some(StateEvent::Capabilities(text.trim().to_string()));
    }
    if rest.starts_with("OK") {
        let (code, _) = split_response_code(rest[2..].trim_start());
        if let Some(code) = code {
            if let Some(caps) = code.strip_prefix("CAPABILITY ") {
                return Some(StateEvent::Capabilities(caps.trim().to_string()));
            }
        }
        return None;
    }
    let mut words = rest.split_whitespace();
    let n: u32 = words.next()?.parse().ok()?;
    match words.next()?.to_uppercase().as_str() {
        "EXISTS" => Some(StateEvent::Exists(n)),
        "RECENT" => Some(StateEvent::Recent(n)),
        "EXPUNGE" => Some(StateEvent::Expunge(n)),
        "FETCH" => parse_fetch_unit(unit).map(|(seq, message)| StateEvent::Fetch { seq, message }),
        _ => None,
    }
}

fn is_untagged_fetch(unit: &ImapUnit) -> bool {
    let rest = match unit.head.strip_prefix("* ") {
        Some(r) => r.trim_start(),
        None => return false,
    };
    let mut words = rest.split_whitespace();
    words.next().map_or(false, |w| w.parse::<u32>().is_ok())
        && words
            .next()
            .map_or(false, |w| w.eq_ignore_ascii_case("FETCH"))
}

// ---------------------------------------------------------------------
// FETCH

/// Parse one `* <seq> FETCH (<items>)` unit into a MimeMessage.
pub fn parse_fetch_unit(unit: &ImapUnit) -> Option<(u32, MimeMessage)> {
    let rest = unit.head.strip_prefix("* ")?.trim_start();
    let mut words = rest.split_whitespace();
    let seq: u32 = words.next()?.parse().ok()?;
    if !words.next()?.eq_ignore_ascii_case("FETCH") {
        return None;
    }

    let nodes = parse_unit_nodes(unit);
    // The item list is the first List after the FETCH atom.
    let items_owned;
    let items: &[Node] = {
        let list = nodes.iter().find_map(Node::as_list)?;
        items_owned = list.to_vec();
        &items_owned
    };

    let mut msg = MimeMessage::default();
    msg.sequence_id = Some(seq);

    let mut i = 0;
    while i < items.len() {
        let key = match &items[i] {
            Node::Atom(a) => a.to_uppercase(),
            _ => {
                i += 1;
                continue;
            }
        };
        let value = items.get(i + 1);
        match key.as_str() {
            "UID" => {
                msg.uid = value.and_then(Node::as_u32);
                i += 2;
            }
            "FLAGS" => {
                if let Some(list) = value.and_then(Node::as_list) {
                    msg.flags = list.iter().filter_map(Node::as_text).collect();
                }
                i += 2;
            }
            "INTERNALDATE" => {
                msg.internal_date = value
                    .and_then(Node::as_text)
                    .and_then(|t| parse_internal_date(&t));
                i += 2;
            }
            "RFC822.SIZE" => {
                msg.size = value.and_then(Node::as_u32);
                i += 2;
            }
            "ENVELOPE" => {
                if let Some(list) = value.and_then(Node::as_list) {
                    apply_envelope(&mut msg, list);
                }
                i += 2;
            }
            // CONDSTORE per-message MODSEQ; consumed, not surfaced.
            "MODSEQ" => {
                i += 2;
            }
            "BODYSTRUCTURE" => {
                i += 2;
            }
            _ if key.starts_with("BODY[") || key.starts_with("BODY.PEEK[") => {
                let section = key
                    .find('[')
                    .and_then(|open| key[open + 1..].find(']').map(|close| &key[open + 1..open + 1 + close]))
                    .unwrap_or("");
                let bytes = value.and_then(Node::as_bytes);
                if let Some(bytes) = bytes {
                    apply_body_section(&mut msg, section, &bytes);
                }
                i += 2;
            }
            // BODY followed by a list is the non-extensible BODYSTRUCTURE form.
            "BODY" => {
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }
    Some((seq, msg))
}

/// INTERNALDATE per RFC 3501: `dd-Mon-yyyy hh:mm:ss +zzzz`, with the
/// day possibly space-padded.
fn parse_internal_date(text: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(text.trim(), "%d-%b-%Y %H:%M:%S %z").ok()
}

fn apply_body_section(msg: &mut MimeMessage, section: &str, bytes: &[u8]) {
    let section = section.to_uppercase();
    if section.is_empty() {
        // Full message: parse the MIME tree.
        let parsed = MimeMessage::parse(bytes);
        msg.headers = parsed.headers;
        msg.body = parsed.body;
    } else if section.starts_with("HEADER") {
        let (headers, _) = parse_headers(bytes);
        if msg.headers.is_empty() {
            msg.headers = headers;
        }
    } else {
        // TEXT or a numbered part: keep the raw bytes.
        if matches!(&msg.body, Body::Raw(b) if b.is_empty()) {
            msg.body = Body::Raw(bytes.to_vec());
        }
    }
}

/// ENVELOPE fields: date, subject, from, sender, reply-to, to, cc, bcc,
/// in-reply-to, message-id. Synthesize header fields the message does
/// not already carry.
fn apply_envelope(msg: &mut MimeMessage, env: &[Node]) {
    let names = [
        "Date",
        "Subject",
        "From",
        "Sender",
        "Reply-To",
        "To",
        "Cc",
        "Bcc",
        "In-Reply-To",
        "Message-ID",
    ];
    for (i, name) in names.iter().enumerate() {
        let node = match env.get(i) {
            Some(n) if !n.is_nil() => n,
            _ => continue,
        };
        let value = match node {
            Node::List(addresses) => format_address_list(addresses),
            other => other.as_text().unwrap_or_default(),
        };
        if !value.is_empty() && msg.header(name).is_none() {
            msg.add_header(*name, value.into_bytes());
        }
    }
}

/// Address structure list: each address is (name adl mailbox host).
fn format_address_list(addresses: &[Node]) -> String {
    let mut out = Vec::new();
    for addr in addresses {
        let fields = match addr.as_list() {
            Some(f) => f,
            None => continue,
        };
        let name = fields.first().and_then(Node::as_text);
        let mailbox = fields.get(2).and_then(Node::as_text);
        let host = fields.get(3).and_then(Node::as_text);
        let route = match (mailbox, host) {
            (Some(m), Some(h)) => format!("{}@{}", m, h),
            (Some(m), None) => m,
            _ => continue,
        };
        out.push(match name {
            Some(n) => format!("{} <{}>", n, route),
            None => route,
        });
    }
    out.join(", ")
}

// ---------------------------------------------------------------------
// LIST / LSUB

fn parse_list_unit(unit: &ImapUnit, keyword: &str) -> Option<(Vec<String>, Option<char>, String)> {
    let rest = unit.head.strip_prefix("* ")?.trim_start();
    let first = rest.split_whitespace().next()?;
    if !first.eq_ignore_ascii_case(keyword) {
        return None;
    }
    let nodes = parse_unit_nodes(unit);
    // keyword, (flags), delim, name
    let mut it = nodes.iter();
    // Skip leading atoms up to the flag list ("*" and the keyword).
    let flags = loop {
        match it.next()? {
            Node::List(l) => break l.iter().filter_map(Node::as_text).collect::<Vec<_>>(),
            _ => continue,
        }
    };
    let delim_node = it.next()?;
    let delim = if delim_node.is_nil() {
        None
    } else {
        delim_node.as_text().and_then(|s| s.chars().next())
    };
    let name = it.next()?.as_text().unwrap_or_default();
    Some((flags, delim, name))
}

// ---------------------------------------------------------------------
// The per-command parser variants (tagged dispatch, no inheritance).

/// Typed results carried inside a Response.
#[derive(Debug, Clone)]
pub enum ImapResult {
    None,
    Capabilities(Vec<String>),
    Mailboxes(Vec<Mailbox>),
    Selected(Mailbox),
    Ids(Vec<u32>),
    Messages(Vec<MimeMessage>),
    MetaData(Vec<MetaDataEntry>),
    Generic(GenericImapResult),
    Bye(String),
}

/// One parser per in-flight command. accepts_untagged decides whether a
/// unit is command-owned; everything declined goes to the event bus.
#[derive(Debug)]
pub enum ResponseParser {
    Capability {
        caps: Vec<String>,
    },
    List {
        is_lsub: bool,
        separator: Option<char>,
        mailboxes: Vec<Mailbox>,
    },
    Select {
        mailbox: Mailbox,
        examine: bool,
    },
    StatusCounts {
        mailbox: Mailbox,
    },
    Search {
        ids: Vec<u32>,
    },
    Fetch {
        messages: Vec<MimeMessage>,
    },
    MetaData {
        entries: Vec<MetaDataEntry>,
    },
    Noop,
    Logout {
        bye: Option<String>,
    },
    Generic,
}

impl ResponseParser {
    pub fn capability() -> Self {
        ResponseParser::Capability { caps: Vec::new() }
    }

    pub fn list(is_lsub: bool) -> Self {
        ResponseParser::List {
            is_lsub,
            separator: None,
            mailboxes: Vec::new(),
        }
    }

    pub fn select(mailbox: Mailbox, examine: bool) -> Self {
        ResponseParser::Select { mailbox, examine }
    }

    pub fn status(mailbox: Mailbox) -> Self {
        ResponseParser::StatusCounts { mailbox }
    }

    pub fn search() -> Self {
        ResponseParser::Search { ids: Vec::new() }
    }

    pub fn fetch() -> Self {
        ResponseParser::Fetch {
            messages: Vec::new(),
        }
    }

    pub fn metadata() -> Self {
        ResponseParser::MetaData {
            entries: Vec::new(),
        }
    }

    /// True when this parser owns the given untagged unit.
    pub fn accepts_untagged(&self, unit: &ImapUnit) -> bool {
        let head = unit.head.as_str();
        match self {
            ResponseParser::Capability { .. } => head.starts_with("* CAPABILITY"),
            ResponseParser::List { is_lsub, .. } => {
                let kw = if *is_lsub { "* LSUB " } else { "* LIST " };
                head.len() >= kw.len() && head[..kw.len()].eq_ignore_ascii_case(kw)
            }
            ResponseParser::Select { .. } => {
                let rest = match head.strip_prefix("* ") {
                    Some(r) => r.trim_start(),
                    None => return false,
                };
                rest.starts_with("OK")
                    || rest.starts_with("FLAGS")
                    || rest.ends_with("EXISTS")
                    || rest.ends_with("RECENT")
            }
            ResponseParser::StatusCounts { .. } => head.starts_with("* STATUS"),
            ResponseParser::Search { .. } => head.starts_with("* SEARCH"),
            ResponseParser::Fetch { .. } => is_untagged_fetch(unit),
            ResponseParser::MetaData { .. } => head.starts_with("* METADATA"),
            ResponseParser::Logout { .. } => head.starts_with("* BYE"),
            ResponseParser::Noop | ResponseParser::Generic => false,
        }
    }

    /// Accumulate a command-owned untagged unit.
    pub fn push(&mut self, unit: &ImapUnit) {
        match self {
            ResponseParser::Capability { caps } => {
                if let Some(text) = unit.head.strip_prefix("* CAPABILITY ") {
                    *caps = text.split_whitespace().map(|w| w.to_uppercase()).collect();
                }
            }
            ResponseParser::List {
                is_lsub,
                separator,
                mailboxes,
            } => {
                let keyword = if *is_lsub { "LSUB" } else { "LIST" };
                if let Some((flags, delim, name)) = parse_list_unit(unit, keyword) {
                    if separator.is_none() {
                        *separator = delim;
                    }
                    let mut mb = Mailbox::new(name, delim.or(*separator));
                    mb.flags = flags;
                    mailboxes.push(mb);
                }
            }
            ResponseParser::Select { mailbox, .. } => {
                apply_select_unit(mailbox, unit);
            }
            ResponseParser::StatusCounts { mailbox } => {
                apply_status_unit(mailbox, unit);
            }
            ResponseParser::Search { ids } => {
                if let Some(text) = unit.head.strip_prefix("* SEARCH") {
                    ids.extend(text.split_whitespace().filter_map(|w| w.parse::<u32>().ok()));
                }
            }
            ResponseParser::Fetch { messages } => {
                if let Some((_, msg)) = parse_fetch_unit(unit) {
                    messages.push(msg);
                }
            }
            ResponseParser::MetaData { entries } => {
                entries.extend(parse_metadata_unit(unit));
            }
            ResponseParser::Logout { bye } => {
                if let Some(text) = unit.head.strip_prefix("* BYE") {
                    *bye = Some(text.trim().to_string());
                }
            }
            ResponseParser::Noop | ResponseParser::Generic => {}
        }
    }

    /// Complete with the tagged line, producing the typed response.
    pub fn finish(self, tagged: &TaggedLine) -> Response<ImapResult> {
        let mut response = Response {
            status: tagged.status,
            message: if tagged.message.is_empty() {
                None
            } else {
                Some(tagged.message.clone())
            },
            code: tagged.code.clone(),
            result: None,
        };
        if tagged.status != Status::Ok {
            // NO/BAD/BYE carry no typed result; LOGOUT's BYE came untagged.
            if let ResponseParser::Logout { bye: Some(text) } = self {
                response.result = Some(ImapResult::Bye(text));
            }
            return response;
        }
        response.result = Some(match self {
            ResponseParser::Capability { mut caps } => {
                // Servers may put the final word in the tagged OK code.
                if caps.is_empty() {
                    if let Some(code) = &tagged.code {
                        if let Some(text) = code.strip_prefix("CAPABILITY ") {
                            caps = text.split_whitespace().map(|w| w.to_uppercase()).collect();
                        }
                    }
                }
                ImapResult::Capabilities(caps)
            }
            ResponseParser::List { mailboxes, .. } => ImapResult::Mailboxes(mailboxes),
            ResponseParser::Select {
                mut mailbox,
                examine,
            } => {
                if let Some(code) = &tagged.code {
                    if code.eq_ignore_ascii_case("READ-ONLY") {
                        mailbox.is_read_write = false;
                    } else if code.eq_ignore_ascii_case("READ-WRITE") {
                        mailbox.is_read_write = true;
                    }
                }
                mailbox.selection = if examine {
                    SelectionState::Examined
                } else {
                    SelectionState::Selected
                };
                ImapResult::Selected(mailbox)
            }
            ResponseParser::StatusCounts { mailbox } => ImapResult::Selected(mailbox),
            ResponseParser::Search { ids } => ImapResult::Ids(ids),
            ResponseParser::Fetch { messages } => ImapResult::Messages(messages),
            ResponseParser::MetaData { entries } => ImapResult::MetaData(entries),
            ResponseParser::Logout { bye } => ImapResult::Bye(bye.unwrap_or_default()),
            ResponseParser::Noop => ImapResult::None,
            ResponseParser::Generic => ImapResult::Generic(parse_generic(tagged)),
        });
        response
    }
}

fn apply_select_unit(mailbox: &mut Mailbox, unit: &ImapUnit) {
    let rest = match unit.head.strip_prefix("* ") {
        Some(r) => r.trim_start(),
        None => return,
    };
    if let Some(n) = rest
        .strip_suffix(" EXISTS")
        .and_then(|s| s.trim().parse::<u32>().ok())
    {
        mailbox.messages_exists = n;
        return;
    }
    if let Some(n) = rest
        .strip_suffix(" RECENT")
        .and_then(|s| s.trim().parse::<u32>().ok())
    {
        mailbox.messages_recent = n;
        return;
    }
    if let Some(flags) = rest.strip_prefix("FLAGS ") {
        mailbox.message_flags = parse_flag_tokens(flags.trim().trim_matches(|c| c == '(' || c == ')'));
        return;
    }
    if let Some(after_ok) = rest.strip_prefix("OK") {
        let (code, _) = split_response_code(after_ok.trim_start());
        let code = match code {
            Some(c) => c,
            None => return,
        };
        if let Some(n) = code_number(&code, "UIDVALIDITY") {
            mailbox.uid_validity = Some(n as u32);
        } else if let Some(n) = code_number(&code, "UIDNEXT") {
            mailbox.uid_next = Some(n as u32);
        } else if let Some(n) = code_number(&code, "UNSEEN") {
            mailbox.unseen = n as u32;
        } else if let Some(n) = code_number(&code, "HIGHESTMODSEQ") {
            mailbox.highest_mod_seq = Some(n);
        } else if let Some(flags) = code.strip_prefix("PERMANENTFLAGS ") {
            mailbox.permanent_flags =
                parse_flag_tokens(flags.trim().trim_matches(|c| c == '(' || c == ')'));
        }
    }
}

fn apply_status_unit(mailbox: &mut Mailbox, unit: &ImapUnit) {
    if !unit.head.starts_with("* STATUS") {
        return;
    }
    let nodes = parse_unit_nodes(unit);
    let counts = match nodes.iter().find_map(Node::as_list) {
        Some(l) => l,
        None => return,
    };
    let mut i = 0;
    while i + 1 < counts.len() {
        let key = match &counts[i] {
            Node::Atom(a) => a.to_uppercase(),
            _ => {
                i += 1;
                continue;
            }
        };
        let n = counts[i + 1].as_text().and_then(|t| t.parse::<u64>().ok());
        if let Some(n) = n {
            match key.as_str() {
                "MESSAGES" => mailbox.messages_exists = n as u32,
                "RECENT" => mailbox.messages_recent = n as u32,
                "UIDNEXT" => mailbox.uid_next = Some(n as u32),
                "UIDVALIDITY" => mailbox.uid_validity = Some(n as u32),
                "UNSEEN" => mailbox.unseen = n as u32,
                "HIGHESTMODSEQ" => mailbox.highest_mod_seq = Some(n),
                _ => {}
            }
        }
        i += 2;
    }
}

/// `* METADATA mailbox (entry value entry value ...)`; values may be
/// NIL, quoted or literal.
fn parse_metadata_unit(unit: &ImapUnit) -> Vec<MetaDataEntry> {
    if !unit.head.starts_with("* METADATA") {
        return Vec::new();
    }
    let nodes = parse_unit_nodes(unit);
    // *, METADATA, mailbox-name, (pairs)
    let mut mailbox_name = String::new();
    let mut pairs: &[Node] = &[];
    let mut seen_keyword = false;
    for node in &nodes {
        match node {
            Node::Atom(a) if a == "*" => {}
            Node::Atom(a) if a.eq_ignore_ascii_case("METADATA") => seen_keyword = true,
            Node::List(l) => {
                pairs = l;
                break;
            }
            other if seen_keyword && mailbox_name.is_empty() => {
                mailbox_name = other.as_text().unwrap_or_default();
            }
            _ => {}
        }
    }
    let mut entries = Vec::new();
    let mut i = 0;
    while i < pairs.len() {
        let entry = match pairs[i].as_text() {
            Some(e) => e,
            None => {
                i += 1;
                continue;
            }
        };
        let value = match pairs.get(i + 1) {
            Some(v) if v.is_nil() => None,
            Some(v) => v.as_bytes(),
            None => None,
        };
        entries.push(MetaDataEntry {
            mailbox_name: mailbox_name.clone(),
            entry,
            value,
        });
        i += 2;
    }
    entries
}

/// UIDPLUS hints from the tagged response code.
fn parse_generic(tagged: &TaggedLine) -> GenericImapResult {
    let mut result = GenericImapResult {
        response_code: tagged.code.clone(),
        ..GenericImapResult::default()
    };
    if let Some(code) = &tagged.code {
        if let Some(rest) = code.strip_prefix("COPYUID ") {
            let mut it = rest.split_whitespace();
            if let (Some(v), Some(src), Some(dst)) = (it.next(), it.next(), it.next()) {
                if let Ok(uid_validity) = v.parse() {
                    result.copy_uid = Some(CopyUid {
                        uid_validity,
                        source_uids: src.to_string(),
                        dest_uids: dst.to_string(),
                    });
                }
            }
        } else if let Some(rest) = code.strip_prefix("APPENDUID ") {
            let mut it = rest.split_whitespace();
            if let (Some(v), Some(u)) = (it.next(), it.next()) {
                if let (Ok(uid_validity), Ok(uid)) = (v.parse(), u.parse()) {
                    result.append_uid = Some(AppendUid { uid_validity, uid });
                }
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(head: &str) -> ImapUnit {
        ImapUnit::line(head)
    }

    fn ok_tagged(tag: &str) -> TaggedLine {
        parse_tagged(&format!("{} OK done", tag)).unwrap()
    }

    #[test]
    fn tagged_line_with_code() {
        let t = parse_tagged("a2 OK [READ-WRITE] SELECT completed").unwrap();
        assert_eq!(t.tag, "a2");
        assert_eq!(t.status, Status::Ok);
        assert_eq!(t.code.as_deref(), Some("READ-WRITE"));
        assert_eq!(t.message, "SELECT completed");
    }

    #[test]
    fn untagged_is_not_tagged() {
        assert!(parse_tagged("* OK ready").is_none());
        assert!(parse_tagged("+ idling").is_none());
    }

    #[test]
    fn capability_parser() {
        let mut p = ResponseParser::capability();
        let u = unit("* CAPABILITY IMAP4rev1 IDLE METADATA");
        assert!(p.accepts_untagged(&u));
        p.push(&u);
        let r = p.finish(&ok_tagged("a0"));
        match r.result.unwrap() {
            ImapResult::Capabilities(caps) => {
                assert_eq!(caps, vec!["IMAP4REV1", "IDLE", "METADATA"]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn capability_from_tagged_code() {
        let p = ResponseParser::capability();
        let t = parse_tagged("a0 OK [CAPABILITY IMAP4rev1 IDLE] logged in").unwrap();
        match p.finish(&t).result.unwrap() {
            ImapResult::Capabilities(caps) => assert_eq!(caps, vec!["IMAP4REV1", "IDLE"]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn list_parser_learns_separator() {
        let mut p = ResponseParser::list(false);
        let u = unit(r#"* LIST (\Noselect) "/" """#);
        assert!(p.accepts_untagged(&u));
        p.push(&u);
        let u2 = unit(r#"* LIST (\HasChildren) "/" "Work/Projects""#);
        p.push(&u2);
        match p {
            ResponseParser::List {
                separator,
                ref mailboxes,
                ..
            } => {
                assert_eq!(separator, Some('/'));
                assert_eq!(mailboxes.len(), 2);
                assert_eq!(mailboxes[1].path, "Work/Projects");
                assert_eq!(mailboxes[1].name, "Projects");
                assert!(!mailboxes[0].is_selectable());
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn select_parser_scenario() {
        let mut p = ResponseParser::select(Mailbox::new("INBOX", Some('/')), false);
        for head in [
            "* 172 EXISTS",
            "* 1 RECENT",
            "* OK [UIDVALIDITY 3857529045] UIDs valid",
            "* OK [UIDNEXT 4392] Predicted next UID",
            "* FLAGS (\\Answered \\Flagged \\Deleted \\Seen \\Draft)",
            "* OK [PERMANENTFLAGS (\\Deleted \\Seen \\*)] Limited",
        ] {
            let u = unit(head);
            assert!(p.accepts_untagged(&u), "rejected {}", head);
            p.push(&u);
        }
        let t = parse_tagged("a2 OK [READ-WRITE] Selected").unwrap();
        match p.finish(&t).result.unwrap() {
            ImapResult::Selected(mb) => {
                assert_eq!(mb.messages_exists, 172);
                assert_eq!(mb.messages_recent, 1);
                assert_eq!(mb.uid_validity, Some(3857529045));
                assert_eq!(mb.uid_next, Some(4392));
                assert_eq!(mb.selection, SelectionState::Selected);
                assert!(mb.is_read_write);
                assert_eq!(mb.permanent_flags.len(), 3);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn status_parser() {
        let mut p = ResponseParser::status(Mailbox::new("blurdybloop", None));
        let u = unit("* STATUS blurdybloop (MESSAGES 231 UIDNEXT 44292 UNSEEN 3 HIGHESTMODSEQ 7011)");
        assert!(p.accepts_untagged(&u));
        p.push(&u);
        match p.finish(&ok_tagged("a3")).result.unwrap() {
            ImapResult::Selected(mb) => {
                assert_eq!(mb.messages_exists, 231);
                assert_eq!(mb.uid_next, Some(44292));
                assert_eq!(mb.unseen, 3);
                assert_eq!(mb.highest_mod_seq, Some(7011));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn search_parser_collects_ordered_ids() {
        let mut p = ResponseParser::search();
        p.push(&unit("* SEARCH 2 84 882"));
        match p.finish(&ok_tagged("a4")).result.unwrap() {
            ImapResult::Ids(ids) => assert_eq!(ids, vec![2, 84, 882]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn fetch_parser_with_literal_body() {
        let mut p = ResponseParser::fetch();
        let u = ImapUnit {
            head: "* 1 FETCH (BODY[] {11}".to_string(),
            parts: vec![(b"Hello world".to_vec(), ")".to_string())],
        };
        assert!(p.accepts_untagged(&u));
        p.push(&u);
        match p.finish(&ok_tagged("a3")).result.unwrap() {
            ImapResult::Messages(msgs) => {
                assert_eq!(msgs.len(), 1);
                assert_eq!(msgs[0].sequence_id, Some(1));
                assert_eq!(msgs[0].decoded_body().unwrap(), b"Hello world");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn fetch_parser_flags_and_uid() {
        let mut p = ResponseParser::fetch();
        p.push(&unit("* 2 FETCH (UID 54 FLAGS (\\Seen \\Answered) RFC822.SIZE 442)"));
        match p.finish(&ok_tagged("a5")).result.unwrap() {
            ImapResult::Messages(msgs) => {
                let m = &msgs[0];
                assert_eq!(m.uid, Some(54));
                assert_eq!(m.flags, vec!["\\Seen", "\\Answered"]);
                assert_eq!(m.size, Some(442));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn fetch_parser_internal_date() {
        let mut p = ResponseParser::fetch();
        p.push(&unit(
            "* 12 FETCH (INTERNALDATE \"17-Jul-1996 02:44:25 -0700\")",
        ));
        match p.finish(&ok_tagged("a12")).result.unwrap() {
            ImapResult::Messages(msgs) => {
                let dt = msgs[0].internal_date.unwrap();
                assert_eq!(dt.to_rfc3339(), "1996-07-17T02:44:25-07:00");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn internal_date_space_padded_day() {
        let dt = parse_internal_date(" 7-Feb-1994 21:52:25 -0800").unwrap();
        assert_eq!(dt.to_rfc3339(), "1994-02-07T21:52:25-08:00");
    }

    #[test]
    fn fetch_parser_envelope() {
        let mut p = ResponseParser::fetch();
        p.push(&unit(
            "* 7 FETCH (ENVELOPE (\"Mon, 7 Feb 1994 21:52:25 -0800\" \"Meeting\" \
             ((\"Terry Gray\" NIL \"gray\" \"cac.washington.edu\")) NIL NIL \
             ((NIL NIL \"imap\" \"cac.washington.edu\")) NIL NIL NIL \
             \"<B27397-0100000@cac.washington.edu>\"))",
        ));
        match p.finish(&ok_tagged("a6")).result.unwrap() {
            ImapResult::Messages(msgs) => {
                let m = &msgs[0];
                assert_eq!(m.subject().as_deref(), Some("Meeting"));
                assert_eq!(
                    m.from().as_deref(),
                    Some("Terry Gray <gray@cac.washington.edu>")
                );
                assert_eq!(m.to().as_deref(), Some("imap@cac.washington.edu"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn fetch_header_fields_section() {
        let mut p = ResponseParser::fetch();
        let u = ImapUnit {
            head: "* 3 FETCH (BODY[HEADER.FIELDS (SUBJECT)] {13}".to_string(),
            parts: vec![(b"Subject: yo\r\n".to_vec(), ")".to_string())],
        };
        p.push(&u);
        match p.finish(&ok_tagged("a7")).result.unwrap() {
            ImapResult::Messages(msgs) => {
                assert_eq!(msgs[0].subject().as_deref(), Some("yo"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn metadata_parser_mixed_values() {
        let mut p = ResponseParser::metadata();
        let u = ImapUnit {
            head: "* METADATA \"INBOX\" (/private/comment {5}".to_string(),
            parts: vec![(b"notes".to_vec(), " /shared/color NIL)".to_string())],
        };
        assert!(p.accepts_untagged(&u));
        p.push(&u);
        match p.finish(&ok_tagged("a8")).result.unwrap() {
            ImapResult::MetaData(entries) => {
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[0].mailbox_name, "INBOX");
                assert_eq!(entries[0].entry, "/private/comment");
                assert_eq!(entries[0].value.as_deref(), Some(&b"notes"[..]));
                assert_eq!(entries[1].entry, "/shared/color");
                assert!(entries[1].value.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn generic_parser_copyuid() {
        let p = ResponseParser::Generic;
        let t = parse_tagged("a9 OK [COPYUID 38505 304,319:320 3956:3958] Done").unwrap();
        match p.finish(&t).result.unwrap() {
            ImapResult::Generic(g) => {
                let cu = g.copy_uid.unwrap();
                assert_eq!(cu.uid_validity, 38505);
                assert_eq!(cu.source_uids, "304,319:320");
                assert_eq!(cu.dest_uids, "3956:3958");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn generic_parser_appenduid() {
        let p = ResponseParser::Generic;
        let t = parse_tagged("a10 OK [APPENDUID 38505 3955] APPEND completed").unwrap();
        match p.finish(&t).result.unwrap() {
            ImapResult::Generic(g) => {
                assert_eq!(
                    g.append_uid,
                    Some(AppendUid {
                        uid_validity: 38505,
                        uid: 3955
                    })
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn no_response_keeps_message() {
        let p = ResponseParser::Generic;
        let t = parse_tagged("a11 NO [ALREADYEXISTS] Mailbox exists").unwrap();
        let r = p.finish(&t);
        assert_eq!(r.status, Status::No);
        assert_eq!(r.code.as_deref(), Some("ALREADYEXISTS"));
        assert!(r.result.is_none());
    }

    #[test]
    fn state_events() {
        assert!(matches!(
            parse_state_event(&unit("* 173 EXISTS")),
            Some(StateEvent::Exists(173))
        ));
        assert!(matches!(
            parse_state_event(&unit("* 5 EXPUNGE")),
            Some(StateEvent::Expunge(5))
        ));
        assert!(matches!(
            parse_state_event(&unit("* BYE going down")),
            Some(StateEvent::Bye(_))
        ));
        assert!(matches!(
            parse_state_event(&unit("* OK [CAPABILITY IMAP4rev1] ready")),
            Some(StateEvent::Capabilities(_))
        ));
        assert!(parse_state_event(&unit("* OK nothing here")).is_none());
    }

    #[test]
    fn noop_parser_accepts_nothing() {
        let p = ResponseParser::Noop;
        assert!(!p.accepts_untagged(&unit("* 3 EXISTS")));
        assert!(!p.accepts_untagged(&unit("* 2 FETCH (FLAGS (\\Seen))")));
    }
}
