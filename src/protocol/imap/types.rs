/*
 * types.rs
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

//! IMAP data model: server/session state, mailboxes, typed command
//! responses, metadata entries.

/// Per-session server knowledge, mutated by LOGIN, CAPABILITY, LIST and
/// STARTTLS responses.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub host: String,
    pub port: u16,
    pub is_secure: bool,
    /// Hierarchy delimiter, learned from the first LIST response.
    pub path_separator: Option<char>,
    /// Raw capability text as last advertised.
    pub capability_text: String,
    /// Uppercased capability names.
    pub capabilities: Vec<String>,
}

impl ServerInfo {
    pub fn new(host: impl Into<String>, port: u16, is_secure: bool) -> Self {
        Self {
            host: host.into(),
            port,
            is_secure,
            path_separator: None,
            capability_text: String::new(),
            capabilities: Vec::new(),
        }
    }

    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities.iter().any(|c| c.eq_ignore_ascii_case(name))
    }

    /// Replace the capability set from a space-separated token list.
    pub fn set_capabilities(&mut self, text: &str) {
        self.capability_text = text.trim().to_string();
        self.capabilities = text
            .split_whitespace()
            .map(|w| w.to_uppercase())
            .collect();
    }

    /// STARTTLS invalidates everything advertised on the plain channel.
    pub fn clear_capabilities(&mut self) {
        self.capability_text.clear();
        self.capabilities.clear();
    }
}

/// Mailbox selection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionState {
    Unselected,
    Selected,
    Examined,
}

/// A mailbox and its last server-reported counts.
#[derive(Debug, Clone, PartialEq)]
pub struct Mailbox {
    /// Server-canonical path.
    pub path: String,
    /// Last path segment.
    pub name: String,
    /// Name attributes, e.g. `\Noselect`, `\HasChildren`.
    pub flags: Vec<String>,
    pub messages_exists: u32,
    pub messages_recent: u32,
    pub unseen: u32,
    pub uid_next: Option<u32>,
    pub uid_validity: Option<u32>,
    pub highest_mod_seq: Option<u64>,
    pub permanent_flags: Vec<String>,
    pub message_flags: Vec<String>,
    pub is_read_write: bool,
    pub selection: SelectionState,
}

impl Mailbox {
    pub fn new(path: impl Into<String>, separator: Option<char>) -> Self {
        let path = path.into();
        let name = match separator {
            Some(sep) => path
                .rsplit(sep)
                .next()
                .unwrap_or(path.as_str())
                .to_string(),
            None => path.clone(),
        };
        Self {
            path,
            name,
            flags: Vec::new(),
            messages_exists: 0,
            messages_recent: 0,
            unseen: 0,
            uid_next: None,
            uid_validity: None,
            highest_mod_seq: None,
            permanent_flags: Vec::new(),
            message_flags: Vec::new(),
            is_read_write: true,
            selection: SelectionState::Unselected,
        }
    }

    pub fn is_selectable(&self) -> bool {
        !self.flags.iter().any(|f| f.eq_ignore_ascii_case("\\Noselect"))
    }
}

/// Tagged response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    No,
    Bad,
    Bye,
}

/// Typed outcome of one command: OK with a result, NO/BAD with the
/// server's message, or BYE.
#[derive(Debug, Clone)]
pub struct Response<T> {
    pub status: Status,
    /// Human-readable text after the status.
    pub message: Option<String>,
    /// Bracketed response code, e.g. `UIDVALIDITY 3857529045`,
    /// `READ-ONLY`.
    pub code: Option<String>,
    pub result: Option<T>,
}

impl<T> Response<T> {
    pub fn ok(result: T) -> Self {
        Self {
            status: Status::Ok,
            message: None,
            code: None,
            result: Some(result),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// Map the result type, keeping status and codes.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Response<U> {
        Response {
            status: self.status,
            message: self.message,
            code: self.code,
            result: self.result.map(f),
        }
    }
}

/// Result of commands whose interesting payload is in the response
/// code of the tagged line (COPY, APPEND, CLOSE, ...).
#[derive(Debug, Clone, Default)]
pub struct GenericImapResult {
    pub response_code: Option<String>,
    /// UIDPLUS `[COPYUID validity src dst]`.
    pub copy_uid: Option<CopyUid>,
    /// UIDPLUS `[APPENDUID validity uid]`.
    pub append_uid: Option<AppendUid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyUid {
    pub uid_validity: u32,
    pub source_uids: String,
    pub dest_uids: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendUid {
    pub uid_validity: u32,
    pub uid: u32,
}

/// One annotation from METADATA (RFC 5464). An empty mailbox name means
/// a server-global entry; a None value marks deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaDataEntry {
    pub mailbox_name: String,
    /// Entry path, beginning with `/private/` or `/shared/`.
    pub entry: String,
    pub value: Option<Vec<u8>>,
}

/// STORE flag operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreAction {
    Add,
    Remove,
    Replace,
}

impl StoreAction {
    /// Data item name, e.g. `+FLAGS.SILENT`.
    pub fn item(&self, silent: bool) -> String {
        let base = match self {
            StoreAction::Add => "+FLAGS",
            StoreAction::Remove => "-FLAGS",
            StoreAction::Replace => "FLAGS",
        };
        if silent {
            format!("{}.SILENT", base)
        } else {
            base.to_string()
        }
    }
}

/// GETMETADATA DEPTH option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaDataDepth {
    None,
    DirectChildren,
    AllChildren,
}

impl MetaDataDepth {
    pub fn as_option(&self) -> &'static str {
        match self {
            MetaDataDepth::None => "0",
            MetaDataDepth::DirectChildren => "1",
            MetaDataDepth::AllChildren => "infinity",
        }
    }
}

/// Quote a string as an IMAP quoted astring; plain atoms pass through.
pub fn quote_astring(s: &str) -> String {
    let plain = !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_alphanumeric()
                || matches!(b, b'-' | b'_' | b'.' | b'/' | b'+' | b'=' | b'#' | b'$' | b'&')
        });
    if plain {
        s.to_string()
    } else {
        format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
    }
}
