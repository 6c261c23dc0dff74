/*
 * command.rs
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

//! Outgoing IMAP commands: one or more literal-separated parts plus the
//! per-session tag allocator. A single-part command is one text line; a
//! multi-part command waits for a `+` continuation between parts.

/// An IMAP command ready for submission. The tag is assigned by the
/// scheduler when the first part is written.
#[derive(Debug, Clone)]
pub struct Command {
    /// First word, for logging and redaction decisions.
    pub name: String,
    parts: Vec<Vec<u8>>,
    next_part: usize,
    /// IDLE holds its continuation open until DONE is sent.
    pub is_idle: bool,
    /// Don't trace the argument text (LOGIN carries the password).
    pub redact_args: bool,
}

impl Command {
    /// Single-line command.
    pub fn line(text: impl Into<String>) -> Self {
        let text = text.into();
        let name = text
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_uppercase();
        Self {
            name,
            parts: vec![text.into_bytes()],
            next_part: 1,
            is_idle: false,
            redact_args: false,
        }
    }

    /// Multi-part command: each part after the first is sent only after
    /// a server continuation. Non-final parts normally end with a
    /// `{N}` literal announcement.
    pub fn with_parts(parts: Vec<Vec<u8>>) -> Self {
        assert!(!parts.is_empty());
        let name = String::from_utf8_lossy(&parts[0])
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_uppercase();
        Self {
            name,
            parts,
            next_part: 1,
            is_idle: false,
            redact_args: false,
        }
    }

    pub fn idle() -> Self {
        let mut c = Self::line("IDLE");
        c.is_idle = true;
        c
    }

    pub fn redacted(mut self) -> Self {
        self.redact_args = true;
        self
    }

    pub fn first_part(&self) -> &[u8] {
        &self.parts[0]
    }

    /// Next part for a `+` continuation, or None when exhausted (the
    /// scheduler treats exhaustion as ContinuationAborted).
    pub fn on_continuation(&mut self) -> Option<&[u8]> {
        if self.next_part < self.parts.len() {
            let i = self.next_part;
            self.next_part += 1;
            Some(&self.parts[i])
        } else {
            None
        }
    }

    pub fn has_pending_parts(&self) -> bool {
        self.next_part < self.parts.len()
    }
}

/// Monotonically increasing per-session tags: a0, a1, a2, ...
#[derive(Debug, Default)]
pub struct TagGenerator {
    next: u32,
}

impl TagGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> String {
        let tag = format!("a{}", self.next);
        self.next += 1;
        tag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_monotonic() {
        let mut tags = TagGenerator::new();
        assert_eq!(tags.next(), "a0");
        assert_eq!(tags.next(), "a1");
        assert_eq!(tags.next(), "a2");
    }

    #[test]
    fn single_part_command() {
        let mut cmd = Command::line("NOOP");
        assert_eq!(cmd.name, "NOOP");
        assert_eq!(cmd.first_part(), b"NOOP");
        assert!(!cmd.has_pending_parts());
        assert!(cmd.on_continuation().is_none());
    }

    #[test]
    fn multi_part_command_yields_parts_in_order() {
        let mut cmd = Command::with_parts(vec![
            b"APPEND INBOX {5}".to_vec(),
            b"hello".to_vec(),
        ]);
        assert!(cmd.has_pending_parts());
        assert_eq!(cmd.on_continuation(), Some(&b"hello"[..]));
        assert!(cmd.on_continuation().is_none());
    }
}
