/*
 * dot_stuffer.rs
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

//! Dot stuffing for SMTP DATA (RFC 5321 §4.5.2): a `.` at the start of
//! a line gains an extra `.`; the terminator is `CRLF.CRLF`.

#[derive(Clone, Copy, PartialEq)]
enum State {
    /// Start of a line (initial, or right after CRLF).
    LineStart,
    Normal,
    /// Saw CR, waiting for LF.
    SawCr,
}

/// Streaming dot stuffer. Bytes pass through unchanged except for the
/// doubled leading dots; end_message() appends the terminator, ensuring
/// the payload ends with CRLF first.
pub struct DotStuffer {
    state: State,
    emitted: bool,
}

impl Default for DotStuffer {
    fn default() -> Self {
        Self {
            state: State::LineStart,
            emitted: false,
        }
    }
}

impl DotStuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a chunk; `out` receives each slice to send, in order.
    pub fn process_chunk<F>(&mut self, chunk: &[u8], mut out: F)
    where
        F: FnMut(&[u8]),
    {
        let mut start = 0;
        for (i, &b) in chunk.iter().enumerate() {
            match self.state {
                State::LineStart => {
                    if b == b'.' {
                        out(&chunk[start..i]);
                        out(b".");
                        start = i;
                    }
                    self.state = if b == b'\r' {
                        State::SawCr
                    } else {
                        State::Normal
                    };
                }
                State::Normal => {
                    if b == b'\r' {
                        self.state = State::SawCr;
                    }
                }
                State::SawCr => {
                    self.state = match b {
                        b'\n' => State::LineStart,
                        b'\r' => State::SawCr,
                        _ => State::Normal,
                    };
                }
            }
        }
        if start < chunk.len() {
            self.emitted = true;
            out(&chunk[start..]);
        }
    }

    /// Emit the `.` terminator and reset.
    pub fn end_message<F>(&mut self, mut out: F)
    where
        F: FnMut(&[u8]),
    {
        match self.state {
            State::LineStart if self.emitted => out(b".\r\n"),
            State::SawCr => out(b"\n.\r\n"),
            _ => out(b"\r\n.\r\n"),
        }
        self.state = State::LineStart;
        self.emitted = false;
    }

    /// Stuff a whole message into a buffer, terminator included.
    pub fn stuff(message: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(message.len() + 8);
        let mut stuffer = DotStuffer::new();
        stuffer.process_chunk(message, |s| out.extend_from_slice(s));
        stuffer.end_message(|s| out.extend_from_slice(s));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dot_line_is_doubled() {
        assert_eq!(DotStuffer::stuff(b"Hi\r\n.\r\nBye"), b"Hi\r\n..\r\nBye\r\n.\r\n");
    }

    #[test]
    fn leading_dot_at_message_start() {
        assert_eq!(DotStuffer::stuff(b".start\r\n"), b"..start\r\n.\r\n");
    }

    #[test]
    fn dot_mid_line_untouched() {
        assert_eq!(DotStuffer::stuff(b"a.b\r\nc.d\r\n"), b"a.b\r\nc.d\r\n.\r\n");
    }

    #[test]
    fn empty_message_gets_terminator() {
        assert_eq!(DotStuffer::stuff(b""), b"\r\n.\r\n");
    }

    #[test]
    fn message_not_ending_in_crlf_is_completed() {
        assert_eq!(DotStuffer::stuff(b"no newline"), b"no newline\r\n.\r\n");
    }

    #[test]
    fn chunked_input_keeps_line_state() {
        let mut stuffer = DotStuffer::new();
        let mut out = Vec::new();
        stuffer.process_chunk(b"Hi\r", |s| out.extend_from_slice(s));
        stuffer.process_chunk(b"\n.bye\r\n", |s| out.extend_from_slice(s));
        assert_eq!(out, b"Hi\r\n..bye\r\n");
    }
}
