/*
 * error.rs
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

//! Engine errors. Command-level NO/BAD refusals are not errors; they are
//! carried inside the typed Response. Everything here ends or degrades
//! the session, or reports a caller contract violation.

use std::fmt;
use std::io;

/// Session and caller errors for all three protocols.
#[derive(Debug)]
pub enum EngineError {
    /// Syntactically invalid server response; fatal for the session.
    Protocol(String),
    /// Framer buffer grew past its cap without a complete unit.
    ProtocolOverflow,
    /// Server-initiated termination (untagged BYE outside LOGOUT).
    Bye(String),
    /// Caller contract violated, e.g. no mailbox selected.
    PreconditionFailed(String),
    /// Transport error or EOF; in-flight and queued commands fail with this.
    ConnectionLost,
    /// The server requested a continuation the command could not supply,
    /// or denied one the client had begun.
    ContinuationAborted,
    /// Caller withdrew interest in an outstanding command.
    Cancelled,
    /// Underlying I/O failure while the session was still usable.
    Io(io::Error),
}

impl EngineError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        EngineError::Protocol(msg.into())
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        EngineError::PreconditionFailed(msg.into())
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Protocol(m) => write!(f, "protocol error: {}", m),
            EngineError::ProtocolOverflow => write!(f, "response buffer overflow"),
            EngineError::Bye(m) => write!(f, "server closed session: {}", m),
            EngineError::PreconditionFailed(m) => write!(f, "precondition failed: {}", m),
            EngineError::ConnectionLost => write!(f, "connection lost"),
            EngineError::ContinuationAborted => write!(f, "continuation aborted"),
            EngineError::Cancelled => write!(f, "cancelled"),
            EngineError::Io(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<io::Error> for EngineError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            EngineError::ConnectionLost
        } else {
            EngineError::Io(e)
        }
    }
}
