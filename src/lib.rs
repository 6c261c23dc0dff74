/*
 * lib.rs
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

//! Busta: email protocol engine.
//!
//! Client-side IMAP4rev1 (IDLE, METADATA, UIDPLUS, MOVE, CONDSTORE,
//! QRESYNC, ENABLE), SMTP and POP3, plus MIME parsing and generation
//! with Quoted-Printable and Base64 transfer encodings.

pub mod error;
pub mod event;
pub mod framer;
pub mod mime;
pub mod net;
pub mod protocol;
pub mod sasl;

pub use error::EngineError;
pub use event::{EventBus, MailEvent};
pub use framer::{Framer, FramerMode, ImapUnit, Pop3Reply, SmtpReply, Unit};
pub use mime::MimeMessage;
pub use protocol::imap::ImapClient;
pub use protocol::pop3::Pop3Client;
pub use protocol::smtp::SmtpClient;
