/*
 * mod.rs
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

//! IMAP4rev1 client: command scheduler with tagged-response
//! correlation, typed per-command parsers, IDLE, METADATA, UIDPLUS and
//! MOVE support.

mod client;
mod command;
mod parser;
mod scheduler;
mod types;

pub use client::{IdleHandle, ImapClient, MetaDataOptions};
pub use command::{Command, TagGenerator};
pub use parser::{parse_tagged, ImapResult, ResponseParser, StateEvent, TaggedLine};
pub use scheduler::{CommandResult, SchedulerHandle, UpgradeFn, UpgradeFuture};
pub use types::{
    quote_astring, AppendUid, CopyUid, GenericImapResult, Mailbox, MetaDataDepth, MetaDataEntry,
    Response, SelectionState, ServerInfo, Status, StoreAction,
};
