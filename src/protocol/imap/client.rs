/*
 * client.rs
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

//! IMAP client facade. Each operation composes a Command and a parser,
//! hands them to the scheduler, and returns the typed response.

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;

use crate::error::EngineError;
use crate::event::{EventBus, MailEvent};
use crate::mime::MimeMessage;
use crate::net::MailStream;
use crate::protocol::imap::command::Command;
use crate::protocol::imap::parser::{ImapResult, ResponseParser};
use crate::protocol::imap::scheduler::{
    self, CommandResult, SchedulerHandle, SessionState, UpgradeFn, UpgradeFuture,
};
use crate::protocol::imap::types::{
    quote_astring, GenericImapResult, Mailbox, MetaDataDepth, MetaDataEntry, Response, ServerInfo,
    StoreAction,
};

/// Options for GETMETADATA.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetaDataOptions {
    pub max_size: Option<u32>,
    pub depth: Option<MetaDataDepth>,
}

/// An IDLE in progress. Events stream to the bus until done() writes
/// the DONE terminator and the server acknowledges the IDLE command.
pub struct IdleHandle<S> {
    scheduler: SchedulerHandle<S>,
    result: oneshot::Receiver<CommandResult>,
}

impl<S> IdleHandle<S> {
    /// End the IDLE: write `DONE` and await the tagged OK.
    pub async fn done(self) -> Result<Response<()>, EngineError> {
        self.scheduler.idle_done()?;
        let response = self
            .result
            .await
            .map_err(|_| EngineError::ConnectionLost)??;
        Ok(response.map(|_| ()))
    }
}

/// IMAP4rev1 client over any duplex byte stream.
pub struct ImapClient<S = MailStream> {
    scheduler: SchedulerHandle<S>,
    state: SessionState,
}

impl ImapClient<MailStream> {
    /// Open a TCP or implicit-TLS connection and start the session
    /// pipeline.
    pub async fn connect(host: &str, port: u16, is_secure: bool) -> Result<Self, EngineError> {
        Self::connect_with_bus(host, port, is_secure, EventBus::new()).await
    }

    /// Connect with a caller-supplied event bus.
    pub async fn connect_with_bus(
        host: &str,
        port: u16,
        is_secure: bool,
        bus: EventBus,
    ) -> Result<Self, EngineError> {
        let stream = MailStream::connect(host, port, is_secure).await?;
        Ok(Self::with_stream(
            stream,
            ServerInfo::new(host, port, is_secure),
            bus,
        ))
    }

    /// STARTTLS: on OK, upgrade the transport and re-learn capabilities
    /// (everything advertised before the upgrade is invalidated).
    pub async fn start_tls(&self) -> Result<Response<GenericImapResult>, EngineError> {
        let host = self.state.server_info.lock().unwrap().host.clone();
        self.start_tls_with(Box::new(move |s: MailStream| -> UpgradeFuture<MailStream> {
            Box::pin(async move { s.upgrade_to_tls(&host).await })
        }))
        .await
    }
}

impl<S> ImapClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Bind a client to an already-connected stream (used directly by
    /// tests; connect() wraps this).
    pub fn with_stream(stream: S, server_info: ServerInfo, bus: EventBus) -> Self {
        let state = SessionState {
            server_info: Arc::new(Mutex::new(server_info)),
            selected: Arc::new(Mutex::new(None)),
            bus,
        };
        let scheduler = scheduler::spawn(stream, state.clone());
        Self { scheduler, state }
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.state.bus
    }

    pub fn subscribe<F>(&self, f: F)
    where
        F: Fn(&MailEvent) + Send + Sync + 'static,
    {
        self.state.bus.subscribe(f);
    }

    pub fn capabilities(&self) -> Vec<String> {
        self.state.server_info.lock().unwrap().capabilities.clone()
    }

    pub fn has_capability(&self, name: &str) -> bool {
        self.state.server_info.lock().unwrap().has_capability(name)
    }

    pub fn path_separator(&self) -> Option<char> {
        self.state.server_info.lock().unwrap().path_separator
    }

    pub fn selected_mailbox(&self) -> Option<Mailbox> {
        self.state.selected.lock().unwrap().clone()
    }

    pub fn is_alive(&self) -> bool {
        self.scheduler.is_alive()
    }

    /// Close the socket; queued commands resolve as cancelled.
    pub fn close(&self) {
        self.scheduler.close();
    }

    async fn submit(&self, command: Command, parser: ResponseParser) -> CommandResult {
        self.scheduler.submit(command, parser).await
    }

    fn require_selected(&self) -> Result<Mailbox, EngineError> {
        self.state
            .selected
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| EngineError::precondition("no mailbox selected"))
    }

    // -- session ------------------------------------------------------

    /// LOGIN. The password never reaches the trace output.
    pub async fn login(
        &self,
        name: &str,
        password: &str,
    ) -> Result<Response<Vec<String>>, EngineError> {
        let command = Command::line(format!(
            "LOGIN {} {}",
            quote_astring(name),
            quote_astring(password)
        ))
        .redacted();
        let response = self.submit(command, ResponseParser::capability()).await?;
        let response = map_result(response, |r| match r {
            ImapResult::Capabilities(caps) => Some(caps),
            _ => None,
        });
        if let Some(caps) = &response.result {
            if !caps.is_empty() {
                self.state
                    .server_info
                    .lock()
                    .unwrap()
                    .set_capabilities(&caps.join(" "));
            }
        }
        Ok(response)
    }

    /// CAPABILITY round trip; refreshes the session's capability set.
    pub async fn capability(&self) -> Result<Response<Vec<String>>, EngineError> {
        let response = self
            .submit(Command::line("CAPABILITY"), ResponseParser::capability())
            .await?;
        Ok(map_result(response, |r| match r {
            ImapResult::Capabilities(caps) => Some(caps),
            _ => None,
        }))
    }

    /// LOGOUT; resolves to the server's BYE text.
    pub async fn logout(&self) -> Result<Response<String>, EngineError> {
        let response = self
            .submit(
                Command::line("LOGOUT"),
                ResponseParser::Logout { bye: None },
            )
            .await?;
        self.scheduler.close();
        Ok(map_result(response, |r| match r {
            ImapResult::Bye(text) => Some(text),
            _ => None,
        }))
    }

    /// STARTTLS with a caller-supplied transport upgrade.
    pub async fn start_tls_with(
        &self,
        upgrade: UpgradeFn<S>,
    ) -> Result<Response<GenericImapResult>, EngineError> {
        let response = self
            .submit(Command::line("STARTTLS"), ResponseParser::Generic)
            .await?;
        if response.is_ok() {
            self.scheduler.upgrade(upgrade).await?;
            {
                let mut info = self.state.server_info.lock().unwrap();
                info.clear_capabilities();
                info.is_secure = true;
            }
            let _ = self.capability().await?;
        }
        Ok(map_result(response, |r| match r {
            ImapResult::Generic(g) => Some(g),
            _ => None,
        }))
    }

    /// NOOP; may fire events. Returns the selected mailbox as updated
    /// by whatever the server pushed.
    pub async fn noop(&self) -> Result<Response<Option<Mailbox>>, EngineError> {
        let response = self
            .submit(Command::line("NOOP"), ResponseParser::Noop)
            .await?;
        let selected = self.selected_mailbox();
        Ok(map_result(response, move |_| Some(selected)))
    }

    /// ENABLE (RFC 5161).
    pub async fn enable(
        &self,
        capabilities: &[&str],
    ) -> Result<Response<GenericImapResult>, EngineError> {
        let command = Command::line(format!("ENABLE {}", capabilities.join(" ")));
        self.generic(command).await
    }

    // -- mailboxes ----------------------------------------------------

    /// LIST. An empty path lists from the root; recursive uses `*`,
    /// otherwise `%`.
    pub async fn list_mailboxes(
        &self,
        path: &str,
        recursive: bool,
    ) -> Result<Response<Vec<Mailbox>>, EngineError> {
        self.list_inner(path, recursive, false).await
    }

    /// LSUB, same grammar as LIST.
    pub async fn list_subscribed_mailboxes(
        &self,
        path: &str,
        recursive: bool,
    ) -> Result<Response<Vec<Mailbox>>, EngineError> {
        self.list_inner(path, recursive, true).await
    }

    async fn list_inner(
        &self,
        path: &str,
        recursive: bool,
        is_lsub: bool,
    ) -> Result<Response<Vec<Mailbox>>, EngineError> {
        let verb = if is_lsub { "LSUB" } else { "LIST" };
        let pattern = if recursive { "*" } else { "%" };
        let command = Command::line(format!(
            "{} {} {}",
            verb,
            quote_astring(path),
            quote_astring(pattern)
        ));
        let response = self.submit(command, ResponseParser::list(is_lsub)).await?;
        Ok(map_result(response, |r| match r {
            ImapResult::Mailboxes(m) => Some(m),
            _ => None,
        }))
    }

    /// Learn the hierarchy delimiter with a `LIST "" ""` round trip.
    /// The scheduler records the delimiter from the LIST response.
    pub async fn ensure_path_separator(&self) -> Result<Option<char>, EngineError> {
        if let Some(sep) = self.path_separator() {
            return Ok(Some(sep));
        }
        let command = Command::line("LIST \"\" \"\"");
        let _ = self.submit(command, ResponseParser::list(false)).await?;
        Ok(self.path_separator())
    }

    /// SELECT by mailbox value.
    pub async fn select_mailbox(&self, mailbox: &Mailbox) -> Result<Response<Mailbox>, EngineError> {
        self.select_inner(&mailbox.path, false).await
    }

    /// SELECT by path, learning the hierarchy delimiter first when it
    /// is still unknown.
    pub async fn select_mailbox_by_path(
        &self,
        path: &str,
    ) -> Result<Response<Mailbox>, EngineError> {
        if self.path_separator().is_none() {
            let _ = self.ensure_path_separator().await?;
        }
        self.select_inner(path, false).await
    }

    pub async fn select_inbox(&self) -> Result<Response<Mailbox>, EngineError> {
        self.select_inner("INBOX", false).await
    }

    /// EXAMINE: like SELECT but read-only.
    pub async fn examine_mailbox(
        &self,
        mailbox: &Mailbox,
    ) -> Result<Response<Mailbox>, EngineError> {
        self.select_inner(&mailbox.path, true).await
    }

    async fn select_inner(
        &self,
        path: &str,
        examine: bool,
    ) -> Result<Response<Mailbox>, EngineError> {
        let verb = if examine { "EXAMINE" } else { "SELECT" };
        let command = Command::line(format!("{} {}", verb, quote_astring(path)));
        let seed = Mailbox::new(path, self.path_separator());
        let response = self
            .submit(command, ResponseParser::select(seed, examine))
            .await?;
        let response = map_result(response, |r| match r {
            ImapResult::Selected(mb) => Some(mb),
            _ => None,
        });
        if response.is_ok() {
            *self.state.selected.lock().unwrap() = response.result.clone();
        }
        Ok(response)
    }

    /// CLOSE: expunge-free deselect.
    pub async fn close_mailbox(&self) -> Result<Response<GenericImapResult>, EngineError> {
        let response = self.generic(Command::line("CLOSE")).await?;
        if response.is_ok() {
            *self.state.selected.lock().unwrap() = None;
        }
        Ok(response)
    }

    /// STATUS; does not change the selection.
    pub async fn status_mailbox(
        &self,
        mailbox: &Mailbox,
        items: &[&str],
    ) -> Result<Response<Mailbox>, EngineError> {
        let items = if items.is_empty() {
            vec!["MESSAGES", "RECENT", "UIDNEXT", "UIDVALIDITY", "UNSEEN"]
        } else {
            items.to_vec()
        };
        let command = Command::line(format!(
            "STATUS {} ({})",
            quote_astring(&mailbox.path),
            items.join(" ")
        ));
        let response = self
            .submit(command, ResponseParser::status(mailbox.clone()))
            .await?;
        Ok(map_result(response, |r| match r {
            ImapResult::Selected(mb) => Some(mb),
            _ => None,
        }))
    }

    pub async fn create_mailbox(&self, path: &str) -> Result<Response<Mailbox>, EngineError> {
        let command = Command::line(format!("CREATE {}", quote_astring(path)));
        let response = self.generic(command).await?;
        let mailbox = Mailbox::new(path, self.path_separator());
        Ok(response.map(move |_| mailbox))
    }

    pub async fn delete_mailbox(
        &self,
        mailbox: &Mailbox,
    ) -> Result<Response<GenericImapResult>, EngineError> {
        self.generic(Command::line(format!(
            "DELETE {}",
            quote_astring(&mailbox.path)
        )))
        .await
    }

    /// RENAME. Renaming INBOX moves its contents to the new mailbox and
    /// leaves INBOX empty (RFC 3501 §6.3.5); the command form is the
    /// same either way.
    pub async fn rename_mailbox(
        &self,
        mailbox: &Mailbox,
        new_path: &str,
    ) -> Result<Response<Mailbox>, EngineError> {
        let command = Command::line(format!(
            "RENAME {} {}",
            quote_astring(&mailbox.path),
            quote_astring(new_path)
        ));
        let response = self.generic(command).await?;
        let renamed = Mailbox::new(new_path, self.path_separator());
        Ok(response.map(move |_| renamed))
    }

    pub async fn subscribe_mailbox(
        &self,
        mailbox: &Mailbox,
    ) -> Result<Response<GenericImapResult>, EngineError> {
        self.generic(Command::line(format!(
            "SUBSCRIBE {}",
            quote_astring(&mailbox.path)
        )))
        .await
    }

    pub async fn unsubscribe_mailbox(
        &self,
        mailbox: &Mailbox,
    ) -> Result<Response<GenericImapResult>, EngineError> {
        self.generic(Command::line(format!(
            "UNSUBSCRIBE {}",
            quote_astring(&mailbox.path)
        )))
        .await
    }

    // -- messages -----------------------------------------------------

    /// SEARCH with raw criteria text (defaulting to UNSEEN when empty).
    pub async fn search_messages(&self, criteria: &str) -> Result<Response<Vec<u32>>, EngineError> {
        self.require_selected()?;
        let criteria = if criteria.is_empty() { "UNSEEN" } else { criteria };
        let command = Command::line(format!("SEARCH {}", criteria));
        let response = self.submit(command, ResponseParser::search()).await?;
        Ok(map_result(response, |r| match r {
            ImapResult::Ids(ids) => Some(ids),
            _ => None,
        }))
    }

    /// UID SEARCH.
    pub async fn uid_search_messages(
        &self,
        criteria: &str,
    ) -> Result<Response<Vec<u32>>, EngineError> {
        self.require_selected()?;
        let criteria = if criteria.is_empty() { "UNSEEN" } else { criteria };
        let command = Command::line(format!("UID SEARCH {}", criteria));
        let response = self.submit(command, ResponseParser::search()).await?;
        Ok(map_result(response, |r| match r {
            ImapResult::Ids(ids) => Some(ids),
            _ => None,
        }))
    }

    /// FETCH one message.
    pub async fn fetch_message(
        &self,
        sequence_id: u32,
        items: &str,
    ) -> Result<Response<Vec<MimeMessage>>, EngineError> {
        self.fetch_messages(&sequence_id.to_string(), items).await
    }

    /// FETCH a sequence set, e.g. `1:5` or `2,4,6`.
    pub async fn fetch_messages(
        &self,
        sequence: &str,
        items: &str,
    ) -> Result<Response<Vec<MimeMessage>>, EngineError> {
        self.require_selected()?;
        self.fetch_by_criteria(&format!("FETCH {} {}", sequence, items))
            .await
    }

    /// UID FETCH.
    pub async fn uid_fetch_messages(
        &self,
        uid_sequence: &str,
        items: &str,
    ) -> Result<Response<Vec<MimeMessage>>, EngineError> {
        self.require_selected()?;
        self.fetch_by_criteria(&format!("UID FETCH {} {}", uid_sequence, items))
            .await
    }

    /// Raw FETCH text for callers composing their own item specs.
    pub async fn fetch_messages_by_criteria(
        &self,
        criteria: &str,
    ) -> Result<Response<Vec<MimeMessage>>, EngineError> {
        self.require_selected()?;
        self.fetch_by_criteria(criteria).await
    }

    /// The most recent `count` messages in the selected mailbox.
    pub async fn fetch_recent_messages(
        &self,
        count: u32,
        items: &str,
    ) -> Result<Response<Vec<MimeMessage>>, EngineError> {
        let mailbox = self.require_selected()?;
        if mailbox.messages_exists == 0 {
            return Ok(Response::ok(Vec::new()));
        }
        let start = mailbox.messages_exists.saturating_sub(count.max(1) - 1).max(1);
        self.fetch_by_criteria(&format!(
            "FETCH {}:{} {}",
            start, mailbox.messages_exists, items
        ))
        .await
    }

    async fn fetch_by_criteria(
        &self,
        criteria: &str,
    ) -> Result<Response<Vec<MimeMessage>>, EngineError> {
        let response = self
            .submit(Command::line(criteria), ResponseParser::fetch())
            .await?;
        Ok(map_result(response, |r| match r {
            ImapResult::Messages(m) => Some(m),
            _ => None,
        }))
    }

    /// STORE: add, remove or replace flags on a sequence set. Unless
    /// silent, the returned messages carry the updated flag sets.
    pub async fn store(
        &self,
        sequence: &str,
        flags: &[&str],
        action: StoreAction,
        silent: bool,
    ) -> Result<Response<Vec<MimeMessage>>, EngineError> {
        self.require_selected()?;
        let command = Command::line(format!(
            "STORE {} {} ({})",
            sequence,
            action.item(silent),
            flags.join(" ")
        ));
        let response = self.submit(command, ResponseParser::fetch()).await?;
        Ok(map_result(response, |r| match r {
            ImapResult::Messages(m) => Some(m),
            _ => None,
        }))
    }

    /// UID STORE.
    pub async fn uid_store(
        &self,
        uid_sequence: &str,
        flags: &[&str],
        action: StoreAction,
        silent: bool,
    ) -> Result<Response<Vec<MimeMessage>>, EngineError> {
        self.require_selected()?;
        let command = Command::line(format!(
            "UID STORE {} {} ({})",
            uid_sequence,
            action.item(silent),
            flags.join(" ")
        ));
        let response = self.submit(command, ResponseParser::fetch()).await?;
        Ok(map_result(response, |r| match r {
            ImapResult::Messages(m) => Some(m),
            _ => None,
        }))
    }

    pub async fn mark_seen(
        &self,
        sequence: &str,
    ) -> Result<Response<Vec<MimeMessage>>, EngineError> {
        self.store(sequence, &["\\Seen"], StoreAction::Add, false).await
    }

    pub async fn mark_unseen(
        &self,
        sequence: &str,
    ) -> Result<Response<Vec<MimeMessage>>, EngineError> {
        self.store(sequence, &["\\Seen"], StoreAction::Remove, false)
            .await
    }

    pub async fn mark_flagged(
        &self,
        sequence: &str,
    ) -> Result<Response<Vec<MimeMessage>>, EngineError> {
        self.store(sequence, &["\\Flagged"], StoreAction::Add, false)
            .await
    }

    pub async fn mark_unflagged(
        &self,
        sequence: &str,
    ) -> Result<Response<Vec<MimeMessage>>, EngineError> {
        self.store(sequence, &["\\Flagged"], StoreAction::Remove, false)
            .await
    }

    pub async fn mark_deleted(
        &self,
        sequence: &str,
    ) -> Result<Response<Vec<MimeMessage>>, EngineError> {
        self.store(sequence, &["\\Deleted"], StoreAction::Add, false)
            .await
    }

    pub async fn mark_undeleted(
        &self,
        sequence: &str,
    ) -> Result<Response<Vec<MimeMessage>>, EngineError> {
        self.store(sequence, &["\\Deleted"], StoreAction::Remove, false)
            .await
    }

    /// COPY a sequence set to another mailbox. With UIDPLUS the result
    /// carries COPYUID.
    pub async fn copy(
        &self,
        sequence: &str,
        target: &Mailbox,
    ) -> Result<Response<GenericImapResult>, EngineError> {
        self.require_selected()?;
        self.generic(Command::line(format!(
            "COPY {} {}",
            sequence,
            quote_astring(&target.path)
        )))
        .await
    }

    /// MOVE (RFC 6851).
    pub async fn move_messages(
        &self,
        sequence: &str,
        target: &Mailbox,
    ) -> Result<Response<GenericImapResult>, EngineError> {
        self.require_selected()?;
        self.generic(Command::line(format!(
            "MOVE {} {}",
            sequence,
            quote_astring(&target.path)
        )))
        .await
    }

    /// EXPUNGE; removals arrive as Expunge events.
    pub async fn expunge(&self) -> Result<Response<GenericImapResult>, EngineError> {
        self.require_selected()?;
        self.generic(Command::line("EXPUNGE")).await
    }

    /// APPEND a complete message, using the literal continuation
    /// protocol. With UIDPLUS the result carries APPENDUID.
    pub async fn append_message(
        &self,
        mailbox_path: &str,
        message: &[u8],
        flags: &[&str],
    ) -> Result<Response<GenericImapResult>, EngineError> {
        let flags_text = if flags.is_empty() {
            String::new()
        } else {
            format!(" ({})", flags.join(" "))
        };
        let first = format!(
            "APPEND {}{} {{{}}}",
            quote_astring(mailbox_path),
            flags_text,
            message.len()
        );
        let command = Command::with_parts(vec![first.into_bytes(), message.to_vec()]);
        self.generic(command).await
    }

    // -- metadata -----------------------------------------------------

    /// GETMETADATA (RFC 5464). An empty mailbox name addresses
    /// server-global entries.
    pub async fn get_meta_data(
        &self,
        entry: &str,
        mailbox_name: &str,
        options: MetaDataOptions,
    ) -> Result<Response<Vec<MetaDataEntry>>, EngineError> {
        let mut opts = Vec::new();
        if let Some(n) = options.max_size {
            opts.push(format!("MAXSIZE {}", n));
        }
        if let Some(depth) = options.depth {
            opts.push(format!("DEPTH {}", depth.as_option()));
        }
        let opts_text = if opts.is_empty() {
            String::new()
        } else {
            format!("({}) ", opts.join(" "))
        };
        let command = Command::line(format!(
            "GETMETADATA {}{} ({})",
            opts_text,
            quote_astring(mailbox_name),
            entry
        ));
        let response = self.submit(command, ResponseParser::metadata()).await?;
        Ok(map_result(response, |r| match r {
            ImapResult::MetaData(entries) => Some(entries),
            _ => None,
        }))
    }

    /// SETMETADATA for one entry.
    pub async fn set_meta_data(
        &self,
        entry: MetaDataEntry,
    ) -> Result<Response<GenericImapResult>, EngineError> {
        let mailbox = entry.mailbox_name.clone();
        self.set_meta_data_entries(&mailbox, &[entry]).await
    }

    /// SETMETADATA for several entries on one mailbox. Short clean
    /// values go inline-quoted; anything with a quote, a newline or 80+
    /// bytes is sent as a literal via continuation.
    pub async fn set_meta_data_entries(
        &self,
        mailbox_name: &str,
        entries: &[MetaDataEntry],
    ) -> Result<Response<GenericImapResult>, EngineError> {
        let command = build_setmetadata(mailbox_name, entries);
        self.generic(command).await
    }

    // -- idle ---------------------------------------------------------

    /// Enter IDLE. Server pushes stream to the event bus until done()
    /// is invoked on the returned handle.
    pub fn idle_start(&self) -> Result<IdleHandle<S>, EngineError> {
        self.require_selected()?;
        let result = self
            .scheduler
            .submit_task(Command::idle(), ResponseParser::Noop);
        Ok(IdleHandle {
            scheduler: self.scheduler.clone(),
            result,
        })
    }

    async fn generic(&self, command: Command) -> Result<Response<GenericImapResult>, EngineError> {
        let response = self.submit(command, ResponseParser::Generic).await?;
        Ok(map_result(response, |r| match r {
            ImapResult::Generic(g) => Some(g),
            _ => None,
        }))
    }
}

/// Inline-quoted SETMETADATA value rule: short, no quote, no newline.
fn metadata_value_is_inline(value: &[u8]) -> bool {
    value.len() < 80 && !value.contains(&b'"') && !value.contains(&b'\n') && !value.contains(&b'\r')
}

fn build_setmetadata(mailbox_name: &str, entries: &[MetaDataEntry]) -> Command {
    let mut parts: Vec<Vec<u8>> = Vec::new();
    let mut current = format!("SETMETADATA {} (", quote_astring(mailbox_name)).into_bytes();
    for (i, entry) in entries.iter().enumerate() {
        if i > 0 {
            current.push(b' ');
        }
        current.extend_from_slice(entry.entry.as_bytes());
        current.push(b' ');
        match &entry.value {
            None => current.extend_from_slice(b"NIL"),
            Some(value) if metadata_value_is_inline(value) => {
                current.push(b'"');
                for &b in value.iter() {
                    if b == b'\\' {
                        current.push(b'\\');
                    }
                    current.push(b);
                }
                current.push(b'"');
            }
            Some(value) => {
                current.extend_from_slice(format!("{{{}}}", value.len()).as_bytes());
                parts.push(std::mem::take(&mut current));
                current = value.clone();
            }
        }
    }
    current.push(b')');
    parts.push(current);
    Command::with_parts(parts)
}

fn map_result<T>(
    response: Response<ImapResult>,
    f: impl FnOnce(ImapResult) -> Option<T>,
) -> Response<T> {
    Response {
        status: response.status,
        message: response.message,
        code: response.code,
        result: response.result.and_then(f),
    }
}
