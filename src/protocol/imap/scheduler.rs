/*
 * scheduler.rs
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

//! Command scheduler: a spawned pipeline task that owns the stream and
//! framer. One command in flight at a time; submits queue behind it.
//! Untagged units go to the in-flight parser when it declares interest,
//! otherwise to the event bus. Continuations feed multi-part commands,
//! and IDLE holds the slot open until DONE.

use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::event::{EventBus, MailEvent};
use crate::framer::{Framer, FramerMode, ImapUnit, Unit};
use crate::protocol::imap::command::{Command, TagGenerator};
use crate::protocol::imap::parser::{
    parse_state_event, parse_tagged, ImapResult, ResponseParser, StateEvent,
};
use crate::protocol::imap::types::{Mailbox, Response, ServerInfo, Status};

pub type CommandResult = Result<Response<ImapResult>, EngineError>;

pub type UpgradeFuture<S> = Pin<Box<dyn Future<Output = io::Result<S>> + Send>>;
/// Opaque transport upgrade (STARTTLS): consumes the stream, returns
/// its TLS-wrapped replacement.
pub type UpgradeFn<S> = Box<dyn FnOnce(S) -> UpgradeFuture<S> + Send>;

/// A submitted command with its parser and completion sink.
pub struct CommandTask {
    pub command: Command,
    pub parser: ResponseParser,
    pub done: oneshot::Sender<CommandResult>,
}

enum Control<S> {
    Submit(CommandTask),
    IdleDone,
    Upgrade {
        upgrade: UpgradeFn<S>,
        done: oneshot::Sender<Result<(), EngineError>>,
    },
    Close,
}

/// Cheap handle to the pipeline task.
pub struct SchedulerHandle<S> {
    tx: mpsc::UnboundedSender<Control<S>>,
}

impl<S> Clone for SchedulerHandle<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<S> SchedulerHandle<S> {
    /// Queue a command; the returned channel yields its typed response.
    pub fn submit_task(
        &self,
        command: Command,
        parser: ResponseParser,
    ) -> oneshot::Receiver<CommandResult> {
        let (done, rx) = oneshot::channel();
        let task = CommandTask {
            command,
            parser,
            done,
        };
        if let Err(mpsc::error::SendError(Control::Submit(task))) =
            self.tx.send(Control::Submit(task))
        {
            let _ = task.done.send(Err(EngineError::ConnectionLost));
        }
        rx
    }

    /// Submit and await the command's completion.
    pub async fn submit(&self, command: Command, parser: ResponseParser) -> CommandResult {
        match self.submit_task(command, parser).await {
            Ok(result) => result,
            // Sender dropped: the session died, or the caller was raced
            // by a close.
            Err(_) => Err(EngineError::ConnectionLost),
        }
    }

    /// Write the IDLE terminator. The pending IDLE command then
    /// completes with its tagged OK.
    pub fn idle_done(&self) -> Result<(), EngineError> {
        self.tx
            .send(Control::IdleDone)
            .map_err(|_| EngineError::ConnectionLost)
    }

    /// Swap the transport under the framer (STARTTLS). Must be called
    /// with no command in flight.
    pub async fn upgrade(&self, upgrade: UpgradeFn<S>) -> Result<(), EngineError> {
        let (done, rx) = oneshot::channel();
        self.tx
            .send(Control::Upgrade { upgrade, done })
            .map_err(|_| EngineError::ConnectionLost)?;
        rx.await.map_err(|_| EngineError::ConnectionLost)?
    }

    /// Shut the session down; queued commands resolve to Cancelled.
    pub fn close(&self) {
        let _ = self.tx.send(Control::Close);
    }

    pub fn is_alive(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Shared session state the scheduler keeps current.
#[derive(Clone)]
pub struct SessionState {
    pub server_info: Arc<Mutex<ServerInfo>>,
    pub selected: Arc<Mutex<Option<Mailbox>>>,
    pub bus: EventBus,
}

/// Spawn the pipeline task for a connected stream.
pub fn spawn<S>(stream: S, state: SessionState) -> SchedulerHandle<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(run(stream, rx, state));
    SchedulerHandle { tx }
}

struct InFlight {
    tag: String,
    command: Command,
    parser: Option<ResponseParser>,
    done: oneshot::Sender<CommandResult>,
}

enum Step {
    Ctrl(Option<ControlMsg>),
    Read(io::Result<usize>),
}

// Control with the upgrade closure split out so the select arm does not
// need to move the stream.
enum ControlMsg {
    Submit(CommandTask),
    IdleDone,
    UpgradeMark,
    Close,
}

async fn run<S>(mut stream: S, mut rx: mpsc::UnboundedReceiver<Control<S>>, state: SessionState)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut framer = Framer::new(FramerMode::Imap);
    let mut tags = TagGenerator::new();
    let mut queue: VecDeque<CommandTask> = VecDeque::new();
    let mut in_flight: Option<InFlight> = None;
    let mut buf = [0u8; 4096];
    // Set once STARTTLS is accepted: nothing on the wire is trusted
    // again until the transport has been swapped.
    let mut awaiting_upgrade = false;

    loop {
        // Drain every complete unit before suspending on I/O.
        while !awaiting_upgrade {
            match framer.next_unit() {
                Ok(Some(Unit::Imap(unit))) => {
                    match handle_unit(unit, &mut stream, &mut in_flight, &state).await {
                        // STARTTLS accepted: anything the server (or an
                        // attacker on the plaintext path) appended after
                        // the tagged OK must not be parsed. Discard it
                        // and go quiet until the upgrade.
                        Ok(true) => {
                            framer.reset();
                            awaiting_upgrade = true;
                        }
                        Ok(false) => {}
                        Err(e) => {
                            fail_session(e, in_flight.take(), &mut queue, &state.bus);
                            return;
                        }
                    }
                }
                Ok(Some(_)) => unreachable!("framer is in IMAP mode"),
                Ok(None) => break,
                Err(e) => {
                    fail_session(e, in_flight.take(), &mut queue, &state.bus);
                    return;
                }
            }
        }

        // Free slot: start the next queued command.
        while in_flight.is_none() && !awaiting_upgrade {
            match queue.pop_front() {
                Some(task) => {
                    if let Err(e) =
                        start_command(task, &mut tags, &mut stream, &mut in_flight).await
                    {
                        fail_session(e, in_flight.take(), &mut queue, &state.bus);
                        return;
                    }
                }
                None => break,
            }
        }

        let mut pending_upgrade: Option<(UpgradeFn<S>, oneshot::Sender<Result<(), EngineError>>)> =
            None;
        let step = tokio::select! {
            ctrl = rx.recv() => Step::Ctrl(ctrl.map(|c| match c {
                Control::Submit(t) => ControlMsg::Submit(t),
                Control::IdleDone => ControlMsg::IdleDone,
                Control::Upgrade { upgrade, done } => {
                    pending_upgrade = Some((upgrade, done));
                    ControlMsg::UpgradeMark
                }
                Control::Close => ControlMsg::Close,
            })),
            read = stream.read(&mut buf) => Step::Read(read),
        };

        match step {
            Step::Ctrl(None) | Step::Ctrl(Some(ControlMsg::Close)) => {
                fail_session_with(
                    EngineError::Cancelled,
                    in_flight.take(),
                    &mut queue,
                    false,
                    &state.bus,
                );
                return;
            }
            Step::Ctrl(Some(ControlMsg::Submit(task))) => {
                queue.push_back(task);
            }
            Step::Ctrl(Some(ControlMsg::IdleDone)) => {
                let idling = in_flight
                    .as_ref()
                    .map_or(false, |f| f.command.is_idle);
                if idling {
                    if let Err(e) = write_all(&mut stream, b"DONE\r\n").await {
                        fail_session(e, in_flight.take(), &mut queue, &state.bus);
                        return;
                    }
                } else {
                    debug!("DONE requested with no IDLE in flight");
                }
            }
            Step::Ctrl(Some(ControlMsg::UpgradeMark)) => {
                let (upgrade, done) = pending_upgrade.take().expect("upgrade closure present");
                if in_flight.is_some() {
                    let _ = done.send(Err(EngineError::precondition(
                        "cannot upgrade transport with a command in flight",
                    )));
                    continue;
                }
                match upgrade(stream).await {
                    Ok(upgraded) => {
                        stream = upgraded;
                        framer.reset();
                        awaiting_upgrade = false;
                        let _ = done.send(Ok(()));
                    }
                    Err(e) => {
                        let _ = done.send(Err(e.into()));
                        fail_session_with(
                            EngineError::ConnectionLost,
                            None,
                            &mut queue,
                            true,
                            &state.bus,
                        );
                        return;
                    }
                }
            }
            Step::Read(Ok(0)) => {
                fail_session(
                    EngineError::ConnectionLost,
                    in_flight.take(),
                    &mut queue,
                    &state.bus,
                );
                return;
            }
            Step::Read(Ok(n)) => {
                if awaiting_upgrade {
                    // Plaintext arriving between the STARTTLS OK and the
                    // handshake is untrusted; drop it.
                    debug!(bytes = n, "discarding input received before TLS upgrade");
                } else if let Err(e) = framer.receive(&buf[..n]) {
                    fail_session(e, in_flight.take(), &mut queue, &state.bus);
                    return;
                }
            }
            Step::Read(Err(e)) => {
                fail_session(e.into(), in_flight.take(), &mut queue, &state.bus);
                return;
            }
        }
    }
}

async fn start_command<S>(
    task: CommandTask,
    tags: &mut TagGenerator,
    stream: &mut S,
    in_flight: &mut Option<InFlight>,
) -> Result<(), EngineError>
where
    S: AsyncWrite + Unpin,
{
    let tag = tags.next();
    let CommandTask {
        command,
        parser,
        done,
    } = task;
    if command.redact_args {
        debug!(tag = %tag, command = %command.name, "sending command (arguments redacted)");
    } else {
        debug!(tag = %tag, command = %String::from_utf8_lossy(command.first_part()), "sending command");
    }
    let mut line = Vec::with_capacity(tag.len() + command.first_part().len() + 3);
    line.extend_from_slice(tag.as_bytes());
    line.push(b' ');
    line.extend_from_slice(command.first_part());
    line.extend_from_slice(b"\r\n");
    write_all(stream, &line).await?;
    *in_flight = Some(InFlight {
        tag,
        command,
        parser: Some(parser),
        done,
    });
    Ok(())
}

/// Process one unit. Returns true when a STARTTLS command just
/// completed OK: the caller must discard any remaining buffered input
/// and stop parsing until the transport is upgraded.
async fn handle_unit<S>(
    unit: ImapUnit,
    stream: &mut S,
    in_flight: &mut Option<InFlight>,
    state: &SessionState,
) -> Result<bool, EngineError>
where
    S: AsyncWrite + Unpin,
{
    let head = unit.head.as_str();

    if head.starts_with('+') {
        let next_part = match in_flight.as_mut() {
            Some(flight) if flight.command.is_idle => {
                debug!(tag = %flight.tag, "idling");
                return Ok(false);
            }
            Some(flight) => flight.command.on_continuation().map(<[u8]>::to_vec),
            None => {
                debug!("continuation with no command in flight");
                return Ok(false);
            }
        };
        match next_part {
            Some(mut part) => {
                part.extend_from_slice(b"\r\n");
                write_all(stream, &part).await?;
            }
            None => {
                let flight = in_flight.take().expect("checked above");
                let _ = flight.done.send(Err(EngineError::ContinuationAborted));
                // Unwedge the server; its error for this tag will be
                // dropped as unknown.
                write_all(stream, b"\r\n").await?;
            }
        }
        return Ok(false);
    }

    if head.starts_with("* ") {
        if let Some(flight) = in_flight.as_mut() {
            let parser = flight.parser.as_mut().expect("parser present until finish");
            if parser.accepts_untagged(&unit) {
                parser.push(&unit);
                // The hierarchy delimiter is session state, learned from
                // the first LIST response.
                if let ResponseParser::List {
                    separator: Some(sep),
                    ..
                } = parser
                {
                    let mut info = state.server_info.lock().unwrap();
                    if info.path_separator.is_none() {
                        info.path_separator = Some(*sep);
                    }
                }
                return Ok(false);
            }
        }
        return dispatch_unsolicited(&unit, state).map(|_| false);
    }

    match parse_tagged(head) {
        Some(tagged) => {
            let matches = in_flight
                .as_ref()
                .map_or(false, |f| f.tag == tagged.tag);
            if !matches {
                warn!(tag = %tagged.tag, "dropping response for unknown tag");
                return Ok(false);
            }
            let mut flight = in_flight.take().expect("checked above");
            let parser = flight.parser.take().expect("parser present until finish");
            let starttls_accepted =
                flight.command.name == "STARTTLS" && tagged.status == Status::Ok;
            // Capability hints on any tagged OK refresh the session set.
            if let Some(code) = &tagged.code {
                if let Some(caps) = code.strip_prefix("CAPABILITY ") {
                    state.server_info.lock().unwrap().set_capabilities(caps);
                }
            }
            let response = parser.finish(&tagged);
            if flight.done.send(Ok(response)).is_err() {
                debug!(tag = %tagged.tag, "caller cancelled; dropping completed response");
            }
            Ok(starttls_accepted)
        }
        None => Err(EngineError::protocol(format!(
            "unparseable response line: {}",
            head
        ))),
    }
}

/// Untagged responses outside any command's interest: update the
/// selected mailbox and raise events.
fn dispatch_unsolicited(unit: &ImapUnit, state: &SessionState) -> Result<(), EngineError> {
    match parse_state_event(unit) {
        Some(StateEvent::Exists(n)) => {
            if let Some(mb) = state.selected.lock().unwrap().as_mut() {
                mb.messages_exists = n;
            }
            state.bus.emit(&MailEvent::Exists(n));
        }
        Some(StateEvent::Recent(n)) => {
            if let Some(mb) = state.selected.lock().unwrap().as_mut() {
                mb.messages_recent = n;
            }
            state.bus.emit(&MailEvent::Recent(n));
        }
        Some(StateEvent::Expunge(n)) => {
            if let Some(mb) = state.selected.lock().unwrap().as_mut() {
                mb.messages_exists = mb.messages_exists.saturating_sub(1);
            }
            state.bus.emit(&MailEvent::Expunge(n));
        }
        Some(StateEvent::Fetch { seq, message }) => {
            if !message.flags.is_empty() {
                state
                    .bus
                    .emit(&MailEvent::FlagsChanged(seq, message.flags.clone()));
            }
            state.bus.emit(&MailEvent::Fetch(message));
        }
        Some(StateEvent::Capabilities(text)) => {
            state.server_info.lock().unwrap().set_capabilities(&text);
        }
        Some(StateEvent::Bye(text)) => {
            return Err(EngineError::Bye(text));
        }
        None => {
            debug!(head = %unit.head, "dropping unhandled untagged response");
        }
    }
    Ok(())
}

fn fail_session(
    error: EngineError,
    in_flight: Option<InFlight>,
    queue: &mut VecDeque<CommandTask>,
    bus: &EventBus,
) {
    fail_session_with(error, in_flight, queue, true, bus);
}

fn fail_session_with(
    error: EngineError,
    in_flight: Option<InFlight>,
    queue: &mut VecDeque<CommandTask>,
    emit_lost: bool,
    bus: &EventBus,
) {
    if let Some(flight) = in_flight {
        let _ = flight.done.send(Err(error));
    }
    for task in queue.drain(..) {
        let _ = task.done.send(Err(EngineError::ConnectionLost));
    }
    if emit_lost {
        bus.emit(&MailEvent::ConnectionLost);
    }
}

async fn write_all<S>(stream: &mut S, bytes: &[u8]) -> Result<(), EngineError>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(bytes).await?;
    stream.flush().await?;
    Ok(())
}
