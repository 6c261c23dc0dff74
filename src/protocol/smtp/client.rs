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

//! SMTP client (RFC 5321): EHLO, STARTTLS, AUTH PLAIN/LOGIN, then
//! MAIL FROM / RCPT TO / DATA transactions. Every transition is gated
//! on a 2yz reply; 4yz is a transient failure, 5yz permanent.

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::EngineError;
use crate::framer::{read_unit, Framer, FramerMode, SmtpReply, Unit};
use crate::net::MailStream;
use crate::protocol::smtp::dot_stuffer::DotStuffer;
use crate::sasl;

/// SMTP failure, split by reply class as the state machine requires.
#[derive(Debug)]
pub enum SmtpError {
    /// 4yz: try again later.
    Transient { code: u16, message: String },
    /// 5yz: the transaction will never succeed as-is.
    Permanent { code: u16, message: String },
    /// Session-level failure (socket, framing).
    Engine(EngineError),
}

impl SmtpError {
    fn from_reply(reply: &SmtpReply) -> Self {
        if reply.is_transient() {
            SmtpError::Transient {
                code: reply.code,
                message: reply.message().to_string(),
            }
        } else {
            SmtpError::Permanent {
                code: reply.code,
                message: reply.message().to_string(),
            }
        }
    }
}

impl std::fmt::Display for SmtpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SmtpError::Transient { code, message } => {
                write!(f, "transient failure {}: {}", code, message)
            }
            SmtpError::Permanent { code, message } => {
                write!(f, "permanent failure {}: {}", code, message)
            }
            SmtpError::Engine(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SmtpError {}

impl From<EngineError> for SmtpError {
    fn from(e: EngineError) -> Self {
        SmtpError::Engine(e)
    }
}

impl From<std::io::Error> for SmtpError {
    fn from(e: std::io::Error) -> Self {
        SmtpError::Engine(e.into())
    }
}

/// Extensions advertised by EHLO.
#[derive(Debug, Clone, Default)]
pub struct SmtpExtensions {
    pub starttls: bool,
    pub pipelining: bool,
    pub auth_mechanisms: Vec<String>,
    pub max_size: Option<u64>,
}

/// Envelope for one transaction: reverse path and forward paths.
#[derive(Debug, Clone)]
pub struct SmtpEnvelope {
    pub sender: String,
    pub recipients: Vec<String>,
}

/// SMTP client over any duplex byte stream. The linear state machine is
/// Connected → Greeted → (STARTTLS → Connected') → Authenticated →
/// transactions → Quit; each method enforces its own gate.
pub struct SmtpClient<S = MailStream> {
    stream: S,
    framer: Framer,
    extensions: SmtpExtensions,
    greeted: bool,
}

impl SmtpClient<MailStream> {
    pub async fn connect(host: &str, port: u16, is_secure: bool) -> Result<Self, SmtpError> {
        let stream = MailStream::connect(host, port, is_secure).await?;
        Ok(Self::with_stream(stream))
    }

    /// STARTTLS: on 220, upgrade the transport and re-EHLO (prior
    /// extensions are invalidated by the upgrade).
    pub async fn start_tls(
        mut self,
        host: &str,
        ehlo_hostname: &str,
    ) -> Result<SmtpClient<MailStream>, SmtpError> {
        let reply = self.command("STARTTLS").await?;
        if reply.code != 220 {
            return Err(SmtpError::from_reply(&reply));
        }
        let stream = self.stream.upgrade_to_tls(host).await?;
        let mut upgraded = SmtpClient::with_stream(stream);
        upgraded.greeted = true;
        upgraded.ehlo(ehlo_hostname).await?;
        Ok(upgraded)
    }
}

impl<S> SmtpClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn with_stream(stream: S) -> Self {
        Self {
            stream,
            framer: Framer::new(FramerMode::Smtp),
            extensions: SmtpExtensions::default(),
            greeted: false,
        }
    }

    pub fn extensions(&self) -> &SmtpExtensions {
        &self.extensions
    }

    async fn read_reply(&mut self) -> Result<SmtpReply, SmtpError> {
        match read_unit(&mut self.stream, &mut self.framer).await? {
            Unit::Smtp(reply) => Ok(reply),
            _ => unreachable!("framer is in SMTP mode"),
        }
    }

    async fn command(&mut self, line: &str) -> Result<SmtpReply, SmtpError> {
        debug!(command = %line.split_whitespace().next().unwrap_or(""), "smtp send");
        self.stream.write_all(line.as_bytes()).await?;
        self.stream.write_all(b"\r\n").await?;
        self.stream.flush().await?;
        self.read_reply().await
    }

    /// Consume the 220 greeting.
    pub async fn read_greeting(&mut self) -> Result<SmtpReply, SmtpError> {
        let reply = self.read_reply().await?;
        if reply.code != 220 {
            return Err(SmtpError::from_reply(&reply));
        }
        Ok(reply)
    }

    /// EHLO; records the advertised extensions.
    pub async fn ehlo(&mut self, hostname: &str) -> Result<&SmtpExtensions, SmtpError> {
        let reply = self.command(&format!("EHLO {}", hostname)).await?;
        if !reply.is_positive() {
            return Err(SmtpError::from_reply(&reply));
        }
        let mut extensions = SmtpExtensions::default();
        // First line is the server's greeting text; the rest are
        // extension keywords.
        for line in reply.lines.iter().skip(1) {
            let upper = line.to_uppercase();
            if upper == "STARTTLS" {
                extensions.starttls = true;
            } else if upper == "PIPELINING" {
                extensions.pipelining = true;
            } else if let Some(rest) = upper.strip_prefix("AUTH ") {
                extensions.auth_mechanisms =
                    rest.split_whitespace().map(str::to_string).collect();
            } else if let Some(rest) = upper.strip_prefix("SIZE") {
                extensions.max_size = rest.trim().parse().ok();
            }
        }
        self.extensions = extensions;
        self.greeted = true;
        Ok(&self.extensions)
    }

    /// AUTH PLAIN with the initial response inline.
    pub async fn auth_plain(&mut self, user: &str, password: &str) -> Result<(), SmtpError> {
        let initial = sasl::initial_response_plain("", user, password)
            .map_err(|e| EngineError::precondition(e.to_string()))?;
        let b64 = String::from_utf8_lossy(&sasl::base64_encode(&initial)).into_owned();
        self.stream.write_all(b"AUTH PLAIN ").await?;
        self.stream.write_all(b64.as_bytes()).await?;
        self.stream.write_all(b"\r\n").await?;
        self.stream.flush().await?;
        debug!("smtp send AUTH PLAIN (credentials redacted)");
        let reply = self.read_reply().await?;
        if reply.code == 235 {
            Ok(())
        } else {
            Err(SmtpError::from_reply(&reply))
        }
    }

    /// AUTH LOGIN: 334 challenges for username and password.
    pub async fn auth_login(&mut self, user: &str, password: &str) -> Result<(), SmtpError> {
        let mut reply = self.command("AUTH LOGIN").await?;
        loop {
            match reply.code {
                235 => return Ok(()),
                334 => {
                    let answer = sasl::login_respond_to_challenge(
                        reply.message().trim(),
                        user,
                        password,
                    )
                    .map_err(|e| EngineError::protocol(e.to_string()))?;
                    self.stream.write_all(&answer).await?;
                    self.stream.write_all(b"\r\n").await?;
                    self.stream.flush().await?;
                    reply = self.read_reply().await?;
                }
                _ => return Err(SmtpError::from_reply(&reply)),
            }
        }
    }

    /// One mail transaction: MAIL FROM, RCPT TO for each recipient,
    /// DATA with dot-stuffed payload.
    pub async fn send_message(
        &mut self,
        envelope: &SmtpEnvelope,
        message: &[u8],
    ) -> Result<SmtpReply, SmtpError> {
        if !self.greeted {
            return Err(SmtpError::Engine(EngineError::precondition(
                "EHLO must complete before a transaction",
            )));
        }
        if envelope.recipients.is_empty() {
            return Err(SmtpError::Engine(EngineError::precondition(
                "no recipients",
            )));
        }

        let reply = self
            .command(&format!("MAIL FROM:<{}>", envelope.sender))
            .await?;
        if !reply.is_positive() {
            return Err(SmtpError::from_reply(&reply));
        }

        for rcpt in &envelope.recipients {
            let reply = self.command(&format!("RCPT TO:<{}>", rcpt)).await?;
            // 251/252 are forward-without-verify acceptances.
            if !reply.is_positive() && reply.code != 251 && reply.code != 252 {
                return Err(SmtpError::from_reply(&reply));
            }
        }

        let reply = self.command("DATA").await?;
        if reply.code != 354 {
            return Err(SmtpError::from_reply(&reply));
        }
        self.stream.write_all(&DotStuffer::stuff(message)).await?;
        self.stream.flush().await?;

        let reply = self.read_reply().await?;
        if !reply.is_positive() {
            return Err(SmtpError::from_reply(&reply));
        }
        Ok(reply)
    }

    /// QUIT; the reply is advisory.
    pub async fn quit(&mut self) -> Result<(), SmtpError> {
        let _ = self.command("QUIT").await;
        Ok(())
    }
}
