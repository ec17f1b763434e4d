//! Command/reply client over an [`SmtpStream`].
//!
//! The client only knows how to exchange commands and replies. Deciding what
//! a reply means for the mail transaction is left to the caller.

use super::{ServerInfo, SmtpStream, TlsPolicy};
use crate::command::Command;
use crate::error::{Error, Result};
use crate::parser::{is_last_reply_line, parse_reply};
use crate::types::{Extension, Reply, ReplyCode};

/// Maximum number of lines accepted in one multi-line reply.
const MAX_REPLY_LINES: usize = 512;

/// SMTP client owning one stream.
#[derive(Debug)]
pub struct Client {
    stream: SmtpStream,
    server_info: ServerInfo,
}

impl Client {
    /// Wraps a connected stream. The greeting has not been read yet.
    #[must_use]
    pub fn new(stream: SmtpStream) -> Self {
        Self {
            stream,
            server_info: ServerInfo::default(),
        }
    }

    /// Returns the server information collected so far.
    #[must_use]
    pub const fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// Returns true if the stream is encrypted.
    #[must_use]
    pub const fn is_encrypted(&self) -> bool {
        self.stream.is_encrypted()
    }

    /// Reads the `220` greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the server refuses service.
    pub async fn read_greeting(&mut self) -> Result<Reply> {
        let greeting = self.read_reply().await?;
        if !greeting.is_success() {
            return Err(Error::smtp_error(
                greeting.code.as_u16(),
                greeting.message_text(),
            ));
        }

        self.server_info.hostname = greeting
            .message
            .first()
            .and_then(|msg| msg.split_whitespace().next())
            .unwrap_or("unknown")
            .to_string();

        Ok(greeting)
    }

    /// Sends EHLO and, on success, replaces the known extensions.
    ///
    /// The reply is returned whatever its code so the caller can fall back
    /// to HELO.
    ///
    /// # Errors
    ///
    /// Returns an error only if the exchange itself fails.
    pub async fn ehlo(&mut self, client_hostname: &str) -> Result<Reply> {
        let reply = self
            .send_command(&Command::Ehlo {
                hostname: client_hostname.to_string(),
            })
            .await?;

        if reply.is_success() {
            // First line is the greeting, the rest are extensions.
            self.server_info.extensions = reply
                .message
                .iter()
                .skip(1)
                .map(|line| Extension::parse(line))
                .collect();
        }

        Ok(reply)
    }

    /// Sends HELO. Extensions are cleared since HELO advertises none.
    ///
    /// # Errors
    ///
    /// Returns an error only if the exchange itself fails.
    pub async fn helo(&mut self, client_hostname: &str) -> Result<Reply> {
        let reply = self
            .send_command(&Command::Helo {
                hostname: client_hostname.to_string(),
            })
            .await?;

        if reply.is_success() {
            self.server_info.extensions.clear();
        }

        Ok(reply)
    }

    /// Upgrades the connection to TLS using STARTTLS.
    ///
    /// Extensions are forgotten; the caller must re-issue EHLO.
    ///
    /// # Errors
    ///
    /// Returns an error if the server refuses STARTTLS or the handshake fails.
    pub async fn starttls(mut self, hostname: &str, policy: &TlsPolicy) -> Result<Self> {
        let reply = self.send_command(&Command::StartTls).await?;
        if reply.code != ReplyCode::SERVICE_READY {
            return Err(Error::smtp_error(reply.code.as_u16(), reply.message_text()));
        }

        let stream = self.stream.upgrade_to_tls(hostname, policy).await?;
        Ok(Self {
            stream,
            server_info: ServerInfo {
                hostname: self.server_info.hostname,
                extensions: std::collections::HashSet::new(),
            },
        })
    }

    /// Sends a command and reads its reply.
    ///
    /// # Errors
    ///
    /// Returns an error if writing or reading fails.
    pub async fn send_command(&mut self, cmd: &Command) -> Result<Reply> {
        tracing::debug!(command = %cmd.log_line(), "C:");
        self.stream.write_all(&cmd.serialize()).await?;
        self.read_reply().await
    }

    /// Writes raw bytes (message content) without reading a reply.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data).await
    }

    /// Reads one complete (possibly multi-line) reply.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the reply is malformed.
    pub async fn read_reply(&mut self) -> Result<Reply> {
        let mut lines = Vec::new();
        loop {
            let line = self.stream.read_line().await?;
            if line.is_empty() {
                continue;
            }

            let is_last = is_last_reply_line(&line);
            lines.push(line);

            if is_last {
                break;
            }
            if lines.len() >= MAX_REPLY_LINES {
                return Err(Error::Protocol(format!(
                    "Reply exceeds {MAX_REPLY_LINES} lines"
                )));
            }
        }

        let reply = parse_reply(&lines)?;
        tracing::trace!(code = reply.code.as_u16(), text = %reply.message_text(), "S:");
        Ok(reply)
    }

    /// Shuts the stream down. The client should not be used afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the shutdown fails.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.stream.shutdown().await
    }
}
