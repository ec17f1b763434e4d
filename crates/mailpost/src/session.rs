//! Send session state machine.
//!
//! A [`Session`] walks one message through the SMTP transaction. Each call
//! to `step` performs one network action and returns the next state; any
//! failure moves the session to `Failed` and is handed to the classifier by
//! the caller.

use mailpost_smtp::{Address, Command, Reply, ReplyCode};

use crate::auth;
use crate::classify::{Cause, Failure, Stage, kind_of};
use crate::connection::Connection;
use crate::envelope::Envelope;
use crate::error::ErrorKind;
use crate::relay::{MessageSource, relay};

/// Where a send currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionState {
    Connecting,
    Connected,
    Greeted,
    Authenticated,
    MailFromSent,
    RcptToSent { accepted: usize },
    DataRequested,
    BodyStreamed,
    Completed,
    Failed(ErrorKind),
}

impl SessionState {
    const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_))
    }
}

/// A recipient the server refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// The refused recipient.
    pub recipient: Address,
    /// Reply code.
    pub code: u16,
    /// Reply text.
    pub message: String,
}

/// Outcome of a successful send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    /// Recipients the server accepted.
    pub accepted: Vec<Address>,
    /// Recipients the server refused.
    pub rejected: Vec<Rejection>,
    /// The server's final reply to the message, e.g. `250 OK: queued as 1234`.
    pub response: String,
    /// Bytes written between `DATA` and the end of the terminator.
    pub bytes_written: u64,
}

pub(crate) struct Session<'e> {
    envelope: &'e Envelope,
    state: SessionState,
    stage: Stage,
    response: Option<Reply>,
    accepted: Vec<Address>,
    rejected: Vec<(Address, Reply)>,
    bytes_written: u64,
}

impl<'e> Session<'e> {
    pub(crate) const fn new(envelope: &'e Envelope) -> Self {
        Self {
            envelope,
            state: SessionState::Connecting,
            stage: Stage::Connect,
            response: None,
            accepted: Vec::new(),
            rejected: Vec::new(),
            bytes_written: 0,
        }
    }

    #[cfg(test)]
    pub(crate) const fn state(&self) -> SessionState {
        self.state
    }

    /// Drives the session until it completes or fails.
    pub(crate) async fn run<S>(
        &mut self,
        conn: &mut Connection<'_>,
        source: &mut S,
    ) -> Result<(), Failure>
    where
        S: MessageSource + ?Sized,
    {
        while !self.state.is_terminal() {
            match self.step(conn, source).await {
                Ok(next) => {
                    tracing::trace!(from = ?self.state, to = ?next, "session");
                    self.state = next;
                }
                Err(failure) => {
                    self.state = SessionState::Failed(kind_of(&failure));
                    return Err(failure);
                }
            }
        }
        Ok(())
    }

    /// Marks the session as aborted in whatever stage it was waiting.
    pub(crate) fn abort(&mut self) -> Failure {
        let failure = Failure::new(self.stage, Cause::Aborted);
        self.state = SessionState::Failed(kind_of(&failure));
        failure
    }

    async fn step<S>(
        &mut self,
        conn: &mut Connection<'_>,
        source: &mut S,
    ) -> Result<SessionState, Failure>
    where
        S: MessageSource + ?Sized,
    {
        match self.state {
            SessionState::Connecting => {
                self.stage = Stage::Connect;
                conn.connect().await?;
                Ok(SessionState::Connected)
            }
            SessionState::Connected => {
                self.stage = Stage::Greeting;
                conn.handshake().await?;
                Ok(SessionState::Greeted)
            }
            SessionState::Greeted => match conn.options().auth.as_ref() {
                Some(credentials) => {
                    self.stage = Stage::Auth;
                    auth::authenticate(conn, credentials).await?;
                    Ok(SessionState::Authenticated)
                }
                None => self.mail_from(conn).await,
            },
            SessionState::Authenticated => self.mail_from(conn).await,
            SessionState::MailFromSent => self.rcpt_to(conn).await,
            SessionState::RcptToSent { accepted } => {
                tracing::debug!(accepted, "requesting DATA");
                self.data(conn).await
            }
            SessionState::DataRequested => {
                self.stage = Stage::Body;
                self.bytes_written = relay(source, conn).await?;
                Ok(SessionState::BodyStreamed)
            }
            SessionState::BodyStreamed => self.acceptance(conn).await,
            state @ (SessionState::Completed | SessionState::Failed(_)) => Ok(state),
        }
    }

    async fn mail_from(&mut self, conn: &mut Connection<'_>) -> Result<SessionState, Failure> {
        self.stage = Stage::MailFrom;
        let size_hint = self.envelope.size_hint();
        let (eight_bit, size_supported, limit) = conn.server_info().map_or(
            (false, false, None),
            |info| {
                (
                    info.supports_8bitmime(),
                    info.supports_size(),
                    info.max_message_size(),
                )
            },
        );

        if let (Some(size), Some(limit)) = (size_hint, limit)
            && size > limit
        {
            return Err(Failure::new(Stage::MailFrom, Cause::TooLarge { size, limit }));
        }

        let command = Command::MailFrom {
            from: self.envelope.from().clone(),
            body: eight_bit.then(|| "8BITMIME".to_string()),
            size: size_hint.filter(|_| size_supported),
        };
        let reply = conn
            .command(&command)
            .await
            .map_err(|cause| Failure::new(Stage::MailFrom, cause))?;
        if !reply.is_success() {
            return Err(Failure::new(Stage::MailFrom, Cause::Rejected(reply)));
        }
        Ok(SessionState::MailFromSent)
    }

    async fn rcpt_to(&mut self, conn: &mut Connection<'_>) -> Result<SessionState, Failure> {
        self.stage = Stage::RcptTo;
        let envelope = self.envelope;

        for recipient in envelope.to() {
            let reply = conn
                .command(&Command::RcptTo {
                    to: recipient.clone(),
                })
                .await
                .map_err(|cause| Failure::new(Stage::RcptTo, cause))?;

            if reply.is_success() {
                self.accepted.push(recipient.clone());
            } else {
                tracing::warn!(%recipient, %reply, "recipient rejected");
                self.rejected.push((recipient.clone(), reply));
            }
        }

        if self.accepted.is_empty() {
            let rejected = std::mem::take(&mut self.rejected);
            return Err(Failure::new(
                Stage::RcptTo,
                Cause::AllRecipientsRejected(rejected),
            ));
        }
        Ok(SessionState::RcptToSent {
            accepted: self.accepted.len(),
        })
    }

    async fn data(&mut self, conn: &mut Connection<'_>) -> Result<SessionState, Failure> {
        self.stage = Stage::Data;
        let reply = conn
            .command(&Command::Data)
            .await
            .map_err(|cause| Failure::new(Stage::Data, cause))?;
        if reply.code != ReplyCode::START_DATA {
            return Err(Failure::new(Stage::Data, Cause::Rejected(reply)));
        }
        Ok(SessionState::DataRequested)
    }

    async fn acceptance(&mut self, conn: &mut Connection<'_>) -> Result<SessionState, Failure> {
        self.stage = Stage::Acceptance;
        let reply = conn
            .read_reply()
            .await
            .map_err(|cause| Failure::new(Stage::Acceptance, cause))?;
        if !reply.is_success() {
            return Err(Failure::new(Stage::Acceptance, Cause::Rejected(reply)));
        }

        tracing::info!(
            accepted = self.accepted.len(),
            rejected = self.rejected.len(),
            bytes = self.bytes_written,
            response = %reply,
            "message accepted"
        );
        // Queued. QUIT is left to the caller's teardown.
        self.response = Some(reply);
        Ok(SessionState::Completed)
    }

    /// Consumes a completed session into its report.
    pub(crate) fn into_report(self) -> SendReport {
        SendReport {
            accepted: self.accepted,
            rejected: self
                .rejected
                .into_iter()
                .map(|(recipient, reply)| Rejection {
                    recipient,
                    code: reply.code.as_u16(),
                    message: reply.message.join(" "),
                })
                .collect(),
            response: self.response.map(|reply| reply.to_string()).unwrap_or_default(),
            bytes_written: self.bytes_written,
        }
    }
}
