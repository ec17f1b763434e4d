//! Failure classification.
//!
//! Components report a [`Failure`]: the protocol stage they were in and what
//! went wrong. [`classify`] is the only place a failure becomes a public
//! [`Error`], so every kind and message is decided here.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use mailpost_smtp::{Address, Reply};

use crate::error::{BoxError, Error, ErrorKind, SharedError};

/// Protocol stage a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stage {
    /// Envelope construction, before any network activity.
    Validate,
    Connect,
    Greeting,
    StartTls,
    Auth,
    MailFrom,
    RcptTo,
    Data,
    Body,
    Acceptance,
}

/// What went wrong.
#[derive(Debug, thiserror::Error)]
pub(crate) enum Cause {
    /// Wire-level failure (I/O, TLS, malformed reply, unexpected code).
    #[error("{0}")]
    Wire(#[from] mailpost_smtp::Error),

    /// The server answered with a failure reply.
    #[error("{0}")]
    Rejected(Reply),

    /// Every RCPT TO was refused.
    #[error("all recipients were rejected")]
    AllRecipientsRejected(Vec<(Address, Reply)>),

    /// The message source failed. Shared so the event side channel reports
    /// the very same cause.
    #[error("{0}")]
    Source(Arc<io::Error>),

    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("aborted by caller")]
    Aborted,

    /// Local envelope validation failed.
    #[error("{0}")]
    Invalid(String),

    #[error("message size {size} exceeds server limit of {limit} bytes")]
    TooLarge { size: usize, limit: usize },

    /// Local authentication failure (no secret, unusable mechanism).
    #[error("{0}")]
    Auth(String),

    #[error("token refresh failed: {0}")]
    TokenRefresh(BoxError),
}

/// A failure raised inside the engine, not yet classified.
#[derive(Debug)]
pub(crate) struct Failure {
    pub(crate) stage: Stage,
    pub(crate) cause: Cause,
}

impl Failure {
    pub(crate) const fn new(stage: Stage, cause: Cause) -> Self {
        Self { stage, cause }
    }

    /// Returns true if the server is still waiting for the next command, so a
    /// polite QUIT can be sent before closing.
    pub(crate) fn connection_usable(&self) -> bool {
        match self.cause {
            Cause::Rejected(_)
            | Cause::AllRecipientsRejected(_)
            | Cause::TooLarge { .. }
            | Cause::Auth(_)
            | Cause::TokenRefresh(_) => !matches!(self.stage, Stage::Body),
            Cause::Wire(mailpost_smtp::Error::SmtpError { .. }) => {
                matches!(
                    self.stage,
                    Stage::Auth | Stage::MailFrom | Stage::RcptTo | Stage::Data
                )
            }
            _ => false,
        }
    }
}

/// Returns the kind a failure is reported as.
pub(crate) fn kind_of(failure: &Failure) -> ErrorKind {
    match &failure.cause {
        Cause::TimedOut(_) | Cause::Aborted => ErrorKind::Timeout,
        Cause::Source(_) => ErrorKind::Stream,
        Cause::TooLarge { .. } => ErrorKind::Message,
        Cause::Invalid(_) => ErrorKind::Envelope,
        Cause::Auth(_) | Cause::TokenRefresh(_) => ErrorKind::Auth,
        Cause::Rejected(_) | Cause::AllRecipientsRejected(_) => match failure.stage {
            Stage::Connect | Stage::Greeting | Stage::StartTls => ErrorKind::Connection,
            Stage::Auth => ErrorKind::Auth,
            Stage::Validate | Stage::MailFrom | Stage::RcptTo | Stage::Data => {
                ErrorKind::Envelope
            }
            Stage::Body | Stage::Acceptance => ErrorKind::Message,
        },
        Cause::Wire(err) => match failure.stage {
            Stage::Validate => ErrorKind::Envelope,
            Stage::Connect | Stage::Greeting | Stage::StartTls => ErrorKind::Connection,
            _ if err.is_transport() => ErrorKind::Socket,
            Stage::Auth => ErrorKind::Auth,
            Stage::MailFrom | Stage::RcptTo | Stage::Data => match err {
                mailpost_smtp::Error::SmtpError { .. } => ErrorKind::Envelope,
                _ => ErrorKind::Protocol,
            },
            Stage::Body | Stage::Acceptance => ErrorKind::Protocol,
        },
    }
}

fn response_code(cause: &Cause) -> Option<u16> {
    match cause {
        Cause::Rejected(reply) => Some(reply.code.as_u16()),
        Cause::AllRecipientsRejected(rejected) => {
            rejected.last().map(|(_, reply)| reply.code.as_u16())
        }
        Cause::Wire(mailpost_smtp::Error::SmtpError { code, .. }) => Some(*code),
        _ => None,
    }
}

fn stage_prefix(stage: Stage) -> &'static str {
    match stage {
        Stage::Validate => "Invalid envelope",
        Stage::Connect => "Connection failed",
        Stage::Greeting => "Greeting failed",
        Stage::StartTls => "STARTTLS failed",
        Stage::Auth => "Invalid login",
        Stage::MailFrom => "Mail command failed",
        Stage::RcptTo => "Recipient command failed",
        Stage::Data => "Data command failed",
        Stage::Body => "Message transfer failed",
        Stage::Acceptance => "Message failed",
    }
}

fn message(stage: Stage, cause: &Cause) -> String {
    match cause {
        Cause::AllRecipientsRejected(rejected) => {
            let details: Vec<String> = rejected
                .iter()
                .map(|(address, reply)| format!("<{address}>: {reply}"))
                .collect();
            format!(
                "Can't send mail - all recipients were rejected: {}",
                details.join("; ")
            )
        }
        Cause::Source(err) => format!("Message stream failed: {err}"),
        Cause::Aborted => "Send aborted".to_string(),
        Cause::TokenRefresh(_) | Cause::Auth(_) => format!("Authentication failed: {cause}"),
        Cause::TimedOut(_) if stage == Stage::Greeting => {
            format!("Greeting never received: {cause}")
        }
        _ => format!("{}: {cause}", stage_prefix(stage)),
    }
}

fn source(cause: Cause) -> Option<SharedError> {
    match cause {
        Cause::Wire(err) => Some(Arc::new(err) as SharedError),
        Cause::Source(err) => Some(err as SharedError),
        Cause::TokenRefresh(err) => Some(Arc::from(err)),
        _ => None,
    }
}

/// Turns a failure into the public error.
pub(crate) fn classify(failure: Failure) -> Error {
    let kind = kind_of(&failure);
    let Failure { stage, cause } = failure;

    let mut error = Error::new(kind, message(stage, &cause))
        .with_response_code(response_code(&cause));
    if matches!(cause, Cause::Aborted) {
        error = error.cancelled();
    }
    error.with_source(source(cause))
}
