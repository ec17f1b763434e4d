//! Classified errors returned by the transport.
//!
//! Every failure that leaves the crate is an [`Error`] with one of the stable
//! [`ErrorKind`]s. Errors are built in one place only (the classifier), so the
//! kind a caller sees never depends on which component noticed the problem.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error used by caller-supplied capabilities (token refreshers).
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Shared underlying cause of an [`Error`].
///
/// Clones of an error point at the same cause, so an observer and the caller
/// can tell they are looking at one failure.
pub type SharedError = Arc<dyn StdError + Send + Sync>;

/// Stable failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The connection could not be established, secured or greeted.
    Connection,
    /// Credentials were rejected, missing, or no mechanism could be used.
    Auth,
    /// The sender or every recipient was rejected, or DATA was refused.
    Envelope,
    /// The message source failed while being read.
    Stream,
    /// The server refused the message after it was transferred, or the
    /// message is larger than the server accepts.
    Message,
    /// A timeout elapsed or the send was aborted.
    Timeout,
    /// The connection failed after the handshake.
    Socket,
    /// The server sent a malformed or unexpected reply.
    Protocol,
}

impl ErrorKind {
    /// Returns the stable code for this kind (`"EAUTH"`, `"EENVELOPE"`, ...).
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Connection => "ECONNECTION",
            Self::Auth => "EAUTH",
            Self::Envelope => "EENVELOPE",
            Self::Stream => "ESTREAM",
            Self::Message => "EMESSAGE",
            Self::Timeout => "ETIMEDOUT",
            Self::Socket => "ESOCKET",
            Self::Protocol => "EPROTOCOL",
        }
    }

    const fn description(self) -> &'static str {
        match self {
            Self::Connection => "connection error",
            Self::Auth => "authentication error",
            Self::Envelope => "envelope error",
            Self::Stream => "message stream error",
            Self::Message => "message error",
            Self::Timeout => "timeout",
            Self::Socket => "network error",
            Self::Protocol => "protocol error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A classified transport failure.
#[derive(Clone)]
pub struct Error {
    inner: Box<Inner>,
}

#[derive(Clone)]
struct Inner {
    kind: ErrorKind,
    message: String,
    response_code: Option<u16>,
    cancelled: bool,
    source: Option<SharedError>,
}

impl Error {
    pub(crate) fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            inner: Box::new(Inner {
                kind,
                message: message.into(),
                response_code: None,
                cancelled: false,
                source: None,
            }),
        }
    }

    pub(crate) fn with_response_code(mut self, code: Option<u16>) -> Self {
        self.inner.response_code = code;
        self
    }

    pub(crate) fn with_source(mut self, source: Option<SharedError>) -> Self {
        self.inner.source = source;
        self
    }

    pub(crate) fn cancelled(mut self) -> Self {
        self.inner.cancelled = true;
        self
    }

    /// Returns the failure category.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.inner.kind
    }

    /// Returns the stable code of the failure category.
    #[must_use]
    pub fn code(&self) -> &'static str {
        self.inner.kind.code()
    }

    /// Returns the human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.inner.message
    }

    /// Returns the SMTP reply code that caused the failure, if any.
    #[must_use]
    pub fn response_code(&self) -> Option<u16> {
        self.inner.response_code
    }

    /// Returns true if the send was aborted by the caller.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled
    }

    /// Returns true for timeouts and aborts.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.inner.kind == ErrorKind::Timeout
    }

    /// Returns the shared underlying cause, if any.
    #[must_use]
    pub fn cause(&self) -> Option<&SharedError> {
        self.inner.source.as_ref()
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut builder = f.debug_struct("mailpost::Error");

        builder.field("kind", &self.inner.kind);
        builder.field("message", &self.inner.message);

        if let Some(code) = self.inner.response_code {
            builder.field("response_code", &code);
        }
        if self.inner.cancelled {
            builder.field("cancelled", &true);
        }
        if let Some(ref source) = self.inner.source {
            builder.field("source", source);
        }

        builder.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.inner.kind, self.inner.message)
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source.as_ref().map(|e| {
            let r: &(dyn StdError + 'static) = &**e;
            r
        })
    }
}
