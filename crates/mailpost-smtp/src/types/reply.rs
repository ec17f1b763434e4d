//! Server replies.

use std::fmt;

/// The first digit of a reply code, per RFC 5321 section 4.2.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyClass {
    /// 2yz: the command completed.
    Completed,
    /// 3yz: the server waits for more input (DATA, SASL challenges).
    Intermediate,
    /// 4yz: try again later.
    Transient,
    /// 5yz: do not retry.
    Permanent,
    /// Anything outside 200..=599.
    Unknown,
}

/// A three-digit reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReplyCode(u16);

impl ReplyCode {
    /// 220 service ready, sent as the greeting and after STARTTLS.
    pub const SERVICE_READY: Self = Self(220);
    /// 221 closing channel, the answer to QUIT.
    pub const CLOSING: Self = Self(221);
    /// 250 action completed.
    pub const OK: Self = Self(250);
    /// 334 SASL continuation.
    pub const AUTH_CONTINUE: Self = Self(334);
    /// 354 start message input.
    pub const START_DATA: Self = Self(354);

    /// Wraps a raw code.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// The numeric value.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Which class the code belongs to.
    #[must_use]
    pub const fn class(self) -> ReplyClass {
        match self.0 / 100 {
            2 => ReplyClass::Completed,
            3 => ReplyClass::Intermediate,
            4 => ReplyClass::Transient,
            5 => ReplyClass::Permanent,
            _ => ReplyClass::Unknown,
        }
    }

    /// True for 2yz codes.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self.class(), ReplyClass::Completed)
    }
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A complete, possibly multi-line, reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Reply code shared by every line.
    pub code: ReplyCode,
    /// Text of each line without the code and separator.
    pub message: Vec<String>,
}

impl Reply {
    /// Builds a reply from its parts.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(code: ReplyCode, message: Vec<String>) -> Self {
        Self { code, message }
    }

    /// True for 2yz replies.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code.is_success()
    }

    /// Lines joined with newlines, as logged and carried in errors.
    #[must_use]
    pub fn message_text(&self) -> String {
        self.message.join("\n")
    }
}

/// Renders the way servers send a one-line reply, e.g. `550 Invalid sender`.
impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{} {}", self.code, self.message.join(" "))
        }
    }
}
