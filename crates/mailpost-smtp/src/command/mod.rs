//! Client commands.

use std::fmt;

use crate::types::{Address, AuthMechanism};

/// A command line the client sends.
///
/// `Display` renders the line without its CRLF; [`Command::serialize`]
/// produces the bytes that go on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `EHLO <name>`
    Ehlo {
        /// Name the client announces.
        hostname: String,
    },
    /// `HELO <name>`, for servers that refuse EHLO.
    Helo {
        /// Name the client announces.
        hostname: String,
    },
    /// `STARTTLS`
    StartTls,
    /// `AUTH <mechanism> [initial-response]`
    Auth {
        /// Mechanism to run.
        mechanism: AuthMechanism,
        /// Base64 initial response (SASL-IR).
        initial_response: Option<String>,
    },
    /// Continuation line answering a `334` challenge (may be empty).
    AuthResponse(String),
    /// `MAIL FROM:<sender> [BODY=..] [SIZE=..]`
    MailFrom {
        /// Reverse path.
        from: Address,
        /// `BODY` parameter, e.g. `8BITMIME`.
        body: Option<String>,
        /// `SIZE` parameter in bytes.
        size: Option<usize>,
    },
    /// `RCPT TO:<recipient>`
    RcptTo {
        /// Forward path.
        to: Address,
    },
    /// `DATA`
    Data,
    /// `QUIT`
    Quit,
}

impl Command {
    /// The command line followed by CRLF.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        format!("{self}\r\n").into_bytes()
    }

    /// The line as it may appear in logs, with SASL secrets masked.
    #[must_use]
    pub fn log_line(&self) -> String {
        match self {
            Self::Auth {
                mechanism,
                initial_response: Some(_),
            } => format!("AUTH {} /* secret */", mechanism.as_str()),
            Self::AuthResponse(response) if !response.is_empty() => "/* secret */".to_string(),
            _ => self.to_string(),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ehlo { hostname } => write!(f, "EHLO {hostname}"),
            Self::Helo { hostname } => write!(f, "HELO {hostname}"),
            Self::StartTls => f.write_str("STARTTLS"),
            Self::Auth {
                mechanism,
                initial_response,
            } => {
                write!(f, "AUTH {}", mechanism.as_str())?;
                match initial_response {
                    Some(response) => write!(f, " {response}"),
                    None => Ok(()),
                }
            }
            Self::AuthResponse(response) => f.write_str(response),
            Self::MailFrom { from, body, size } => {
                write!(f, "MAIL FROM:<{}>", from.as_str())?;
                if let Some(body) = body {
                    write!(f, " BODY={body}")?;
                }
                if let Some(size) = size {
                    write!(f, " SIZE={size}")?;
                }
                Ok(())
            }
            Self::RcptTo { to } => write!(f, "RCPT TO:<{}>", to.as_str()),
            Self::Data => f.write_str("DATA"),
            Self::Quit => f.write_str("QUIT"),
        }
    }
}
