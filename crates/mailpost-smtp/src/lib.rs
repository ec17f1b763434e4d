//! # mailpost-smtp
//!
//! SMTP wire protocol primitives (RFC 5321) used by the `mailpost` transport.
//!
//! ## Features
//!
//! - **Replies**: single and multi-line reply parsing, reply code classes
//! - **Commands**: EHLO/HELO, STARTTLS, AUTH, MAIL FROM, RCPT TO, DATA, QUIT
//! - **TLS**: implicit TLS and STARTTLS over rustls with a pluggable
//!   certificate policy
//! - **SASL**: PLAIN, LOGIN, XOAUTH2 and OAUTHBEARER payloads
//! - **DATA transparency**: streaming dot-stuffing and CRLF normalization
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailpost_smtp::{Address, Client, Command, TlsPolicy};
//! use mailpost_smtp::connection::connect;
//!
//! #[tokio::main]
//! async fn main() -> mailpost_smtp::Result<()> {
//!     let stream = connect("smtp.example.com", 587).await?;
//!     let mut client = Client::new(stream);
//!     client.read_greeting().await?;
//!     client.ehlo("client.example.com").await?;
//!
//!     let mut client = client
//!         .starttls("smtp.example.com", &TlsPolicy::default())
//!         .await?;
//!     client.ehlo("client.example.com").await?;
//!
//!     let from = Address::new("sender@example.com")?;
//!     let reply = client
//!         .send_command(&Command::MailFrom { from, body: None, size: None })
//!         .await?;
//!     assert!(reply.is_success());
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`codec`]: DATA transparency encoder
//! - [`command`]: SMTP command builders
//! - [`connection`]: Streams, TLS policy and the command client
//! - [`parser`]: Response parser
//! - [`sasl`]: SASL payload encoders
//! - [`types`]: Core SMTP types (addresses, extensions, replies)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod codec;
pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod sasl;
pub mod types;

pub use codec::DataEncoder;
pub use command::Command;
pub use connection::{Client, ServerInfo, SmtpStream, TlsPolicy};
pub use error::{Error, Result};
pub use types::{Address, AuthMechanism, Extension, Reply, ReplyClass, ReplyCode};

/// SMTP protocol version supported.
pub const SMTP_VERSION: &str = "SMTP/ESMTP (RFC 5321)";
