//! # mailpost
//!
//! Async SMTP client transport.
//!
//! Given an [`Envelope`] and a message body stream, a [`SmtpTransport`]
//! connects to the configured server (directly or through a well-known
//! provider preset), negotiates TLS and authentication, relays the body with
//! backpressure and reports a [`SendReport`] or a classified [`Error`].
//!
//! ## Features
//!
//! - **Provider presets**: `service("gmail")` fills host, port and TLS mode
//! - **TLS**: implicit TLS or STARTTLS with an injectable certificate policy
//! - **Authentication**: PLAIN, LOGIN, XOAUTH2 and OAUTHBEARER, with
//!   caller-supplied token refresh
//! - **Streaming**: any `AsyncRead` body, dot-stuffed and CRLF-normalized on
//!   the fly
//! - **Errors**: stable [`ErrorKind`] codes (`EAUTH`, `EENVELOPE`, ...)
//! - **Cancellation**: [`abort_pair`] and per-phase timeouts
//!
//! ## Quick Start
//!
//! ```no_run
//! use mailpost::{AuthConfig, Envelope, SmtpTransport, TransportOptions};
//!
//! # async fn run() -> mailpost::Result<()> {
//! let transport = SmtpTransport::new(
//!     TransportOptions::builder()
//!         .host("smtp.example.com")
//!         .auth(AuthConfig::with_password("user", "secret"))
//!         .build(),
//! );
//! transport.verify().await?;
//!
//! let envelope = Envelope::new("sender@example.com", ["rcpt@example.com"])?;
//! let body: &[u8] = b"Subject: hello\r\n\r\nHello there\r\n";
//! let report = transport.send(&envelope, body).await?;
//! println!("accepted: {:?}", report.accepted);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`provider`]: Well-known provider presets

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod abort;
mod auth;
mod classify;
mod connection;
mod envelope;
mod error;
mod events;
mod options;
pub mod provider;
mod relay;
mod session;
#[cfg(test)]
mod testing;
mod transport;

pub use abort::{AbortHandle, AbortSignal, abort_pair};
pub use auth::TokenRefresher;
pub use envelope::Envelope;
pub use error::{BoxError, Error, ErrorKind, Result, SharedError};
pub use events::{EVENT_CAPACITY, TransportEvent};
pub use mailpost_smtp::{Address, AuthMechanism, TlsPolicy};
pub use options::{
    AuthConfig, DEFAULT_CONNECTION_TIMEOUT, DEFAULT_GREETING_TIMEOUT, DEFAULT_SOCKET_TIMEOUT,
    ResolvedOptions, TransportOptions, TransportOptionsBuilder,
};
pub use relay::MessageSource;
pub use session::{Rejection, SendReport};
pub use transport::SmtpTransport;

/// Crate name, reported as the transport name.
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
