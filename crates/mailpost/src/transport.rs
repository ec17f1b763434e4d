//! The public SMTP transport.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::abort::AbortSignal;
use crate::auth;
use crate::classify::{Failure, classify};
use crate::connection::Connection;
use crate::envelope::Envelope;
use crate::error::{ErrorKind, Result};
use crate::events::{self, TransportEvent};
use crate::options::{ResolvedOptions, TransportOptions};
use crate::relay::MessageSource;
use crate::session::{SendReport, Session};

/// Sends messages over SMTP.
///
/// The transport holds resolved options and an event channel. Every send
/// opens its own connection, so one transport can serve concurrent sends.
///
/// ```no_run
/// use mailpost::{AuthConfig, Envelope, SmtpTransport, TransportOptions};
///
/// # async fn run() -> mailpost::Result<()> {
/// let transport = SmtpTransport::new(
///     TransportOptions::builder()
///         .service("gmail")
///         .auth(AuthConfig::with_password("me@gmail.com", "app-password"))
///         .build(),
/// );
///
/// let envelope = Envelope::new("me@gmail.com", ["you@example.com"])?;
/// let message: &[u8] = b"Subject: hello\n\nHi!\n";
/// let report = transport.send(&envelope, message).await?;
/// println!("{}", report.response);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SmtpTransport {
    options: Arc<ResolvedOptions>,
    events: broadcast::Sender<TransportEvent>,
}

impl SmtpTransport {
    /// Creates a transport from caller options.
    #[must_use]
    pub fn new(options: TransportOptions) -> Self {
        let options = options.resolve();
        tracing::debug!(
            host = %options.host,
            port = options.port,
            secure = options.secure,
            service = options.service,
            "transport created"
        );
        Self {
            options: Arc::new(options),
            events: events::channel(),
        }
    }

    /// Returns the resolved options.
    #[must_use]
    pub fn options(&self) -> &ResolvedOptions {
        &self.options
    }

    /// Returns the crate name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        crate::NAME
    }

    /// Returns the crate version.
    #[must_use]
    pub const fn version(&self) -> &'static str {
        crate::VERSION
    }

    /// Subscribes to transport events.
    ///
    /// A receiver more than [`EVENT_CAPACITY`](crate::EVENT_CAPACITY) events
    /// behind sees `RecvError::Lagged` with the number it missed.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }

    /// Sends one message.
    ///
    /// # Errors
    ///
    /// Returns a classified [`Error`](crate::Error) if the connection,
    /// authentication, envelope, message source or final acceptance fails.
    pub async fn send<S>(&self, envelope: &Envelope, source: S) -> Result<SendReport>
    where
        S: MessageSource,
    {
        self.send_with_abort(envelope, source, AbortSignal::never())
            .await
    }

    /// Sends one message, giving up when `abort` fires.
    ///
    /// # Errors
    ///
    /// As [`send`](Self::send); an abort yields a timeout error whose
    /// [`is_cancelled`](crate::Error::is_cancelled) is true.
    pub async fn send_with_abort<S>(
        &self,
        envelope: &Envelope,
        mut source: S,
        mut abort: AbortSignal,
    ) -> Result<SendReport>
    where
        S: MessageSource,
    {
        let mut conn = Connection::new(&self.options);
        let mut session = Session::new(envelope);

        let finished = tokio::select! {
            result = session.run(&mut conn, &mut source) => Some(result),
            () = abort.aborted() => None,
        };
        let outcome = finished.unwrap_or_else(|| {
            tracing::debug!("send aborted");
            Err(session.abort())
        });

        let quit = outcome.as_ref().err().is_none_or(Failure::connection_usable);
        conn.close(quit).await;

        match outcome {
            Ok(()) => Ok(session.into_report()),
            Err(failure) => {
                let error = classify(failure);
                tracing::debug!(code = error.code(), %error, "send failed");
                if error.kind() == ErrorKind::Stream {
                    events::publish(&self.events, TransportEvent::StreamError(error.clone()));
                }
                Err(error)
            }
        }
    }

    /// Connects, authenticates when credentials are configured and
    /// disconnects without sending anything.
    ///
    /// # Errors
    ///
    /// Returns the classified error of the first step that fails.
    pub async fn verify(&self) -> Result<()> {
        let mut conn = Connection::new(&self.options);

        let outcome: std::result::Result<(), Failure> = async {
            conn.connect().await?;
            conn.handshake().await?;
            if let Some(credentials) = self.options.auth.as_ref() {
                auth::authenticate(&mut conn, credentials).await?;
            }
            Ok(())
        }
        .await;

        let quit = outcome.as_ref().err().is_none_or(Failure::connection_usable);
        conn.close(quit).await;
        outcome.map_err(classify)
    }
}
