//! Connection manager.
//!
//! Owns the socket for one send: opens it, reads the greeting, introduces the
//! client, upgrades with STARTTLS when appropriate and tears it down exactly
//! once. Every network wait is bounded by one of the configured timeouts.

use std::future::Future;
use std::time::Duration;

use mailpost_smtp::connection::{connect, connect_tls};
use mailpost_smtp::{Client, Command, Reply, ServerInfo};

use crate::classify::{Cause, Failure, Stage};
use crate::options::ResolvedOptions;

/// Upper bound for the farewell QUIT and stream shutdown.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectionState {
    Idle,
    Connecting,
    TlsUpgrading,
    Greeted,
    InUse,
    Closed,
}

/// One SMTP connection, used by a single send or verify.
pub(crate) struct Connection<'a> {
    options: &'a ResolvedOptions,
    client: Option<Client>,
    state: ConnectionState,
}

/// Runs `fut` under `limit`, turning both failure modes into a [`Cause`].
pub(crate) async fn bounded<T>(
    limit: Duration,
    fut: impl Future<Output = mailpost_smtp::Result<T>>,
) -> Result<T, Cause> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(Cause::Wire),
        Err(_) => Err(Cause::TimedOut(limit)),
    }
}

fn closed() -> Cause {
    Cause::Wire(mailpost_smtp::Error::ConnectionClosed)
}

impl<'a> Connection<'a> {
    pub(crate) const fn new(options: &'a ResolvedOptions) -> Self {
        Self {
            options,
            client: None,
            state: ConnectionState::Idle,
        }
    }

    #[cfg(test)]
    pub(crate) const fn state(&self) -> ConnectionState {
        self.state
    }

    pub(crate) const fn options(&self) -> &'a ResolvedOptions {
        self.options
    }

    pub(crate) fn server_info(&self) -> Option<&ServerInfo> {
        self.client.as_ref().map(Client::server_info)
    }

    /// Opens the TCP connection, with TLS right away when `secure` is set.
    pub(crate) async fn connect(&mut self) -> Result<(), Failure> {
        let options = self.options;
        self.state = ConnectionState::Connecting;
        tracing::debug!(
            host = %options.host,
            port = options.port,
            secure = options.secure,
            "connecting"
        );

        let opening = async {
            if options.secure {
                connect_tls(&options.host, options.port, &options.tls).await
            } else {
                connect(&options.host, options.port).await
            }
        };

        match bounded(options.connection_timeout, opening).await {
            Ok(stream) => {
                self.client = Some(Client::new(stream));
                Ok(())
            }
            Err(cause) => Err(self.abandon(Stage::Connect, cause)),
        }
    }

    /// Reads the greeting, sends EHLO (or HELO) and upgrades with STARTTLS
    /// when the server offers it or it is required.
    pub(crate) async fn handshake(&mut self) -> Result<(), Failure> {
        match self.try_handshake().await {
            Ok(()) => {
                self.state = ConnectionState::Greeted;
                Ok(())
            }
            Err(failure) => Err(self.abandon(failure.stage, failure.cause)),
        }
    }

    async fn try_handshake(&mut self) -> Result<(), Failure> {
        let options = self.options;
        {
            let client = self
                .client
                .as_mut()
                .ok_or_else(|| Failure::new(Stage::Greeting, closed()))?;
            let greeting = bounded(options.greeting_timeout, client.read_greeting())
                .await
                .map_err(|cause| Failure::new(Stage::Greeting, cause))?;
            tracing::debug!(greeting = %greeting, "greeted");
        }
        self.introduce(Stage::Greeting).await?;

        if options.secure || options.ignore_tls {
            return Ok(());
        }

        let offered = self
            .server_info()
            .is_some_and(ServerInfo::supports_starttls);
        if !offered {
            if options.require_tls {
                return Err(Failure::new(
                    Stage::StartTls,
                    Cause::Wire(mailpost_smtp::Error::NotSupported(
                        "STARTTLS is required but the server does not offer it".into(),
                    )),
                ));
            }
            return Ok(());
        }

        self.state = ConnectionState::TlsUpgrading;
        let client = self
            .client
            .take()
            .ok_or_else(|| Failure::new(Stage::StartTls, closed()))?;
        let client = bounded(
            options.socket_timeout,
            client.starttls(&options.host, &options.tls),
        )
        .await
        .map_err(|cause| Failure::new(Stage::StartTls, cause))?;
        self.client = Some(client);
        tracing::debug!("connection upgraded with STARTTLS");

        self.introduce(Stage::StartTls).await
    }

    /// EHLO, falling back to HELO when EHLO is refused.
    async fn introduce(&mut self, stage: Stage) -> Result<(), Failure> {
        let options = self.options;
        let client = self
            .client
            .as_mut()
            .ok_or_else(|| Failure::new(stage, closed()))?;

        let reply = bounded(options.socket_timeout, client.ehlo(&options.name))
            .await
            .map_err(|cause| Failure::new(stage, cause))?;
        if reply.is_success() {
            return Ok(());
        }

        tracing::debug!(code = reply.code.as_u16(), "EHLO refused, trying HELO");
        let reply = bounded(options.socket_timeout, client.helo(&options.name))
            .await
            .map_err(|cause| Failure::new(stage, cause))?;
        if reply.is_success() {
            Ok(())
        } else {
            Err(Failure::new(stage, Cause::Rejected(reply)))
        }
    }

    fn abandon(&mut self, stage: Stage, cause: Cause) -> Failure {
        self.state = ConnectionState::Closed;
        self.client = None;
        tracing::debug!(?stage, %cause, "connection abandoned");
        Failure::new(stage, cause)
    }

    fn in_use(&mut self) -> Result<&mut Client, Cause> {
        match (self.state, self.client.as_mut()) {
            (ConnectionState::Greeted | ConnectionState::InUse, Some(client)) => {
                self.state = ConnectionState::InUse;
                Ok(client)
            }
            _ => Err(closed()),
        }
    }

    /// Sends one command and reads its reply.
    pub(crate) async fn command(&mut self, command: &Command) -> Result<Reply, Cause> {
        let limit = self.options.socket_timeout;
        let client = self.in_use()?;
        bounded(limit, client.send_command(command)).await
    }

    /// Reads a reply without sending anything first.
    pub(crate) async fn read_reply(&mut self) -> Result<Reply, Cause> {
        let limit = self.options.socket_timeout;
        let client = self.in_use()?;
        bounded(limit, client.read_reply()).await
    }

    /// Writes and flushes raw message bytes.
    pub(crate) async fn write_raw(&mut self, data: &[u8]) -> Result<(), Cause> {
        let limit = self.options.socket_timeout;
        let client = self.in_use()?;
        bounded(limit, client.write_raw(data)).await
    }

    /// Closes the connection. Sends QUIT first when `quit` is set. Calling it
    /// again does nothing.
    pub(crate) async fn close(&mut self, quit: bool) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.state = ConnectionState::Closed;
        let Some(mut client) = self.client.take() else {
            return;
        };

        let limit = self.options.socket_timeout.min(CLOSE_TIMEOUT);
        if quit {
            match bounded(limit, client.send_command(&Command::Quit)).await {
                Ok(reply) => tracing::trace!(code = reply.code.as_u16(), "QUIT acknowledged"),
                Err(cause) => tracing::debug!(%cause, "QUIT failed"),
            }
        }
        if let Err(cause) = bounded(limit, client.shutdown()).await {
            tracing::debug!(%cause, "shutdown failed");
        }
        tracing::debug!(host = %self.options.host, "connection closed");
    }
}

impl Drop for Connection<'_> {
    fn drop(&mut self) {
        if self.client.is_some() {
            tracing::warn!(state = ?self.state, "connection dropped without close");
        }
    }
}
