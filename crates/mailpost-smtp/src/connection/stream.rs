//! Low-level SMTP stream handling.

use super::tls::TlsPolicy;
use crate::error::{Error, Result};
use rustls::pki_types::ServerName;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// SMTP stream (TCP or TLS).
#[derive(Debug)]
pub enum SmtpStream {
    /// Plain TCP connection.
    Tcp(BufReader<TcpStream>),
    /// TLS-encrypted connection.
    Tls(Box<BufReader<tokio_rustls::client::TlsStream<TcpStream>>>),
}

impl SmtpStream {
    /// Reads a line from the stream, without its line ending.
    ///
    /// Invalid UTF-8 in server text is replaced rather than rejected.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the server closed the connection.
    pub async fn read_line(&mut self) -> Result<String> {
        let mut line = Vec::new();
        let read = match self {
            Self::Tcp(reader) => reader.read_until(b'\n', &mut line).await?,
            Self::Tls(reader) => reader.read_until(b'\n', &mut line).await?,
        };
        if read == 0 {
            return Err(Error::ConnectionClosed);
        }
        Ok(String::from_utf8_lossy(&line).trim_end().to_string())
    }

    /// Writes data to the stream and flushes it.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Tcp(reader) => {
                reader.get_mut().write_all(data).await?;
                reader.get_mut().flush().await?;
            }
            Self::Tls(reader) => {
                reader.get_mut().write_all(data).await?;
                reader.get_mut().flush().await?;
            }
        }
        Ok(())
    }

    /// Shuts down the write half (sends TLS `close_notify` first when encrypted).
    ///
    /// # Errors
    ///
    /// Returns an error if the shutdown fails.
    pub async fn shutdown(&mut self) -> Result<()> {
        match self {
            Self::Tcp(reader) => reader.get_mut().shutdown().await?,
            Self::Tls(reader) => reader.get_mut().shutdown().await?,
        }
        Ok(())
    }

    /// Returns true if the stream is encrypted.
    #[must_use]
    pub const fn is_encrypted(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    /// Upgrades a TCP stream to TLS.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS handshake fails.
    pub async fn upgrade_to_tls(self, hostname: &str, policy: &TlsPolicy) -> Result<Self> {
        let tcp_stream = match self {
            Self::Tcp(reader) => reader.into_inner(),
            Self::Tls(_) => return Err(Error::Protocol("Already using TLS".into())),
        };

        let tls_stream = handshake(tcp_stream, hostname, policy).await?;
        tracing::debug!(hostname, "connection upgraded to TLS");
        Ok(Self::Tls(Box::new(BufReader::new(tls_stream))))
    }
}

/// Connects to an SMTP server over plain TCP.
///
/// # Errors
///
/// Returns an error if the connection fails.
pub async fn connect(hostname: &str, port: u16) -> Result<SmtpStream> {
    let stream = TcpStream::connect((bare_host(hostname), port)).await?;
    Ok(SmtpStream::Tcp(BufReader::new(stream)))
}

/// Connects to an SMTP server over TLS (implicit TLS, usually port 465).
///
/// # Errors
///
/// Returns an error if the connection or TLS handshake fails.
pub async fn connect_tls(hostname: &str, port: u16, policy: &TlsPolicy) -> Result<SmtpStream> {
    let tcp_stream = TcpStream::connect((bare_host(hostname), port)).await?;
    let tls_stream = handshake(tcp_stream, hostname, policy).await?;
    Ok(SmtpStream::Tls(Box::new(BufReader::new(tls_stream))))
}

/// Strips the brackets of an IPv6 literal such as `[::1]`.
fn bare_host(hostname: &str) -> &str {
    hostname
        .strip_prefix('[')
        .and_then(|inner| inner.strip_suffix(']'))
        .unwrap_or(hostname)
}

fn server_name(hostname: &str) -> Result<ServerName<'static>> {
    ServerName::try_from(bare_host(hostname).to_string())
        .map_err(|_| Error::InvalidHostname(hostname.to_string()))
}

async fn handshake(
    tcp_stream: TcpStream,
    hostname: &str,
    policy: &TlsPolicy,
) -> Result<tokio_rustls::client::TlsStream<TcpStream>> {
    let name = server_name(hostname)?;

    let connector = policy.connector();
    Ok(connector.connect(name, tcp_stream).await?)
}
