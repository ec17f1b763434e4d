//! Transport configuration.
//!
//! [`TransportOptions`] is what the caller provides: every field optional,
//! either built in code with [`TransportOptions::builder`] or deserialized
//! from the application's own configuration. [`TransportOptions::resolve`]
//! merges it with the provider registry and defaults into
//! [`ResolvedOptions`], where every field is concrete.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use mailpost_smtp::{AuthMechanism, TlsPolicy};
use serde::Deserialize;

use crate::auth::TokenRefresher;
use crate::provider;

/// Default time allowed to open the TCP (and implicit TLS) connection.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(2 * 60);
/// Default time allowed for the server greeting after connecting.
pub const DEFAULT_GREETING_TIMEOUT: Duration = Duration::from_secs(30);
/// Default time allowed for any single read or write.
pub const DEFAULT_SOCKET_TIMEOUT: Duration = Duration::from_secs(10 * 60);

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_NAME: &str = "localhost";

/// Caller-supplied transport configuration.
///
/// Unset fields are filled from the provider named by `service`, then from
/// defaults. Explicit fields always win over provider presets.
///
/// Deserialization uses camelCase field names and millisecond timeouts:
///
/// ```
/// use mailpost::TransportOptions;
///
/// let options: TransportOptions = serde_json::from_str(
///     r#"{ "service": "gmail", "auth": { "user": "me@gmail.com", "pass": "secret" }, "socketTimeout": 5000 }"#,
/// ).unwrap();
/// let resolved = options.resolve();
/// assert_eq!(resolved.host, "smtp.gmail.com");
/// assert_eq!(resolved.socket_timeout.as_millis(), 5000);
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TransportOptions {
    /// Well-known service identifier (`"gmail"`, `"google mail"`, `"gmail.com"`).
    pub service: Option<String>,
    /// SMTP host.
    pub host: Option<String>,
    /// SMTP port.
    pub port: Option<u16>,
    /// Use implicit TLS from the start.
    pub secure: Option<bool>,
    /// Client name sent with EHLO/HELO.
    pub name: Option<String>,
    /// Never upgrade with STARTTLS.
    pub ignore_tls: bool,
    /// Fail if a plain connection cannot be upgraded with STARTTLS.
    pub require_tls: bool,
    /// Credentials. No authentication is attempted when absent.
    pub auth: Option<AuthConfig>,
    /// Time allowed to connect.
    #[serde(deserialize_with = "millis::deserialize")]
    pub connection_timeout: Option<Duration>,
    /// Time allowed for the greeting.
    #[serde(deserialize_with = "millis::deserialize")]
    pub greeting_timeout: Option<Duration>,
    /// Time allowed for any single read or write.
    #[serde(deserialize_with = "millis::deserialize")]
    pub socket_timeout: Option<Duration>,
    /// Certificate policy for implicit TLS and STARTTLS.
    #[serde(skip)]
    pub tls: TlsPolicy,
}

impl TransportOptions {
    /// Creates an options builder.
    #[must_use]
    pub fn builder() -> TransportOptionsBuilder {
        TransportOptionsBuilder::default()
    }

    /// Merges the options with the provider registry and defaults.
    #[must_use]
    pub fn resolve(&self) -> ResolvedOptions {
        let preset = self.service.as_deref().and_then(|service| {
            let found = provider::lookup(service);
            if found.is_none() {
                tracing::debug!(service, "unknown service, using explicit options only");
            }
            found
        });

        let secure = self.secure.or(preset.map(|p| p.secure)).unwrap_or(false);
        let port = self
            .port
            .or(preset.map(|p| p.port))
            .unwrap_or(if secure { 465 } else { 587 });
        let host = self
            .host
            .clone()
            .or_else(|| preset.map(|p| p.host.to_string()))
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        ResolvedOptions {
            service: preset.map(|p| p.name),
            host,
            port,
            secure,
            name: self.name.clone().unwrap_or_else(|| DEFAULT_NAME.to_string()),
            ignore_tls: self.ignore_tls,
            require_tls: self.require_tls,
            auth: self.auth.clone(),
            auth_hint: preset.and_then(|p| p.auth_method),
            connection_timeout: self.connection_timeout.unwrap_or(DEFAULT_CONNECTION_TIMEOUT),
            greeting_timeout: self.greeting_timeout.unwrap_or(DEFAULT_GREETING_TIMEOUT),
            socket_timeout: self.socket_timeout.unwrap_or(DEFAULT_SOCKET_TIMEOUT),
            tls: self.tls.clone(),
        }
    }
}

/// Builder for [`TransportOptions`].
#[derive(Debug, Clone, Default)]
pub struct TransportOptionsBuilder {
    options: TransportOptions,
}

impl TransportOptionsBuilder {
    /// Sets the well-known service identifier.
    #[must_use]
    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.options.service = Some(service.into());
        self
    }

    /// Sets the host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.options.host = Some(host.into());
        self
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.options.port = Some(port);
        self
    }

    /// Enables or disables implicit TLS.
    #[must_use]
    pub const fn secure(mut self, secure: bool) -> Self {
        self.options.secure = Some(secure);
        self
    }

    /// Sets the client name sent with EHLO/HELO.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.options.name = Some(name.into());
        self
    }

    /// Never use STARTTLS, even when advertised.
    #[must_use]
    pub const fn ignore_tls(mut self, ignore: bool) -> Self {
        self.options.ignore_tls = ignore;
        self
    }

    /// Require STARTTLS on plain connections.
    #[must_use]
    pub const fn require_tls(mut self, require: bool) -> Self {
        self.options.require_tls = require;
        self
    }

    /// Sets the credentials.
    #[must_use]
    pub fn auth(mut self, auth: AuthConfig) -> Self {
        self.options.auth = Some(auth);
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub const fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.options.connection_timeout = Some(timeout);
        self
    }

    /// Sets the greeting timeout.
    #[must_use]
    pub const fn greeting_timeout(mut self, timeout: Duration) -> Self {
        self.options.greeting_timeout = Some(timeout);
        self
    }

    /// Sets the per-operation socket timeout.
    #[must_use]
    pub const fn socket_timeout(mut self, timeout: Duration) -> Self {
        self.options.socket_timeout = Some(timeout);
        self
    }

    /// Sets the certificate policy.
    #[must_use]
    pub fn tls_policy(mut self, policy: TlsPolicy) -> Self {
        self.options.tls = policy;
        self
    }

    /// Builds the options.
    #[must_use]
    pub fn build(self) -> TransportOptions {
        self.options
    }
}

/// Credentials.
///
/// The secret is a password, a bearer token, or a [`TokenRefresher`] that
/// provides tokens on demand. A static token combined with a refresher is
/// tried first and refreshed once if the server rejects it.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// User name.
    pub user: String,
    /// Password for PLAIN and LOGIN.
    pub pass: Option<String>,
    /// Bearer token for XOAUTH2 and OAUTHBEARER.
    #[serde(alias = "accessToken")]
    pub token: Option<String>,
    /// Source of fresh bearer tokens.
    #[serde(skip)]
    pub refresher: Option<Arc<dyn TokenRefresher>>,
    /// Mechanism to use instead of negotiating one.
    pub method: Option<AuthMechanism>,
}

impl AuthConfig {
    /// Password credentials.
    #[must_use]
    pub fn with_password(user: impl Into<String>, pass: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            pass: Some(pass.into()),
            ..Self::default()
        }
    }

    /// Static bearer token credentials.
    #[must_use]
    pub fn with_token(user: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            token: Some(token.into()),
            ..Self::default()
        }
    }

    /// Bearer tokens obtained from `refresher` when needed.
    #[must_use]
    pub fn with_refresher(user: impl Into<String>, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            user: user.into(),
            refresher: Some(refresher),
            ..Self::default()
        }
    }

    /// Adds a refresher used when the static token is rejected.
    #[must_use]
    pub fn refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// Forces a mechanism.
    #[must_use]
    pub const fn method(mut self, method: AuthMechanism) -> Self {
        self.method = Some(method);
        self
    }

    /// Returns true if a bearer token can be produced.
    #[must_use]
    pub const fn has_token_source(&self) -> bool {
        self.token.is_some() || self.refresher.is_some()
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("user", &self.user)
            .field("pass", &self.pass.as_ref().map(|_| "<redacted>"))
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("refresher", &self.refresher.as_ref().map(|_| "<refresher>"))
            .field("method", &self.method)
            .finish()
    }
}

/// Fully resolved options used by one transport.
#[derive(Debug, Clone)]
pub struct ResolvedOptions {
    /// Canonical name of the matched provider, if any.
    pub service: Option<&'static str>,
    /// SMTP host.
    pub host: String,
    /// SMTP port.
    pub port: u16,
    /// Implicit TLS.
    pub secure: bool,
    /// Client name sent with EHLO/HELO.
    pub name: String,
    /// Never use STARTTLS.
    pub ignore_tls: bool,
    /// Require STARTTLS on plain connections.
    pub require_tls: bool,
    /// Credentials.
    pub auth: Option<AuthConfig>,
    /// Mechanism preferred by the provider.
    pub auth_hint: Option<AuthMechanism>,
    /// Connect timeout.
    pub connection_timeout: Duration,
    /// Greeting timeout.
    pub greeting_timeout: Duration,
    /// Per-operation timeout.
    pub socket_timeout: Duration,
    /// Certificate policy.
    pub tls: TlsPolicy,
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
