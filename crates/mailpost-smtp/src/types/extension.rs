//! EHLO keywords and SASL mechanisms.

/// One capability line from an EHLO reply.
///
/// Only the keywords the transport acts on get their own variant; the rest
/// are kept verbatim in [`Extension::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Extension {
    /// `STARTTLS`
    StartTls,
    /// `AUTH` with the mechanisms this client can speak.
    Auth(Vec<AuthMechanism>),
    /// `SIZE`, with the advertised limit if one was given.
    Size(Option<usize>),
    /// `8BITMIME`
    EightBitMime,
    /// `SMTPUTF8`
    SmtpUtf8,
    /// `PIPELINING`
    Pipelining,
    /// Any other keyword, with its parameters.
    Other(String),
}

impl Extension {
    /// Parses one capability line (without the reply code).
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let mut words = line.split_whitespace();
        let Some(keyword) = words.next() else {
            return Self::Other(String::new());
        };
        let keyword = keyword.to_ascii_uppercase();

        // Pre-RFC 4954 servers announce `AUTH=PLAIN LOGIN`.
        if let Some(first) = keyword.strip_prefix("AUTH=") {
            let first = AuthMechanism::parse(first);
            let rest = words.filter_map(AuthMechanism::parse);
            return Self::Auth(first.into_iter().chain(rest).collect());
        }

        match keyword.as_str() {
            "STARTTLS" => Self::StartTls,
            "AUTH" => Self::Auth(words.filter_map(AuthMechanism::parse).collect()),
            "SIZE" => Self::Size(words.next().and_then(|limit| limit.parse().ok())),
            "8BITMIME" => Self::EightBitMime,
            "SMTPUTF8" => Self::SmtpUtf8,
            "PIPELINING" => Self::Pipelining,
            _ => Self::Other(line.trim().to_string()),
        }
    }
}

/// SASL mechanism the client can run.
///
/// Mechanisms the server advertises but the client cannot speak (CRAM-MD5,
/// NTLM, ...) are dropped while parsing the EHLO reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuthMechanism {
    /// `PLAIN` (RFC 4616)
    #[serde(alias = "plain")]
    Plain,
    /// `LOGIN`
    #[serde(alias = "login")]
    Login,
    /// `XOAUTH2`
    #[serde(alias = "xoauth2")]
    XOAuth2,
    /// `OAUTHBEARER` (RFC 7628)
    #[serde(alias = "oauthbearer")]
    OAuthBearer,
}

impl AuthMechanism {
    /// Parses a mechanism name, ignoring case.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        [Self::Plain, Self::Login, Self::XOAuth2, Self::OAuthBearer]
            .into_iter()
            .find(|mechanism| mechanism.as_str().eq_ignore_ascii_case(name))
    }

    /// True for the bearer-token mechanisms.
    #[must_use]
    pub const fn is_bearer(self) -> bool {
        matches!(self, Self::XOAuth2 | Self::OAuthBearer)
    }

    /// The name sent after `AUTH`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
            Self::XOAuth2 => "XOAUTH2",
            Self::OAuthBearer => "OAUTHBEARER",
        }
    }
}
