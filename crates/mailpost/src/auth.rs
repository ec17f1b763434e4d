//! Authentication negotiation.
//!
//! Picks a SASL mechanism, runs its exchange over an established connection
//! and reports an auth-class failure on any rejection. Bearer tokens can come
//! from a caller-supplied [`TokenRefresher`]; the negotiator only asks it for a
//! token and never stores one.

use async_trait::async_trait;
use mailpost_smtp::sasl::{
    login_response, oauthbearer_response, parse_oauth_challenge, plain_response,
    xoauth2_response,
};
use mailpost_smtp::{AuthMechanism, Command, Reply, ReplyCode};

use crate::classify::{Cause, Failure, Stage};
use crate::connection::Connection;
use crate::error::BoxError;
use crate::options::AuthConfig;

/// Source of bearer tokens for XOAUTH2 and OAUTHBEARER.
///
/// ```
/// use mailpost::{BoxError, TokenRefresher};
///
/// struct Fixed;
///
/// #[async_trait::async_trait]
/// impl TokenRefresher for Fixed {
///     async fn access_token(&self, _user: &str) -> Result<String, BoxError> {
///         Ok("token".to_string())
///     }
/// }
/// ```
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Returns a currently valid access token for `user`.
    async fn access_token(&self, user: &str) -> Result<String, BoxError>;
}

fn auth_failure(cause: Cause) -> Failure {
    Failure::new(Stage::Auth, cause)
}

/// Chooses the mechanism for `auth` given the provider hint and what the
/// server advertised.
pub(crate) fn choose_mechanism(
    auth: &AuthConfig,
    hint: Option<AuthMechanism>,
    advertised: &[AuthMechanism],
) -> AuthMechanism {
    if let Some(method) = auth.method {
        return method;
    }
    if auth.has_token_source() {
        // Only switch to OAUTHBEARER when the server offers nothing else.
        let bearer_only = advertised.contains(&AuthMechanism::OAuthBearer)
            && !advertised.contains(&AuthMechanism::XOAuth2);
        return if bearer_only {
            AuthMechanism::OAuthBearer
        } else {
            AuthMechanism::XOAuth2
        };
    }
    if let Some(hint) = hint {
        return hint;
    }
    [AuthMechanism::Plain, AuthMechanism::Login]
        .into_iter()
        .find(|mechanism| advertised.contains(mechanism))
        .unwrap_or(AuthMechanism::Plain)
}

/// Authenticates the connection with the configured credentials.
pub(crate) async fn authenticate(
    conn: &mut Connection<'_>,
    auth: &AuthConfig,
) -> Result<AuthMechanism, Failure> {
    let advertised = conn
        .server_info()
        .map(mailpost_smtp::ServerInfo::auth_mechanisms)
        .unwrap_or_default();
    let mechanism = choose_mechanism(auth, conn.options().auth_hint, &advertised);
    tracing::debug!(user = %auth.user, mechanism = mechanism.as_str(), "authenticating");

    if mechanism.is_bearer() {
        bearer(conn, auth, mechanism).await?;
    } else {
        let pass = auth.pass.as_deref().ok_or_else(|| {
            auth_failure(Cause::Auth(format!(
                "missing password for user \"{}\"",
                auth.user
            )))
        })?;
        match mechanism {
            AuthMechanism::Login => login(conn, &auth.user, pass).await?,
            _ => plain(conn, &auth.user, pass).await?,
        }
    }

    tracing::debug!(user = %auth.user, "authenticated");
    Ok(mechanism)
}

async fn exchange(conn: &mut Connection<'_>, command: &Command) -> Result<Reply, Failure> {
    conn.command(command).await.map_err(auth_failure)
}

fn expect_success(reply: Reply) -> Result<(), Failure> {
    if reply.is_success() {
        Ok(())
    } else {
        Err(auth_failure(Cause::Rejected(reply)))
    }
}

fn expect_continue(reply: Reply) -> Result<(), Failure> {
    if reply.code == ReplyCode::AUTH_CONTINUE {
        Ok(())
    } else {
        Err(auth_failure(Cause::Rejected(reply)))
    }
}

async fn plain(conn: &mut Connection<'_>, user: &str, pass: &str) -> Result<(), Failure> {
    let response = plain_response(user, pass);
    let mut reply = exchange(
        conn,
        &Command::Auth {
            mechanism: AuthMechanism::Plain,
            initial_response: Some(response.clone()),
        },
    )
    .await?;

    // Servers without SASL-IR ask for the response with an empty 334.
    if reply.code == ReplyCode::AUTH_CONTINUE {
        reply = exchange(conn, &Command::AuthResponse(response)).await?;
    }
    expect_success(reply)
}

async fn login(conn: &mut Connection<'_>, user: &str, pass: &str) -> Result<(), Failure> {
    let reply = exchange(
        conn,
        &Command::Auth {
            mechanism: AuthMechanism::Login,
            initial_response: None,
        },
    )
    .await?;
    expect_continue(reply)?;

    let reply = exchange(conn, &Command::AuthResponse(login_response(user))).await?;
    expect_continue(reply)?;

    let reply = exchange(conn, &Command::AuthResponse(login_response(pass))).await?;
    expect_success(reply)
}

async fn fetch_token(auth: &AuthConfig) -> Result<String, Failure> {
    let Some(refresher) = auth.refresher.as_ref() else {
        return Err(auth_failure(Cause::Auth(format!(
            "missing access token for user \"{}\"",
            auth.user
        ))));
    };
    refresher
        .access_token(&auth.user)
        .await
        .map_err(|err| auth_failure(Cause::TokenRefresh(err)))
}

async fn bearer(
    conn: &mut Connection<'_>,
    auth: &AuthConfig,
    mechanism: AuthMechanism,
) -> Result<(), Failure> {
    let (token, from_refresher) = match auth.token.as_ref() {
        Some(token) => (token.clone(), false),
        None => (fetch_token(auth).await?, true),
    };

    match bearer_attempt(conn, &auth.user, &token, mechanism).await {
        Err(failure)
            if !from_refresher
                && auth.refresher.is_some()
                && matches!(failure.cause, Cause::Rejected(_)) =>
        {
            tracing::debug!(user = %auth.user, "token rejected, refreshing");
            let token = fetch_token(auth).await?;
            bearer_attempt(conn, &auth.user, &token, mechanism).await
        }
        result => result,
    }
}

async fn bearer_attempt(
    conn: &mut Connection<'_>,
    user: &str,
    token: &str,
    mechanism: AuthMechanism,
) -> Result<(), Failure> {
    let initial_response = if mechanism == AuthMechanism::OAuthBearer {
        oauthbearer_response(user, token)
    } else {
        xoauth2_response(user, token)
    };
    let reply = exchange(
        conn,
        &Command::Auth {
            mechanism,
            initial_response: Some(initial_response),
        },
    )
    .await?;

    if reply.code != ReplyCode::AUTH_CONTINUE {
        return expect_success(reply);
    }

    // A 334 here carries the error details; the server answers the empty
    // line with the final failure.
    let detail = reply
        .message
        .first()
        .and_then(|challenge| parse_oauth_challenge(challenge));
    let mut reply = exchange(conn, &Command::AuthResponse(String::new())).await?;
    if reply.is_success() {
        return Ok(());
    }
    if let Some(detail) = detail {
        reply.message.push(format!("(OAuth2 {detail})"));
    }
    Err(auth_failure(Cause::Rejected(reply)))
}
