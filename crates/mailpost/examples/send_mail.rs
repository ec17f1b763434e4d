#![allow(clippy::doc_markdown)]
//! Example: Send a message read from stdin
//!
//! Connection settings come from the environment:
//!
//! - `SMTP_SERVICE` (e.g. `gmail`) or `SMTP_HOST` / `SMTP_PORT` / `SMTP_SECURE`
//! - `SMTP_USER` and `SMTP_PASS` (optional)
//! - `MAIL_FROM` and `MAIL_TO` (comma separated)
//!
//! ## Running
//!
//! ```bash
//! printf 'Subject: hello\n\nHi there\n' | \
//!   SMTP_SERVICE=gmail SMTP_USER=me@gmail.com SMTP_PASS=app-password \
//!   MAIL_FROM=me@gmail.com MAIL_TO=you@example.com \
//!   RUST_LOG=mailpost=debug \
//!   cargo run --package mailpost --example send_mail
//! ```

use std::env;

use anyhow::{Context, Result};
use mailpost::{AuthConfig, Envelope, SmtpTransport, TransportOptions};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut builder = TransportOptions::builder();
    if let Ok(service) = env::var("SMTP_SERVICE") {
        builder = builder.service(service);
    }
    if let Ok(host) = env::var("SMTP_HOST") {
        builder = builder.host(host);
    }
    if let Ok(port) = env::var("SMTP_PORT") {
        builder = builder.port(port.parse().context("SMTP_PORT must be a port number")?);
    }
    if let Ok(secure) = env::var("SMTP_SECURE") {
        builder = builder.secure(secure == "1" || secure.eq_ignore_ascii_case("true"));
    }
    if let (Ok(user), Ok(pass)) = (env::var("SMTP_USER"), env::var("SMTP_PASS")) {
        builder = builder.auth(AuthConfig::with_password(user, pass));
    }

    let transport = SmtpTransport::new(builder.build());
    let options = transport.options();
    println!(
        "{} {} -> {}:{} (secure: {})",
        transport.name(),
        transport.version(),
        options.host,
        options.port,
        options.secure
    );

    let from = env::var("MAIL_FROM").context("MAIL_FROM is not set")?;
    let to = env::var("MAIL_TO").context("MAIL_TO is not set")?;
    let envelope = Envelope::new(&from, to.split(',').map(str::trim))?;

    let report = transport.send(&envelope, tokio::io::stdin()).await?;

    println!("✓ {}", report.response);
    for recipient in &report.accepted {
        println!("  accepted {recipient}");
    }
    for rejection in &report.rejected {
        println!(
            "  rejected {} ({} {})",
            rejection.recipient, rejection.code, rejection.message
        );
    }
    Ok(())
}
