//! In-process SMTP server for integration tests.
//!
//! Policy: senders must end with `@valid.sender`, recipients with
//! `@valid.recipient`; user `testuser` authenticates with password `testpass`
//! or bearer token `testtoken` over PLAIN, LOGIN or XOAUTH2.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    dead_code,
    missing_docs,
    unreachable_pub
)]

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use mailpost::TransportOptions;
use mailpost::TransportOptionsBuilder;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader, ReadBuf};
use tokio::net::{TcpListener, TcpStream};

pub const USER: &str = "testuser";
pub const PASS: &str = "testpass";
pub const TOKEN: &str = "testtoken";

/// Installs a test subscriber honoring `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Server behavior knobs.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Send the greeting. A silent server never answers anything.
    pub greet: bool,
    /// Answer EHLO; otherwise clients must fall back to HELO.
    pub ehlo: bool,
    /// Mechanisms advertised with AUTH.
    pub auth_methods: Vec<&'static str>,
    /// Reject MAIL FROM before authentication.
    pub require_auth: bool,
    /// Advertised SIZE limit.
    pub size_limit: Option<usize>,
    /// Reply to the end of DATA.
    pub final_reply: &'static str,
    /// Close the socket right after answering DATA with 354.
    pub drop_after_data: bool,
    /// Wait this long before answering QUIT.
    pub quit_delay: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            greet: true,
            ehlo: true,
            auth_methods: vec!["PLAIN", "LOGIN", "XOAUTH2"],
            require_auth: false,
            size_limit: None,
            final_reply: "250 OK: queued as 1234",
            drop_after_data: false,
            quit_delay: None,
        }
    }
}

/// A message the server accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    pub from: String,
    pub to: Vec<String>,
    pub body: Vec<u8>,
}

#[derive(Default)]
struct Shared {
    transcript: Mutex<Vec<String>>,
    messages: Mutex<Vec<Received>>,
}

/// A running test server.
pub struct TestServer {
    port: u16,
    shared: Arc<Shared>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::with_config(ServerConfig::default()).await
    }

    pub async fn with_config(config: ServerConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let shared = Arc::new(Shared::default());

        let state = Arc::clone(&shared);
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let session = Connection {
                    socket: BufReader::new(socket),
                    config: config.clone(),
                    shared: Arc::clone(&state),
                    authenticated: false,
                    from: None,
                    to: Vec::new(),
                };
                tokio::spawn(session.run());
            }
        });

        Self { port, shared }
    }

    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Options pointing at this server with short timeouts.
    pub fn options(&self) -> TransportOptionsBuilder {
        TransportOptions::builder()
            .host("127.0.0.1")
            .port(self.port)
            .name("client.test")
            .connection_timeout(Duration::from_secs(2))
            .greeting_timeout(Duration::from_millis(300))
            .socket_timeout(Duration::from_secs(5))
    }

    /// Every command line received, across all connections.
    pub fn transcript(&self) -> Vec<String> {
        self.shared.transcript.lock().unwrap().clone()
    }

    /// Returns true if any received command starts with `prefix`.
    pub fn saw(&self, prefix: &str) -> bool {
        self.transcript()
            .iter()
            .any(|line| line.starts_with(prefix))
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.transcript()
            .iter()
            .filter(|line| line.starts_with(prefix))
            .count()
    }

    pub fn messages(&self) -> Vec<Received> {
        self.shared.messages.lock().unwrap().clone()
    }

    /// Waits until `predicate` holds for the transcript, so assertions about
    /// commands sent during teardown do not race the server task.
    pub async fn wait_for(&self, predicate: impl Fn(&[String]) -> bool) {
        for _ in 0..100 {
            if predicate(&self.transcript()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("transcript never matched: {:?}", self.transcript());
    }
}

struct Connection {
    socket: BufReader<TcpStream>,
    config: ServerConfig,
    shared: Arc<Shared>,
    authenticated: bool,
    from: Option<String>,
    to: Vec<String>,
}

impl Connection {
    async fn run(mut self) {
        if !self.config.greet {
            let mut sink = Vec::new();
            while self.socket.read_until(b'\n', &mut sink).await.unwrap_or(0) > 0 {}
            return;
        }

        if self.reply("220 mx.test ESMTP ready").await.is_err() {
            return;
        }
        while let Some(line) = self.read_line().await {
            self.record(&line);
            if self.dispatch(&line).await.is_err() {
                break;
            }
        }
        self.record("<disconnect>");
    }

    fn record(&self, line: &str) {
        self.shared.transcript.lock().unwrap().push(line.to_string());
    }

    async fn read_line(&mut self) -> Option<String> {
        let mut raw = Vec::new();
        match self.socket.read_until(b'\n', &mut raw).await {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(
                String::from_utf8_lossy(&raw)
                    .trim_end_matches(['\r', '\n'])
                    .to_string(),
            ),
        }
    }

    async fn reply(&mut self, text: &str) -> io::Result<()> {
        self.socket
            .get_mut()
            .write_all(format!("{text}\r\n").as_bytes())
            .await
    }

    async fn dispatch(&mut self, line: &str) -> io::Result<()> {
        let upper = line.to_ascii_uppercase();
        let verb = upper.split_whitespace().next().unwrap_or("");

        match verb {
            "EHLO" if self.config.ehlo => {
                let mut lines = vec!["mx.test greets client".to_string()];
                if !self.config.auth_methods.is_empty() {
                    lines.push(format!("AUTH {}", self.config.auth_methods.join(" ")));
                }
                lines.push("8BITMIME".to_string());
                if let Some(limit) = self.config.size_limit {
                    lines.push(format!("SIZE {limit}"));
                }
                let last = lines.len() - 1;
                for (idx, text) in lines.iter().enumerate() {
                    let sep = if idx == last { ' ' } else { '-' };
                    self.reply(&format!("250{sep}{text}")).await?;
                }
                Ok(())
            }
            "HELO" => self.reply("250 mx.test").await,
            "AUTH" => self.auth(line).await,
            "MAIL" => self.mail_from(line).await,
            "RCPT" => self.rcpt_to(line).await,
            "DATA" => self.data().await,
            "RSET" | "NOOP" => self.reply("250 OK").await,
            "QUIT" => {
                if let Some(delay) = self.config.quit_delay {
                    tokio::time::sleep(delay).await;
                }
                self.reply("221 Bye").await?;
                Err(io::Error::other("quit"))
            }
            _ => self.reply("502 Command not implemented").await,
        }
    }

    async fn auth(&mut self, line: &str) -> io::Result<()> {
        let mut parts = line.split_whitespace().skip(1);
        let mechanism = parts.next().unwrap_or("").to_ascii_uppercase();
        let initial = parts.next().map(str::to_string);

        if !self.config.auth_methods.contains(&mechanism.as_str()) {
            return self.reply("504 Unrecognized authentication type").await;
        }

        let ok = match mechanism.as_str() {
            "PLAIN" => {
                let payload = match initial {
                    Some(payload) => payload,
                    None => {
                        self.reply("334 ").await?;
                        self.read_auth_line().await?
                    }
                };
                decode(&payload) == format!("\0{USER}\0{PASS}")
            }
            "LOGIN" => {
                self.reply("334 VXNlcm5hbWU6").await?;
                let user = decode(&self.read_auth_line().await?);
                self.reply("334 UGFzc3dvcmQ6").await?;
                let pass = decode(&self.read_auth_line().await?);
                user == USER && pass == PASS
            }
            "XOAUTH2" => {
                let payload = decode(&initial.unwrap_or_default());
                if payload == format!("user={USER}\x01auth=Bearer {TOKEN}\x01\x01") {
                    true
                } else {
                    let error = serde_json::json!({
                        "status": "401",
                        "schemes": "bearer",
                        "scope": "https://mail.google.com/",
                    });
                    self.reply(&format!("334 {}", STANDARD.encode(error.to_string())))
                        .await?;
                    self.read_auth_line().await?;
                    false
                }
            }
            _ => false,
        };

        if ok {
            self.authenticated = true;
            self.reply("235 Authentication successful").await
        } else {
            self.reply("535 Authentication failed").await
        }
    }

    async fn read_auth_line(&mut self) -> io::Result<String> {
        let line = self
            .read_line()
            .await
            .ok_or_else(|| io::Error::other("eof during auth"))?;
        self.record(&format!("<auth> {line}"));
        Ok(line)
    }

    async fn mail_from(&mut self, line: &str) -> io::Result<()> {
        if self.config.require_auth && !self.authenticated {
            return self.reply("530 Authentication required").await;
        }
        let address = angle_address(line);
        if address.ends_with("@valid.sender") {
            self.from = Some(address);
            self.to.clear();
            self.reply("250 Accepted").await
        } else {
            self.reply("550 Invalid sender").await
        }
    }

    async fn rcpt_to(&mut self, line: &str) -> io::Result<()> {
        if self.from.is_none() {
            return self.reply("503 Need MAIL command").await;
        }
        let address = angle_address(line);
        if address.ends_with("@valid.recipient") {
            self.to.push(address);
            self.reply("250 Accepted").await
        } else {
            self.reply("550 Invalid recipient").await
        }
    }

    async fn data(&mut self) -> io::Result<()> {
        if self.to.is_empty() {
            return self.reply("503 Need RCPT command").await;
        }
        self.reply("354 End data with <CR><LF>.<CR><LF>").await?;
        if self.config.drop_after_data {
            self.record("<dropped>");
            return Err(io::Error::other("dropped during data"));
        }

        let mut body = Vec::new();
        loop {
            let mut raw = Vec::new();
            if self.socket.read_until(b'\n', &mut raw).await? == 0 {
                self.record("<data aborted>");
                return Err(io::Error::other("eof during data"));
            }
            if raw == b".\r\n" {
                break;
            }
            let unstuffed = if raw.starts_with(b"..") { &raw[1..] } else { &raw[..] };
            body.extend_from_slice(unstuffed);
        }
        self.record("<data complete>");

        let reply = self.config.final_reply;
        if reply.starts_with('2') {
            self.shared.messages.lock().unwrap().push(Received {
                from: self.from.take().unwrap_or_default(),
                to: std::mem::take(&mut self.to),
                body,
            });
        }
        self.reply(reply).await
    }
}

fn decode(payload: &str) -> String {
    STANDARD
        .decode(payload.trim())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

fn angle_address(line: &str) -> String {
    line.split_once('<')
        .and_then(|(_, rest)| rest.split_once('>'))
        .map(|(address, _)| address.to_string())
        .unwrap_or_default()
}

/// Normalizes bare `\n` to `\r\n`, as expected on the wire.
pub fn crlf(text: &str) -> Vec<u8> {
    text.replace("\r\n", "\n").replace('\n', "\r\n").into_bytes()
}

/// A source that yields `prefix` and then fails.
pub struct FailingSource {
    prefix: &'static [u8],
    sent: bool,
}

impl FailingSource {
    pub const fn new(prefix: &'static [u8]) -> Self {
        Self {
            prefix,
            sent: false,
        }
    }
}

impl AsyncRead for FailingSource {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.sent {
            return Poll::Ready(Err(io::Error::other("source exploded")));
        }
        self.sent = true;
        buf.put_slice(self.prefix);
        Poll::Ready(Ok(()))
    }
}
