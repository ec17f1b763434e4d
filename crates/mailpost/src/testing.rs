//! Helpers shared by unit tests.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::options::{ResolvedOptions, TransportOptions};

/// Accepts one connection, plays `script` (expected line prefix, reply) and
/// returns every line received until the client hangs up.
///
/// An empty reply sends nothing, which lets a script consume message lines.
pub(crate) async fn scripted(
    greeting: &'static str,
    script: Vec<(&'static str, &'static str)>,
) -> (u16, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut socket = BufReader::new(socket);
        let mut received = Vec::new();
        if !greeting.is_empty() {
            socket.get_mut().write_all(greeting.as_bytes()).await.unwrap();
        }

        let mut script = script.into_iter();
        loop {
            let mut line = String::new();
            if socket.read_line(&mut line).await.unwrap_or(0) == 0 {
                break;
            }
            let line = line.trim_end().to_string();
            if let Some((expected, reply)) = script.next() {
                assert!(line.starts_with(expected), "expected {expected}, got {line}");
                socket.get_mut().write_all(reply.as_bytes()).await.unwrap();
            } else if line == "QUIT" {
                let _ = socket.get_mut().write_all(b"221 bye\r\n").await;
            }
            received.push(line);
        }
        received
    });

    (port, handle)
}

/// Options pointing at a local scripted server.
pub(crate) fn options(port: u16) -> ResolvedOptions {
    TransportOptions::builder()
        .host("127.0.0.1")
        .port(port)
        .name("client.test")
        .greeting_timeout(Duration::from_millis(200))
        .socket_timeout(Duration::from_secs(5))
        .build()
        .resolve()
}
