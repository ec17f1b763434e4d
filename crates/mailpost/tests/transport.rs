//! End-to-end tests against an in-process SMTP server.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod support;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mailpost::{
    AuthConfig, AuthMechanism, BoxError, Envelope, ErrorKind, SmtpTransport, TokenRefresher,
    TransportEvent, TransportOptions, abort_pair,
};
use support::{FailingSource, PASS, ServerConfig, TOKEN, TestServer, USER, crlf, init_tracing};
use tokio::sync::broadcast::error::TryRecvError;

fn envelope(from: &str, to: &[&str]) -> Envelope {
    Envelope::new(from, to.iter().copied()).unwrap()
}

fn valid_envelope() -> Envelope {
    envelope("test@valid.sender", &["test@valid.recipient"])
}

mod delivery {
    use super::*;

    #[tokio::test]
    async fn body_is_crlf_normalized() {
        init_tracing();
        let server = TestServer::start().await;
        let transport = SmtpTransport::new(server.options().build());
        let body = "Subject: test\n\nHello\nWorld\r\n.hidden dot\n";

        let report = transport
            .send(&valid_envelope(), body.as_bytes())
            .await
            .unwrap();

        assert_eq!(report.accepted.len(), 1);
        assert!(report.rejected.is_empty());
        assert_eq!(report.response, "250 OK: queued as 1234");

        let messages = server.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].from, "test@valid.sender");
        assert_eq!(messages[0].to, vec!["test@valid.recipient"]);
        assert_eq!(messages[0].body, crlf(body));
        assert!(server.saw("QUIT"));
    }

    #[tokio::test]
    async fn thousands_of_lines() {
        init_tracing();
        let server = TestServer::start().await;
        let transport = SmtpTransport::new(server.options().build());

        let mut body = String::new();
        for i in 0..5000 {
            if i % 7 == 0 {
                body.push('.');
            }
            body.push_str(&format!("line {i} of a long message\n"));
        }

        let report = transport
            .send(&valid_envelope(), body.as_bytes())
            .await
            .unwrap();

        let expected = crlf(&body);
        assert_eq!(server.messages()[0].body, expected);
        assert!(report.bytes_written > expected.len() as u64);
    }

    #[tokio::test]
    async fn body_without_trailing_newline() {
        init_tracing();
        let server = TestServer::start().await;
        let transport = SmtpTransport::new(server.options().build());

        transport
            .send(&valid_envelope(), &b"no newline at the end"[..])
            .await
            .unwrap();

        assert_eq!(server.messages()[0].body, b"no newline at the end\r\n");
    }

    #[tokio::test]
    async fn partial_recipient_rejection() {
        init_tracing();
        let server = TestServer::start().await;
        let transport = SmtpTransport::new(server.options().build());
        let envelope = envelope(
            "test@valid.sender",
            &["ok@valid.recipient", "nope@invalid.recipient"],
        );

        let report = transport.send(&envelope, &b"hi\n"[..]).await.unwrap();

        assert_eq!(report.accepted.len(), 1);
        assert_eq!(report.accepted[0].as_str(), "ok@valid.recipient");
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].recipient.as_str(), "nope@invalid.recipient");
        assert_eq!(report.rejected[0].code, 550);
        assert_eq!(server.messages()[0].to, vec!["ok@valid.recipient"]);
    }

    #[tokio::test]
    async fn helo_fallback() {
        init_tracing();
        let server = TestServer::with_config(ServerConfig {
            ehlo: false,
            ..ServerConfig::default()
        })
        .await;
        let transport = SmtpTransport::new(server.options().build());

        transport
            .send(&valid_envelope(), &b"hi\n"[..])
            .await
            .unwrap();

        assert!(server.saw("EHLO client.test"));
        assert!(server.saw("HELO client.test"));
        assert!(!server.saw("MAIL FROM:<test@valid.sender> BODY=8BITMIME"));
    }

    #[tokio::test]
    async fn advertises_body_and_size() {
        init_tracing();
        let server = TestServer::with_config(ServerConfig {
            size_limit: Some(1000),
            ..ServerConfig::default()
        })
        .await;
        let transport = SmtpTransport::new(server.options().build());
        let envelope = valid_envelope().with_size_hint(3);

        transport.send(&envelope, &b"hi\n"[..]).await.unwrap();

        assert!(server.saw("MAIL FROM:<test@valid.sender> BODY=8BITMIME SIZE=3"));
    }

    #[tokio::test]
    async fn concurrent_sends() {
        init_tracing();
        let server = TestServer::start().await;
        let transport = SmtpTransport::new(server.options().build());
        let first = valid_envelope();
        let second = envelope("other@valid.sender", &["other@valid.recipient"]);

        let (a, b) = tokio::join!(
            transport.send(&first, &b"first\n"[..]),
            transport.send(&second, &b"second\n"[..]),
        );
        a.unwrap();
        b.unwrap();

        let mut bodies: Vec<Vec<u8>> = server.messages().into_iter().map(|m| m.body).collect();
        bodies.sort();
        assert_eq!(bodies, vec![b"first\r\n".to_vec(), b"second\r\n".to_vec()]);
    }

    #[tokio::test]
    async fn abort_during_quit_keeps_success() {
        init_tracing();
        let server = TestServer::with_config(ServerConfig {
            quit_delay: Some(Duration::from_secs(1)),
            ..ServerConfig::default()
        })
        .await;
        let transport = SmtpTransport::new(server.options().build());
        let envelope = valid_envelope();
        let (handle, signal) = abort_pair();

        let (result, ()) = tokio::join!(
            transport.send_with_abort(&envelope, &b"queued before abort\n"[..], signal),
            async {
                server
                    .wait_for(|lines| lines.iter().any(|line| line == "QUIT"))
                    .await;
                handle.abort();
            }
        );

        let report = result.unwrap();
        assert_eq!(report.response, "250 OK: queued as 1234");
        assert_eq!(server.messages().len(), 1);
        assert_eq!(server.count("QUIT"), 1);
    }
}

mod envelope_errors {
    use super::*;

    #[tokio::test]
    async fn sender_rejected_before_data() {
        init_tracing();
        let server = TestServer::start().await;
        let transport = SmtpTransport::new(server.options().build());
        let envelope = envelope("test@invalid.sender", &["test@valid.recipient"]);

        let err = transport
            .send(&envelope, &b"never sent\n"[..])
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Envelope);
        assert_eq!(err.code(), "EENVELOPE");
        assert_eq!(err.response_code(), Some(550));
        assert!(!server.saw("RCPT"));
        assert!(!server.saw("DATA"));
        assert!(server.messages().is_empty());
    }

    #[tokio::test]
    async fn all_recipients_rejected() {
        init_tracing();
        let server = TestServer::start().await;
        let transport = SmtpTransport::new(server.options().build());
        let envelope = envelope(
            "test@valid.sender",
            &["a@invalid.recipient", "b@invalid.recipient"],
        );

        let err = transport
            .send(&envelope, &b"never sent\n"[..])
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Envelope);
        assert!(err.message().contains("a@invalid.recipient"));
        assert!(err.message().contains("b@invalid.recipient"));
        assert_eq!(server.count("RCPT TO"), 2);
        assert!(!server.saw("DATA"));
        server
            .wait_for(|lines| lines.iter().any(|line| line == "QUIT"))
            .await;
    }

    #[test]
    fn malformed_address_is_local() {
        let err = Envelope::new("not an address", ["test@valid.recipient"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Envelope);
    }
}

mod message_errors {
    use super::*;

    #[tokio::test]
    async fn final_reply_rejected() {
        init_tracing();
        let server = TestServer::with_config(ServerConfig {
            final_reply: "554 Message rejected as spam",
            ..ServerConfig::default()
        })
        .await;
        let transport = SmtpTransport::new(server.options().build());

        let err = transport
            .send(&valid_envelope(), &b"buy now\n"[..])
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Message);
        assert_eq!(err.code(), "EMESSAGE");
        assert_eq!(err.response_code(), Some(554));
        assert!(server.saw("<data complete>"));
    }

    #[tokio::test]
    async fn larger_than_server_limit() {
        init_tracing();
        let server = TestServer::with_config(ServerConfig {
            size_limit: Some(100),
            ..ServerConfig::default()
        })
        .await;
        let transport = SmtpTransport::new(server.options().build());
        let envelope = valid_envelope().with_size_hint(101);

        let err = transport
            .send(&envelope, &b"whatever\n"[..])
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Message);
        assert!(!server.saw("MAIL FROM"));
    }
}

mod stream_errors {
    use super::*;

    #[tokio::test]
    async fn reported_once_in_result_and_once_as_event() {
        init_tracing();
        let server = TestServer::start().await;
        let transport = SmtpTransport::new(server.options().build());
        let mut events = transport.subscribe();

        let err = transport
            .send(&valid_envelope(), FailingSource::new(b"Subject: partial\r\n\r\nfirst line\r\n"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Stream);
        assert_eq!(err.code(), "ESTREAM");
        assert!(err.message().contains("source exploded"));

        let TransportEvent::StreamError(event) = events.try_recv().unwrap() else {
            panic!("unexpected event");
        };
        assert_eq!(event.kind(), ErrorKind::Stream);
        assert!(Arc::ptr_eq(err.cause().unwrap(), event.cause().unwrap()));
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));

        server
            .wait_for(|lines| lines.iter().any(|line| line == "<data aborted>"))
            .await;
        assert!(server.messages().is_empty());
        assert!(!server.saw("QUIT"));
    }

    #[tokio::test]
    async fn no_event_for_other_failures() {
        init_tracing();
        let server = TestServer::start().await;
        let transport = SmtpTransport::new(server.options().build());
        let mut events = transport.subscribe();
        let envelope = envelope("test@invalid.sender", &["test@valid.recipient"]);

        transport.send(&envelope, &b"x\n"[..]).await.unwrap_err();

        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }
}

mod authentication {
    use super::*;

    fn secured(server: &TestServer, auth: AuthConfig) -> SmtpTransport {
        SmtpTransport::new(server.options().auth(auth).build())
    }

    async fn strict_server() -> TestServer {
        TestServer::with_config(ServerConfig {
            require_auth: true,
            ..ServerConfig::default()
        })
        .await
    }

    #[tokio::test]
    async fn plain_succeeds() {
        init_tracing();
        let server = strict_server().await;
        let transport = secured(&server, AuthConfig::with_password(USER, PASS));

        transport
            .send(&valid_envelope(), &b"hi\n"[..])
            .await
            .unwrap();

        assert!(server.saw("AUTH PLAIN "));
        assert_eq!(server.messages().len(), 1);
    }

    #[tokio::test]
    async fn wrong_password() {
        init_tracing();
        let server = strict_server().await;
        let transport = secured(&server, AuthConfig::with_password(USER, "wrongpass"));

        let err = transport
            .send(&valid_envelope(), &b"hi\n"[..])
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Auth);
        assert_eq!(err.code(), "EAUTH");
        assert_eq!(err.response_code(), Some(535));
        assert!(!server.saw("MAIL FROM"));
    }

    #[tokio::test]
    async fn wrong_user() {
        init_tracing();
        let server = strict_server().await;
        let transport = secured(&server, AuthConfig::with_password("invaliduser", PASS));

        let err = transport
            .send(&valid_envelope(), &b"hi\n"[..])
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Auth);
        assert!(!server.saw("MAIL FROM"));
    }

    #[tokio::test]
    async fn login_when_forced() {
        init_tracing();
        let server = strict_server().await;
        let transport = secured(
            &server,
            AuthConfig::with_password(USER, PASS).method(AuthMechanism::Login),
        );

        transport
            .send(&valid_envelope(), &b"hi\n"[..])
            .await
            .unwrap();

        assert!(server.saw("AUTH LOGIN"));
        assert_eq!(server.count("<auth>"), 2);
    }

    #[tokio::test]
    async fn login_when_only_offer() {
        init_tracing();
        let server = TestServer::with_config(ServerConfig {
            require_auth: true,
            auth_methods: vec!["LOGIN"],
            ..ServerConfig::default()
        })
        .await;
        let transport = secured(&server, AuthConfig::with_password(USER, PASS));

        transport
            .send(&valid_envelope(), &b"hi\n"[..])
            .await
            .unwrap();
        assert!(server.saw("AUTH LOGIN"));
    }

    #[tokio::test]
    async fn missing_password_sends_no_auth() {
        init_tracing();
        let server = strict_server().await;
        let transport = secured(
            &server,
            AuthConfig {
                user: USER.to_string(),
                ..AuthConfig::default()
            },
        );

        let err = transport
            .send(&valid_envelope(), &b"hi\n"[..])
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Auth);
        assert!(!server.saw("AUTH"));
        assert!(!server.saw("MAIL FROM"));
    }

    #[tokio::test]
    async fn xoauth2_token() {
        init_tracing();
        let server = strict_server().await;
        let transport = secured(&server, AuthConfig::with_token(USER, TOKEN));

        transport
            .send(&valid_envelope(), &b"hi\n"[..])
            .await
            .unwrap();
        assert!(server.saw("AUTH XOAUTH2 "));
    }

    #[tokio::test]
    async fn xoauth2_rejection_includes_status() {
        init_tracing();
        let server = strict_server().await;
        let transport = secured(&server, AuthConfig::with_token(USER, "expired"));

        let err = transport
            .send(&valid_envelope(), &b"hi\n"[..])
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Auth);
        assert!(err.message().contains("status 401"), "{}", err.message());
        assert!(server.saw("<auth> "));
        assert!(!server.saw("MAIL FROM"));
    }

    struct Refresher {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl TokenRefresher for Refresher {
        async fn access_token(&self, user: &str) -> Result<String, BoxError> {
            self.calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            assert_eq!(user, USER);
            Ok(TOKEN.to_string())
        }
    }

    #[tokio::test]
    async fn stale_token_is_refreshed_once() {
        init_tracing();
        let server = strict_server().await;
        let refresher = Arc::new(Refresher {
            calls: std::sync::atomic::AtomicUsize::new(0),
        });
        let transport = secured(
            &server,
            AuthConfig::with_token(USER, "expired").refresher(refresher.clone()),
        );

        transport
            .send(&valid_envelope(), &b"hi\n"[..])
            .await
            .unwrap();

        assert_eq!(refresher.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(server.count("AUTH XOAUTH2"), 2);
    }

    #[tokio::test]
    async fn refresher_supplies_token() {
        init_tracing();
        let server = strict_server().await;
        let refresher = Arc::new(Refresher {
            calls: std::sync::atomic::AtomicUsize::new(0),
        });
        let transport = secured(&server, AuthConfig::with_refresher(USER, refresher.clone()));

        transport
            .send(&valid_envelope(), &b"hi\n"[..])
            .await
            .unwrap();

        assert_eq!(refresher.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(server.count("AUTH XOAUTH2"), 1);
    }

    #[tokio::test]
    async fn verify_checks_credentials() {
        init_tracing();
        let server = strict_server().await;

        secured(&server, AuthConfig::with_password(USER, PASS))
            .verify()
            .await
            .unwrap();
        let err = secured(&server, AuthConfig::with_password(USER, "nope"))
            .verify()
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Auth);
        assert!(!server.saw("MAIL FROM"));
        server
            .wait_for(|lines| lines.iter().filter(|line| *line == "QUIT").count() == 2)
            .await;
    }
}

mod connection_errors {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn silent_server_times_out() {
        init_tracing();
        let server = TestServer::with_config(ServerConfig {
            greet: false,
            ..ServerConfig::default()
        })
        .await;
        let transport = SmtpTransport::new(server.options().build());

        let err = transport
            .send(&valid_envelope(), &b"hi\n"[..])
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(err.code(), "ETIMEDOUT");
        assert!(!err.is_cancelled());
    }

    #[tokio::test]
    async fn abort_cancels_pending_wait() {
        init_tracing();
        let server = TestServer::with_config(ServerConfig {
            greet: false,
            ..ServerConfig::default()
        })
        .await;
        let transport = SmtpTransport::new(
            server
                .options()
                .greeting_timeout(Duration::from_secs(30))
                .build(),
        );
        let (handle, signal) = abort_pair();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            handle.abort();
        });
        let err = tokio::time::timeout(
            Duration::from_secs(5),
            transport.send_with_abort(&valid_envelope(), &b"hi\n"[..], signal),
        )
        .await
        .expect("abort should end the send")
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn refused_connection() {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let transport = SmtpTransport::new(
            TransportOptions::builder()
                .host("127.0.0.1")
                .port(port)
                .build(),
        );
        let err = transport.verify().await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Connection);
        assert_eq!(err.code(), "ECONNECTION");
    }

    #[tokio::test]
    async fn implicit_tls_against_plain_server() {
        init_tracing();
        let server = TestServer::start().await;
        let transport = SmtpTransport::new(
            server
                .options()
                .secure(true)
                .tls_policy(mailpost::TlsPolicy::AcceptInvalidCerts)
                .build(),
        );

        let err = transport.verify().await.unwrap_err();
        assert!(
            matches!(err.kind(), ErrorKind::Connection | ErrorKind::Timeout),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn require_tls_without_starttls() {
        init_tracing();
        let server = TestServer::start().await;
        let transport = SmtpTransport::new(server.options().require_tls(true).build());

        let err = transport.verify().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert!(err.message().contains("STARTTLS"));
    }

    #[tokio::test]
    async fn server_drops_socket_during_data() {
        init_tracing();
        let server = TestServer::with_config(ServerConfig {
            drop_after_data: true,
            ..ServerConfig::default()
        })
        .await;
        let transport = SmtpTransport::new(server.options().build());
        let mut events = transport.subscribe();
        let body = format!("{}\n", "x".repeat(76)).repeat(100_000);

        let err = transport
            .send(&valid_envelope(), body.as_bytes())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Socket);
        assert_eq!(err.code(), "ESOCKET");
        assert!(!err.is_cancelled());
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
        server
            .wait_for(|lines| lines.iter().any(|line| line == "<dropped>"))
            .await;
        assert!(server.messages().is_empty());
        assert!(!server.saw("QUIT"));
    }
}
