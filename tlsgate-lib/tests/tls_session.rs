mod helpers;

use std::io::ErrorKind;
use std::sync::Arc;
use std::time::{Duration, Instant};

use helpers::{
    cleanup, client_config, connector, create_valid_test_cert, raw_pair, server_name, TestResult,
};
use tlsgate_lib::config::{TlsOptions, TlsVersion};
use tlsgate_lib::stats::keys;
use tlsgate_lib::{GateError, IoServer, IoSession, Stats, TlsServer};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_rustls::rustls::{self, ProtocolVersion};
use tokio_rustls::TlsConnector;

struct Fixture {
    server: TlsServer,
    stats: Arc<Stats>,
    cert_path: std::path::PathBuf,
    key_path: std::path::PathBuf,
}

impl Fixture {
    fn new(handshake_timeout_ms: u64, options: TlsOptions) -> TestResult<Self> {
        let (cert_path, key_path) = create_valid_test_cert()?;
        let stats = Arc::new(Stats::new());
        let server = TlsServer::builder("db1", &key_path, &cert_path)
            .io_timeout_ms(5000)
            .handshake_timeout_ms(handshake_timeout_ms)
            .options(options)
            .stats(Arc::clone(&stats))
            .build()?;
        Ok(Self { server, stats, cert_path, key_path })
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        cleanup(&[&self.cert_path, &self.key_path]);
    }
}

#[tokio::test]
async fn handshake_then_echo() -> TestResult {
    let fx = Fixture::new(5000, TlsOptions::default())?;
    let (client_io, raw) = raw_pair();
    let mut session = fx.server.accept_tls(raw)?;
    assert!(!session.is_established());

    let connect = connector(&fx.cert_path)?.connect(server_name()?, client_io);
    let (client, handshake) = tokio::join!(connect, session.handshake());
    let mut client = client?;
    handshake?;

    assert!(session.is_established());
    assert_eq!(session.protocol_version(), Some(ProtocolVersion::TLSv1_3));
    assert!(session.cipher_suite().is_some());
    assert_eq!(fx.stats.get(keys::HANDSHAKE_COMPLETED), 1);

    client.write_all(b"ping").await?;
    client.flush().await?;

    let mut buf = [0u8; 4];
    session.read_exact(&mut buf).await?;
    assert_eq!(&buf, b"ping");

    session.write_all(b"pong").await?;
    session.flush().await?;
    client.read_exact(&mut buf).await?;
    assert_eq!(&buf, b"pong");

    // A second handshake call on an established session is a no-op
    session.handshake().await?;
    assert_eq!(fx.stats.get(keys::HANDSHAKE_COMPLETED), 1);
    Ok(())
}

#[tokio::test]
async fn first_read_drives_handshake() -> TestResult {
    let fx = Fixture::new(5000, TlsOptions::default())?;
    let (client_io, raw) = raw_pair();
    let mut session = fx.server.accept(raw)?;

    let cert_path = fx.cert_path.clone();
    let client = tokio::spawn(async move {
        let mut tls = connector(&cert_path)?.connect(server_name()?, client_io).await?;
        tls.write_all(b"hello").await?;
        tls.flush().await?;
        // Keep the connection open until the server has read
        let mut buf = [0u8; 1];
        let _ = tls.read(&mut buf).await;
        Ok::<_, Box<dyn std::error::Error + Send + Sync>>(())
    });

    let mut buf = [0u8; 5];
    session.read_exact(&mut buf).await?;
    assert_eq!(&buf, b"hello");
    assert_eq!(fx.stats.get(keys::HANDSHAKE_COMPLETED), 1);

    session.shutdown().await?;
    client.await??;
    Ok(())
}

#[tokio::test]
async fn silent_peer_hits_handshake_timeout() -> TestResult {
    let fx = Fixture::new(100, TlsOptions::default())?;
    let (_client_io, raw) = raw_pair();
    let mut session = fx.server.accept(raw)?;

    let started = Instant::now();
    let result = session.handshake().await;

    match result {
        Err(GateError::HandshakeTimeout { timeout_ms }) => assert_eq!(timeout_ms, 100),
        other => panic!("expected HandshakeTimeout, got {other:?}"),
    }
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(fx.stats.get(keys::HANDSHAKE_TIMEOUT), 1);
    assert_eq!(fx.stats.get(keys::HANDSHAKE_FAILED), 0);
    Ok(())
}

#[tokio::test]
async fn handshake_timeout_surfaces_as_timed_out_on_read() -> TestResult {
    let fx = Fixture::new(100, TlsOptions::default())?;
    let (_client_io, raw) = raw_pair();
    let mut session = fx.server.accept(raw)?;

    let mut buf = [0u8; 8];
    let err = match session.read(&mut buf).await {
        Err(e) => e,
        Ok(n) => panic!("expected timeout, read {n} bytes"),
    };

    assert_eq!(err.kind(), ErrorKind::TimedOut);
    assert_eq!(fx.stats.get(keys::HANDSHAKE_TIMEOUT), 1);
    Ok(())
}

#[tokio::test]
async fn session_is_unusable_after_failure() -> TestResult {
    let fx = Fixture::new(50, TlsOptions::default())?;
    let (_client_io, raw) = raw_pair();
    let mut session = fx.server.accept_tls(raw)?;

    assert!(session.handshake().await.is_err());
    assert!(!session.is_established());

    match session.handshake().await {
        Err(GateError::Io(e)) => assert_eq!(e.kind(), ErrorKind::NotConnected),
        other => panic!("expected NotConnected, got {other:?}"),
    }
    let err = session.write(b"late").await.err().map(|e| e.kind());
    assert_eq!(err, Some(ErrorKind::NotConnected));
    // Counted once, not per call
    assert_eq!(fx.stats.get(keys::HANDSHAKE_TIMEOUT), 1);
    Ok(())
}

#[tokio::test]
async fn garbage_client_fails_handshake() -> TestResult {
    let fx = Fixture::new(5000, TlsOptions::default())?;
    let (mut client_io, raw) = raw_pair();
    let mut session = fx.server.accept(raw)?;

    client_io.write_all(b"GET / HTTP/1.1\r\nHost: db1\r\n\r\n").await?;

    match session.handshake().await {
        Err(e @ GateError::Handshake(_)) => assert!(!e.is_timeout()),
        other => panic!("expected handshake error, got {other:?}"),
    }
    assert_eq!(fx.stats.get(keys::HANDSHAKE_FAILED), 1);
    assert_eq!(fx.stats.get(keys::HANDSHAKE_TIMEOUT), 0);
    Ok(())
}

#[tokio::test]
async fn version_below_minimum_is_refused() -> TestResult {
    let options = TlsOptions { min_version: TlsVersion::V1_3, ..TlsOptions::default() };
    let fx = Fixture::new(5000, options)?;
    let (client_io, raw) = raw_pair();
    let mut session = fx.server.accept(raw)?;

    let tls12_only = client_config(&fx.cert_path, &[&rustls::version::TLS12], &[])?;
    let connect = TlsConnector::from(tls12_only).connect(server_name()?, client_io);
    let (client, handshake) = tokio::join!(connect, session.handshake());

    assert!(client.is_err());
    assert!(matches!(handshake, Err(GateError::Handshake(_))));
    assert_eq!(fx.stats.get(keys::HANDSHAKE_FAILED), 1);
    Ok(())
}

#[tokio::test]
async fn tls12_client_accepted_by_default_policy() -> TestResult {
    let fx = Fixture::new(5000, TlsOptions::default())?;
    let (client_io, raw) = raw_pair();
    let mut session = fx.server.accept_tls(raw)?;

    let tls12_only = client_config(&fx.cert_path, &[&rustls::version::TLS12], &[])?;
    let connect = TlsConnector::from(tls12_only).connect(server_name()?, client_io);
    let (client, handshake) = tokio::join!(connect, session.handshake());
    client?;
    handshake?;

    assert_eq!(session.protocol_version(), Some(ProtocolVersion::TLSv1_2));
    Ok(())
}

#[tokio::test]
async fn negotiates_alpn() -> TestResult {
    let options = TlsOptions { alpn: vec!["h2".to_string()], ..TlsOptions::default() };
    let fx = Fixture::new(5000, options)?;
    let (client_io, raw) = raw_pair();
    let mut session = fx.server.accept_tls(raw)?;

    let config = client_config(&fx.cert_path, rustls::ALL_VERSIONS, &[&b"h2"[..], &b"http/1.1"[..]])?;
    let connect = TlsConnector::from(config).connect(server_name()?, client_io);
    let (client, handshake) = tokio::join!(connect, session.handshake());
    client?;
    handshake?;

    assert_eq!(session.alpn_protocol(), Some(&b"h2"[..]));
    Ok(())
}

#[tokio::test]
async fn session_outlives_server() -> TestResult {
    let fx = Fixture::new(5000, TlsOptions::default())?;
    let stats = Arc::clone(&fx.stats);
    let connector = connector(&fx.cert_path)?;

    let (client_io, raw) = raw_pair();
    let mut session = fx.server.accept(raw)?;

    // Release the server and its context, and remove the PEM files, before the
    // handshake even starts
    drop(fx);
    assert_eq!(stats.get(keys::CONTEXT_RELEASED), 1);

    let (client, handshake) =
        tokio::join!(connector.connect(server_name()?, client_io), session.handshake());
    let mut client = client?;
    handshake?;

    client.write_all(b"still here").await?;
    client.flush().await?;
    let mut buf = [0u8; 10];
    session.read_exact(&mut buf).await?;
    assert_eq!(&buf, b"still here");

    assert_eq!(stats.get(keys::HANDSHAKE_COMPLETED), 1);
    assert_eq!(stats.get(keys::CONTEXT_RELEASED), 1);
    Ok(())
}

#[tokio::test]
async fn sessions_are_independent() -> TestResult {
    let fx = Fixture::new(200, TlsOptions::default())?;

    // One peer never speaks and times out; the other completes normally
    let (_silent, raw_silent) = raw_pair();
    let mut stalled = fx.server.accept(raw_silent)?;

    let (client_io, raw) = raw_pair();
    let mut active = fx.server.accept(raw)?;
    let connect = connector(&fx.cert_path)?.connect(server_name()?, client_io);

    let (stalled_result, (client, handshake)) =
        tokio::join!(stalled.handshake(), async { tokio::join!(connect, active.handshake()) });

    assert!(matches!(stalled_result, Err(GateError::HandshakeTimeout { .. })));
    client?;
    handshake?;

    assert_eq!(fx.stats.get(keys::SESSION_ACCEPTED), 2);
    assert_eq!(fx.stats.get(keys::HANDSHAKE_COMPLETED), 1);
    assert_eq!(fx.stats.get(keys::HANDSHAKE_TIMEOUT), 1);
    Ok(())
}
