//! Transport-agnostic server contract.
//!
//! An [`IoServer`] turns an already-connected raw stream into an [`IoSession`]. The
//! listening socket and the accept loop belong to the caller; a server only wraps
//! what it is handed. [`crate::tls::TlsServer`] and [`PlainServer`] are interchangeable
//! behind `Box<dyn IoServer>`.

use serde::Serialize;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::Result;
use crate::stats::{keys, Stats};
use crate::tls::TlsServer;

/// Any connected byte stream that has not been wrapped yet
pub trait RawStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> RawStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

pub type RawSession = Box<dyn RawStream>;

pub type SessionFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Plain,
    Tls,
}

/// Construction-time description of a server, for logs and diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerInfo {
    pub host: String,
    pub timeout_ms: u64,
}

impl std::fmt::Display for ServerInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{host: {}, timeout: {}}}", self.host, self.timeout_ms)
    }
}

/// A session produced by [`IoServer::accept`]
pub trait IoSession: AsyncRead + AsyncWrite + Send + Unpin {
    fn kind(&self) -> SessionKind;

    /// Timeout the owner should apply to each read or write
    fn io_timeout(&self) -> Duration;

    /// Finish any negotiation still pending on the session
    ///
    /// Reads and writes also drive it, so calling this is only needed to surface
    /// negotiation errors before exchanging data.
    fn handshake(&mut self) -> SessionFuture<'_>;
}

pub trait IoServer: Send + Sync {
    fn name(&self) -> &str;

    /// Wrap a connected raw session; no network I/O happens here
    fn accept(&self, raw: RawSession) -> Result<Box<dyn IoSession>>;

    fn describe(&self) -> ServerInfo;
}

/// Server that hands raw sessions back unencrypted
pub struct PlainServer {
    host: String,
    timeout: Duration,
    stats: Arc<Stats>,
}

impl PlainServer {
    pub fn new(host: impl Into<String>, timeout_ms: u64, stats: Arc<Stats>) -> Self {
        let host = host.into();
        stats.inc(keys::PLAIN_SERVER_CREATED);
        info!(%host, timeout_ms, "plain server created");
        Self { host, timeout: Duration::from_millis(timeout_ms), stats }
    }
}

impl IoServer for PlainServer {
    fn name(&self) -> &str {
        &self.host
    }

    fn accept(&self, raw: RawSession) -> Result<Box<dyn IoSession>> {
        self.stats.inc(keys::PLAIN_SESSION_ACCEPTED);
        debug!(host = %self.host, "plain session accepted");
        Ok(Box::new(PlainSession { io: raw, io_timeout: self.timeout }))
    }

    fn describe(&self) -> ServerInfo {
        ServerInfo { host: self.host.clone(), timeout_ms: self.timeout.as_millis() as u64 }
    }
}

pub struct PlainSession {
    io: RawSession,
    io_timeout: Duration,
}

impl IoSession for PlainSession {
    fn kind(&self) -> SessionKind {
        SessionKind::Plain
    }

    fn io_timeout(&self) -> Duration {
        self.io_timeout
    }

    fn handshake(&mut self) -> SessionFuture<'_> {
        Box::pin(async { Ok(()) })
    }
}

impl AsyncRead for PlainSession {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_read(cx, buf)
    }
}

impl AsyncWrite for PlainSession {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.io).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_shutdown(cx)
    }
}

/// Build the server described by `cfg`: TLS when a `[tls]` table is present
pub fn build_server(cfg: &Config, stats: Arc<Stats>) -> Result<Box<dyn IoServer>> {
    match &cfg.tls {
        Some(tls) => {
            let server = TlsServer::builder(&cfg.host, &tls.key_path, &tls.cert_path)
                .io_timeout_ms(cfg.timeout.io_ms)
                .handshake_timeout_ms(cfg.timeout.tls_handshake_ms)
                .options(tls.options.clone())
                .stats(stats)
                .build()?;
            Ok(Box::new(server))
        }
        None => Ok(Box::new(PlainServer::new(&cfg.host, cfg.timeout.io_ms, stats))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn server_info_display() {
        let info = ServerInfo { host: "db1".to_string(), timeout_ms: 5000 };
        assert_eq!(info.to_string(), "{host: db1, timeout: 5000}");
    }

    #[tokio::test]
    async fn plain_session_passes_bytes_through() -> Result<()> {
        let stats = Arc::new(Stats::new());
        let server = PlainServer::new("plain", 1000, Arc::clone(&stats));
        let (client, raw) = tokio::io::duplex(1024);

        let mut session = server.accept(Box::new(raw))?;
        session.handshake().await?;
        assert_eq!(session.kind(), SessionKind::Plain);
        assert_eq!(session.io_timeout(), Duration::from_millis(1000));

        let (mut client_rd, mut client_wr) = tokio::io::split(client);
        client_wr.write_all(b"ping").await?;
        let mut buf = [0u8; 4];
        session.read_exact(&mut buf).await?;
        assert_eq!(&buf, b"ping");

        session.write_all(b"pong").await?;
        client_rd.read_exact(&mut buf).await?;
        assert_eq!(&buf, b"pong");

        assert_eq!(stats.get(keys::PLAIN_SERVER_CREATED), 1);
        assert_eq!(stats.get(keys::PLAIN_SESSION_ACCEPTED), 1);
        Ok(())
    }
}
