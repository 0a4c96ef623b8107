use std::future::{poll_fn, Future};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::{Instant, Sleep};
use tokio_rustls::rustls::{CipherSuite, ProtocolVersion};
use tokio_rustls::server::TlsStream;
use tokio_rustls::Accept;
use tracing::{debug, warn};

use crate::error::{GateError, Result};
use crate::server::{IoSession, RawSession, SessionFuture, SessionKind};
use crate::stats::{keys, Stats};

enum State {
    Handshaking {
        accept: Accept<RawSession>,
        deadline: Option<Pin<Box<Sleep>>>,
        started: Option<Instant>,
    },
    Streaming(Box<TlsStream<RawSession>>),
    Closed,
}

/// One TLS connection produced by [`crate::tls::TlsServer`]
///
/// The handshake starts on the first call to [`IoSession::handshake`] or the first
/// read or write, and fails with [`GateError::HandshakeTimeout`] if the peer does
/// not finish it in time.
pub struct TlsSession {
    state: State,
    server: Arc<str>,
    handshake_timeout: Duration,
    io_timeout: Duration,
    stats: Arc<Stats>,
}

impl TlsSession {
    pub(crate) fn new(
        accept: Accept<RawSession>,
        server: Arc<str>,
        handshake_timeout: Duration,
        io_timeout: Duration,
        stats: Arc<Stats>,
    ) -> Self {
        Self {
            state: State::Handshaking { accept, deadline: None, started: None },
            server,
            handshake_timeout,
            io_timeout,
            stats,
        }
    }

    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    pub fn is_established(&self) -> bool {
        matches!(self.state, State::Streaming(_))
    }

    pub fn protocol_version(&self) -> Option<ProtocolVersion> {
        self.stream().and_then(|s| s.get_ref().1.protocol_version())
    }

    pub fn cipher_suite(&self) -> Option<CipherSuite> {
        self.stream()
            .and_then(|s| s.get_ref().1.negotiated_cipher_suite())
            .map(|cs| cs.suite())
    }

    pub fn alpn_protocol(&self) -> Option<&[u8]> {
        self.stream().and_then(|s| s.get_ref().1.alpn_protocol())
    }

    fn stream(&self) -> Option<&TlsStream<RawSession>> {
        match &self.state {
            State::Streaming(s) => Some(s),
            _ => None,
        }
    }

    fn stream_mut(&mut self) -> io::Result<&mut TlsStream<RawSession>> {
        match &mut self.state {
            State::Streaming(s) => Ok(s),
            _ => Err(io::Error::new(io::ErrorKind::NotConnected, "TLS session is closed")),
        }
    }

    fn poll_handshake(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        let timeout = self.handshake_timeout;
        let outcome = match &mut self.state {
            State::Streaming(_) => return Poll::Ready(Ok(())),
            State::Closed => {
                return Poll::Ready(Err(GateError::Io(io::Error::new(
                    io::ErrorKind::NotConnected,
                    "TLS session is closed",
                ))))
            }
            State::Handshaking { accept, deadline, started } => {
                let started = *started.get_or_insert_with(Instant::now);
                let deadline =
                    deadline.get_or_insert_with(|| Box::pin(tokio::time::sleep(timeout)));

                match Pin::new(accept).poll(cx) {
                    Poll::Ready(Ok(stream)) => Ok((stream, started.elapsed())),
                    Poll::Ready(Err(e)) => Err(GateError::Handshake(e.to_string())),
                    Poll::Pending => {
                        ready!(deadline.as_mut().poll(cx));
                        Err(GateError::HandshakeTimeout { timeout_ms: timeout.as_millis() as u64 })
                    }
                }
            }
        };

        match outcome {
            Ok((stream, elapsed)) => {
                self.established(&stream, elapsed);
                self.state = State::Streaming(Box::new(stream));
                Poll::Ready(Ok(()))
            }
            Err(e) => {
                self.state = State::Closed;
                self.failed(&e);
                Poll::Ready(Err(e))
            }
        }
    }

    fn established(&self, stream: &TlsStream<RawSession>, elapsed: Duration) {
        let (_, connection) = stream.get_ref();

        let tls_version = connection
            .protocol_version()
            .map(|v| format!("{v:?}"))
            .unwrap_or_else(|| "unknown".to_string());
        let cipher_suite = connection
            .negotiated_cipher_suite()
            .map(|cs| format!("{:?}", cs.suite()))
            .unwrap_or_else(|| "unknown".to_string());

        self.stats.inc(keys::HANDSHAKE_COMPLETED);
        if let Some(m) = self.stats.metrics() {
            m.record_tls_handshake(&tls_version, &cipher_suite, elapsed.as_secs_f64());
        }
        debug!(
            server = %self.server,
            %tls_version,
            %cipher_suite,
            elapsed_ms = elapsed.as_millis() as u64,
            "TLS handshake completed"
        );
    }

    fn failed(&self, err: &GateError) {
        if err.is_timeout() {
            self.stats.inc(keys::HANDSHAKE_TIMEOUT);
            warn!(server = %self.server, error = %err, "TLS handshake timeout");
        } else {
            self.stats.inc(keys::HANDSHAKE_FAILED);
            warn!(server = %self.server, error = %err, "TLS handshake failed");
        }
        if let Some(m) = self.stats.metrics() {
            m.record_tls_handshake_error(err.error_type());
        }
    }
}

impl IoSession for TlsSession {
    fn kind(&self) -> SessionKind {
        SessionKind::Tls
    }

    fn io_timeout(&self) -> Duration {
        self.io_timeout
    }

    fn handshake(&mut self) -> SessionFuture<'_> {
        Box::pin(poll_fn(move |cx| self.poll_handshake(cx)))
    }
}

impl AsyncRead for TlsSession {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(this.poll_handshake(cx))?;
        Pin::new(this.stream_mut()?).poll_read(cx, buf)
    }
}

impl AsyncWrite for TlsSession {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        ready!(this.poll_handshake(cx))?;
        Pin::new(this.stream_mut()?).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().state {
            State::Streaming(s) => Pin::new(s.as_mut()).poll_flush(cx),
            _ => Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match &mut this.state {
            State::Streaming(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
            State::Handshaking { accept, .. } => {
                if let Some(io) = accept.get_mut() {
                    ready!(Pin::new(io).poll_shutdown(cx))?;
                }
                this.state = State::Closed;
                Poll::Ready(Ok(()))
            }
            State::Closed => Poll::Ready(Ok(())),
        }
    }
}
