use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::Duration;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, trace, warn};

use crate::config::{default_io_timeout, default_tls_handshake_timeout, TlsOptions};
use crate::crypto;
use crate::error::{GateError, Result};
use crate::server::{IoServer, IoSession, RawSession, ServerInfo};
use crate::stats::{keys, Stats};
use crate::tls::context::TlsContext;
use crate::tls::session::TlsSession;

/// Server that wraps each accepted raw session in a TLS handshake
///
/// Owns exactly one [`TlsContext`]. Accepting never touches the network; the
/// handshake runs inside the returned session, bounded by the handshake timeout.
///
/// Sessions keep their own reference to the immutable rustls config, so dropping
/// the server while sessions are still open does not break them. The context is
/// still counted as released when the server goes away.
pub struct TlsServer {
    host: Arc<str>,
    context: TlsContext,
    acceptor: TlsAcceptor,
    io_timeout: Duration,
    handshake_timeout: Duration,
    stats: Arc<Stats>,
}

impl TlsServer {
    /// Build a server with the default handshake timeout and protocol policy
    pub fn new(
        host: impl Into<String>,
        key_path: impl Into<PathBuf>,
        cert_path: impl Into<PathBuf>,
        timeout_ms: u64,
    ) -> Result<Self> {
        Self::builder(host, key_path, cert_path).io_timeout_ms(timeout_ms).build()
    }

    pub fn builder(
        host: impl Into<String>,
        key_path: impl Into<PathBuf>,
        cert_path: impl Into<PathBuf>,
    ) -> TlsServerBuilder {
        TlsServerBuilder {
            host: host.into(),
            key_path: key_path.into(),
            cert_path: cert_path.into(),
            io_timeout_ms: default_io_timeout(),
            handshake_timeout_ms: default_tls_handshake_timeout(),
            options: TlsOptions::default(),
            stats: None,
        }
    }

    pub fn context(&self) -> &TlsContext {
        &self.context
    }

    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    pub fn io_timeout(&self) -> Duration {
        self.io_timeout
    }

    /// Same as [`IoServer::accept`] without erasing the session type
    pub fn accept_tls(&self, raw: RawSession) -> Result<TlsSession> {
        // The callback only runs once rustls has built the connection state.
        let mut created = false;
        let mut handshake = self.acceptor.accept_with(raw, |_| created = true);
        ensure_created(created, &self.host, &mut handshake)
            .inspect_err(|e| warn!(host = %self.host, error = %e, "unable to create TLS handshake"))?;

        self.stats.inc(keys::SESSION_ACCEPTED);
        debug!(host = %self.host, "TLS session accepted");

        Ok(TlsSession::new(
            handshake,
            Arc::clone(&self.host),
            self.handshake_timeout,
            self.io_timeout,
            Arc::clone(&self.stats),
        ))
    }
}

impl IoServer for TlsServer {
    fn name(&self) -> &str {
        &self.host
    }

    fn accept(&self, raw: RawSession) -> Result<Box<dyn IoSession>> {
        Ok(Box::new(self.accept_tls(raw)?))
    }

    fn describe(&self) -> ServerInfo {
        ServerInfo { host: self.host.to_string(), timeout_ms: self.io_timeout.as_millis() as u64 }
    }
}

impl Drop for TlsServer {
    fn drop(&mut self) {
        trace!(host = %self.host, context = ?self.context, "releasing TLS context");
        self.stats.inc(keys::CONTEXT_RELEASED);
    }
}

impl std::fmt::Debug for TlsServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsServer")
            .field("host", &self.host)
            .field("io_timeout", &self.io_timeout)
            .field("handshake_timeout", &self.handshake_timeout)
            .field("context", &self.context)
            .finish()
    }
}

/// Fail with [`GateError::HandshakeObjectCreationFailed`] unless the connection
/// state was created
///
/// A handshake whose state was never created is already failed and resolves
/// without I/O, so a single poll yields the reason.
fn ensure_created<F, T>(created: bool, host: &str, handshake: &mut F) -> Result<()>
where
    F: Future<Output = io::Result<T>> + Unpin,
{
    if created {
        return Ok(());
    }

    let mut cx = Context::from_waker(Waker::noop());
    let reason = match Pin::new(handshake).poll(&mut cx) {
        Poll::Ready(Err(e)) => e.to_string(),
        _ => "connection state was not created".to_string(),
    };
    Err(GateError::HandshakeObjectCreationFailed { host: host.to_string(), reason })
}

/// Optional settings for a [`TlsServer`], created by [`TlsServer::builder`]
pub struct TlsServerBuilder {
    host: String,
    key_path: PathBuf,
    cert_path: PathBuf,
    io_timeout_ms: u64,
    handshake_timeout_ms: u64,
    options: TlsOptions,
    stats: Option<Arc<Stats>>,
}

impl TlsServerBuilder {
    /// General timeout applied to I/O on accepted sessions
    pub fn io_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.io_timeout_ms = timeout_ms;
        self
    }

    /// Deadline for completing the TLS handshake, independent of the I/O timeout
    pub fn handshake_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.handshake_timeout_ms = timeout_ms;
        self
    }

    /// Protocol version range and ALPN list
    pub fn options(mut self, options: TlsOptions) -> Self {
        self.options = options;
        self
    }

    /// Counter sink; defaults to [`Stats::global`]
    pub fn stats(mut self, stats: Arc<Stats>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Initialize crypto, load the context and create the server
    pub fn build(self) -> Result<TlsServer> {
        debug!(
            host = %self.host,
            key = %self.key_path.display(),
            cert = %self.cert_path.display(),
            timeout_ms = self.io_timeout_ms,
            "creating TLS server"
        );

        let provider = crypto::init()?;
        let context = TlsContext::build(provider, &self.cert_path, &self.key_path, &self.options)
            .inspect_err(|e| warn!(host = %self.host, error = %e, "TLS context creation failed"))?;

        let stats = self.stats.unwrap_or_else(Stats::global);
        stats.inc(keys::CONTEXT_CREATED);

        let acceptor = TlsAcceptor::from(Arc::clone(context.config()));
        let server = TlsServer {
            host: Arc::from(self.host),
            context,
            acceptor,
            io_timeout: Duration::from_millis(self.io_timeout_ms),
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
            stats,
        };

        server.stats.inc(keys::SERVER_CREATED);
        info!(
            host = %server.host,
            versions = ?server.context.versions(),
            handshake_timeout_ms = self.handshake_timeout_ms,
            "TLS server created"
        );

        Ok(server)
    }
}
