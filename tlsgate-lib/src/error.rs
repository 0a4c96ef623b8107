use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while building an acceptor or driving one of its sessions
#[derive(Error, Debug)]
pub enum GateError {
    #[error("Crypto engine initialization failed: {0}")]
    CryptoInit(String),

    #[error("No usable TLS protocol method: {0}")]
    MethodUnavailable(String),

    #[error("Unable to create TLS context: {0}")]
    ContextAllocationFailed(String),

    #[error("Unable to load server certificate [{}]: {reason}", path.display())]
    CertificateLoadFailed { path: PathBuf, reason: String },

    #[error("Unable to load server private key [{}]: {reason}", path.display())]
    PrivateKeyLoadFailed { path: PathBuf, reason: String },

    #[error("Unable to create TLS handshake for server {host}: {reason}")]
    HandshakeObjectCreationFailed { host: String, reason: String },

    #[error("TLS handshake did not complete within {timeout_ms}ms")]
    HandshakeTimeout { timeout_ms: u64 },

    #[error("TLS handshake failed: {0}")]
    Handshake(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Telemetry error: {0}")]
    Telemetry(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl GateError {
    pub fn is_timeout(&self) -> bool {
        match self {
            GateError::HandshakeTimeout { .. } => true,
            GateError::Io(e) => e.kind() == io::ErrorKind::TimedOut,
            _ => false,
        }
    }

    /// Short label used for metrics and structured logs
    pub fn error_type(&self) -> &'static str {
        match self {
            GateError::CryptoInit(_) => "crypto_init",
            GateError::MethodUnavailable(_) => "method_unavailable",
            GateError::ContextAllocationFailed(_) => "context_allocation",
            GateError::CertificateLoadFailed { .. } => "certificate_load",
            GateError::PrivateKeyLoadFailed { .. } => "private_key_load",
            GateError::HandshakeObjectCreationFailed { .. } => "handshake_object",
            GateError::HandshakeTimeout { .. } => "handshake_timeout",
            GateError::Handshake(_) => "handshake",
            GateError::Config(_) => "config",
            GateError::Telemetry(_) => "telemetry",
            GateError::Io(_) => "io",
        }
    }
}

impl From<GateError> for io::Error {
    fn from(err: GateError) -> Self {
        match err {
            GateError::Io(e) => e,
            e @ GateError::HandshakeTimeout { .. } => io::Error::new(io::ErrorKind::TimedOut, e),
            e => io::Error::other(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, GateError>;
