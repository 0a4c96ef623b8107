use serde::Deserialize;

/// Timeout configuration
///
/// The general I/O timeout and the TLS handshake timeout are independent settings.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Timeout for any I/O operation on an accepted session, in milliseconds
    /// Default: 60000 (60 seconds)
    #[serde(default = "default_io_timeout")]
    pub io_ms: u64,
    /// Maximum time allowed for completing the TLS handshake, in milliseconds
    /// Default: 5000 (5 seconds)
    #[serde(default = "default_tls_handshake_timeout")]
    pub tls_handshake_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { io_ms: default_io_timeout(), tls_handshake_ms: default_tls_handshake_timeout() }
    }
}

pub(crate) fn default_io_timeout() -> u64 {
    60_000
}

pub(crate) fn default_tls_handshake_timeout() -> u64 {
    5_000
}
