use serde::Deserialize;
use std::net::SocketAddr;

pub use super::telemetry::{LoggingConfig, TelemetryConfig};
pub use super::timeout::TimeoutConfig;
pub use super::tls::{TlsConfig, TlsOptions, TlsVersion};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Address and port to listen on
    /// Example: "0.0.0.0:4433" or "127.0.0.1:8443"
    pub listen: SocketAddr,
    /// Label reported by the server; used for identification and logs, never for binding
    pub host: String,
    /// TLS termination configuration (optional)
    /// If not provided, sessions are accepted in plaintext
    #[serde(default)]
    pub tls: Option<TlsConfig>,
    #[serde(default)]
    pub timeout: TimeoutConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}
