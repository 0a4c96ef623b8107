mod loader;
mod telemetry;
mod timeout;
mod tls;
mod types;

pub use loader::{load_from_path, load_from_str};
pub(crate) use timeout::{default_io_timeout, default_tls_handshake_timeout};
pub use types::{
    Config, LoggingConfig, TelemetryConfig, TimeoutConfig, TlsConfig, TlsOptions, TlsVersion,
};
