#![forbid(unsafe_code)]

pub mod config;
pub mod crypto;
pub mod error;
pub mod server;
pub mod stats;
pub mod telemetry;
pub mod tls;

pub use config::{load_from_path, Config, TlsConfig, TlsOptions, TlsVersion};
pub use error::{GateError, Result};
pub use server::{
    build_server, IoServer, IoSession, PlainServer, RawSession, ServerInfo, SessionKind,
};
pub use stats::Stats;
pub use tls::{TlsContext, TlsServer, TlsSession};
