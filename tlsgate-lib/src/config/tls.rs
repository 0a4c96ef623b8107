use serde::Deserialize;

/// TLS version configuration
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    /// TLS 1.2
    #[serde(rename = "1.2")]
    V1_2,
    /// TLS 1.3
    #[serde(rename = "1.3")]
    V1_3,
}

impl std::fmt::Display for TlsVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TlsVersion::V1_2 => f.write_str("TLSv1.2"),
            TlsVersion::V1_3 => f.write_str("TLSv1.3"),
        }
    }
}

/// Protocol policy for the TLS context
///
/// Anything older than TLS 1.2 cannot be expressed.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct TlsOptions {
    /// Minimum TLS version
    /// Default: "1.2"
    #[serde(default = "default_min_version")]
    pub min_version: TlsVersion,
    /// Maximum TLS version
    /// Default: "1.3"
    #[serde(default = "default_max_version")]
    pub max_version: TlsVersion,
    /// Application-Layer Protocol Negotiation (ALPN) protocols
    /// Default: empty (no ALPN)
    #[serde(default)]
    pub alpn: Vec<String>,
}

impl Default for TlsOptions {
    fn default() -> Self {
        Self {
            min_version: default_min_version(),
            max_version: default_max_version(),
            alpn: Vec::new(),
        }
    }
}

fn default_min_version() -> TlsVersion {
    TlsVersion::V1_2
}

fn default_max_version() -> TlsVersion {
    TlsVersion::V1_3
}

/// TLS termination configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TlsConfig {
    /// Path to TLS certificate chain file (PEM format)
    pub cert_path: String,
    /// Path to TLS private key file (PEM format)
    pub key_path: String,
    /// Controls TLS versions and ALPN
    #[serde(default)]
    pub options: TlsOptions,
}
