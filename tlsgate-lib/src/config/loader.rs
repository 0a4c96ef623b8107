use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::error::{GateError, Result};

pub fn load_from_path<P: AsRef<Path>>(p: P) -> Result<Config> {
    let txt = fs::read_to_string(p)
        .map_err(|e| GateError::Config(format!("Failed to read config file: {e}")))?;
    load_from_str(&txt)
}

pub fn load_from_str(txt: &str) -> Result<Config> {
    let cfg: Config = toml::from_str(txt)
        .map_err(|e| GateError::Config(format!("Failed to parse config: {e}")))?;

    validate_config(&cfg)?;

    Ok(cfg)
}

fn validate_config(cfg: &Config) -> Result<()> {
    if cfg.host.trim().is_empty() {
        return Err(GateError::Config("host must not be empty".to_string()));
    }

    if cfg.timeout.io_ms == 0 {
        return Err(GateError::Config("timeout.io_ms must be greater than zero".to_string()));
    }
    if cfg.timeout.tls_handshake_ms == 0 {
        return Err(GateError::Config(
            "timeout.tls_handshake_ms must be greater than zero".to_string(),
        ));
    }

    if let Some(tls) = &cfg.tls {
        if tls.cert_path.is_empty() || tls.key_path.is_empty() {
            return Err(GateError::Config(
                "tls.cert_path and tls.key_path are required".to_string(),
            ));
        }
        if tls.options.min_version > tls.options.max_version {
            return Err(GateError::Config(format!(
                "tls.options.min_version ({}) cannot be greater than max_version ({})",
                tls.options.min_version, tls.options.max_version
            )));
        }
        if tls.options.alpn.iter().any(|p| p.is_empty()) {
            return Err(GateError::Config("ALPN protocol names cannot be empty".to_string()));
        }
    }

    Ok(())
}
