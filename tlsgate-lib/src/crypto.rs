use std::sync::{Arc, OnceLock};
use tokio_rustls::rustls::crypto::{aws_lc_rs, CryptoProvider};
use tracing::debug;

use crate::error::{GateError, Result};

static PROVIDER: OnceLock<Arc<CryptoProvider>> = OnceLock::new();

/// Initialize the crypto engine used for every TLS context
///
/// Idempotent and safe to call from several threads. The first call installs the
/// aws-lc-rs provider as the process default unless another one is already installed,
/// in which case that provider is adopted.
pub fn init() -> Result<Arc<CryptoProvider>> {
    if let Some(provider) = PROVIDER.get() {
        return Ok(Arc::clone(provider));
    }

    // Err here only means a default was installed first; it is picked up below.
    if aws_lc_rs::default_provider().install_default().is_ok() {
        debug!("installed aws-lc-rs as the default crypto provider");
    }

    let provider = CryptoProvider::get_default()
        .cloned()
        .ok_or_else(|| GateError::CryptoInit("no default crypto provider available".to_string()))?;
    validate_provider(&provider)?;

    Ok(Arc::clone(PROVIDER.get_or_init(|| provider)))
}

fn validate_provider(provider: &CryptoProvider) -> Result<()> {
    if provider.cipher_suites.is_empty() {
        return Err(GateError::CryptoInit("crypto provider offers no cipher suites".to_string()));
    }
    if provider.kx_groups.is_empty() {
        return Err(GateError::CryptoInit(
            "crypto provider offers no key exchange groups".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn init_is_idempotent() -> Result<()> {
        let first = init()?;
        let second = init()?;
        assert!(Arc::ptr_eq(&first, &second));
        Ok(())
    }

    #[test]
    fn init_is_safe_from_many_threads() {
        let handles: Vec<_> = (0..8).map(|_| thread::spawn(init)).collect();
        let providers: Vec<_> = handles
            .into_iter()
            .map(|h| {
                h.join()
                    .unwrap_or_else(|_| panic!("init thread panicked"))
                    .unwrap_or_else(|e| panic!("init failed: {e}"))
            })
            .collect();

        for p in &providers[1..] {
            assert!(Arc::ptr_eq(&providers[0], p));
        }
    }

    #[test]
    fn provider_without_suites_is_rejected() {
        let mut provider = aws_lc_rs::default_provider();
        provider.cipher_suites.clear();
        let err = validate_provider(&provider).err();
        assert!(matches!(err, Some(GateError::CryptoInit(_))));
    }
}
