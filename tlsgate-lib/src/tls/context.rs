use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_rustls::rustls::crypto::CryptoProvider;
use tokio_rustls::rustls::server::ParsedCertificate;
use tokio_rustls::rustls::sign::CertifiedKey;
use tokio_rustls::rustls::ServerConfig;
use tracing::debug;

use crate::config::{TlsOptions, TlsVersion};
use crate::error::{GateError, Result};
use crate::tls::versions::{allowed_versions, protocol_versions};

/// Certificate chain, private key and protocol policy shared by every handshake
///
/// Immutable once built. Handshake objects hold their own reference to the inner
/// rustls config.
pub struct TlsContext {
    config: Arc<ServerConfig>,
    versions: Vec<TlsVersion>,
    cert_path: PathBuf,
    key_path: PathBuf,
}

impl TlsContext {
    pub fn build(
        provider: Arc<CryptoProvider>,
        cert_path: impl AsRef<Path>,
        key_path: impl AsRef<Path>,
        options: &TlsOptions,
    ) -> Result<Self> {
        let cert_path = cert_path.as_ref();
        let key_path = key_path.as_ref();

        let methods = protocol_versions(options)?;
        let versions = allowed_versions(options)?;
        debug!(?versions, "selected TLS protocol versions");

        let builder = ServerConfig::builder_with_provider(Arc::clone(&provider))
            .with_protocol_versions(&methods)
            .map_err(|e| GateError::ContextAllocationFailed(e.to_string()))?;

        let certs = load_certificates(cert_path)?;
        debug!(path = %cert_path.display(), count = certs.len(), "loaded certificate chain");

        let key = load_private_key(key_path)?;
        check_key_matches(&provider, &certs, &key, key_path)?;
        debug!(path = %key_path.display(), "loaded private key");

        let mut config = builder
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| key_error(key_path, e))?;

        if !options.alpn.is_empty() {
            config.alpn_protocols = options.alpn.iter().map(|s| s.as_bytes().to_vec()).collect();
        }

        Ok(Self {
            config: Arc::new(config),
            versions,
            cert_path: cert_path.to_path_buf(),
            key_path: key_path.to_path_buf(),
        })
    }

    pub fn config(&self) -> &Arc<ServerConfig> {
        &self.config
    }

    pub fn versions(&self) -> &[TlsVersion] {
        &self.versions
    }

    pub fn cert_path(&self) -> &Path {
        &self.cert_path
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }
}

impl std::fmt::Debug for TlsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsContext")
            .field("versions", &self.versions)
            .field("cert_path", &self.cert_path)
            .field("key_path", &self.key_path)
            .finish_non_exhaustive()
    }
}

fn cert_error(path: &Path, reason: impl std::fmt::Display) -> GateError {
    GateError::CertificateLoadFailed { path: path.to_path_buf(), reason: reason.to_string() }
}

fn key_error(path: &Path, reason: impl std::fmt::Display) -> GateError {
    GateError::PrivateKeyLoadFailed { path: path.to_path_buf(), reason: reason.to_string() }
}

fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let bytes = std::fs::read(path).map_err(|e| cert_error(path, e))?;

    let certs = CertificateDer::pem_slice_iter(&bytes)
        .collect::<std::result::Result<Vec<_>, rustls_pki_types::pem::Error>>()
        .map_err(|e| cert_error(path, format!("invalid PEM: {e}")))?;

    let leaf = certs.first().ok_or_else(|| cert_error(path, "no certificates found"))?;
    ParsedCertificate::try_from(leaf)
        .map_err(|e| cert_error(path, format!("invalid certificate: {e}")))?;

    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let bytes = std::fs::read(path).map_err(|e| key_error(path, e))?;

    let mut keys: Vec<PrivateKeyDer<'static>> = PrivateKeyDer::pem_slice_iter(&bytes)
        .collect::<std::result::Result<Vec<_>, rustls_pki_types::pem::Error>>()
        .map_err(|e| key_error(path, format!("invalid PEM: {e}")))?;

    keys.pop().ok_or_else(|| {
        key_error(path, "no private key found - make sure it is in PKCS#1, PKCS#8 or SEC1 PEM format")
    })
}

/// The leaf certificate's public key must belong to `key`
fn check_key_matches(
    provider: &CryptoProvider,
    certs: &[CertificateDer<'static>],
    key: &PrivateKeyDer<'static>,
    key_path: &Path,
) -> Result<()> {
    let signing_key = provider
        .key_provider
        .load_private_key(key.clone_key())
        .map_err(|e| key_error(key_path, format!("unsupported private key: {e}")))?;

    CertifiedKey::new(certs.to_vec(), signing_key)
        .keys_match()
        .map_err(|e| key_error(key_path, format!("private key does not match certificate: {e}")))
}
