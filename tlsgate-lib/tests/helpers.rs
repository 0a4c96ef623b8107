//! Shared test helpers for TLS tests
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, ServerName};
use tlsgate_lib::server::RawSession;
use tokio::io::DuplexStream;
use tokio_rustls::rustls::{ClientConfig, RootCertStore, SupportedProtocolVersion};
use tokio_rustls::TlsConnector;

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Generate a temporary file path for testing
pub fn tmp_path(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_nanos();
    std::env::temp_dir().join(format!("tlsgate-test-{nanos}-{name}"))
}

/// Generate valid test certificates using rcgen
/// Returns paths to PEM files containing a self-signed certificate for "localhost"
pub fn create_valid_test_cert() -> TestResult<(PathBuf, PathBuf)> {
    let cert_path = tmp_path("test.crt");
    let key_path = tmp_path("test.key");

    let subject_alt_names = vec!["localhost".to_string()];
    let rcgen::CertifiedKey { cert, signing_key } =
        rcgen::generate_simple_self_signed(subject_alt_names)?;

    fs::write(&cert_path, cert.pem())?;
    fs::write(&key_path, signing_key.serialize_pem())?;

    Ok((cert_path, key_path))
}

/// Certificate from one key pair and private key from another
pub fn create_mismatched_test_cert() -> TestResult<(PathBuf, PathBuf)> {
    let (cert_path, _) = create_valid_test_cert()?;
    let key_path = tmp_path("other.key");

    let other = rcgen::KeyPair::generate()?;
    fs::write(&key_path, other.serialize_pem())?;

    Ok((cert_path, key_path))
}

pub fn cleanup(paths: &[&Path]) {
    for p in paths {
        let _ = fs::remove_file(p);
    }
}

/// Client config that trusts exactly the certificate at `cert_path`
pub fn client_config(
    cert_path: &Path,
    versions: &[&'static SupportedProtocolVersion],
    alpn: &[&[u8]],
) -> TestResult<Arc<ClientConfig>> {
    tlsgate_lib::crypto::init()?;

    let pem = fs::read(cert_path)?;
    let mut roots = RootCertStore::empty();
    for cert in CertificateDer::pem_slice_iter(&pem) {
        roots.add(cert?)?;
    }

    let mut config = ClientConfig::builder_with_protocol_versions(versions)
        .with_root_certificates(roots)
        .with_no_client_auth();
    config.alpn_protocols = alpn.iter().map(|p| p.to_vec()).collect();

    Ok(Arc::new(config))
}

pub fn connector(cert_path: &Path) -> TestResult<TlsConnector> {
    Ok(TlsConnector::from(client_config(cert_path, tokio_rustls::rustls::ALL_VERSIONS, &[])?))
}

pub fn server_name() -> TestResult<ServerName<'static>> {
    Ok(ServerName::try_from("localhost")?)
}

/// In-memory connection: the client end and the raw session for the server
pub fn raw_pair() -> (DuplexStream, RawSession) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    (client, Box::new(server))
}
