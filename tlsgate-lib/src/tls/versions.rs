use tokio_rustls::rustls::{self, SupportedProtocolVersion};

use crate::config::{TlsOptions, TlsVersion};
use crate::error::{GateError, Result};

const ALL_VERSIONS: [TlsVersion; 2] = [TlsVersion::V1_2, TlsVersion::V1_3];

fn rustls_version(version: TlsVersion) -> &'static SupportedProtocolVersion {
    match version {
        TlsVersion::V1_2 => &rustls::version::TLS12,
        TlsVersion::V1_3 => &rustls::version::TLS13,
    }
}

/// Protocol versions allowed by the policy, oldest first
pub fn allowed_versions(options: &TlsOptions) -> Result<Vec<TlsVersion>> {
    if options.min_version > options.max_version {
        return Err(GateError::MethodUnavailable(format!(
            "min_version ({}) is greater than max_version ({})",
            options.min_version, options.max_version
        )));
    }

    Ok(ALL_VERSIONS
        .into_iter()
        .filter(|v| *v >= options.min_version && *v <= options.max_version)
        .collect())
}

/// The rustls protocol method for a policy
pub fn protocol_versions(options: &TlsOptions) -> Result<Vec<&'static SupportedProtocolVersion>> {
    let versions: Vec<_> = allowed_versions(options)?
        .into_iter()
        .map(rustls_version)
        .collect();

    if versions.is_empty() {
        return Err(GateError::MethodUnavailable("no TLS version allowed".to_string()));
    }

    Ok(versions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_tls12_and_tls13() -> Result<()> {
        let versions = allowed_versions(&TlsOptions::default())?;
        assert_eq!(versions, vec![TlsVersion::V1_2, TlsVersion::V1_3]);
        assert_eq!(protocol_versions(&TlsOptions::default())?.len(), 2);
        Ok(())
    }

    #[test]
    fn tls13_only() -> Result<()> {
        let options = TlsOptions { min_version: TlsVersion::V1_3, ..Default::default() };
        let versions = protocol_versions(&options)?;
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].version, rustls::ProtocolVersion::TLSv1_3);
        Ok(())
    }

    #[test]
    fn inverted_range_is_rejected() {
        let options = TlsOptions {
            min_version: TlsVersion::V1_3,
            max_version: TlsVersion::V1_2,
            ..Default::default()
        };
        assert!(matches!(protocol_versions(&options), Err(GateError::MethodUnavailable(_))));
    }
}
