//! TLS client configuration for Bambu Lab printers.
//!
//! # Why no certificate check? (for beginners)
//!
//! A Bambu printer in LAN mode presents a certificate signed by Bambu's own
//! private CA, issued for the printer's serial number rather than its IP
//! address.  No public root store trusts it and the name never matches, so
//! ordinary verification always fails.  The LAN access code is what
//! authenticates the session.
//!
//! The verifier below accepts any server certificate.  It is built only by
//! [`insecure_client_config`] and handed only to the Bambu MQTT and FTPS
//! connections; every other TLS connection in PrintLink (reqwest) keeps the
//! default verification.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::ring;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};

use crate::application::adapter::AdapterError;

#[derive(Debug)]
struct AcceptAnyServerCert {
    schemes: Vec<SignatureScheme>,
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.schemes.clone()
    }
}

/// Builds the Bambu-only client config that skips certificate verification.
///
/// The `ring` provider is named explicitly so the result does not depend on
/// which process-wide default provider other crates happen to install.
///
/// # Errors
///
/// [`AdapterError::Tls`] if the provider rejects the default protocol
/// versions.
pub fn insecure_client_config() -> Result<Arc<ClientConfig>, AdapterError> {
    let provider = Arc::new(ring::default_provider());
    let schemes = provider
        .signature_verification_algorithms
        .supported_schemes();

    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert { schemes }))
        .with_no_client_auth();
    Ok(Arc::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builds_and_accepts_any_certificate() {
        // Arrange
        let verifier = AcceptAnyServerCert {
            schemes: vec![SignatureScheme::ECDSA_NISTP256_SHA256],
        };
        let cert = CertificateDer::from(vec![0u8; 4]);
        let name = ServerName::try_from("192.168.1.77").unwrap();

        // Act
        let verdict = verifier.verify_server_cert(&cert, &[], &name, &[], UnixTime::now());

        // Assert
        assert!(verdict.is_ok());
        assert!(insecure_client_config().is_ok());
    }

    #[test]
    fn test_advertises_provider_signature_schemes() {
        let provider = ring::default_provider();
        let expected = provider.signature_verification_algorithms.supported_schemes();

        let verifier = AcceptAnyServerCert {
            schemes: expected.clone(),
        };

        assert!(!expected.is_empty());
        assert_eq!(verifier.supported_verify_schemes(), expected);
    }
}
