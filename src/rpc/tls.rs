//! rustls client configuration for encrypted gateway connections.
//!
//! Certificates are verified against the webpki root bundle plus any
//! configured PEM roots. `skip_verify` replaces verification entirely and
//! exists for gateways running with self-signed certificates.

use std::io::Cursor;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{ring, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tracing::warn;

use crate::config::ClientConfig as JsqlConfig;
use crate::error::{JsqlError, Result};

fn tls_error(message: impl Into<String>) -> JsqlError {
    JsqlError::Tls(message.into())
}

/// Server name used for SNI and certificate verification.
pub fn server_name(host: &str) -> Result<ServerName<'static>> {
    ServerName::try_from(host.to_string())
        .map_err(|e| tls_error(format!("Invalid server name '{host}': {e}")))
}

/// Build the rustls configuration for `config`.
pub fn build_client_config(config: &JsqlConfig) -> Result<ClientConfig> {
    let provider = Arc::new(ring::default_provider());

    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(&[&rustls::version::TLS12, &rustls::version::TLS13])
        .map_err(|e| tls_error(format!("Failed to set TLS versions: {e}")))?;

    if config.skip_verify {
        warn!(host = %config.host, "TLS certificate verification disabled");
        return Ok(builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerifier::new(&provider)))
            .with_no_client_auth());
    }

    let mut root_store = RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    if let Some(pem) = &config.root_cert_pem {
        let mut added = 0;
        for cert in rustls_pemfile::certs(&mut Cursor::new(pem)) {
            let cert = cert.map_err(|e| tls_error(format!("Invalid root certificate PEM: {e}")))?;
            root_store
                .add(cert)
                .map_err(|e| tls_error(format!("Rejected root certificate: {e}")))?;
            added += 1;
        }
        if added == 0 {
            return Err(tls_error("No certificates found in root certificate PEM"));
        }
    }

    Ok(builder
        .with_root_certificates(root_store)
        .with_no_client_auth())
}

/// Accepts any server certificate.
#[derive(Debug)]
struct NoVerifier {
    schemes: Vec<SignatureScheme>,
}

impl NoVerifier {
    fn new(provider: &CryptoProvider) -> Self {
        Self {
            schemes: provider
                .signature_verification_algorithms
                .supported_schemes(),
        }
    }
}

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.schemes.clone()
    }
}
