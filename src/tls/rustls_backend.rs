//! `rustls`-backed verification context construction and bare-handshake
//! certificate retrieval (spec §4.A), selected by the `tls-rustls-*`
//! feature family.

use std::sync::Arc;

use once_cell::sync::Lazy;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::endpoint::Endpoint;
use crate::error::{Error, Result};

use super::TlsContext;

static CRYPTO_PROVIDER: Lazy<()> = Lazy::new(|| {
    let _ = rustls::crypto::ring::default_provider().install_default();
});

fn ensure_crypto_provider() {
    Lazy::force(&CRYPTO_PROVIDER);
}

/// A verifier that accepts any certificate chain, used only when the
/// endpoint has `verify_peer = false` (spec §4.A).
struct NoVerifier(Arc<rustls::crypto::CryptoProvider>);

impl std::fmt::Debug for NoVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoVerifier").finish_non_exhaustive()
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
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
        .map(|_| HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
        .map(|_| HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

fn system_root_store() -> Result<RootCertStore> {
    #[cfg(feature = "rustls-native-certs")]
    {
        let mut store = RootCertStore::empty();
        let result = rustls_native_certs::load_native_certs();
        for err in &result.errors {
            tracing::warn!(%err, "error loading a native root certificate");
        }
        for cert in result.certs {
            let _ = store.add(cert);
        }
        Ok(store)
    }
    #[cfg(not(feature = "rustls-native-certs"))]
    {
        let mut store = RootCertStore::empty();
        store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        Ok(store)
    }
}

fn ca_root_store(ca_pem: &str) -> Result<RootCertStore> {
    let mut store = RootCertStore::empty();
    let mut reader = std::io::BufReader::new(ca_pem.as_bytes());
    for cert in rustls_pemfile::certs(&mut reader) {
        let cert = cert.map_err(|e| Error::Handshake(format!("invalid CA material: {e}")))?;
        store
            .add(cert)
            .map_err(|e| Error::Handshake(format!("invalid CA certificate: {e}")))?;
    }
    Ok(store)
}

pub(super) fn build_context(endpoint: &Endpoint) -> Result<TlsContext> {
    ensure_crypto_provider();

    let provider = rustls::crypto::CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::ring::default_provider()));

    let config = if !endpoint.verify_peer {
        ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerifier(provider)))
            .with_no_client_auth()
    } else if let Some(ca_pem) = &endpoint.ca_pem {
        let store = ca_root_store(ca_pem)?;
        ClientConfig::builder()
            .with_root_certificates(store)
            .with_no_client_auth()
    } else {
        let store = system_root_store()?;
        ClientConfig::builder()
            .with_root_certificates(store)
            .with_no_client_auth()
    };

    Ok(TlsContext::Rustls(Arc::new(config)))
}

/// Opens a short TLS connection with verification disabled, reads the
/// leaf certificate, and PEM-encodes it (spec §4.A `get_certificate`).
pub(super) async fn fetch_certificate(endpoint: &Endpoint) -> Result<String> {
    ensure_crypto_provider();

    let provider = rustls::crypto::CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::ring::default_provider()));

    let config = ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(NoVerifier(provider)))
        .with_no_client_auth();

    let connector = TlsConnector::from(Arc::new(config));
    let server_name = ServerName::try_from(endpoint.host.clone())
        .map_err(|_| Error::Handshake(format!("invalid DNS name: {}", endpoint.host)))?;

    let stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await?;
    let tls_stream = connector
        .connect(server_name, stream)
        .await
        .map_err(|e| Error::Handshake(format!("certificate probe handshake failed: {e}")))?;

    let (_, session) = tls_stream.get_ref();
    let chain = session
        .peer_certificates()
        .ok_or_else(|| Error::Handshake("server presented no certificate".to_string()))?;
    let leaf = chain
        .first()
        .ok_or_else(|| Error::Handshake("server presented an empty certificate chain".to_string()))?;

    Ok(super::pem::encode_certificate(leaf.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_peer_false_builds_a_context() {
        let endpoint = Endpoint::new("localhost", 8076, "user", "pw").with_verify_peer(false);
        let ctx = build_context(&endpoint).unwrap();
        assert!(matches!(ctx, TlsContext::Rustls(_)));
    }
}
