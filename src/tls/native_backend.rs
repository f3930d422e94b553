//! `native-tls`-backed verification context construction, selected by the
//! `tls-native-tls` feature (spec §4.A's native-tls alternative, mirroring
//! `sqlx-core`'s own `_tls-native-tls` feature).

use native_tls::TlsConnector as NativeTlsConnector;

use crate::endpoint::Endpoint;
use crate::error::{Error, Result};

use super::TlsContext;

pub(super) fn build_context(endpoint: &Endpoint) -> Result<TlsContext> {
    let mut builder = native_tls::TlsConnector::builder();

    if !endpoint.verify_peer {
        builder.danger_accept_invalid_certs(true);
        builder.danger_accept_invalid_hostnames(true);
    } else if let Some(ca_pem) = &endpoint.ca_pem {
        let cert = native_tls::Certificate::from_pem(ca_pem.as_bytes())
            .map_err(|e| Error::Handshake(format!("invalid CA material: {e}")))?;
        builder.add_root_certificate(cert);
    }

    let connector: NativeTlsConnector = builder
        .build()
        .map_err(|e| Error::Handshake(format!("could not build TLS connector: {e}")))?;

    Ok(TlsContext::Native(connector))
}

/// Opens a short TLS connection with verification disabled, reads the
/// leaf certificate, and PEM-encodes it (spec §4.A `get_certificate`).
pub(super) async fn fetch_certificate(endpoint: &Endpoint) -> Result<String> {
    let connector = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()
        .map_err(|e| Error::Handshake(format!("could not build TLS connector: {e}")))?;
    let connector = tokio_native_tls::TlsConnector::from(connector);

    let stream = tokio::net::TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await?;
    let tls_stream = connector
        .connect(&endpoint.host, stream)
        .await
        .map_err(|e| Error::Handshake(format!("certificate probe handshake failed: {e}")))?;

    let der = tls_stream
        .get_ref()
        .peer_certificate()
        .map_err(|e| Error::Handshake(format!("could not read peer certificate: {e}")))?
        .ok_or_else(|| Error::Handshake("server presented no certificate".to_string()))?
        .to_der()
        .map_err(|e| Error::Handshake(format!("could not DER-encode peer certificate: {e}")))?;

    Ok(super::pem::encode_certificate(&der))
}
