//! Websocket event stream.
//!
//! The hub pushes one JSON envelope per text frame on `wss://<hub>:8443/v1`,
//! authenticated with the same bearer token as the REST API. The hub
//! presents a self-signed certificate, so verification can be switched off.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use tokio_tungstenite::Connector;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use url::Url;

use crate::error::HubError;
use crate::transport::EventStream;

/// Open the event stream and expose its text frames.
pub(crate) async fn connect(
    url: &Url,
    bearer: &str,
    accept_invalid_certs: bool,
    timeout: Duration,
) -> Result<EventStream, HubError> {
    tracing::info!(url = %url, "Connecting to hub event stream");

    let uri: tungstenite::http::Uri = url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| HubError::WebSocket(e.to_string()))?;
    let request =
        ClientRequestBuilder::new(uri).with_header("Authorization", format!("Bearer {bearer}"));

    let connector = tls_connector(accept_invalid_certs)?;
    let handshake =
        tokio_tungstenite::connect_async_tls_with_config(request, None, false, connector);
    let (ws_stream, _response) = tokio::time::timeout(timeout, handshake)
        .await
        .map_err(|_| HubError::Unreachable(format!("websocket handshake timed out after {timeout:?}")))??;

    tracing::info!("Hub event stream connected");

    let frames = ws_stream.filter_map(|frame| async move {
        match frame {
            Ok(tungstenite::Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
            Ok(tungstenite::Message::Close(frame)) => {
                if let Some(cf) = frame {
                    tracing::info!(code = %cf.code, reason = %cf.reason, "Hub closed the event stream");
                } else {
                    tracing::info!("Hub closed the event stream");
                }
                None
            }
            // Ping replies are handled by tungstenite; binary frames are not used by the hub.
            Ok(_) => None,
            Err(e) => Some(Err(HubError::WebSocket(e.to_string()))),
        }
    });

    Ok(frames.boxed())
}

/// `None` keeps tungstenite's default (webpki roots) verification.
fn tls_connector(accept_invalid_certs: bool) -> Result<Option<Connector>, HubError> {
    if !accept_invalid_certs {
        return Ok(None);
    }

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| HubError::Tls(e.to_string()))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate { provider }))
        .with_no_client_auth();

    Ok(Some(Connector::Rustls(Arc::new(config))))
}

/// Accepts any server certificate but still checks handshake signatures.
#[derive(Debug)]
struct AcceptAnyCertificate {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyCertificate {
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
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_connector_when_verifying() {
        assert!(tls_connector(false).unwrap().is_none());
    }

    #[test]
    fn test_permissive_connector() {
        let connector = tls_connector(true).unwrap();
        assert!(matches!(connector, Some(Connector::Rustls(_))));
    }
}
