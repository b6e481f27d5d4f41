//! TLS helpers shared by the dnstap listener (§4.E), the PowerDNS listener
//! (§4.F), and the dnstap sender (§4.H). Mirrors the original's
//! `dnsutils.TLS_VERSION` map and `TlsClientConfig`/`TlsServerConfig`
//! helpers, built on `rustls` since the teacher does not carry a TLS crate
//! of its own.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore, ServerConfig};

use crate::error::{DcError, DcResult};

/// The minimum TLS protocol versions we accept configuring, matching
/// `dnsutils.TLSVersion` in the original collector.
pub fn validate_version(version: &str) -> DcResult<()> {
    match version {
        "1.2" | "1.3" => Ok(()),
        other => Err(DcError::config(format!(
            "invalid tls min version: {other} (expected \"1.2\" or \"1.3\")"
        ))),
    }
}

fn protocol_versions(min_version: &str) -> &'static [&'static rustls::SupportedProtocolVersion] {
    match min_version {
        "1.3" => &[&rustls::version::TLS13],
        _ => &[&rustls::version::TLS12, &rustls::version::TLS13],
    }
}

fn load_certs(path: &str) -> DcResult<Vec<CertificateDer<'static>>> {
    let file = File::open(path).map_err(|e| DcError::config(format!("open {path}: {e}")))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| DcError::config(format!("parse certificate {path}: {e}")))
}

fn load_key(path: &str) -> DcResult<PrivateKeyDer<'static>> {
    let file = File::open(path).map_err(|e| DcError::config(format!("open {path}: {e}")))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| DcError::config(format!("parse private key {path}: {e}")))?
        .ok_or_else(|| DcError::config(format!("no private key found in {path}")))
}

/// Server-side TLS config for the dnstap/PowerDNS listeners.
pub fn server_config(cert_file: &str, key_file: &str, min_version: &str) -> DcResult<Arc<ServerConfig>> {
    validate_version(min_version)?;
    let certs = load_certs(cert_file)?;
    let key = load_key(key_file)?;
    let config = ServerConfig::builder_with_protocol_versions(protocol_versions(min_version))
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| DcError::config(format!("building server tls config: {e}")))?;
    Ok(Arc::new(config))
}

/// Client-side TLS config for the dnstap sender.
pub fn client_config(
    ca_file: Option<&str>,
    min_version: &str,
    insecure: bool,
) -> DcResult<Arc<ClientConfig>> {
    validate_version(min_version)?;
    let builder = ClientConfig::builder_with_protocol_versions(protocol_versions(min_version));

    if insecure {
        let config = builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerifier))
            .with_no_client_auth();
        return Ok(Arc::new(config));
    }

    let mut roots = RootCertStore::empty();
    if let Some(ca_file) = ca_file {
        for cert in load_certs(ca_file)? {
            roots
                .add(cert)
                .map_err(|e| DcError::config(format!("adding CA cert: {e}")))?;
        }
    } else {
        roots.extend(webpki_roots_or_empty());
    }

    let config = builder.with_root_certificates(roots).with_no_client_auth();
    Ok(Arc::new(config))
}

fn webpki_roots_or_empty() -> Vec<rustls::pki_types::TrustAnchor<'static>> {
    // No bundled root store dependency; operators relying on public CAs
    // should pass `ca_file` explicitly. Kept as a seam rather than a panic.
    Vec::new()
}

#[derive(Debug)]
struct NoVerifier;

impl rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_version() {
        assert!(validate_version("1.1").is_err());
        assert!(validate_version("1.2").is_ok());
        assert!(validate_version("1.3").is_ok());
    }
}
