use std::fs;
use std::sync::Arc;

use rustls_pki_types::pem::{self, PemObject};
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;

use crate::config::TlsConfig;
use crate::error::{ProxyError, Result};

/// TLS acceptor terminating client connections in front of the fingerprinting
/// pipeline
///
/// rustls defaults (TLS 1.2 and 1.3, no client auth). ALPN advertises the
/// configured protocols in order, an empty list disables ALPN.
pub fn build_rustls(cfg: &TlsConfig) -> Result<TlsAcceptor> {
    let certs = load_certs(&cfg.cert_path)?;
    let key = load_private_key(&cfg.key_path)?;

    let mut server = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ProxyError::Tls(format!("Failed to build TLS config: {e}")))?;
    server.alpn_protocols = cfg.alpn.iter().map(|p| p.as_bytes().to_vec()).collect();

    Ok(TlsAcceptor::from(Arc::new(server)))
}

fn read_pem(path: &str, what: &str) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| ProxyError::Tls(format!("Failed to read {what} {path}: {e}")))
}

/// Certificate chain from a PEM file, leaf first
fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>> {
    let bytes = read_pem(path, "certificate")?;
    let certs = CertificateDer::pem_slice_iter(&bytes)
        .collect::<std::result::Result<Vec<_>, pem::Error>>()
        .map_err(|e| ProxyError::Tls(format!("Failed to parse certificates in {path}: {e}")))?;
    if certs.is_empty() {
        return Err(ProxyError::Tls(format!("No certificate found in {path}")));
    }
    Ok(certs)
}

/// First private key (PKCS#8, PKCS#1 or SEC1) in a PEM file
fn load_private_key(path: &str) -> Result<PrivateKeyDer<'static>> {
    let bytes = read_pem(path, "private key")?;
    match PrivateKeyDer::pem_slice_iter(&bytes).next() {
        Some(Ok(key)) => Ok(key),
        Some(Err(e)) => Err(ProxyError::Tls(format!("Failed to parse private key in {path}: {e}"))),
        None => Err(ProxyError::NoPrivateKey),
    }
}
