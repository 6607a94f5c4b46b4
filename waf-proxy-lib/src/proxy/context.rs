use std::net::SocketAddr;

use http::request::Parts;
use http::{Extensions, Version};
use tokio::sync::watch;

use crate::fingerprinting::Ja4Fingerprints;

/// Per-request metadata collected by the connection layer
///
/// Inserted into the request extensions before the request reaches the
/// handler and read by fingerprint providers. Dropped with the request.
#[derive(Debug, Clone)]
pub struct RequestMetadata {
    pub remote_addr: SocketAddr,
    pub version: Version,
    pub is_https: bool,
    /// ALPN protocol negotiated during the TLS handshake
    pub alpn: Option<Vec<u8>>,
    /// JA4 fingerprints of the ClientHello, if it could be parsed
    pub ja4: Option<Ja4Fingerprints>,
    http2_fingerprint: Option<watch::Receiver<Option<String>>>,
}

impl RequestMetadata {
    pub fn new(remote_addr: SocketAddr) -> Self {
        Self {
            remote_addr,
            version: Version::HTTP_11,
            is_https: false,
            alpn: None,
            ja4: None,
            http2_fingerprint: None,
        }
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Mark the request as received over TLS
    pub fn with_tls(mut self, ja4: Option<Ja4Fingerprints>, alpn: Option<Vec<u8>>) -> Self {
        self.is_https = true;
        self.ja4 = ja4;
        self.alpn = alpn;
        self
    }

    pub fn with_http2_fingerprint(mut self, rx: watch::Receiver<Option<String>>) -> Self {
        self.http2_fingerprint = Some(rx);
        self
    }

    /// Current HTTP/2 fingerprint of the connection, if one was extracted
    pub fn http2_fingerprint(&self) -> Option<String> {
        self.http2_fingerprint
            .as_ref()
            .and_then(|rx| rx.borrow().clone())
    }

    pub fn from_extensions(extensions: &Extensions) -> Option<&Self> {
        extensions.get::<Self>()
    }

    pub fn from_parts(head: &Parts) -> Option<&Self> {
        Self::from_extensions(&head.extensions)
    }
}
