use serde::Deserialize;

use crate::fingerprinting::names;

/// Fingerprinting configuration
#[derive(Debug, Deserialize, Clone)]
pub struct FingerprintConfig {
    /// Inject TLS fingerprints (JA4 and JA4_r)
    /// Without `[tls]` the headers are only stripped from incoming requests
    /// Default: true
    #[serde(default = "default_true")]
    pub tls_enabled: bool,
    /// Inject the HTTP/2 fingerprint (Akamai)
    /// Note: Only works for HTTP/2 connections, not HTTP/1.x
    /// Default: true
    #[serde(default = "default_true")]
    pub http_enabled: bool,
    /// Maximum bytes to capture for HTTP/2 fingerprinting
    /// This limits the amount of data buffered for fingerprint extraction
    /// Default: 65536 (64 KB)
    #[serde(default = "default_max_capture")]
    pub max_capture: usize,
    /// Header carrying the JA4 fingerprint
    /// Default: "x-ja4-fingerprint"
    #[serde(default = "default_ja4_header")]
    pub ja4_header: String,
    /// Header carrying the JA4_r fingerprint (original ClientHello order)
    /// Default: "x-ja4-r-fingerprint"
    #[serde(default = "default_ja4_raw_header")]
    pub ja4_raw_header: String,
    /// Header carrying the Akamai HTTP/2 fingerprint
    /// Default: "x-http2-fingerprint"
    #[serde(default = "default_http2_header")]
    pub http2_header: String,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            tls_enabled: default_true(),
            http_enabled: default_true(),
            max_capture: default_max_capture(),
            ja4_header: default_ja4_header(),
            ja4_raw_header: default_ja4_raw_header(),
            http2_header: default_http2_header(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_capture() -> usize {
    64 * 1024 // 64 KB
}

fn default_ja4_header() -> String {
    names::JA4.to_string()
}

fn default_ja4_raw_header() -> String {
    names::JA4_R.to_string()
}

fn default_http2_header() -> String {
    names::HTTP2_AKAMAI.to_string()
}
