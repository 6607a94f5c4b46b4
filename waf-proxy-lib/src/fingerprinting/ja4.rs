use huginn_net_tls::Ja4Payload;

/// JA4 fingerprint data extracted from TLS ClientHello
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ja4Fingerprints {
    /// JA4 with sorted cipher suites and extensions
    pub ja4: String,
    /// JA4_r, original ClientHello order
    pub ja4_raw: String,
}

impl Ja4Fingerprints {
    pub fn new(ja4: impl Into<String>, ja4_raw: impl Into<String>) -> Self {
        Self { ja4: ja4.into(), ja4_raw: ja4_raw.into() }
    }

    pub fn from_payloads(ja4: &Ja4Payload, ja4_raw: &Ja4Payload) -> Self {
        Self::new(ja4.full.to_string(), ja4_raw.full.to_string())
    }
}
