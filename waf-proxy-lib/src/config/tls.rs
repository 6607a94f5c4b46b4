use serde::Deserialize;

/// TLS termination, needed for the JA4 fingerprints
///
/// Both files are PEM and are checked for existence when the configuration
/// is loaded.
#[derive(Debug, Deserialize, Clone)]
pub struct TlsConfig {
    pub cert_path: String,
    pub key_path: String,
    /// ALPN protocols offered to clients, in preference order
    /// Default: ["h2", "http/1.1"]
    #[serde(default = "default_alpn")]
    pub alpn: Vec<String>,
}

fn default_alpn() -> Vec<String> {
    ["h2", "http/1.1"].map(String::from).to_vec()
}
