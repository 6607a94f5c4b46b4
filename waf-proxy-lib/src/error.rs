use thiserror::Error;

/// Startup and serving errors
///
/// Request-level failures never surface here; they become responses (see
/// [`crate::proxy::HttpError`]) and per-injector failures are
/// [`crate::fingerprinting::FingerprintError`].
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Certificate or key could not be loaded, or rustls refused them
    #[error("TLS error: {0}")]
    Tls(String),

    #[error("No private key found in key file")]
    NoPrivateKey,

    /// Invalid configuration file or value
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid backend URI: {0}")]
    InvalidUri(#[from] http::uri::InvalidUri),

    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    /// Building a locally generated response failed
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Telemetry error: {0}")]
    Telemetry(String),
}

pub type Result<T> = std::result::Result<T, ProxyError>;
