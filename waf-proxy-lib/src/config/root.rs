use serde::Deserialize;
use std::net::SocketAddr;

use super::backend::BackendPoolConfig;
use super::fingerprinting::FingerprintConfig;
use super::probe::ProbeConfig;
use super::telemetry::{LoggingConfig, TelemetryConfig};
use super::timeout::TimeoutConfig;
use super::tls::TlsConfig;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Address and port to listen on
    /// Example: "0.0.0.0:7000" or "127.0.0.1:8080"
    pub listen: SocketAddr,
    /// Backend URL every request is forwarded to
    /// Only plain `http` backends are supported
    /// Example: "http://127.0.0.1:3000" or "http://webapp:8080/app"
    pub backend: String,
    /// Preserve the original Host header from clients when forwarding to the backend
    /// When true: Backend receives the original Host header (useful for virtual hosting)
    /// When false: Backend receives the backend authority as Host header (default)
    /// Default: false
    #[serde(default)]
    pub preserve_host: bool,
    /// Upper bound for buffering a request body before forwarding
    /// Requests with larger bodies are rejected with 413
    /// Default: 10485760 (10 MiB)
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Health check probe short-circuit
    #[serde(default)]
    pub probe: ProbeConfig,
    /// TLS termination configuration (optional)
    /// If not provided, proxy operates in plain HTTP mode and no TLS fingerprints exist
    /// Default: None
    #[serde(default)]
    pub tls: Option<TlsConfig>,
    /// Fingerprinting configuration
    /// Controls which fingerprint headers are injected and their names
    #[serde(default)]
    pub fingerprint: FingerprintConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Timeout configuration
    #[serde(default)]
    pub timeout: TimeoutConfig,
    /// Backend connection pool configuration
    #[serde(default)]
    pub backend_pool: BackendPoolConfig,
    /// Telemetry configuration
    /// Controls metrics and health endpoints
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}
