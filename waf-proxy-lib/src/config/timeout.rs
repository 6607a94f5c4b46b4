use std::time::Duration;

use serde::Deserialize;

/// Timeouts of the inbound side and keep-alive of the backend side
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Seconds open connections get to finish after a shutdown signal
    /// Default: 30
    pub shutdown_secs: u64,
    /// Seconds allowed for reading the ClientHello and completing the TLS
    /// handshake
    /// Default: 15
    pub tls_handshake_secs: u64,
    pub keep_alive: KeepAliveConfig,
}

impl TimeoutConfig {
    pub fn shutdown(&self) -> Duration {
        Duration::from_secs(self.shutdown_secs)
    }

    pub fn tls_handshake(&self) -> Duration {
        Duration::from_secs(self.tls_handshake_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { shutdown_secs: 30, tls_handshake_secs: 15, keep_alive: KeepAliveConfig::default() }
    }
}

/// HTTP/1.1 keep-alive on client connections and TCP keep-alive towards the
/// backend
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct KeepAliveConfig {
    /// Default: true
    pub enabled: bool,
    /// TCP keep-alive interval in seconds
    /// Default: 60
    pub timeout_secs: u64,
}

impl KeepAliveConfig {
    /// TCP keep-alive interval, `None` when keep-alive is disabled
    pub fn tcp_interval(&self) -> Option<Duration> {
        self.enabled.then(|| Duration::from_secs(self.timeout_secs))
    }
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self { enabled: true, timeout_secs: 60 }
    }
}
