mod backend;
mod fingerprinting;
mod loader;
mod probe;
mod root;
mod telemetry;
mod timeout;
mod tls;

pub use backend::{parse_backend, BackendPoolConfig};
pub use fingerprinting::FingerprintConfig;
pub use loader::{load_from_path, load_from_str, parse_header_name};
pub use probe::ProbeConfig;
pub use root::Config;
pub use telemetry::{LoggingConfig, TelemetryConfig};
pub use timeout::{KeepAliveConfig, TimeoutConfig};
pub use tls::TlsConfig;
