#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod fingerprinting;
pub mod proxy;
pub mod telemetry;
pub mod tls;

pub use config::{load_from_path, Config};
pub use error::{ProxyError, Result};
pub use fingerprinting::{
    forwarded, names, FingerprintError, FingerprintFn, FingerprintHeaderInjector, HeaderInjector,
};
pub use proxy::{
    resolve_client_ip, Forwarder, HttpError, KubernetesProbe, OutboundRequest, PassThrough,
    ProbeClassifier, ProxyHandler, ProxyServer, RequestMetadata, RequestRewriter,
    RequestScreening, Verdict,
};
