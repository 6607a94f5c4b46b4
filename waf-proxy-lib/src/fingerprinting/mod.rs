pub mod headers;
pub mod http2_extractor;
pub mod injector;
pub mod ja4;
pub mod providers;
pub mod tls_extractor;

pub use headers::{forwarded, names};
pub use http2_extractor::CapturingStream;
pub use injector::{FingerprintError, FingerprintFn, FingerprintHeaderInjector, HeaderInjector};
pub use ja4::Ja4Fingerprints;
pub use providers::injectors_from_config;
pub use tls_extractor::read_client_hello;
