pub mod client_ip;
pub mod client_pool;
pub mod context;
pub mod forwarding;
pub mod guards;
pub mod handler;
pub mod http_result;
pub mod probe;
pub mod rewrite;
pub mod screening;
pub mod server;
pub mod stream;
pub mod synthetic_response;

pub use client_ip::resolve_client_ip;
pub use context::RequestMetadata;
pub use forwarding::{Forwarder, HttpForwarder};
pub use handler::ProxyHandler;
pub use http_result::{HttpError, HttpResult};
pub use probe::{KubernetesProbe, ProbeClassifier};
pub use rewrite::{OutboundRequest, RequestRewriter};
pub use screening::{PassThrough, RequestScreening, Verdict};
pub use server::{shutdown_on_signal, ProxyServer};
pub use synthetic_response::RespBody;
