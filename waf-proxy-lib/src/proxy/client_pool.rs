use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::config::{BackendPoolConfig, KeepAliveConfig};

pub type HttpClient = Client<HttpConnector, Full<Bytes>>;

/// Build the shared HTTP/1.1 client used for all backend requests
///
/// Connections are pooled, so the TCP handshake to the backend is paid once
/// per idle connection rather than once per request.
pub fn build_client(keep_alive: &KeepAliveConfig, pool: &BackendPoolConfig) -> HttpClient {
    let mut connector = HttpConnector::new();
    connector.set_keepalive(keep_alive.tcp_interval());

    let mut builder = Client::builder(TokioExecutor::new());
    builder.pool_idle_timeout(Duration::from_secs(pool.idle_timeout));

    if pool.pool_max_idle_per_host > 0 {
        builder.pool_max_idle_per_host(pool.pool_max_idle_per_host);
    }

    builder.build(connector)
}
