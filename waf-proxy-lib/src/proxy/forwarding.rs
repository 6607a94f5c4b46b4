use async_trait::async_trait;
use bytes::Bytes;
use http::uri::PathAndQuery;
use http::{Request, Response, Uri};
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::{BackendPoolConfig, KeepAliveConfig};
use crate::proxy::client_pool::{build_client, HttpClient};
use crate::proxy::http_result::{HttpError, HttpResult};
use crate::proxy::rewrite::wants_websocket_upgrade;
use crate::proxy::synthetic_response::RespBody;

/// Sends a rewritten request to the backend and returns its response
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(&self, req: Request<Full<Bytes>>) -> HttpResult<Response<RespBody>>;
}

/// Forwards over a pooled hyper client
///
/// The response body is streamed back to the client without buffering.
/// WebSocket upgrades get a dedicated backend connection that can be
/// taken over once the backend answers 101.
pub struct HttpForwarder {
    client: HttpClient,
}

impl HttpForwarder {
    pub fn new(keep_alive: &KeepAliveConfig, pool: &BackendPoolConfig) -> Self {
        Self { client: build_client(keep_alive, pool) }
    }

    async fn forward_upgrade(&self, mut req: Request<Full<Bytes>>) -> HttpResult<Response<RespBody>> {
        let uri = req.uri().clone();
        let authority = uri.authority().ok_or_else(|| {
            HttpError::FailedToGenerateUpstreamRequest(format!("backend URI has no authority: {uri}"))
        })?;
        let addr = format!("{}:{}", authority.host(), authority.port_u16().unwrap_or(80));

        // a single connection speaks origin-form
        let origin = uri.path_and_query().cloned().unwrap_or_else(|| PathAndQuery::from_static("/"));
        *req.uri_mut() = Uri::from(origin);

        let stream = TcpStream::connect(&addr).await.map_err(|e| {
            warn!(%uri, error = %e, "backend connect failed");
            HttpError::BackendUnavailable(e.to_string())
        })?;
        let (mut sender, conn) = http1::handshake(TokioIo::new(stream)).await.map_err(|e| {
            warn!(%uri, error = %e, "backend handshake failed");
            HttpError::BackendUnavailable(e.to_string())
        })?;
        tokio::spawn(async move {
            if let Err(e) = conn.with_upgrades().await {
                debug!(error = %e, "upgrade connection to backend closed with error");
            }
        });

        let resp = sender.send_request(req).await.map_err(|e| {
            warn!(%uri, error = %e, "backend upgrade request failed");
            HttpError::BackendUnavailable(e.to_string())
        })?;
        debug!(%uri, status = resp.status().as_u16(), "backend answered upgrade request");
        Ok(resp.map(|b| b.boxed()))
    }
}

#[async_trait]
impl Forwarder for HttpForwarder {
    async fn forward(&self, req: Request<Full<Bytes>>) -> HttpResult<Response<RespBody>> {
        if wants_websocket_upgrade(req.version(), req.headers()) {
            return self.forward_upgrade(req).await;
        }

        let start = Instant::now();
        let uri = req.uri().clone();

        match self.client.request(req).await {
            Ok(resp) => {
                debug!(%uri, status = resp.status().as_u16(), elapsed = ?start.elapsed(), "backend responded");
                Ok(resp.map(|b| b.boxed()))
            }
            Err(e) => {
                warn!(%uri, error = %e, "backend request failed");
                Err(HttpError::BackendUnavailable(e.to_string()))
            }
        }
    }
}
