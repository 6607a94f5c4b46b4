use std::net::SocketAddr;
use std::sync::Arc;

use http::{Request, Response, StatusCode};
use hyper::body::Body;
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{parse_backend, Config};
use crate::error::Result;
use crate::fingerprinting::injectors_from_config;
use crate::proxy::forwarding::{Forwarder, HttpForwarder};
use crate::proxy::http_result::{HttpError, HttpResult};
use crate::proxy::probe::{KubernetesProbe, ProbeClassifier, PROBE_RESPONSE_BODY, PROBE_STATUS};
use crate::proxy::rewrite::{wants_websocket_upgrade, RequestRewriter};
use crate::proxy::screening::{PassThrough, RequestScreening, Verdict};
use crate::proxy::synthetic_response::{synthetic_error_response, synthetic_response, RespBody};
use crate::telemetry::Metrics;

/// Per-request entry point
///
/// Answers probes locally, otherwise rewrites, screens and forwards. Every
/// outcome becomes a response; nothing here fails the connection.
pub struct ProxyHandler {
    probe: Option<Arc<dyn ProbeClassifier>>,
    rewriter: RequestRewriter,
    screening: Arc<dyn RequestScreening>,
    forwarder: Arc<dyn Forwarder>,
    metrics: Option<Arc<Metrics>>,
}

impl ProxyHandler {
    pub fn new(rewriter: RequestRewriter, forwarder: Arc<dyn Forwarder>) -> Self {
        Self {
            probe: None,
            rewriter,
            screening: Arc::new(PassThrough),
            forwarder,
            metrics: None,
        }
    }

    /// Build the handler described by a configuration, forwarding over HTTP
    pub fn from_config(config: &Config, metrics: Option<Arc<Metrics>>) -> Result<Self> {
        let target = parse_backend(&config.backend)?;
        let injectors = injectors_from_config(config, metrics.clone())?;

        let rewriter = RequestRewriter::new(target, injectors)
            .with_preserve_host(config.preserve_host)
            .with_max_body_bytes(config.max_body_bytes)
            .with_metrics(metrics.clone());

        let forwarder = HttpForwarder::new(&config.timeout.keep_alive, &config.backend_pool);

        let probe: Option<Arc<dyn ProbeClassifier>> = config
            .probe
            .enabled
            .then(|| Arc::new(KubernetesProbe::new(&config.probe.user_agent_prefix)) as _);

        info!(
            backend = %rewriter.target(),
            preserve_host = config.preserve_host,
            max_body_bytes = config.max_body_bytes,
            probe = config.probe.enabled,
            "proxy handler configured"
        );

        Ok(Self::new(rewriter, Arc::new(forwarder))
            .with_probe(probe)
            .with_metrics(metrics))
    }

    pub fn with_probe(mut self, probe: Option<Arc<dyn ProbeClassifier>>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_screening(mut self, screening: Arc<dyn RequestScreening>) -> Self {
        self.screening = screening;
        self
    }

    pub fn with_metrics(mut self, metrics: Option<Arc<Metrics>>) -> Self {
        self.metrics = metrics;
        self
    }

    pub async fn handle<B>(&self, req: Request<B>, remote_addr: SocketAddr) -> Response<RespBody>
    where
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let start = Instant::now();
        let method = req.method().to_string();
        let protocol = format!("{:?}", req.version());

        let response = match self.dispatch(req, remote_addr).await {
            Ok(resp) => resp,
            Err(e) => {
                debug!(%remote_addr, error = %e, "request failed");
                if let Some(m) = &self.metrics {
                    match &e {
                        HttpError::Forbidden => m.record_screening_denied(),
                        HttpError::BackendUnavailable(_) => m.record_backend_error(e.error_type()),
                        _ => {}
                    }
                }
                synthetic_error_response(StatusCode::from(e))
            }
        };

        if let Some(m) = &self.metrics {
            m.record_request(
                &method,
                response.status().as_u16(),
                &protocol,
                start.elapsed().as_secs_f64(),
            );
        }

        response
    }

    async fn dispatch<B>(&self, mut req: Request<B>, remote_addr: SocketAddr) -> HttpResult<Response<RespBody>>
    where
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let client_upgrade = wants_websocket_upgrade(req.version(), req.headers())
            .then(|| hyper::upgrade::on(&mut req));
        let (head, body) = req.into_parts();

        if let Some(probe) = &self.probe {
            if probe.is_probe(&head) {
                debug!(%remote_addr, uri = %head.uri, "probe request answered locally");
                if let Some(m) = &self.metrics {
                    m.record_probe();
                }
                return Ok(synthetic_response(PROBE_STATUS, PROBE_RESPONSE_BODY));
            }
        }

        let outbound = self
            .rewriter
            .rewrite(head, body, &remote_addr.to_string())
            .await?;

        if self.screening.screen(&outbound) == Verdict::Deny {
            warn!(%remote_addr, uri = %outbound.head.uri, "request denied by screening");
            return Err(HttpError::Forbidden);
        }

        let mut response = self.forwarder.forward(outbound.into_request()).await?;

        if let Some(client) = client_upgrade {
            if response.status() == StatusCode::SWITCHING_PROTOCOLS {
                let backend = hyper::upgrade::on(&mut response);
                tokio::spawn(tunnel(client, backend, remote_addr));
            }
        }

        Ok(response)
    }
}

/// Splice an upgraded client connection to the upgraded backend connection
async fn tunnel(client: OnUpgrade, backend: OnUpgrade, remote_addr: SocketAddr) {
    let (client, backend) = match tokio::try_join!(client, backend) {
        Ok(pair) => pair,
        Err(e) => {
            warn!(%remote_addr, error = %e, "websocket upgrade failed");
            return;
        }
    };
    debug!(%remote_addr, "websocket tunnel open");

    let mut client = TokioIo::new(client);
    let mut backend = TokioIo::new(backend);
    match tokio::io::copy_bidirectional(&mut client, &mut backend).await {
        Ok((to_backend, to_client)) => {
            debug!(%remote_addr, to_backend, to_client, "websocket tunnel closed");
        }
        Err(e) => debug!(%remote_addr, error = %e, "websocket tunnel closed with error"),
    }
}
