use crate::proxy::synthetic_response::{synthetic_response, RespBody};
use crate::telemetry::endpoints;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use prometheus::Registry;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

/// Start the observability server on a dedicated port
///
/// Serves:
/// - `/metrics` - Prometheus metrics
/// - `/health` - Health check endpoint
/// - `/ready` - Readiness check endpoint
/// - `/live` - Liveness check endpoint
pub async fn start_observability_server(
    port: u16,
    registry: Registry,
    accepting: Arc<AtomicBool>,
    shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    serve_observability(listener, registry, accepting, shutdown).await
}

pub async fn serve_observability(
    listener: TcpListener,
    registry: Registry,
    accepting: Arc<AtomicBool>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let registry = Arc::new(registry);
    info!(addr = ?listener.local_addr()?, "Observability server started (metrics + health checks)");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                info!("Observability server: shutting down");
                break;
            }
            result = listener.accept() => {
                let (stream, peer) = match result {
                    Ok((stream, peer)) => (stream, peer),
                    Err(e) => {
                        warn!(error = %e, "Observability server: accept error");
                        continue;
                    }
                };

                let registry = registry.clone();
                let accepting = accepting.clone();
                tokio::spawn(async move {
                    let svc = hyper::service::service_fn(move |req: Request<Incoming>| {
                        let resp = route(req.uri().path(), &registry, &accepting);
                        async move { Ok::<_, hyper::Error>(resp) }
                    });

                    let builder = ConnBuilder::new(TokioExecutor::new());
                    if let Err(e) = builder.serve_connection(TokioIo::new(stream), svc).await {
                        warn!(?peer, error = %e, "Observability server: serve_connection error");
                    }
                });
            }
        }
    }

    info!("Observability server stopped");
    Ok(())
}

fn route(path: &str, registry: &Registry, accepting: &AtomicBool) -> Response<RespBody> {
    let result = match path {
        "/health" => endpoints::health(),
        "/ready" => endpoints::ready(accepting.load(Ordering::Relaxed)),
        "/live" => endpoints::live(),
        "/metrics" => endpoints::metrics(registry),
        _ => return synthetic_response(StatusCode::NOT_FOUND, "Not Found"),
    };

    result.unwrap_or_else(|e| {
        warn!(path, error = %e, "Observability server: failed to build response");
        synthetic_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
    })
}
