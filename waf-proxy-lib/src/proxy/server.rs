use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use hyper::body::Incoming;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::signal;
use tokio::sync::watch;
use tokio::time::{timeout, Instant};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

use crate::config::{Config, FingerprintConfig, TimeoutConfig};
use crate::error::{ProxyError, Result};
use crate::fingerprinting::{read_client_hello, CapturingStream};
use crate::proxy::context::RequestMetadata;
use crate::proxy::guards::ConnectionGuard;
use crate::proxy::handler::ProxyHandler;
use crate::proxy::stream::PrefixedStream;
use crate::telemetry::metrics::values;
use crate::telemetry::Metrics;
use crate::tls::build_rustls;

/// Accept loop serving HTTP/1.1 and HTTP/2, optionally behind TLS
pub struct ProxyServer {
    handler: Arc<ProxyHandler>,
    tls_acceptor: Option<TlsAcceptor>,
    fingerprint: FingerprintConfig,
    timeout: TimeoutConfig,
    metrics: Option<Arc<Metrics>>,
    accepting: Arc<AtomicBool>,
}

impl ProxyServer {
    pub fn new(config: &Config, handler: Arc<ProxyHandler>) -> Result<Self> {
        let tls_acceptor = match &config.tls {
            Some(t) => Some(build_rustls(t)?),
            None => None,
        };

        Ok(Self {
            handler,
            tls_acceptor,
            fingerprint: config.fingerprint.clone(),
            timeout: config.timeout.clone(),
            metrics: None,
            accepting: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn with_metrics(mut self, metrics: Option<Arc<Metrics>>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Flag that is true while the accept loop runs, for readiness checks
    pub fn accepting(&self) -> Arc<AtomicBool> {
        self.accepting.clone()
    }

    pub async fn run(self, addr: SocketAddr, shutdown: watch::Receiver<bool>) -> Result<()> {
        let listener = TcpListener::bind(addr).await.map_err(ProxyError::Io)?;
        self.serve(listener, shutdown).await
    }

    /// Serve connections from `listener` until `shutdown` changes
    ///
    /// Open connections are asked to finish their in-flight requests and are
    /// given `timeout.shutdown_secs` to do so.
    pub async fn serve(self, listener: TcpListener, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let addr = listener.local_addr().map_err(ProxyError::Io)?;
        let shutdown_timeout = self.timeout.shutdown();
        let server = Arc::new(self);

        let active_connections = Arc::new(AtomicUsize::new(0));
        let (idle_tx, mut idle_rx) = watch::channel(());

        server.accepting.store(true, Ordering::Relaxed);
        info!(
            ?addr,
            tls = server.tls_acceptor.is_some(),
            "starting fingerprinting proxy (h1/h2)"
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("Shutdown requested, no longer accepting connections");
                    break;
                }
                result = listener.accept() => {
                    let (stream, peer) = match result {
                        Ok((stream, peer)) => (stream, peer),
                        Err(e) => {
                            warn!(error = %e, "accept error");
                            continue;
                        }
                    };

                    let guard = ConnectionGuard::new(
                        active_connections.clone(),
                        idle_tx.clone(),
                        server.metrics.clone(),
                    );
                    let server = server.clone();
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        let _guard = guard;
                        server.handle_connection(stream, peer, shutdown).await;
                    });
                }
            }
        }

        server.accepting.store(false, Ordering::Relaxed);
        drop(listener);

        let active = active_connections.load(Ordering::Relaxed);
        if active > 0 {
            info!(
                active_connections = active,
                "Waiting for active connections to finish (timeout: {}s)",
                shutdown_timeout.as_secs()
            );
            let drained = async {
                while active_connections.load(Ordering::Relaxed) > 0 {
                    if idle_rx.changed().await.is_err() {
                        break;
                    }
                }
            };
            if timeout(shutdown_timeout, drained).await.is_err() {
                warn!(
                    active_connections = active_connections.load(Ordering::Relaxed),
                    "Shutdown timeout reached, dropping remaining connections"
                );
            }
        }

        info!("Proxy server stopped");
        Ok(())
    }

    async fn handle_connection(
        &self,
        mut stream: TcpStream,
        peer: SocketAddr,
        shutdown: watch::Receiver<bool>,
    ) {
        let Some(acceptor) = &self.tls_acceptor else {
            self.serve_stream(stream, RequestMetadata::new(peer), shutdown).await;
            return;
        };

        let start = Instant::now();
        let handshake = async {
            let (prefix, ja4) = read_client_hello(&mut stream, self.metrics.as_ref()).await?;
            let tls = acceptor.accept(PrefixedStream::new(prefix, stream)).await?;
            Ok::<_, std::io::Error>((tls, ja4))
        };

        let handshake_timeout = self.timeout.tls_handshake();
        match timeout(handshake_timeout, handshake).await {
            Ok(Ok((tls, ja4))) => {
                let alpn = tls.get_ref().1.alpn_protocol().map(<[u8]>::to_vec);
                debug!(?peer, elapsed = ?start.elapsed(), ja4 = ?ja4.as_ref().map(|f| &f.ja4), "tls handshake complete");
                if let Some(m) = &self.metrics {
                    m.record_tls_handshake();
                }
                let metadata = RequestMetadata::new(peer).with_tls(ja4, alpn);
                self.serve_stream(tls, metadata, shutdown).await;
            }
            Ok(Err(e)) => {
                warn!(?peer, error = %e, "tls accept error");
                if let Some(m) = &self.metrics {
                    m.record_tls_handshake_error();
                }
            }
            Err(_) => {
                warn!(?peer, "tls handshake timeout");
                if let Some(m) = &self.metrics {
                    m.record_timeout(values::TIMEOUT_TLS_HANDSHAKE);
                }
            }
        }
    }

    async fn serve_stream<S>(&self, io: S, metadata: RequestMetadata, shutdown: watch::Receiver<bool>)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        if self.fingerprint.http_enabled {
            let (capturing, fingerprint_rx) =
                CapturingStream::new(io, self.fingerprint.max_capture, self.metrics.clone());
            self.serve_http(capturing, metadata.with_http2_fingerprint(fingerprint_rx), shutdown)
                .await;
        } else {
            self.serve_http(io, metadata, shutdown).await;
        }
    }

    async fn serve_http<S>(&self, io: S, metadata: RequestMetadata, mut shutdown: watch::Receiver<bool>)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let peer = metadata.remote_addr;
        let handler = self.handler.clone();
        let svc = hyper::service::service_fn(move |mut req: Request<Incoming>| {
            let handler = handler.clone();
            let metadata = metadata.clone().with_version(req.version());
            req.extensions_mut().insert(metadata);
            async move { Ok::<_, Infallible>(handler.handle(req, peer).await) }
        });

        let mut builder = ConnBuilder::new(TokioExecutor::new());
        builder.http1().keep_alive(self.timeout.keep_alive.enabled);

        let conn = builder.serve_connection_with_upgrades(TokioIo::new(io), svc);
        tokio::pin!(conn);

        let mut draining = false;
        let result = loop {
            tokio::select! {
                res = conn.as_mut() => break res,
                _ = shutdown.changed(), if !draining => {
                    conn.as_mut().graceful_shutdown();
                    draining = true;
                }
            }
        };

        if let Err(e) = result {
            warn!(?peer, error = %e, "serve_connection error");
        }
    }
}

/// Watch channel flipped to `true` on SIGTERM or SIGINT
pub fn shutdown_on_signal() -> Result<watch::Receiver<bool>> {
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate()).map_err(|e| {
        ProxyError::Io(std::io::Error::other(format!("Failed to setup SIGTERM handler: {e}")))
    })?;
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt()).map_err(|e| {
        ProxyError::Io(std::io::Error::other(format!("Failed to setup SIGINT handler: {e}")))
    })?;

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
            _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown"),
        }
        let _ = tx.send(true);
        // keep the sender alive so receivers do not observe a closed channel
        tx.closed().await;
    });

    Ok(rx)
}
