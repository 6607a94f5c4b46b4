#![forbid(unsafe_code)]

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use waf_proxy_lib::config::load_from_path;
use waf_proxy_lib::proxy::{shutdown_on_signal, ProxyHandler, ProxyServer};
use waf_proxy_lib::telemetry::{init_metrics, init_tracing, start_observability_server};

#[derive(Parser, Debug)]
#[command(author, version, about = "Fingerprint-injecting reverse proxy")]
struct Cli {
    /// Path to configuration TOML file
    #[arg(short, long, value_name = "FILE", env = "WAF_CONFIG", default_value = "waf.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = match load_from_path(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("failed to load configuration from {}: {err}", cli.config.display());
            std::process::exit(1);
        }
    };

    if let Err(err) = init_tracing(&config.logging, &config.telemetry) {
        eprintln!("failed to initialize tracing: {err}");
        std::process::exit(1);
    }

    info!(
        listen = %config.listen,
        backend = %config.backend,
        tls = config.tls.is_some(),
        metrics_port = ?config.telemetry.metrics_port,
        "configuration loaded"
    );

    let shutdown = match shutdown_on_signal() {
        Ok(rx) => rx,
        Err(err) => {
            error!(%err, "failed to install signal handlers");
            std::process::exit(1);
        }
    };

    let (metrics, registry) = match config.telemetry.metrics_port {
        Some(_) => match init_metrics() {
            Ok((metrics, registry)) => (Some(metrics), Some(registry)),
            Err(err) => {
                warn!(%err, "metrics disabled: initialization failed");
                (None, None)
            }
        },
        None => (None, None),
    };

    let handler = match ProxyHandler::from_config(&config, metrics.clone()) {
        Ok(h) => Arc::new(h),
        Err(err) => {
            error!(%err, "failed to build proxy handler");
            std::process::exit(1);
        }
    };

    let server = match ProxyServer::new(&config, handler) {
        Ok(s) => s.with_metrics(metrics),
        Err(err) => {
            error!(%err, "failed to build proxy server");
            std::process::exit(1);
        }
    };

    if let (Some(port), Some(registry)) = (config.telemetry.metrics_port, registry) {
        let accepting = server.accepting();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(err) = start_observability_server(port, registry, accepting, shutdown).await
            {
                error!(%err, "observability server exited with error");
            }
        });
    }

    if let Err(err) = server.run(config.listen, shutdown).await {
        error!(%err, "proxy exited with error");
        std::process::exit(1);
    }
}
