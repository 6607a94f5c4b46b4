//! Built-in fingerprint providers and the injector set derived from configuration.

use std::sync::Arc;

use http::Version;
use tracing::info;

use super::injector::{FingerprintError, FingerprintHeaderInjector, HeaderInjector};
use crate::config::Config;
use crate::error::Result;
use crate::proxy::context::RequestMetadata;
use crate::telemetry::Metrics;

type FingerprintResult = std::result::Result<String, FingerprintError>;

/// JA4 fingerprint of the connection's ClientHello
///
/// Plain-text connections have no ClientHello and yield an empty value.
pub fn ja4(metadata: &RequestMetadata) -> FingerprintResult {
    if !metadata.is_https {
        return Ok(String::new());
    }
    metadata
        .ja4
        .as_ref()
        .map(|fp| fp.ja4.clone())
        .ok_or(FingerprintError::Unavailable("JA4"))
}

/// JA4_r fingerprint (original ClientHello order)
pub fn ja4_raw(metadata: &RequestMetadata) -> FingerprintResult {
    if !metadata.is_https {
        return Ok(String::new());
    }
    metadata
        .ja4
        .as_ref()
        .map(|fp| fp.ja4_raw.clone())
        .ok_or(FingerprintError::Unavailable("JA4_r"))
}

/// Akamai HTTP/2 fingerprint
///
/// Only HTTP/2 requests carry one; other versions yield an empty value.
pub fn http2_akamai(metadata: &RequestMetadata) -> FingerprintResult {
    if metadata.version != Version::HTTP_2 {
        return Ok(String::new());
    }
    metadata.http2_fingerprint().ok_or(FingerprintError::Unavailable("HTTP/2"))
}

/// Build the ordered injector set for a configuration
///
/// Injectors are registered even where they can never produce a value (JA4
/// on a plain listener), so client-supplied copies of their headers are
/// always stripped.
pub fn injectors_from_config(
    config: &Config,
    metrics: Option<Arc<Metrics>>,
) -> Result<Vec<Arc<dyn HeaderInjector>>> {
    let fp = &config.fingerprint;
    let mut injectors: Vec<Arc<dyn HeaderInjector>> = Vec::new();

    if fp.tls_enabled {
        injectors.push(Arc::new(
            FingerprintHeaderInjector::new(&fp.ja4_header, ja4)?.with_metrics(metrics.clone()),
        ));
        injectors.push(Arc::new(
            FingerprintHeaderInjector::new(&fp.ja4_raw_header, ja4_raw)?
                .with_metrics(metrics.clone()),
        ));
    }

    if fp.http_enabled {
        injectors.push(Arc::new(
            FingerprintHeaderInjector::new(&fp.http2_header, http2_akamai)?
                .with_metrics(metrics.clone()),
        ));
    }

    let names: Vec<&str> = injectors.iter().map(|i| i.header_name().as_str()).collect();
    info!(?names, "fingerprint injectors configured");

    Ok(injectors)
}
