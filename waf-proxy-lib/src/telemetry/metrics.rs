use opentelemetry::global;
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter, UpDownCounter};
use opentelemetry::KeyValue;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::Registry;
use std::sync::Arc;

pub mod labels {
    pub const ERROR_TYPE: &str = "error_type";
    pub const HEADER: &str = "header";
    pub const KIND: &str = "kind";
    pub const METHOD: &str = "method";
    pub const OUTCOME: &str = "outcome";
    pub const PROTOCOL: &str = "protocol";
    pub const REASON: &str = "reason";
    pub const RUST_VERSION: &str = "rust_version";
    pub const STATUS_CODE: &str = "status_code";
    pub const TIMEOUT_TYPE: &str = "timeout_type";
    pub const VERSION: &str = "version";
}

pub mod values {
    pub const KIND_TLS: &str = "tls";
    pub const KIND_HTTP2: &str = "http2";
    pub const OUTCOME_OK: &str = "ok";
    pub const OUTCOME_MISSING: &str = "missing";
    pub const OUTCOME_ERROR: &str = "error";
    pub const TIMEOUT_TLS_HANDSHAKE: &str = "tls_handshake";
}

/// Instruments of the proxy, all prefixed `waf_`
#[derive(Clone)]
pub struct Metrics {
    pub connections_total: Counter<u64>,
    pub connections_active: UpDownCounter<i64>,

    pub requests_total: Counter<u64>,
    pub requests_duration_seconds: Histogram<f64>,
    pub probe_requests_total: Counter<u64>,
    pub screening_denied_total: Counter<u64>,
    pub backend_errors_total: Counter<u64>,

    // header injection, one series per configured header
    pub fingerprint_duration_seconds: Histogram<f64>,
    pub fingerprint_failures_total: Counter<u64>,
    pub headers_injected_total: Counter<u64>,

    // connection-level extraction, by kind (tls / http2)
    pub connection_fingerprints_total: Counter<u64>,
    pub connection_fingerprint_duration_seconds: Histogram<f64>,

    pub tls_handshakes_total: Counter<u64>,
    pub timeouts_total: Counter<u64>,

    pub build_info: Gauge<u64>,
}

impl Metrics {
    pub(crate) fn new(meter: Meter) -> Self {
        let counter = |name: &'static str, description: &'static str| {
            meter.u64_counter(name).with_description(description).build()
        };
        let histogram = |name: &'static str, description: &'static str| {
            meter.f64_histogram(name).with_description(description).build()
        };

        Self {
            connections_total: counter("waf_connections_total", "Client connections accepted"),
            connections_active: meter
                .i64_up_down_counter("waf_connections_active")
                .with_description("Client connections currently open")
                .build(),

            requests_total: counter("waf_requests_total", "Requests answered, by method, status and protocol"),
            requests_duration_seconds: histogram(
                "waf_requests_duration_seconds",
                "Time from request head to response head",
            ),
            probe_requests_total: counter(
                "waf_probe_requests_total",
                "Health probe requests answered without reaching the backend",
            ),
            screening_denied_total: counter(
                "waf_screening_denied_total",
                "Requests rejected with 403 by the screening gate",
            ),
            backend_errors_total: counter(
                "waf_backend_errors_total",
                "Requests that could not be forwarded to the backend",
            ),

            fingerprint_duration_seconds: histogram(
                "waf_fingerprint_duration_seconds",
                "Time spent computing an injected header value",
            ),
            fingerprint_failures_total: counter(
                "waf_fingerprint_failures_total",
                "Injected headers omitted because the provider failed",
            ),
            headers_injected_total: counter(
                "waf_headers_injected_total",
                "Fingerprint headers written on forwarded requests",
            ),

            connection_fingerprints_total: counter(
                "waf_connection_fingerprints_total",
                "Connection fingerprint extractions, by kind and outcome",
            ),
            connection_fingerprint_duration_seconds: histogram(
                "waf_connection_fingerprint_duration_seconds",
                "Time from connection start to fingerprint extraction",
            ),

            tls_handshakes_total: counter("waf_tls_handshakes_total", "TLS handshakes, by outcome"),
            timeouts_total: counter("waf_timeouts_total", "Timeouts, by type"),

            build_info: meter
                .u64_gauge("waf_build_info")
                .with_description("Build information (version, rust version)")
                .build(),
        }
    }

    pub fn set_build_info(&self) {
        self.build_info.record(
            1,
            &[
                KeyValue::new(labels::VERSION, env!("CARGO_PKG_VERSION")),
                KeyValue::new(labels::RUST_VERSION, env!("CARGO_PKG_RUST_VERSION")),
            ],
        );
    }

    pub fn record_connection(&self) {
        self.connections_total.add(1, &[]);
        self.connections_active.add(1, &[]);
    }

    pub fn record_connection_closed(&self) {
        self.connections_active.add(-1, &[]);
    }

    pub fn record_request(&self, method: &str, status_code: u16, protocol: &str, duration: f64) {
        let attrs = [
            KeyValue::new(labels::METHOD, method.to_string()),
            KeyValue::new(labels::STATUS_CODE, status_code.to_string()),
            KeyValue::new(labels::PROTOCOL, protocol.to_string()),
        ];
        self.requests_total.add(1, &attrs);
        self.requests_duration_seconds.record(duration, &attrs);
    }

    pub fn record_probe(&self) {
        self.probe_requests_total.add(1, &[]);
    }

    pub fn record_screening_denied(&self) {
        self.screening_denied_total.add(1, &[]);
    }

    pub fn record_backend_error(&self, error_type: &'static str) {
        self.backend_errors_total
            .add(1, &[KeyValue::new(labels::ERROR_TYPE, error_type)]);
    }

    pub fn record_fingerprint_duration(&self, header: &str, duration: f64) {
        self.fingerprint_duration_seconds
            .record(duration, &[KeyValue::new(labels::HEADER, header.to_string())]);
    }

    pub fn record_fingerprint_failure(&self, header: &str, reason: &'static str) {
        self.fingerprint_failures_total.add(
            1,
            &[
                KeyValue::new(labels::HEADER, header.to_string()),
                KeyValue::new(labels::REASON, reason),
            ],
        );
    }

    pub fn record_header_injected(&self, header: &str) {
        self.headers_injected_total
            .add(1, &[KeyValue::new(labels::HEADER, header.to_string())]);
    }

    pub fn record_tls_fingerprint(&self, found: bool, duration: f64) {
        self.record_connection_fingerprint(values::KIND_TLS, found, duration);
    }

    /// Only HTTP/2 connections report; HTTP/1.x never carries this fingerprint
    pub fn record_http2_fingerprint(&self, found: bool, duration: f64) {
        self.record_connection_fingerprint(values::KIND_HTTP2, found, duration);
    }

    fn record_connection_fingerprint(&self, kind: &'static str, found: bool, duration: f64) {
        let outcome = if found { values::OUTCOME_OK } else { values::OUTCOME_MISSING };
        self.connection_fingerprints_total.add(
            1,
            &[KeyValue::new(labels::KIND, kind), KeyValue::new(labels::OUTCOME, outcome)],
        );
        if found {
            self.connection_fingerprint_duration_seconds
                .record(duration, &[KeyValue::new(labels::KIND, kind)]);
        }
    }

    pub fn record_tls_handshake(&self) {
        self.tls_handshakes_total
            .add(1, &[KeyValue::new(labels::OUTCOME, values::OUTCOME_OK)]);
    }

    pub fn record_tls_handshake_error(&self) {
        self.tls_handshakes_total
            .add(1, &[KeyValue::new(labels::OUTCOME, values::OUTCOME_ERROR)]);
    }

    pub fn record_timeout(&self, timeout_type: &'static str) {
        self.timeouts_total
            .add(1, &[KeyValue::new(labels::TIMEOUT_TYPE, timeout_type)]);
    }
}

/// Install a global meter provider exporting into a fresh Prometheus registry
pub fn init_metrics() -> Result<(Arc<Metrics>, Registry), Box<dyn std::error::Error + Send + Sync>>
{
    let registry = Registry::default();
    let exporter = opentelemetry_prometheus::exporter()
        .with_registry(registry.clone())
        .build()?;
    global::set_meter_provider(SdkMeterProvider::builder().with_reader(exporter).build());

    let metrics = Arc::new(Metrics::new(global::meter("waf-proxy")));
    metrics.set_build_info();

    Ok((metrics, registry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::metrics::MeterProvider;
    use prometheus::{Encoder, TextEncoder};

    type TestResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

    #[test]
    fn connection_fingerprints_are_labelled_by_kind_and_outcome() -> TestResult {
        let registry = Registry::new();
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()?;
        let provider = SdkMeterProvider::builder().with_reader(exporter).build();
        let metrics = Metrics::new(provider.meter("test"));

        metrics.record_tls_fingerprint(true, 0.001);
        metrics.record_http2_fingerprint(false, 0.002);
        metrics.record_tls_handshake_error();

        let mut text = Vec::new();
        TextEncoder::new().encode(&registry.gather(), &mut text)?;
        let text = String::from_utf8(text)?;

        let series = |kind: &str, outcome: &str| {
            text.lines().any(|l| {
                l.starts_with("waf_connection_fingerprints_total{")
                    && l.contains(&format!("kind=\"{kind}\""))
                    && l.contains(&format!("outcome=\"{outcome}\""))
            })
        };
        assert!(series("tls", "ok"), "{text}");
        assert!(series("http2", "missing"), "{text}");
        assert!(text.lines().any(|l| l.starts_with("waf_tls_handshakes_total{") && l.contains("outcome=\"error\"")));
        Ok(())
    }
}
