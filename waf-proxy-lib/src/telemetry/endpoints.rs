use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{Response, StatusCode};
use prometheus::{Encoder, Registry, TextEncoder};
use serde_json::json;

use crate::error::{ProxyError, Result};
use crate::proxy::synthetic_response::{full_body, RespBody};

fn respond(status: StatusCode, content_type: &str, body: Vec<u8>) -> Result<Response<RespBody>> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, content_type)
        .body(full_body(Bytes::from(body)))
        .map_err(|e| ProxyError::Http(format!("Failed to build {status} response: {e}")))
}

fn json_status(status: StatusCode, body: serde_json::Value) -> Result<Response<RespBody>> {
    let bytes = serde_json::to_vec(&body)
        .map_err(|e| ProxyError::Http(format!("Failed to serialize status body: {e}")))?;
    respond(status, "application/json", bytes)
}

/// `/health`: 200 for as long as the process can answer
pub fn health() -> Result<Response<RespBody>> {
    json_status(StatusCode::OK, json!({"status": "healthy"}))
}

/// `/live`
pub fn live() -> Result<Response<RespBody>> {
    json_status(StatusCode::OK, json!({"status": "alive"}))
}

/// `/ready`: 200 while the proxy listener accepts connections, 503 once it
/// stopped (startup or shutdown)
pub fn ready(accepting: bool) -> Result<Response<RespBody>> {
    if accepting {
        return json_status(StatusCode::OK, json!({"status": "ready"}));
    }
    json_status(
        StatusCode::SERVICE_UNAVAILABLE,
        json!({"status": "not_ready", "reason": "listener_not_accepting"}),
    )
}

/// `/metrics`: the registry in the Prometheus text exposition format
pub fn metrics(registry: &Registry) -> Result<Response<RespBody>> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&registry.gather(), &mut buffer)
        .map_err(|e| ProxyError::Telemetry(format!("Failed to encode metrics: {e}")))?;
    respond(StatusCode::OK, encoder.format_type(), buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use prometheus::{IntCounter, Opts};

    type TestResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

    async fn body_of(resp: Response<RespBody>) -> std::result::Result<Bytes, hyper::Error> {
        Ok(resp.into_body().collect().await?.to_bytes())
    }

    #[tokio::test]
    async fn readiness_follows_listener_state() -> TestResult {
        assert_eq!(ready(true)?.status(), StatusCode::OK);

        let resp = ready(false)?;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let value: serde_json::Value = serde_json::from_slice(&body_of(resp).await?)?;
        assert_eq!(value["status"], "not_ready");
        Ok(())
    }

    #[tokio::test]
    async fn metrics_renders_registered_families() -> TestResult {
        let registry = Registry::new();
        let counter = IntCounter::with_opts(Opts::new("waf_test_total", "test counter"))?;
        registry.register(Box::new(counter.clone()))?;
        counter.inc_by(3);

        let resp = metrics(&registry)?;
        assert_eq!(resp.status(), StatusCode::OK);
        let text = String::from_utf8(body_of(resp).await?.to_vec())?;
        assert!(text.contains("waf_test_total 3"), "{text}");
        Ok(())
    }
}
