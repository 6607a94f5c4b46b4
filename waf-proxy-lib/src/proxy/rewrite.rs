use std::sync::Arc;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONNECTION, HOST, UPGRADE};
use http::request::Parts;
use http::{HeaderMap, Request, Uri, Version};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use tracing::warn;
use uuid::Uuid;

use crate::fingerprinting::{forwarded, HeaderInjector};
use crate::proxy::client_ip::resolve_client_ip;
use crate::proxy::context::RequestMetadata;
use crate::proxy::http_result::{HttpError, HttpResult};
use crate::telemetry::Metrics;

pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Connection-scoped headers that must not be forwarded
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Whether a request asks to switch the connection to WebSocket
///
/// Only HTTP/1.1 can upgrade; the `Connection` header must list `upgrade`.
pub fn wants_websocket_upgrade(version: Version, headers: &HeaderMap) -> bool {
    if version != Version::HTTP_11 {
        return false;
    }
    let websocket = headers
        .get(UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.split(',').any(|p| p.trim().eq_ignore_ascii_case("websocket")));
    websocket && connection_tokens(headers).any(|t| t.eq_ignore_ascii_case("upgrade"))
}

fn connection_tokens(headers: &HeaderMap) -> impl Iterator<Item = &str> {
    headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
}

/// A request rewritten for the backend with its body fully buffered
#[derive(Debug)]
pub struct OutboundRequest {
    pub head: Parts,
    pub body: Bytes,
}

impl OutboundRequest {
    pub fn into_request(self) -> Request<Full<Bytes>> {
        Request::from_parts(self.head, Full::new(self.body))
    }
}

/// Turns an inbound request into the request sent to the backend
///
/// Holds only read-only configuration and is shared by every connection.
pub struct RequestRewriter {
    target: Uri,
    preserve_host: bool,
    injectors: Vec<Arc<dyn HeaderInjector>>,
    max_body_bytes: usize,
    metrics: Option<Arc<Metrics>>,
}

impl RequestRewriter {
    pub fn new(target: Uri, injectors: Vec<Arc<dyn HeaderInjector>>) -> Self {
        Self {
            target,
            preserve_host: false,
            injectors,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            metrics: None,
        }
    }

    pub fn with_preserve_host(mut self, preserve_host: bool) -> Self {
        self.preserve_host = preserve_host;
        self
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn with_metrics(mut self, metrics: Option<Arc<Metrics>>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn target(&self) -> &Uri {
        &self.target
    }

    pub fn injectors(&self) -> &[Arc<dyn HeaderInjector>] {
        &self.injectors
    }

    pub async fn rewrite<B>(
        &self,
        mut head: Parts,
        body: B,
        remote_addr: &str,
    ) -> HttpResult<OutboundRequest>
    where
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let inbound_authority = head.uri.authority().cloned();
        let upgrade = wants_websocket_upgrade(head.version, &head.headers)
            .then(|| head.headers.get(UPGRADE).cloned())
            .flatten();

        remove_hop_by_hop_headers(&mut head.headers);
        if let Some(protocol) = upgrade {
            head.headers.insert(UPGRADE, protocol);
            head.headers.insert(CONNECTION, HeaderValue::from_static("upgrade"));
        }

        head.uri = join_uri(&self.target, &head.uri)?;
        head.version = Version::HTTP_11;

        let request_id = Uuid::new_v4().to_string();
        head.headers
            .insert(forwarded::REQUEST_ID, header_value(&request_id)?);

        let client_ip = resolve_client_ip(&head.headers, remote_addr);
        head.headers.insert(forwarded::FOR, header_value(&client_ip)?);
        set_forwarded_origin(&mut head, inbound_authority.as_ref().map(|a| a.as_str()))?;

        if self.preserve_host {
            // HTTP/2 requests carry the host in :authority only
            if !head.headers.contains_key(HOST) {
                if let Some(authority) = inbound_authority {
                    head.headers.insert(HOST, header_value(authority.as_str())?);
                }
            }
        } else if let Some(authority) = self.target.authority() {
            head.headers.insert(HOST, header_value(authority.as_str())?);
        }

        self.inject_headers(&mut head, remote_addr);

        let body = self.buffer_body(body).await?;

        Ok(OutboundRequest { head, body })
    }

    fn inject_headers(&self, head: &mut Parts, remote_addr: &str) {
        for injector in &self.injectors {
            let name = injector.header_name();
            let value = match injector.header_value(head) {
                Ok(value) if value.is_empty() => None,
                Ok(value) => match HeaderValue::from_str(&value) {
                    Ok(value) => Some(value),
                    Err(e) => {
                        warn!(header = %name, remote_addr, error = %e, "fingerprint is not a valid header value");
                        self.record_failure(name, "invalid_value");
                        None
                    }
                },
                Err(e) => {
                    warn!(header = %name, remote_addr, error = %e, "fingerprint injection failed");
                    self.record_failure(name, e.reason());
                    None
                }
            };

            match value {
                Some(value) => {
                    head.headers.insert(name.clone(), value);
                    if let Some(m) = &self.metrics {
                        m.record_header_injected(name.as_str());
                    }
                }
                // never forward a client-supplied value under an injected name
                None => {
                    head.headers.remove(name);
                }
            }
        }
    }

    fn record_failure(&self, name: &HeaderName, reason: &'static str) {
        if let Some(m) = &self.metrics {
            m.record_fingerprint_failure(name.as_str(), reason);
        }
    }

    async fn buffer_body<B>(&self, body: B) -> HttpResult<Bytes>
    where
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let limit = self.max_body_bytes;
        match Limited::new(body, limit).collect().await {
            Ok(collected) => Ok(collected.to_bytes()),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                Err(HttpError::PayloadTooLarge { limit })
            }
            Err(e) => Err(HttpError::InvalidRequestBody(e.to_string())),
        }
    }
}

fn header_value(value: &str) -> HttpResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| HttpError::FailedToGenerateUpstreamRequest(e.to_string()))
}

/// Set `x-forwarded-host`, `x-forwarded-port` and `x-forwarded-proto`
///
/// Runs before Host is rewritten. Port and scheme are only known from the
/// connection metadata; without it client-supplied copies are dropped.
fn set_forwarded_origin(head: &mut Parts, inbound_authority: Option<&str>) -> HttpResult<()> {
    let host = match head.headers.get(HOST) {
        Some(host) => Some(host.clone()),
        None => inbound_authority.map(header_value).transpose()?,
    };
    match host {
        Some(host) => {
            head.headers.insert(forwarded::HOST, host);
        }
        None => {
            head.headers.remove(forwarded::HOST);
        }
    }

    let origin = RequestMetadata::from_parts(head)
        .map(|m| (m.remote_addr.port(), if m.is_https { "https" } else { "http" }));
    match origin {
        Some((port, proto)) => {
            head.headers.insert(forwarded::PORT, HeaderValue::from(port));
            head.headers.insert(forwarded::PROTO, HeaderValue::from_static(proto));
        }
        None => {
            head.headers.remove(forwarded::PORT);
            head.headers.remove(forwarded::PROTO);
        }
    }
    Ok(())
}

fn remove_hop_by_hop_headers(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = connection_tokens(headers)
        .filter_map(|name| HeaderName::from_bytes(name.as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}

/// Point `inbound` at the backend `target`
///
/// Paths are joined with exactly one slash between them and queries are
/// concatenated with `&`.
pub fn join_uri(target: &Uri, inbound: &Uri) -> HttpResult<Uri> {
    let path = join_path(target.path(), inbound.path());
    let query = match (target.query(), inbound.query()) {
        (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => Some(format!("{a}&{b}")),
        (Some(a), _) if !a.is_empty() => Some(a.to_string()),
        (_, Some(b)) if !b.is_empty() => Some(b.to_string()),
        _ => None,
    };

    let path_and_query = match query {
        Some(query) => format!("{path}?{query}"),
        None => path,
    };

    let mut builder = Uri::builder().path_and_query(path_and_query);
    if let Some(scheme) = target.scheme() {
        builder = builder.scheme(scheme.clone());
    }
    if let Some(authority) = target.authority() {
        builder = builder.authority(authority.clone());
    }
    builder
        .build()
        .map_err(|e| HttpError::FailedToGenerateUpstreamRequest(e.to_string()))
}

fn join_path(a: &str, b: &str) -> String {
    match (a.ends_with('/'), b.starts_with('/')) {
        (true, true) => format!("{a}{}", &b[1..]),
        (false, false) => format!("{a}/{b}"),
        _ => format!("{a}{b}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprinting::FingerprintError;
    use http_body_util::Empty;
    use std::collections::HashSet;

    type TestResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

    struct Fixed {
        name: HeaderName,
        value: std::result::Result<String, FingerprintError>,
    }

    impl Fixed {
        fn new(name: &'static str, value: std::result::Result<&str, FingerprintError>) -> Arc<Self> {
            Arc::new(Self { name: HeaderName::from_static(name), value: value.map(String::from) })
        }
    }

    impl HeaderInjector for Fixed {
        fn header_name(&self) -> &HeaderName {
            &self.name
        }

        fn header_value(&self, _head: &Parts) -> std::result::Result<String, FingerprintError> {
            self.value.clone()
        }
    }

    fn rewriter(target: &'static str, injectors: Vec<Arc<dyn HeaderInjector>>) -> RequestRewriter {
        RequestRewriter::new(Uri::from_static(target), injectors)
    }

    fn head(uri: &str) -> std::result::Result<Parts, http::Error> {
        Ok(Request::builder().uri(uri).body(())?.into_parts().0)
    }

    #[test]
    fn joins_paths_with_single_slash() {
        assert_eq!(join_path("/", "/users"), "/users");
        assert_eq!(join_path("/api", "/users"), "/api/users");
        assert_eq!(join_path("/api/", "/users"), "/api/users");
        assert_eq!(join_path("/api", "users"), "/api/users");
        assert_eq!(join_path("/api", "/"), "/api/");
    }

    #[test]
    fn joins_queries() -> TestResult {
        let target = Uri::from_static("http://backend:8080/base?key=1");
        let uri = join_uri(&target, &Uri::from_static("/x?y=2"))?;
        assert_eq!(uri, "http://backend:8080/base/x?key=1&y=2");

        let target = Uri::from_static("http://backend:8080");
        let uri = join_uri(&target, &Uri::from_static("/x?y=2"))?;
        assert_eq!(uri, "http://backend:8080/x?y=2");

        let uri = join_uri(&target, &Uri::from_static("/plain"))?;
        assert_eq!(uri, "http://backend:8080/plain");
        Ok(())
    }

    #[test]
    fn strips_hop_by_hop_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(CONNECTION, HeaderValue::from_static("close, x-private"));
        headers.insert("x-private", HeaderValue::from_static("1"));
        headers.insert("upgrade", HeaderValue::from_static("websocket"));
        headers.insert("x-kept", HeaderValue::from_static("1"));
        remove_hop_by_hop_headers(&mut headers);
        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key("x-kept"));
    }

    #[tokio::test]
    async fn sets_forwarding_headers_and_target() -> TestResult {
        let rewriter = rewriter("http://backend:8080", Vec::new());
        let mut head = head("/path?q=1")?;
        head.headers.insert(HOST, HeaderValue::from_static("public.example"));
        head.headers
            .insert(forwarded::FOR, HeaderValue::from_static("spoofed, 10.0.0.5"));
        head.headers.insert(forwarded::REQUEST_ID, HeaderValue::from_static("client-id"));

        let out = rewriter.rewrite(head, Empty::<Bytes>::new(), "203.0.113.9:1234").await?;

        assert_eq!(out.head.uri, "http://backend:8080/path?q=1");
        assert_eq!(out.head.headers.get(HOST), Some(&HeaderValue::from_static("backend:8080")));
        assert_eq!(out.head.headers.get(forwarded::FOR), Some(&HeaderValue::from_static("10.0.0.5")));
        let id = out.head.headers.get(forwarded::REQUEST_ID).map(|v| v.to_str()).transpose()?;
        assert_ne!(id, Some("client-id"));
        assert!(Uuid::parse_str(id.unwrap_or_default()).is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn forwarded_origin_comes_from_the_connection() -> TestResult {
        let rewriter = rewriter("http://backend:8080", Vec::new());
        let mut head = head("/")?;
        head.headers.insert(HOST, HeaderValue::from_static("shop.example"));
        head.headers.insert(forwarded::PROTO, HeaderValue::from_static("http"));
        head.headers.insert(forwarded::HOST, HeaderValue::from_static("evil.example"));
        head.headers.insert(forwarded::PORT, HeaderValue::from_static("1"));
        let peer = std::net::SocketAddr::from(([198, 51, 100, 7], 40100));
        head.extensions.insert(RequestMetadata::new(peer).with_tls(None, None));

        let out = rewriter.rewrite(head, Empty::<Bytes>::new(), &peer.to_string()).await?;
        let headers = &out.head.headers;
        assert_eq!(headers.get(forwarded::PROTO), Some(&HeaderValue::from_static("https")));
        assert_eq!(headers.get(forwarded::HOST), Some(&HeaderValue::from_static("shop.example")));
        assert_eq!(headers.get(forwarded::PORT), Some(&HeaderValue::from_static("40100")));
        assert_eq!(headers.get(HOST), Some(&HeaderValue::from_static("backend:8080")));
        Ok(())
    }

    #[tokio::test]
    async fn forwarded_origin_without_metadata_drops_client_values() -> TestResult {
        let rewriter = rewriter("http://backend:8080", Vec::new());
        let mut head = head("https://h2.example/")?;
        head.headers.insert(forwarded::PROTO, HeaderValue::from_static("https"));
        head.headers.insert(forwarded::HOST, HeaderValue::from_static("evil.example"));
        head.headers.insert(forwarded::PORT, HeaderValue::from_static("443"));

        let out = rewriter.rewrite(head, Empty::<Bytes>::new(), "203.0.113.9:1").await?;
        let headers = &out.head.headers;
        assert!(!headers.contains_key(forwarded::PROTO));
        assert!(!headers.contains_key(forwarded::PORT));
        // :authority stands in for the missing Host header
        assert_eq!(headers.get(forwarded::HOST), Some(&HeaderValue::from_static("h2.example")));
        Ok(())
    }

    #[tokio::test]
    async fn keeps_websocket_upgrade_headers() -> TestResult {
        let rewriter = rewriter("http://backend:8080", Vec::new());
        let mut ws = head("/chat")?;
        ws.headers.insert(UPGRADE, HeaderValue::from_static("websocket"));
        ws.headers.insert(CONNECTION, HeaderValue::from_static("keep-alive, Upgrade"));
        ws.headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));

        let out = rewriter.rewrite(ws, Empty::<Bytes>::new(), "127.0.0.1:1").await?;
        assert_eq!(out.head.headers.get(UPGRADE), Some(&HeaderValue::from_static("websocket")));
        assert_eq!(out.head.headers.get(CONNECTION), Some(&HeaderValue::from_static("upgrade")));
        assert!(!out.head.headers.contains_key("keep-alive"));
        assert!(wants_websocket_upgrade(out.head.version, &out.head.headers));

        let mut h2c = head("/")?;
        h2c.headers.insert(UPGRADE, HeaderValue::from_static("h2c"));
        h2c.headers.insert(CONNECTION, HeaderValue::from_static("Upgrade, HTTP2-Settings"));
        let out = rewriter.rewrite(h2c, Empty::<Bytes>::new(), "127.0.0.1:1").await?;
        assert!(!out.head.headers.contains_key(UPGRADE));
        assert!(!out.head.headers.contains_key(CONNECTION));
        Ok(())
    }

    #[test]
    fn websocket_upgrade_needs_http11_and_connection_token() {
        let mut headers = HeaderMap::new();
        headers.insert(UPGRADE, HeaderValue::from_static("WebSocket"));
        assert!(!wants_websocket_upgrade(Version::HTTP_11, &headers));

        headers.insert(CONNECTION, HeaderValue::from_static("upgrade"));
        assert!(wants_websocket_upgrade(Version::HTTP_11, &headers));
        assert!(!wants_websocket_upgrade(Version::HTTP_10, &headers));
        assert!(!wants_websocket_upgrade(Version::HTTP_2, &headers));
    }

    #[tokio::test]
    async fn preserves_inbound_host() -> TestResult {
        let rewriter = rewriter("http://backend:8080", Vec::new()).with_preserve_host(true);
        let mut h1 = head("/")?;
        h1.headers.insert(HOST, HeaderValue::from_static("public.example"));
        let out = rewriter.rewrite(h1, Empty::<Bytes>::new(), "203.0.113.9:1").await?;
        assert_eq!(out.head.headers.get(HOST), Some(&HeaderValue::from_static("public.example")));

        let h2 = head("https://h2.example/")?;
        let out = rewriter.rewrite(h2, Empty::<Bytes>::new(), "203.0.113.9:1").await?;
        assert_eq!(out.head.headers.get(HOST), Some(&HeaderValue::from_static("h2.example")));
        Ok(())
    }

    #[tokio::test]
    async fn request_ids_are_unique() -> TestResult {
        let rewriter = rewriter("http://backend:8080", Vec::new());
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            let out = rewriter.rewrite(head("/")?, Empty::<Bytes>::new(), "127.0.0.1:1").await?;
            let id = out
                .head
                .headers
                .get(forwarded::REQUEST_ID)
                .map(|v| v.to_str().map(String::from))
                .transpose()?
                .unwrap_or_default();
            assert!(!id.is_empty());
            seen.insert(id);
        }
        assert_eq!(seen.len(), 10_000);
        Ok(())
    }

    #[tokio::test]
    async fn injector_failures_drop_only_their_header() -> TestResult {
        let injectors: Vec<Arc<dyn HeaderInjector>> = vec![
            Fixed::new("x-ok", Ok("value")),
            Fixed::new("x-failed", Err(FingerprintError::Unavailable("JA4"))),
            Fixed::new("x-empty", Ok("")),
            Fixed::new("x-invalid", Ok("line\nbreak")),
            Fixed::new("x-after", Ok("still-runs")),
        ];
        let rewriter = rewriter("http://backend:8080", injectors);

        let mut head = head("/")?;
        head.headers.insert("x-failed", HeaderValue::from_static("spoofed"));
        head.headers.insert("x-empty", HeaderValue::from_static("spoofed"));
        head.headers.insert("x-ok", HeaderValue::from_static("spoofed"));

        let out = rewriter.rewrite(head, Empty::<Bytes>::new(), "127.0.0.1:1").await?;
        let headers = &out.head.headers;
        assert_eq!(headers.get("x-ok"), Some(&HeaderValue::from_static("value")));
        assert_eq!(headers.get("x-after"), Some(&HeaderValue::from_static("still-runs")));
        assert!(!headers.contains_key("x-failed"));
        assert!(!headers.contains_key("x-empty"));
        assert!(!headers.contains_key("x-invalid"));
        Ok(())
    }

    #[tokio::test]
    async fn buffers_body_within_limit() -> TestResult {
        let rewriter = rewriter("http://backend:8080", Vec::new()).with_max_body_bytes(8);

        let out = rewriter
            .rewrite(head("/")?, Full::new(Bytes::from_static(b"12345678")), "127.0.0.1:1")
            .await?;
        assert_eq!(out.body, Bytes::from_static(b"12345678"));

        let err = rewriter
            .rewrite(head("/")?, Full::new(Bytes::from_static(b"123456789")), "127.0.0.1:1")
            .await
            .err();
        assert_eq!(err, Some(HttpError::PayloadTooLarge { limit: 8 }));
        Ok(())
    }
}
