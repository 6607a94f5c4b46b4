use tracing::debug;

use crate::fingerprinting::forwarded;
use crate::proxy::rewrite::OutboundRequest;

/// Outcome of screening a rewritten request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny,
}

/// Inspection point between rewriting and forwarding
///
/// Sees the final headers and the buffered body, so a verdict is based on
/// exactly the bytes the backend would receive.
pub trait RequestScreening: Send + Sync {
    fn screen(&self, request: &OutboundRequest) -> Verdict;
}

impl<F> RequestScreening for F
where
    F: Fn(&OutboundRequest) -> Verdict + Send + Sync,
{
    fn screen(&self, request: &OutboundRequest) -> Verdict {
        self(request)
    }
}

/// Allows everything and records what it saw
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl RequestScreening for PassThrough {
    fn screen(&self, request: &OutboundRequest) -> Verdict {
        let head = &request.head;
        debug!(
            method = %head.method,
            uri = %head.uri,
            request_id = ?head.headers.get(forwarded::REQUEST_ID),
            client_ip = ?head.headers.get(forwarded::FOR),
            headers = head.headers.len(),
            body_bytes = request.body.len(),
            "request inspected"
        );
        Verdict::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::Request;

    fn outbound(body: &'static [u8]) -> OutboundRequest {
        let (head, ()) = Request::new(()).into_parts();
        OutboundRequest { head, body: Bytes::from_static(body) }
    }

    #[test]
    fn pass_through_allows() {
        assert_eq!(PassThrough.screen(&outbound(b"anything")), Verdict::Allow);
    }

    #[test]
    fn closures_can_deny() {
        let no_empty_bodies = |req: &OutboundRequest| {
            if req.body.is_empty() {
                Verdict::Deny
            } else {
                Verdict::Allow
            }
        };
        assert_eq!(no_empty_bodies.screen(&outbound(b"")), Verdict::Deny);
        assert_eq!(no_empty_bodies.screen(&outbound(b"x")), Verdict::Allow);
    }
}
