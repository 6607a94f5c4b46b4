use http::header::USER_AGENT;
use http::request::Parts;
use http::StatusCode;

/// Response written for a recognised probe request
pub const PROBE_STATUS: StatusCode = StatusCode::OK;
pub const PROBE_RESPONSE_BODY: &str = "OK";

/// Decides whether a request is an infrastructure health check
///
/// Probe requests are answered by the proxy and never forwarded.
pub trait ProbeClassifier: Send + Sync {
    fn is_probe(&self, head: &Parts) -> bool;
}

impl<F> ProbeClassifier for F
where
    F: Fn(&Parts) -> bool + Send + Sync,
{
    fn is_probe(&self, head: &Parts) -> bool {
        self(head)
    }
}

/// Matches the kubelet probe client by its User-Agent prefix
///
/// Kubelet sends `kube-probe/<major>.<minor>` for HTTP liveness and
/// readiness probes.
#[derive(Debug, Clone)]
pub struct KubernetesProbe {
    user_agent_prefix: String,
}

impl KubernetesProbe {
    pub const DEFAULT_PREFIX: &'static str = "kube-probe/";

    pub fn new(user_agent_prefix: impl Into<String>) -> Self {
        Self { user_agent_prefix: user_agent_prefix.into() }
    }
}

impl Default for KubernetesProbe {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PREFIX)
    }
}

impl ProbeClassifier for KubernetesProbe {
    fn is_probe(&self, head: &Parts) -> bool {
        head.headers
            .get(USER_AGENT)
            .and_then(|ua| ua.to_str().ok())
            .is_some_and(|ua| ua.starts_with(&self.user_agent_prefix))
    }
}
