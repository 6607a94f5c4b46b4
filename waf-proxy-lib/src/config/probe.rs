use serde::Deserialize;

/// Health check probe configuration
///
/// Requests recognised as infrastructure probes are answered by the proxy
/// itself with `200 OK` and never reach the backend.
#[derive(Debug, Deserialize, Clone)]
pub struct ProbeConfig {
    /// Answer probe requests locally
    /// Default: true
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// User-Agent prefix identifying a probe request
    /// Default: "kube-probe/" (kubelet liveness/readiness probes)
    #[serde(default = "default_user_agent_prefix")]
    pub user_agent_prefix: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self { enabled: true, user_agent_prefix: default_user_agent_prefix() }
    }
}

fn default_true() -> bool {
    true
}

fn default_user_agent_prefix() -> String {
    "kube-probe/".to_string()
}
