use http::Uri;
use serde::Deserialize;

use crate::error::{ProxyError, Result};

/// Parse the `backend` setting into the target URI
///
/// The backend must be an absolute `http` URL with a host. Its path and
/// query become the prefix of every forwarded request.
pub fn parse_backend(backend: &str) -> Result<Uri> {
    let uri: Uri = backend.trim().parse()?;
    match uri.scheme_str() {
        Some("http") => {}
        Some(other) => {
            return Err(ProxyError::Config(format!(
                "Unsupported backend scheme '{other}', only http is supported"
            )))
        }
        None => {
            return Err(ProxyError::Config(format!("Backend URL must be absolute: {backend}")))
        }
    }
    if uri.authority().is_none() {
        return Err(ProxyError::Config(format!("Backend URL has no host: {backend}")));
    }
    Ok(uri)
}

/// Pooling of the connections to the backend
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct BackendPoolConfig {
    /// Seconds an idle pooled connection is kept before it is closed
    /// Default: 90
    pub idle_timeout: u64,
    /// Idle connections kept per host, 0 leaves hyper's unlimited default
    /// Default: 0
    pub pool_max_idle_per_host: usize,
}

impl Default for BackendPoolConfig {
    fn default() -> Self {
        Self { idle_timeout: 90, pool_max_idle_per_host: 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_http_with_path_and_query() -> Result<()> {
        let uri = parse_backend(" http://webapp:8080/app?tenant=a ")?;
        assert_eq!(uri.authority().map(|a| a.as_str()), Some("webapp:8080"));
        assert_eq!(uri.path(), "/app");
        assert_eq!(uri.query(), Some("tenant=a"));
        Ok(())
    }

    #[test]
    fn rejects_other_schemes_and_relative_urls() {
        for bad in ["https://webapp", "/relative/path", "webapp:8080"] {
            assert!(
                matches!(parse_backend(bad), Err(ProxyError::Config(_)) | Err(ProxyError::InvalidUri(_))),
                "{bad} accepted"
            );
        }
    }
}
