use std::collections::HashSet;
use std::fs;
use std::path::Path;

use http::header::HeaderName;

use crate::config::backend::parse_backend;
use crate::config::Config;
use crate::error::{ProxyError, Result};
use crate::fingerprinting::forwarded;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

pub fn load_from_path<P: AsRef<Path>>(p: P) -> Result<Config> {
    let txt = fs::read_to_string(p)
        .map_err(|e| ProxyError::Config(format!("Failed to read config file: {e}")))?;
    load_from_str(&txt)
}

pub fn load_from_str(txt: &str) -> Result<Config> {
    let cfg: Config = toml::from_str(txt)
        .map_err(|e| ProxyError::Config(format!("Failed to parse config: {e}")))?;

    validate_config(&cfg)?;

    Ok(cfg)
}

pub fn parse_header_name(name: &str) -> Result<HeaderName> {
    if name.trim().is_empty() {
        return Err(ProxyError::Config("Header name cannot be empty".to_string()));
    }
    Ok(HeaderName::from_bytes(name.trim().to_ascii_lowercase().as_bytes())?)
}

fn validate_config(cfg: &Config) -> Result<()> {
    parse_backend(&cfg.backend)?;

    if cfg.max_body_bytes == 0 {
        return Err(ProxyError::Config("max_body_bytes must be > 0".to_string()));
    }

    if cfg.probe.enabled && cfg.probe.user_agent_prefix.is_empty() {
        return Err(ProxyError::Config(
            "probe.user_agent_prefix cannot be empty when probes are enabled".to_string(),
        ));
    }

    if !LOG_LEVELS.contains(&cfg.logging.level.to_ascii_lowercase().as_str()) {
        return Err(ProxyError::Config(format!(
            "Invalid log level '{}' (must be one of {})",
            cfg.logging.level,
            LOG_LEVELS.join("/")
        )));
    }

    validate_fingerprint_headers(cfg)?;

    if let Some(tls) = &cfg.tls {
        if !Path::new(&tls.cert_path).exists() {
            return Err(ProxyError::Config(format!(
                "Certificate file not found: {}",
                tls.cert_path
            )));
        }
        if !Path::new(&tls.key_path).exists() {
            return Err(ProxyError::Config(format!("Key file not found: {}", tls.key_path)));
        }
    }

    Ok(())
}

fn validate_fingerprint_headers(cfg: &Config) -> Result<()> {
    let fp = &cfg.fingerprint;
    let mut seen: HashSet<HeaderName> =
        [forwarded::REQUEST_ID, forwarded::FOR].into_iter().map(HeaderName::from_static).collect();

    for name in [&fp.ja4_header, &fp.ja4_raw_header, &fp.http2_header] {
        let header = parse_header_name(name)?;
        if !seen.insert(header) {
            return Err(ProxyError::Config(format!(
                "Fingerprint header '{name}' collides with another injected header"
            )));
        }
    }

    Ok(())
}
