use std::fmt;
use std::sync::Arc;

use http::header::HeaderName;
use http::request::Parts;
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

use crate::config::parse_header_name;
use crate::error::Result;
use crate::proxy::context::RequestMetadata;
use crate::telemetry::Metrics;

/// Why an injector could not produce a header value
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FingerprintError {
    #[error("request metadata not found")]
    MissingContext,

    #[error("{0} fingerprint not available for this connection")]
    Unavailable(&'static str),

    #[error("fingerprint computation failed: {0}")]
    Computation(String),
}

impl FingerprintError {
    /// Label used for the `reason` metric attribute
    pub fn reason(&self) -> &'static str {
        match self {
            FingerprintError::MissingContext => "missing_context",
            FingerprintError::Unavailable(_) => "unavailable",
            FingerprintError::Computation(_) => "computation",
        }
    }
}

/// Computes a fingerprint from the per-request metadata
///
/// `Ok(String::new())` means "nothing to inject" and is not an error.
pub type FingerprintFn =
    Arc<dyn Fn(&RequestMetadata) -> std::result::Result<String, FingerprintError> + Send + Sync>;

/// A value producer for one outbound header
///
/// Implementations are shared read-only by all in-flight requests and must
/// not keep per-request state.
pub trait HeaderInjector: Send + Sync {
    /// Name of the outbound header, constant for the lifetime of the injector
    fn header_name(&self) -> &HeaderName;

    /// Value for the outbound header of this request
    ///
    /// An empty string means the header should be skipped.
    fn header_value(&self, head: &Parts) -> std::result::Result<String, FingerprintError>;
}

/// Binds a header name to a [`FingerprintFn`]
///
/// Looks up the [`RequestMetadata`] of the in-flight request and times the
/// fingerprint computation.
#[derive(Clone)]
pub struct FingerprintHeaderInjector {
    header_name: HeaderName,
    fingerprint: FingerprintFn,
    metrics: Option<Arc<Metrics>>,
}

impl FingerprintHeaderInjector {
    pub fn new<F>(header_name: &str, fingerprint: F) -> Result<Self>
    where
        F: Fn(&RequestMetadata) -> std::result::Result<String, FingerprintError>
            + Send
            + Sync
            + 'static,
    {
        Ok(Self {
            header_name: parse_header_name(header_name)?,
            fingerprint: Arc::new(fingerprint),
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: Option<Arc<Metrics>>) -> Self {
        self.metrics = metrics;
        self
    }
}

impl fmt::Debug for FingerprintHeaderInjector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FingerprintHeaderInjector")
            .field("header_name", &self.header_name)
            .finish_non_exhaustive()
    }
}

impl HeaderInjector for FingerprintHeaderInjector {
    fn header_name(&self) -> &HeaderName {
        &self.header_name
    }

    fn header_value(&self, head: &Parts) -> std::result::Result<String, FingerprintError> {
        let metadata =
            RequestMetadata::from_parts(head).ok_or(FingerprintError::MissingContext)?;

        let start = Instant::now();
        let result = (self.fingerprint)(metadata);
        let elapsed = start.elapsed();
        debug!(header = %self.header_name, ?elapsed, "fingerprint duration");

        if let Some(m) = &self.metrics {
            m.record_fingerprint_duration(self.header_name.as_str(), elapsed.as_secs_f64());
        }

        result
    }
}
