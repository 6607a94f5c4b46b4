use http::StatusCode;
use thiserror::Error;

/// HTTP result type, T is typically a hyper::Response
/// HttpError is used to generate a synthetic error response
pub type HttpResult<T> = std::result::Result<T, HttpError>;

/// Describes things that can go wrong while handling a request
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HttpError {
    #[error("Failed to read request body: {0}")]
    InvalidRequestBody(String),

    #[error("Request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("Failed to generate upstream request: {0}")]
    FailedToGenerateUpstreamRequest(String),

    #[error("Request rejected by screening")]
    Forbidden,

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),
}

impl HttpError {
    /// Label used for the `error_type` metric attribute
    pub fn error_type(&self) -> &'static str {
        match self {
            HttpError::InvalidRequestBody(_) => "invalid_request_body",
            HttpError::PayloadTooLarge { .. } => "payload_too_large",
            HttpError::FailedToGenerateUpstreamRequest(_) => "upstream_request",
            HttpError::Forbidden => "screening_denied",
            HttpError::BackendUnavailable(_) => "backend_unavailable",
        }
    }
}

impl From<HttpError> for StatusCode {
    fn from(e: HttpError) -> StatusCode {
        match e {
            HttpError::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            HttpError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            HttpError::FailedToGenerateUpstreamRequest(_) => StatusCode::INTERNAL_SERVER_ERROR,
            HttpError::Forbidden => StatusCode::FORBIDDEN,
            HttpError::BackendUnavailable(_) => StatusCode::BAD_GATEWAY,
        }
    }
}
