use crate::decoder::StreamError;
use crate::publish::PublishError;
use axum::http::{header, HeaderMap, StatusCode};

/// Request-level failures that end a request with a single status code.
///
/// Per-document problems in the streaming protocol never surface here; they
/// are tallied by [`crate::stream_response::StreamResponse`] instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntakeError {
    // 400-level: client errors
    #[error("data decoding error: {0}")]
    Decode(String),
    #[error("data validation error: {0}")]
    Validation(String),
    #[error("invalid token")]
    Unauthorized,
    #[error("forbidden request: endpoint is disabled")]
    Disabled,
    #[error("forbidden request: origin '{0}' is not allowed")]
    OriginNotAllowed(String),
    #[error("only POST requests are supported")]
    MethodNotAllowed,
    #[error("request body too large")]
    TooLarge,
    #[error("too many requests")]
    RateLimited,

    // 503: retryable server-side conditions
    #[error("timeout waiting to be processed")]
    ConcurrencyTimeout,
    #[error("queue is full")]
    QueueFull,
    #[error("timeout while waiting to process request")]
    ProcessingTimeout,
    #[error("server is shutting down")]
    ShuttingDown,
}

impl IntakeError {
    /// HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Decode(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Disabled | Self::OriginNotAllowed(_) => StatusCode::FORBIDDEN,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::ConcurrencyTimeout
            | Self::QueueFull
            | Self::ProcessingTimeout
            | Self::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Short machine-readable name, used as a metrics label
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode",
            Self::Validation(_) => "validation",
            Self::Unauthorized => "unauthorized",
            Self::Disabled => "forbidden",
            Self::OriginNotAllowed(_) => "forbidden_origin",
            Self::MethodNotAllowed => "method_not_allowed",
            Self::TooLarge => "request_too_large",
            Self::RateLimited => "rate_limit",
            Self::ConcurrencyTimeout => "concurrency",
            Self::QueueFull => "queue_full",
            Self::ProcessingTimeout => "processing_timeout",
            Self::ShuttingDown => "shutting_down",
        }
    }

    /// 429 and 503 tell the client to try again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.status_code(),
            StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE
        )
    }
}

impl From<StreamError> for IntakeError {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::SizeExceeded(_) => IntakeError::TooLarge,
            other => IntakeError::Decode(other.to_string()),
        }
    }
}

impl From<PublishError> for IntakeError {
    fn from(err: PublishError) -> Self {
        match err {
            PublishError::QueueFull => IntakeError::QueueFull,
            PublishError::ProcessingTimeout => IntakeError::ProcessingTimeout,
            PublishError::ShuttingDown => IntakeError::ShuttingDown,
        }
    }
}

/// Whether an error body should be rendered as JSON for this client.
///
/// Clients that send no `Accept` header get JSON; otherwise the header must
/// mention `*/*` or `application/json`.
pub fn accepts_json(headers: &HeaderMap) -> bool {
    match headers.get(header::ACCEPT) {
        None => true,
        Some(value) => value
            .to_str()
            .map(|accept| accept.contains("*/*") || accept.contains("application/json"))
            .unwrap_or(false),
    }
}
