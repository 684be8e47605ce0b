use async_openai::error::{ApiError, OpenAIError};
use serde::Deserialize;
use thiserror::Error;

/// Type alias for Result with TriageError
pub type Result<T> = std::result::Result<T, TriageError>;

/// Coarse classification of an error, decided where the error enters the crate.
///
/// Retry policy only looks at this, never at error message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Provider throttling or quota exhaustion; safe to retry later
    RateLimited,
    /// Bad input, bad output, bad credentials or bad configuration
    Invalid,
    /// Referenced resource does not exist
    NotFound,
    /// Anything else (network, server, unexpected)
    Unknown,
}

/// Error types for the inbox triage system
#[derive(Error, Debug)]
pub enum TriageError {
    /// Mail provider returned an error
    #[error("Mail API error: {0}")]
    MailApiError(String),

    /// LLM provider returned an error
    #[error("LLM API error: {0}")]
    LlmError(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Provider throttled the request
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// Provider quota exhausted
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Network-related error (connection issues, timeouts, etc.)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Server returned 5xx error
    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    /// Resource not found (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden (403)
    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// Provider payload is missing required data
    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),

    /// The model did not return the expected JSON object
    #[error("Malformed classification response: {0}")]
    MalformedResponse(String),

    /// Folder lookup or creation failed
    #[error("Folder error: {0}")]
    FolderError(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic catch-all error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl TriageError {
    /// Typed kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            TriageError::RateLimited(_) | TriageError::QuotaExceeded(_) => ErrorKind::RateLimited,
            TriageError::NotFound(_) => ErrorKind::NotFound,
            TriageError::AuthError(_)
            | TriageError::BadRequest(_)
            | TriageError::Forbidden(_)
            | TriageError::InvalidMessageFormat(_)
            | TriageError::MalformedResponse(_)
            | TriageError::SerializationError(_)
            | TriageError::ConfigError(_) => ErrorKind::Invalid,
            _ => ErrorKind::Unknown,
        }
    }

    /// Check if the error is provider throttling and should be retried
    pub fn is_rate_limited(&self) -> bool {
        self.kind() == ErrorKind::RateLimited
    }

    /// Map a bare HTTP status from a Google API response
    pub(crate) fn from_http_status(status: u16, message: String) -> Self {
        match status {
            429 => TriageError::RateLimited(message),
            401 => TriageError::AuthError(message),
            400 => TriageError::BadRequest(message),
            403 => TriageError::Forbidden(message),
            404 => TriageError::NotFound(message),
            500..=599 => TriageError::ServerError { status, message },
            _ => TriageError::MailApiError(message),
        }
    }

    /// Map a Google API JSON error body
    ///
    /// Google reports throttling either as HTTP 429 or as 403 with a
    /// `rateLimitExceeded`/`userRateLimitExceeded` reason.
    pub(crate) fn from_google_error_body(body: &serde_json::Value) -> Self {
        let error = &body["error"];
        let status = error["code"].as_u64().unwrap_or(0) as u16;
        let message = error["message"]
            .as_str()
            .unwrap_or("unknown Google API error")
            .to_string();
        let reason = error["errors"][0]["reason"].as_str().unwrap_or("");

        match reason {
            "rateLimitExceeded" | "userRateLimitExceeded" => TriageError::RateLimited(message),
            "quotaExceeded" | "dailyLimitExceeded" => TriageError::QuotaExceeded(message),
            _ => Self::from_http_status(status, message),
        }
    }
}

/// `{"error": {...}}` body returned by OpenAI-compatible endpoints
#[derive(Deserialize)]
struct LlmErrorBody {
    error: ApiError,
}

/// Throttling as described by an error object's code, type or message.
///
/// Some providers send `"code": null` and only say "Rate limit reached" in
/// the message, so the text is checked as well.
fn classify_llm_error(api: ApiError) -> TriageError {
    let reason = format!("{:?} {:?} {}", api.code, api.r#type, api.message).to_lowercase();
    if reason.contains("quota") {
        TriageError::QuotaExceeded(api.message)
    } else if reason.contains("rate_limit") || reason.contains("rate limit") {
        TriageError::RateLimited(api.message)
    } else {
        TriageError::LlmError(api.message)
    }
}

impl TriageError {
    /// Map a non-success response from a chat completions endpoint
    ///
    /// HTTP 429 is throttling whatever the body says; the body only separates
    /// quota exhaustion from rate limiting. Bodies that are not JSON (proxies,
    /// gateways) are kept as the message.
    pub(crate) fn from_llm_response(status: u16, body: &str) -> Self {
        let fallback = match body.trim() {
            "" => format!("HTTP {}", status),
            text => text.to_string(),
        };
        let classified = serde_json::from_str::<LlmErrorBody>(body)
            .ok()
            .map(|wrapped| classify_llm_error(wrapped.error));

        match (status, classified) {
            (429, Some(TriageError::LlmError(message))) => TriageError::RateLimited(message),
            (429, Some(error)) => error,
            (429, None) if fallback.to_lowercase().contains("quota") => {
                TriageError::QuotaExceeded(fallback)
            }
            (429, None) => TriageError::RateLimited(fallback),
            (_, Some(error)) if error.is_rate_limited() => error,
            (401, _) => TriageError::AuthError(fallback),
            (400, Some(TriageError::LlmError(message))) => TriageError::BadRequest(message),
            (400, None) => TriageError::BadRequest(fallback),
            (403, _) => TriageError::Forbidden(fallback),
            (404, _) => TriageError::NotFound(fallback),
            (500..=599, Some(TriageError::LlmError(message))) => {
                TriageError::ServerError { status, message }
            }
            (500..=599, _) => TriageError::ServerError {
                status,
                message: fallback,
            },
            (_, Some(error)) => error,
            (_, None) => TriageError::LlmError(fallback),
        }
    }
}

impl From<google_gmail1::Error> for TriageError {
    fn from(error: google_gmail1::Error) -> Self {
        match error {
            google_gmail1::Error::Failure(ref response) => {
                let status = response.status();
                let message = format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown")
                );
                TriageError::from_http_status(status.as_u16(), message)
            }
            google_gmail1::Error::BadRequest(ref body) => TriageError::from_google_error_body(body),
            google_gmail1::Error::HttpError(ref err) => {
                TriageError::NetworkError(format!("Connection error: {}", err))
            }
            google_gmail1::Error::Io(err) => TriageError::NetworkError(err.to_string()),
            _ => TriageError::MailApiError(error.to_string()),
        }
    }
}

impl From<OpenAIError> for TriageError {
    fn from(error: OpenAIError) -> Self {
        match error {
            OpenAIError::ApiError(api) => classify_llm_error(api),
            OpenAIError::Reqwest(err) => match err.status().map(|s| s.as_u16()) {
                Some(429) => TriageError::RateLimited(err.to_string()),
                Some(status @ 500..=599) => TriageError::ServerError {
                    status,
                    message: err.to_string(),
                },
                _ => TriageError::NetworkError(err.to_string()),
            },
            OpenAIError::InvalidArgument(message) => TriageError::BadRequest(message),
            other => TriageError::LlmError(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for TriageError {
    fn from(error: reqwest::Error) -> Self {
        match error.status().map(|s| s.as_u16()) {
            Some(429) => TriageError::RateLimited(error.to_string()),
            Some(status @ 500..=599) => TriageError::ServerError {
                status,
                message: error.to_string(),
            },
            _ if error.is_decode() => TriageError::LlmError(error.to_string()),
            _ => TriageError::NetworkError(error.to_string()),
        }
    }
}
