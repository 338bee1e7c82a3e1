use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// No credential is present at all.
    #[error("No active session")]
    NoActiveSession,

    /// The credential was rejected and the single refresh attempt failed.
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// The credential disappeared while it was being validated.
    #[error("Session lost during validation")]
    SessionLost,

    /// A privileged call was still rejected after the refresh-and-retry cycle.
    #[error("Authorization failed: {0}")]
    AuthorizationFailed(String),

    /// The remote procedure failed for a reason unrelated to authorization.
    #[error("Remote procedure error: {message}")]
    RemoteProcedure {
        status: Option<u16>,
        message: String,
    },

    /// Anything that does not fit the categories above.
    #[error("Unexpected error: {0}")]
    Unexpected(String),

    /// The caller exceeded its request budget.
    #[error("Too many requests, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Input rejected before any network call.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A multipart error.
    #[error("Multipart error: {0}")]
    Multipart(String),

    /// An optional integration has no credentials configured.
    #[error("Not configured: {0}")]
    NotConfigured(String),

    /// A third-party provider (LLM, image CDN) failed.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// The owning context was torn down before the operation finished.
    #[error("Operation cancelled")]
    Cancelled,

    /// An outbound HTTP error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] sonic_rs::Error),

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// The HTTP status this error is rendered with.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NoActiveSession | AppError::SessionExpired(_) | AppError::SessionLost => {
                StatusCode::UNAUTHORIZED
            }
            AppError::AuthorizationFailed(_) => StatusCode::FORBIDDEN,
            AppError::RemoteProcedure { status, .. } => status
                .and_then(|s| StatusCode::from_u16(s).ok())
                .filter(|s| s.is_client_error())
                .unwrap_or(StatusCode::BAD_GATEWAY),
            AppError::Unexpected(_) | AppError::Json(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Validation(_) | AppError::Multipart(_) => StatusCode::BAD_REQUEST,
            AppError::NotConfigured(_) => StatusCode::NOT_IMPLEMENTED,
            AppError::Upstream(_) | AppError::Http(_) => StatusCode::BAD_GATEWAY,
            // nginx's "client closed request"
            AppError::Cancelled => {
                StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    /// Whether the client should fall back to an alternative path.
    pub fn offers_fallback(&self) -> bool {
        matches!(self, AppError::NotConfigured(_) | AppError::Upstream(_))
    }

    /// The message exposed to clients. Internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Unexpected(_) | AppError::Internal(_) => "Internal server error".to_string(),
            AppError::Json(_) => "Malformed JSON".to_string(),
            AppError::Http(_) => "Upstream service unavailable".to_string(),
            AppError::RemoteProcedure { message, .. } => message.clone(),
            AppError::SessionExpired(_) => "Session expired, please sign in again".to_string(),
            AppError::AuthorizationFailed(msg)
            | AppError::Validation(msg)
            | AppError::Multipart(msg)
            | AppError::NotConfigured(msg)
            | AppError::Upstream(msg) => msg.clone(),
            other => other.to_string(),
        }
    }

    fn log(&self) {
        match self {
            AppError::NoActiveSession | AppError::SessionLost => {
                tracing::warn!("Authentication required: {}", self)
            }
            AppError::SessionExpired(msg) => tracing::warn!("Session expired: {}", msg),
            AppError::AuthorizationFailed(msg) => tracing::warn!("Authorization failed: {}", msg),
            AppError::RemoteProcedure { status, message } => {
                tracing::warn!("Remote procedure failed ({:?}): {}", status, message)
            }
            AppError::RateLimited { retry_after_secs } => {
                tracing::warn!("Rate limit exceeded, retry after {}s", retry_after_secs)
            }
            AppError::Validation(msg) => tracing::debug!("Validation error: {}", msg),
            AppError::Multipart(msg) => tracing::error!("Multipart error: {}", msg),
            AppError::NotConfigured(msg) => tracing::warn!("Not configured: {}", msg),
            AppError::Upstream(msg) => tracing::error!("Upstream error: {}", msg),
            AppError::Cancelled => tracing::debug!("Operation cancelled"),
            AppError::Http(e) => tracing::error!("HTTP error: {}", e),
            AppError::Json(e) => tracing::error!("JSON error: {}", e),
            AppError::Unexpected(msg) => tracing::error!("Unexpected error: {}", msg),
            AppError::Internal(msg) => tracing::error!("Internal error: {}", msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.log();

        let status = self.status();
        let message = self.public_message();

        let body = if self.offers_fallback() {
            sonic_rs::to_string(&sonic_rs::json!({
                "error": message,
                "fallback": true
            }))
        } else {
            sonic_rs::to_string(&sonic_rs::json!({
                "error": message
            }))
        }
        .unwrap_or_else(|_| r#"{"error":"Internal server error"}"#.to_string());

        let mut response = (
            status,
            [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
            body,
        )
            .into_response();

        if let AppError::RateLimited { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }

        response
    }
}
