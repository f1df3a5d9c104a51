use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use securebank_core::error::CoreError;
use securebank_core::ratelimit::RateLimitDecision;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `securebank-core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A database error from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A denied rate-limit decision, carrying the retry/captcha detail.
    #[error("Rate limited")]
    RateLimited(RateLimitDecision),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A missing resource with a human-readable message.
    #[error("Not found: {0}")]
    NotFound(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // The rate-limit denial has a richer body (retry hints, captcha
        // flag) and a Retry-After header, so it is built separately.
        if let AppError::RateLimited(decision) = &self {
            return rate_limited_response(decision);
        }

        let (status, code, message) = match &self {
            AppError::Core(core) => classify_core_error(core),
            AppError::Database(err) => classify_sqlx_error(err),
            AppError::RateLimited(_) => unreachable!("handled above"),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Build the 429 response for a denied rate-limit decision.
fn rate_limited_response(decision: &RateLimitDecision) -> Response {
    let message = decision
        .message
        .clone()
        .unwrap_or_else(|| "Too many requests. Please try again later.".to_string());

    let body = json!({
        "error": message,
        "code": "RATE_LIMITED",
        "retry_after_secs": decision.retry_after_secs,
        "captcha_required": decision.require_captcha,
    });

    let mut response = (StatusCode::TOO_MANY_REQUESTS, axum::Json(body)).into_response();
    if let Some(retry_after) = decision.retry_after_secs {
        if let Ok(value) = retry_after.to_string().parse() {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
    }
    response
}

/// Map a [`CoreError`] to an HTTP status, error code, and message.
fn classify_core_error(core: &CoreError) -> (StatusCode, &'static str, String) {
    match core {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::AccountNotFound(id) => (
            StatusCode::NOT_FOUND,
            "ACCOUNT_NOT_FOUND",
            format!("Account {id} not found"),
        ),
        CoreError::AccountFrozen(_) => (
            StatusCode::FORBIDDEN,
            "ACCOUNT_FROZEN",
            "Account is not active".to_string(),
        ),
        CoreError::InsufficientFunds { .. } => (
            StatusCode::BAD_REQUEST,
            "INSUFFICIENT_FUNDS",
            "Insufficient funds for this transfer".to_string(),
        ),
        CoreError::InvalidAmount(msg) => {
            (StatusCode::BAD_REQUEST, "INVALID_AMOUNT", msg.clone())
        }
        CoreError::InvalidOperation(msg) => {
            (StatusCode::BAD_REQUEST, "INVALID_OPERATION", msg.clone())
        }
        CoreError::CurrencyMismatch { .. } => (
            StatusCode::BAD_REQUEST,
            "CURRENCY_MISMATCH",
            "Accounts do not share a currency".to_string(),
        ),
        CoreError::ConcurrentModification { .. } => (
            StatusCode::CONFLICT,
            "CONCURRENT_MODIFICATION",
            "The transfer could not be applied due to concurrent activity. Please retry."
                .to_string(),
        ),
        CoreError::RateLimited { retry_after_secs } => (
            StatusCode::TOO_MANY_REQUESTS,
            "RATE_LIMITED",
            format!("Too many requests. Retry after {retry_after_secs} seconds"),
        ),
        CoreError::TokenExpired => (
            StatusCode::UNAUTHORIZED,
            "TOKEN_EXPIRED",
            "Access token has expired".to_string(),
        ),
        CoreError::RefreshTokenExpired => (
            StatusCode::UNAUTHORIZED,
            "REFRESH_TOKEN_EXPIRED",
            "Refresh token has expired".to_string(),
        ),
        CoreError::TokenInvalid(_) => (
            StatusCode::UNAUTHORIZED,
            "TOKEN_INVALID",
            "Invalid token".to_string(),
        ),
        CoreError::SessionRevoked => (
            StatusCode::UNAUTHORIZED,
            "SESSION_REVOKED",
            "Session has been revoked. Please log in again.".to_string(),
        ),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        CoreError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
        CoreError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
        CoreError::Internal(msg) => {
            tracing::error!(error = %msg, "Internal core error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
    }
}

/// Classify a sqlx error into an HTTP status, error code, and message.
///
/// - `RowNotFound` maps to 404.
/// - Unique constraint violations (constraint name starting with `uq_`) map to 409.
/// - Everything else maps to 500 with a sanitized message.
fn classify_sqlx_error(err: &sqlx::Error) -> (StatusCode, &'static str, String) {
    match err {
        sqlx::Error::RowNotFound => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Resource not found".to_string(),
        ),
        sqlx::Error::Database(db_err) => {
            // PostgreSQL unique constraint violation: error code 23505
            if db_err.code().as_deref() == Some("23505") {
                let constraint = db_err.constraint().unwrap_or("unknown");
                if constraint.starts_with("uq_") {
                    return (
                        StatusCode::CONFLICT,
                        "CONFLICT",
                        format!("Duplicate value violates unique constraint: {constraint}"),
                    );
                }
            }
            tracing::error!(error = %db_err, "Database error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
        other => {
            tracing::error!(error = %other, "Database error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
    }
}
