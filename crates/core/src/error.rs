use crate::types::DbId;

/// Domain-level error type shared across the workspace.
///
/// Token verification failures are split into expired/invalid kinds because
/// callers react differently: an expired access token triggers a refresh,
/// a bad signature forces re-login.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Account not found: {0}")]
    AccountNotFound(DbId),

    #[error("Account {0} is not active")]
    AccountFrozen(DbId),

    #[error("Insufficient funds in account {account_id}: available {available}, requested {requested}")]
    InsufficientFunds {
        account_id: DbId,
        available: rust_decimal::Decimal,
        requested: rust_decimal::Decimal,
    },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Currency mismatch: {from} vs {to}")]
    CurrencyMismatch { from: String, to: String },

    #[error("Concurrent modification: retries exhausted after {attempts} attempts")]
    ConcurrentModification { attempts: u32 },

    #[error("Rate limited, retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: i64 },

    #[error("Access token expired")]
    TokenExpired,

    #[error("Invalid token: {0}")]
    TokenInvalid(String),

    #[error("Refresh token expired")]
    RefreshTokenExpired,

    #[error("Session revoked")]
    SessionRevoked,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
