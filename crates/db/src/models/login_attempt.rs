//! Login attempt ledger model. Rows are immutable once recorded.

use sqlx::FromRow;

use securebank_core::types::{DbId, Timestamp};

/// A login attempt row from the `login_attempts` table.
#[derive(Debug, Clone, FromRow)]
pub struct LoginAttempt {
    pub id: DbId,
    pub email: String,
    pub success: bool,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub attempted_at: Timestamp,
}

/// DTO for recording a login attempt.
pub struct CreateLoginAttempt {
    /// Normalized (lowercase) email.
    pub email: String,
    pub success: bool,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub attempted_at: Timestamp,
}
