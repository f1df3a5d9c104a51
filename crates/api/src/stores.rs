//! PostgreSQL-backed implementations of the engine's collaborator traits.
//!
//! Thin adapters: each method delegates to a repository in `securebank-db`
//! and maps row models to the engine's domain views. Infrastructure errors
//! surface as [`CoreError::Internal`]; the engines decide whether that means
//! fail-open (rate limiting) or fail-closed (transfers).

use async_trait::async_trait;
use rust_decimal::Decimal;

use securebank_core::error::CoreError;
use securebank_core::ratelimit::AttemptWindow;
use securebank_core::types::{DbId, Timestamp};
use securebank_db::models::login_attempt::CreateLoginAttempt;
use securebank_db::models::session::CreateSession;
use securebank_db::models::transaction::{CreateTransaction, Transaction};
use securebank_db::repositories::{
    AccountRepo, LoginAttemptRepo, SessionRepo, TransactionRepo,
};
use securebank_db::DbPool;
use securebank_engine::store::{
    Account, AccountStatus, AccountStore, AttemptLedger, NewLoginAttempt, NewSession,
    NewTransaction, SessionStore, StoredSession, TransactionLog, TransactionRecord,
    TransactionStatus,
};

/// Map an infrastructure error into the domain error space.
fn db_error(e: sqlx::Error) -> CoreError {
    CoreError::Internal(format!("Database error: {e}"))
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

/// [`AccountStore`] over the `accounts` table.
pub struct PgAccountStore {
    pool: DbPool,
}

impl PgAccountStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn get(&self, id: DbId) -> Result<Option<Account>, CoreError> {
        let row = AccountRepo::find_by_id(&self.pool, id)
            .await
            .map_err(db_error)?;
        Ok(row.map(|r| Account {
            id: r.id,
            balance: r.balance,
            currency: r.currency,
            status: AccountStatus::parse(&r.status),
        }))
    }

    async fn compare_and_set_balance(
        &self,
        id: DbId,
        expected: Decimal,
        new: Decimal,
    ) -> Result<bool, CoreError> {
        AccountRepo::compare_and_set_balance(&self.pool, id, expected, new)
            .await
            .map_err(db_error)
    }
}

// ---------------------------------------------------------------------------
// Attempt ledger
// ---------------------------------------------------------------------------

/// [`AttemptLedger`] over the `login_attempts` table.
pub struct PgAttemptLedger {
    pool: DbPool,
}

impl PgAttemptLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AttemptLedger for PgAttemptLedger {
    async fn record(&self, attempt: NewLoginAttempt) -> Result<(), CoreError> {
        LoginAttemptRepo::create(
            &self.pool,
            &CreateLoginAttempt {
                email: attempt.email,
                success: attempt.success,
                ip_address: attempt.ip_address,
                user_agent: attempt.user_agent,
                attempted_at: attempt.attempted_at,
            },
        )
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn failed_window(
        &self,
        email: &str,
        since: Timestamp,
    ) -> Result<AttemptWindow, CoreError> {
        LoginAttemptRepo::failed_window(&self.pool, email, since)
            .await
            .map_err(db_error)
    }

    async fn failed_count_for_ip(&self, ip: &str, since: Timestamp) -> Result<u32, CoreError> {
        LoginAttemptRepo::failed_count_for_ip(&self.pool, ip, since)
            .await
            .map_err(db_error)
    }

    async fn clear_failures(&self, email: &str) -> Result<u64, CoreError> {
        LoginAttemptRepo::clear_failures(&self.pool, email)
            .await
            .map_err(db_error)
    }

    async fn prune_older_than(&self, cutoff: Timestamp) -> Result<u64, CoreError> {
        LoginAttemptRepo::delete_older_than(&self.pool, cutoff)
            .await
            .map_err(db_error)
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// [`SessionStore`] over the `user_sessions` table.
pub struct PgSessionStore {
    pool: DbPool,
}

impl PgSessionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create(&self, session: NewSession) -> Result<(), CoreError> {
        SessionRepo::create(
            &self.pool,
            &CreateSession {
                session_id: session.session_id,
                user_id: session.user_id,
                refresh_token_hash: session.refresh_token_hash,
                expires_at: session.expires_at,
                user_agent: session.user_agent,
                ip_address: session.ip_address,
            },
        )
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn find(&self, session_id: &str) -> Result<Option<StoredSession>, CoreError> {
        let row = SessionRepo::find_by_session_id(&self.pool, session_id)
            .await
            .map_err(db_error)?;
        Ok(row.map(|r| StoredSession {
            session_id: r.session_id,
            user_id: r.user_id,
            refresh_token_hash: r.refresh_token_hash,
            expires_at: r.expires_at,
            is_revoked: r.is_revoked,
        }))
    }

    async fn rotate_refresh_hash(
        &self,
        session_id: &str,
        expected_hash: &str,
        new_hash: &str,
        new_expires_at: Timestamp,
    ) -> Result<bool, CoreError> {
        SessionRepo::rotate_refresh_hash(
            &self.pool,
            session_id,
            expected_hash,
            new_hash,
            new_expires_at,
        )
        .await
        .map_err(db_error)
    }

    async fn revoke(&self, session_id: &str) -> Result<bool, CoreError> {
        SessionRepo::revoke(&self.pool, session_id)
            .await
            .map_err(db_error)
    }

    async fn revoke_all_for_user(&self, user_id: DbId) -> Result<u64, CoreError> {
        SessionRepo::revoke_all_for_user(&self.pool, user_id)
            .await
            .map_err(db_error)
    }
}

// ---------------------------------------------------------------------------
// Transaction log
// ---------------------------------------------------------------------------

/// [`TransactionLog`] over the `transactions` table.
pub struct PgTransactionLog {
    pool: DbPool,
}

impl PgTransactionLog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Convert a row model into the engine's record view.
fn to_record(row: Transaction) -> TransactionRecord {
    TransactionRecord {
        id: row.id,
        reference_number: row.reference_number,
        from_account_id: row.from_account_id,
        to_account_id: row.to_account_id,
        amount: row.amount,
        currency: row.currency,
        description: row.description,
        status: TransactionStatus::parse(&row.status),
        failure_reason: row.failure_reason,
        idempotency_key: row.idempotency_key,
        created_at: row.created_at,
        completed_at: row.completed_at,
    }
}

#[async_trait]
impl TransactionLog for PgTransactionLog {
    async fn create_pending(&self, tx: NewTransaction) -> Result<TransactionRecord, CoreError> {
        let row = TransactionRepo::create_pending(
            &self.pool,
            &CreateTransaction {
                reference_number: tx.reference_number,
                from_account_id: tx.from_account_id,
                to_account_id: tx.to_account_id,
                amount: tx.amount,
                currency: tx.currency,
                description: tx.description,
                idempotency_key: tx.idempotency_key,
            },
        )
        .await
        .map_err(db_error)?;
        Ok(to_record(row))
    }

    async fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<TransactionRecord>, CoreError> {
        let row = TransactionRepo::find_by_idempotency_key(&self.pool, key)
            .await
            .map_err(db_error)?;
        Ok(row.map(to_record))
    }

    async fn mark_completed(
        &self,
        id: DbId,
        completed_at: Timestamp,
    ) -> Result<TransactionRecord, CoreError> {
        let row = TransactionRepo::mark_completed(&self.pool, id, completed_at)
            .await
            .map_err(db_error)?;
        Ok(to_record(row))
    }

    async fn mark_failed(&self, id: DbId, reason: &str) -> Result<TransactionRecord, CoreError> {
        let row = TransactionRepo::mark_failed(&self.pool, id, reason)
            .await
            .map_err(db_error)?;
        Ok(to_record(row))
    }
}
