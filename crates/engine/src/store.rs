//! Collaborator traits and the domain views the engines operate on.
//!
//! The engines see storage through these narrow contracts: a key-value
//! get/compare-and-set over accounts, an append-only attempt ledger with
//! windowed queries, a session store with an atomic refresh-lineage swap,
//! and an append-once transaction log. Production adapters back them with
//! PostgreSQL repositories; [`crate::memory`] backs them with hash maps.

use async_trait::async_trait;
use rust_decimal::Decimal;
use securebank_core::error::CoreError;
use securebank_core::ratelimit::AttemptWindow;
use securebank_core::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

/// Lifecycle state of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountStatus {
    Active,
    Frozen,
    Closed,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Frozen => "frozen",
            AccountStatus::Closed => "closed",
        }
    }

    /// Parse a stored status string. Unknown values map to `Frozen` so a
    /// corrupt row can never move money.
    pub fn parse(s: &str) -> Self {
        match s {
            "active" => AccountStatus::Active,
            "closed" => AccountStatus::Closed,
            _ => AccountStatus::Frozen,
        }
    }
}

/// The engine's view of an account: just enough to validate and move money.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: DbId,
    pub balance: Decimal,
    pub currency: String,
    pub status: AccountStatus,
}

/// Account storage boundary.
///
/// The engine never mutates a balance directly; the conditional write is the
/// only mutation primitive, and its precondition (`expected`) is the balance
/// value the engine originally read.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Fetch an account by id.
    async fn get(&self, id: DbId) -> Result<Option<Account>, CoreError>;

    /// Atomically replace the balance if it still equals `expected`.
    ///
    /// Returns `false` when the precondition failed (a concurrent writer got
    /// there first); the caller decides whether to retry.
    async fn compare_and_set_balance(
        &self,
        id: DbId,
        expected: Decimal,
        new: Decimal,
    ) -> Result<bool, CoreError>;
}

// ---------------------------------------------------------------------------
// Login attempts
// ---------------------------------------------------------------------------

/// A login attempt to append to the ledger. Immutable once recorded.
#[derive(Debug, Clone)]
pub struct NewLoginAttempt {
    /// Normalized (lowercase) email.
    pub email: String,
    pub success: bool,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub attempted_at: Timestamp,
}

/// Append-only login attempt ledger with time-windowed queries.
#[async_trait]
pub trait AttemptLedger: Send + Sync {
    /// Append an attempt.
    async fn record(&self, attempt: NewLoginAttempt) -> Result<(), CoreError>;

    /// Failed-attempt count and oldest failure for an email since `since`.
    async fn failed_window(&self, email: &str, since: Timestamp)
        -> Result<AttemptWindow, CoreError>;

    /// Failed-attempt count for an IP (across all emails) since `since`.
    async fn failed_count_for_ip(&self, ip: &str, since: Timestamp) -> Result<u32, CoreError>;

    /// Drop the failed-attempt history for an email (post-login reset).
    /// Returns the number of entries dropped. Must be idempotent.
    async fn clear_failures(&self, email: &str) -> Result<u64, CoreError>;

    /// Delete attempts older than `cutoff` (retention sweep).
    async fn prune_older_than(&self, cutoff: Timestamp) -> Result<u64, CoreError>;
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// A new session row to persist at token issuance.
#[derive(Debug, Clone)]
pub struct NewSession {
    /// Opaque session identifier embedded in both tokens as `sid`.
    pub session_id: String,
    pub user_id: DbId,
    /// SHA-256 hex of the current refresh token. The plaintext never lands
    /// server-side, so a database leak does not compromise active sessions.
    pub refresh_token_hash: String,
    pub expires_at: Timestamp,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// Server-side session state: the durable, revocable handle behind a
/// stateless access token.
#[derive(Debug, Clone)]
pub struct StoredSession {
    pub session_id: String,
    pub user_id: DbId,
    pub refresh_token_hash: String,
    pub expires_at: Timestamp,
    pub is_revoked: bool,
}

/// Session storage boundary.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a new session.
    async fn create(&self, session: NewSession) -> Result<(), CoreError>;

    /// Look up a session by its id, revoked or not.
    async fn find(&self, session_id: &str) -> Result<Option<StoredSession>, CoreError>;

    /// Atomically swap the refresh lineage: succeeds only if the stored hash
    /// still equals `expected_hash` and the session is not revoked.
    ///
    /// Returns `false` when the lineage has already moved on — the caller
    /// must treat that as refresh-token reuse.
    async fn rotate_refresh_hash(
        &self,
        session_id: &str,
        expected_hash: &str,
        new_hash: &str,
        new_expires_at: Timestamp,
    ) -> Result<bool, CoreError>;

    /// Revoke a single session. Returns `true` if the row was updated.
    async fn revoke(&self, session_id: &str) -> Result<bool, CoreError>;

    /// Revoke every active session of a user. Returns the revoked count.
    async fn revoke_all_for_user(&self, user_id: DbId) -> Result<u64, CoreError>;
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

/// Terminal and in-flight transaction states. A record transitions from
/// `Pending` to exactly one terminal state, then never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
        }
    }

    /// Parse a stored status string. Unknown values map to `Failed` so a
    /// corrupt row is never mistaken for an applied transfer.
    pub fn parse(s: &str) -> Self {
        match s {
            "pending" => TransactionStatus::Pending,
            "completed" => TransactionStatus::Completed,
            _ => TransactionStatus::Failed,
        }
    }
}

/// A transfer's durable record: audit trail and idempotency anchor. Created
/// `pending` before any balance write so a crash mid-transfer leaves
/// discoverable evidence.
#[derive(Debug, Clone)]
pub struct TransactionRecord {
    pub id: DbId,
    pub reference_number: String,
    pub from_account_id: DbId,
    pub to_account_id: DbId,
    pub amount: Decimal,
    pub currency: String,
    pub description: Option<String>,
    pub status: TransactionStatus,
    pub failure_reason: Option<String>,
    pub idempotency_key: Option<String>,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

/// Fields for creating a pending transaction record.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub reference_number: String,
    pub from_account_id: DbId,
    pub to_account_id: DbId,
    pub amount: Decimal,
    pub currency: String,
    pub description: Option<String>,
    pub idempotency_key: Option<String>,
}

/// Transaction log boundary.
#[async_trait]
pub trait TransactionLog: Send + Sync {
    /// Insert a new `pending` record.
    async fn create_pending(&self, tx: NewTransaction) -> Result<TransactionRecord, CoreError>;

    /// Find the most recent non-failed record carrying this idempotency key.
    async fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<TransactionRecord>, CoreError>;

    /// Transition a pending record to `completed`.
    async fn mark_completed(
        &self,
        id: DbId,
        completed_at: Timestamp,
    ) -> Result<TransactionRecord, CoreError>;

    /// Transition a pending record to `failed` with a reason.
    async fn mark_failed(&self, id: DbId, reason: &str) -> Result<TransactionRecord, CoreError>;
}
