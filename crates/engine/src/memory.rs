//! In-memory collaborator implementations.
//!
//! Back the engines with plain hash maps behind a `Mutex`, preserving the
//! same atomicity contracts as the PostgreSQL adapters (the compare-and-set
//! operations hold the lock for the whole read-compare-write). Used by the
//! engine unit tests; no production code path constructs these.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use rust_decimal::Decimal;
use securebank_core::audit::{AuditEvent, AuditSink};
use securebank_core::clock::Clock;
use securebank_core::error::CoreError;
use securebank_core::ratelimit::AttemptWindow;
use securebank_core::types::{DbId, Timestamp};

use crate::store::{
    Account, AccountStore, AttemptLedger, NewLoginAttempt, NewSession, NewTransaction,
    SessionStore, StoredSession, TransactionLog, TransactionRecord, TransactionStatus,
};

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// A clock that only moves when told to. Lets tests cross rate-limit windows
/// and session expiries without sleeping.
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Advance the clock by a duration.
    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().unwrap()
    }
}

// ---------------------------------------------------------------------------
// Audit sink
// ---------------------------------------------------------------------------

/// Sink that collects every emitted event for later assertions.
#[derive(Default)]
pub struct CollectingAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl CollectingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events emitted so far.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Count of events with the given action name.
    pub fn count_action(&self, action: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.action == action)
            .count()
    }
}

impl AuditSink for CollectingAuditSink {
    fn emit(&self, event: AuditEvent) {
        self.events.lock().unwrap().push(event);
    }
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

/// In-memory [`AccountStore`] with a read counter for call-order assertions.
#[derive(Default)]
pub struct InMemoryAccountStore {
    accounts: Mutex<HashMap<DbId, Account>>,
    reads: AtomicU64,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an account.
    pub fn put(&self, account: Account) {
        self.accounts.lock().unwrap().insert(account.id, account);
    }

    /// Current balance of an account, panicking if absent (test helper).
    pub fn balance_of(&self, id: DbId) -> Decimal {
        self.accounts.lock().unwrap().get(&id).expect("account").balance
    }

    /// How many `get` calls have been made.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn get(&self, id: DbId) -> Result<Option<Account>, CoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.accounts.lock().unwrap().get(&id).cloned())
    }

    async fn compare_and_set_balance(
        &self,
        id: DbId,
        expected: Decimal,
        new: Decimal,
    ) -> Result<bool, CoreError> {
        let mut accounts = self.accounts.lock().unwrap();
        match accounts.get_mut(&id) {
            Some(account) if account.balance == expected => {
                account.balance = new;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Ok(false),
        }
    }
}

// ---------------------------------------------------------------------------
// Attempt ledger
// ---------------------------------------------------------------------------

/// A recorded attempt row.
#[derive(Debug, Clone)]
struct AttemptRow {
    email: String,
    success: bool,
    ip_address: Option<String>,
    attempted_at: Timestamp,
}

/// In-memory [`AttemptLedger`].
#[derive(Default)]
pub struct InMemoryAttemptLedger {
    attempts: Mutex<Vec<AttemptRow>>,
}

impl InMemoryAttemptLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of retained attempts (successes included).
    pub fn len(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AttemptLedger for InMemoryAttemptLedger {
    async fn record(&self, attempt: NewLoginAttempt) -> Result<(), CoreError> {
        self.attempts.lock().unwrap().push(AttemptRow {
            email: attempt.email,
            success: attempt.success,
            ip_address: attempt.ip_address,
            attempted_at: attempt.attempted_at,
        });
        Ok(())
    }

    async fn failed_window(
        &self,
        email: &str,
        since: Timestamp,
    ) -> Result<AttemptWindow, CoreError> {
        let attempts = self.attempts.lock().unwrap();
        let mut failed_count = 0u32;
        let mut oldest_failure: Option<Timestamp> = None;
        for row in attempts
            .iter()
            .filter(|r| r.email == email && !r.success && r.attempted_at > since)
        {
            failed_count += 1;
            if oldest_failure.map_or(true, |t| row.attempted_at < t) {
                oldest_failure = Some(row.attempted_at);
            }
        }
        Ok(AttemptWindow {
            failed_count,
            oldest_failure,
        })
    }

    async fn failed_count_for_ip(&self, ip: &str, since: Timestamp) -> Result<u32, CoreError> {
        let attempts = self.attempts.lock().unwrap();
        Ok(attempts
            .iter()
            .filter(|r| {
                r.ip_address.as_deref() == Some(ip) && !r.success && r.attempted_at > since
            })
            .count() as u32)
    }

    async fn clear_failures(&self, email: &str) -> Result<u64, CoreError> {
        let mut attempts = self.attempts.lock().unwrap();
        let before = attempts.len();
        attempts.retain(|r| r.email != email || r.success);
        Ok((before - attempts.len()) as u64)
    }

    async fn prune_older_than(&self, cutoff: Timestamp) -> Result<u64, CoreError> {
        let mut attempts = self.attempts.lock().unwrap();
        let before = attempts.len();
        attempts.retain(|r| r.attempted_at >= cutoff);
        Ok((before - attempts.len()) as u64)
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// In-memory [`SessionStore`].
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, StoredSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions, revoked included.
    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, session: NewSession) -> Result<(), CoreError> {
        let stored = StoredSession {
            session_id: session.session_id.clone(),
            user_id: session.user_id,
            refresh_token_hash: session.refresh_token_hash,
            expires_at: session.expires_at,
            is_revoked: false,
        };
        self.sessions
            .lock()
            .unwrap()
            .insert(session.session_id, stored);
        Ok(())
    }

    async fn find(&self, session_id: &str) -> Result<Option<StoredSession>, CoreError> {
        Ok(self.sessions.lock().unwrap().get(session_id).cloned())
    }

    async fn rotate_refresh_hash(
        &self,
        session_id: &str,
        expected_hash: &str,
        new_hash: &str,
        new_expires_at: Timestamp,
    ) -> Result<bool, CoreError> {
        let mut sessions = self.sessions.lock().unwrap();
        match sessions.get_mut(session_id) {
            Some(s) if !s.is_revoked && s.refresh_token_hash == expected_hash => {
                s.refresh_token_hash = new_hash.to_string();
                s.expires_at = new_expires_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke(&self, session_id: &str) -> Result<bool, CoreError> {
        let mut sessions = self.sessions.lock().unwrap();
        match sessions.get_mut(session_id) {
            Some(s) if !s.is_revoked => {
                s.is_revoked = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_for_user(&self, user_id: DbId) -> Result<u64, CoreError> {
        let mut sessions = self.sessions.lock().unwrap();
        let mut revoked = 0u64;
        for s in sessions.values_mut() {
            if s.user_id == user_id && !s.is_revoked {
                s.is_revoked = true;
                revoked += 1;
            }
        }
        Ok(revoked)
    }
}

// ---------------------------------------------------------------------------
// Transaction log
// ---------------------------------------------------------------------------

/// In-memory [`TransactionLog`].
#[derive(Default)]
pub struct InMemoryTransactionLog {
    records: Mutex<Vec<TransactionRecord>>,
    next_id: AtomicU64,
}

impl InMemoryTransactionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records.
    pub fn records(&self) -> Vec<TransactionRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransactionLog for InMemoryTransactionLog {
    async fn create_pending(&self, tx: NewTransaction) -> Result<TransactionRecord, CoreError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) as DbId + 1;
        let record = TransactionRecord {
            id,
            reference_number: tx.reference_number,
            from_account_id: tx.from_account_id,
            to_account_id: tx.to_account_id,
            amount: tx.amount,
            currency: tx.currency,
            description: tx.description,
            status: TransactionStatus::Pending,
            failure_reason: None,
            idempotency_key: tx.idempotency_key,
            created_at: chrono::Utc::now(),
            completed_at: None,
        };
        self.records.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<TransactionRecord>, CoreError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| {
                r.idempotency_key.as_deref() == Some(key) && r.status != TransactionStatus::Failed
            })
            .cloned())
    }

    async fn mark_completed(
        &self,
        id: DbId,
        completed_at: Timestamp,
    ) -> Result<TransactionRecord, CoreError> {
        let mut records = self.records.lock().unwrap();
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(CoreError::NotFound {
                entity: "transaction",
                id,
            })?;
        record.status = TransactionStatus::Completed;
        record.completed_at = Some(completed_at);
        Ok(record.clone())
    }

    async fn mark_failed(&self, id: DbId, reason: &str) -> Result<TransactionRecord, CoreError> {
        let mut records = self.records.lock().unwrap();
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(CoreError::NotFound {
                entity: "transaction",
                id,
            })?;
        record.status = TransactionStatus::Failed;
        record.failure_reason = Some(reason.to_string());
        Ok(record.clone())
    }
}
