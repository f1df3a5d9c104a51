//! Atomic funds transfer between two accounts.
//!
//! The engine never locks: each balance write is a compare-and-set against
//! the value originally read, and a lost race retries the whole
//! read-validate-write cycle a bounded number of times. When the second
//! write of a pair loses, the first is compensated before retrying, so no
//! outcome ever leaves only the debit or only the credit applied. The
//! `pending` transaction row is created before any balance write and is the
//! idempotency anchor for client retries.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use uuid::Uuid;

use securebank_core::audit::{actions, AuditEvent, AuditSink};
use securebank_core::clock::Clock;
use securebank_core::error::CoreError;
use securebank_core::money::validate_amount;
use securebank_core::types::DbId;

use crate::store::{
    Account, AccountStatus, AccountStore, NewTransaction, TransactionLog, TransactionRecord,
};

// ---------------------------------------------------------------------------
// Configuration and request
// ---------------------------------------------------------------------------

/// Tunable transfer parameters.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Full-cycle retries before surfacing `ConcurrentModification`.
    pub max_retries: u32,
    /// Backoff between retry cycles.
    pub retry_backoff: Duration,
    /// Attempts to undo an applied write when its sibling loses the race.
    pub compensation_retries: u32,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff: Duration::from_millis(25),
            compensation_retries: 5,
        }
    }
}

/// A transfer order.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub from_account_id: DbId,
    pub to_account_id: DbId,
    pub amount: Decimal,
    pub description: Option<String>,
    /// Client-supplied key: retries carrying the same key return the
    /// original transaction instead of applying the transfer again.
    pub idempotency_key: Option<String>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Performs atomic balance movement with idempotency and audit emission.
pub struct TransferEngine {
    accounts: Arc<dyn AccountStore>,
    log: Arc<dyn TransactionLog>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    config: TransferConfig,
}

impl TransferEngine {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        log: Arc<dyn TransactionLog>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        config: TransferConfig,
    ) -> Self {
        Self {
            accounts,
            log,
            audit,
            clock,
            config,
        }
    }

    /// Move `amount` from one account to another.
    ///
    /// Validation order: amount, self-transfer guard, idempotency replay,
    /// account existence/status/currency/funds -- all before any mutation.
    /// On success the returned record is `completed`; every failure after
    /// the pending row exists marks it `failed` with a reason.
    pub async fn transfer(&self, request: TransferRequest) -> Result<TransactionRecord, CoreError> {
        // Cheap validations first: rejected before any account read.
        validate_amount(request.amount)?;
        if request.from_account_id == request.to_account_id {
            return Err(CoreError::InvalidOperation(
                "Cannot transfer between an account and itself".to_string(),
            ));
        }

        // Idempotency replay: a pending or completed record under the same
        // key means the order was already accepted. Failed records do not
        // block a retry.
        if let Some(key) = &request.idempotency_key {
            if let Some(existing) = self.log.find_by_idempotency_key(key).await? {
                tracing::debug!(
                    reference = %existing.reference_number,
                    "Idempotent replay, returning existing transaction"
                );
                return Ok(existing);
            }
        }

        // First read + validation pass, before the pending row is created.
        let (from, _to) = self.read_and_validate(&request).await?;

        let record = self
            .log
            .create_pending(NewTransaction {
                reference_number: generate_reference(),
                from_account_id: request.from_account_id,
                to_account_id: request.to_account_id,
                amount: request.amount,
                currency: from.currency.clone(),
                description: request.description.clone(),
                idempotency_key: request.idempotency_key.clone(),
            })
            .await?;

        match self.apply_with_retries(&request).await {
            Ok(()) => {
                let completed = self
                    .log
                    .mark_completed(record.id, self.clock.now())
                    .await?;
                self.audit.emit(
                    AuditEvent::new(actions::TRANSFER_COMPLETED)
                        .with_resource("transaction", &completed.reference_number)
                        .with_details(serde_json::json!({
                            "from_account_id": completed.from_account_id,
                            "to_account_id": completed.to_account_id,
                            "amount": completed.amount.to_string(),
                            "currency": completed.currency,
                        })),
                );
                Ok(completed)
            }
            Err(e) => {
                // Best-effort terminal marking; the typed error wins if both fail.
                if let Err(mark_err) = self.log.mark_failed(record.id, &e.to_string()).await {
                    tracing::error!(
                        error = %mark_err,
                        reference = %record.reference_number,
                        "Failed to mark transaction as failed"
                    );
                }
                self.audit.emit(
                    AuditEvent::new(actions::TRANSFER_FAILED)
                        .with_resource("transaction", &record.reference_number)
                        .with_details(serde_json::json!({
                            "from_account_id": record.from_account_id,
                            "to_account_id": record.to_account_id,
                            "amount": record.amount.to_string(),
                            "reason": e.to_string(),
                        }))
                        .failed(),
                );
                Err(e)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Read both accounts and run the full validation set against current
    /// state. Returns the fresh `(from, to)` pair.
    async fn read_and_validate(
        &self,
        request: &TransferRequest,
    ) -> Result<(Account, Account), CoreError> {
        let from = self
            .accounts
            .get(request.from_account_id)
            .await?
            .ok_or(CoreError::AccountNotFound(request.from_account_id))?;
        let to = self
            .accounts
            .get(request.to_account_id)
            .await?
            .ok_or(CoreError::AccountNotFound(request.to_account_id))?;

        if from.status != AccountStatus::Active {
            return Err(CoreError::AccountFrozen(from.id));
        }
        if to.status != AccountStatus::Active {
            return Err(CoreError::AccountFrozen(to.id));
        }
        if from.currency != to.currency {
            return Err(CoreError::CurrencyMismatch {
                from: from.currency,
                to: to.currency,
            });
        }
        if from.balance < request.amount {
            return Err(CoreError::InsufficientFunds {
                account_id: from.id,
                available: from.balance,
                requested: request.amount,
            });
        }

        Ok((from, to))
    }

    /// The optimistic write loop: each cycle re-reads, re-validates, and
    /// applies both conditional writes in canonical (lower account id first)
    /// order. A lost race backs off and retries the whole cycle.
    async fn apply_with_retries(&self, request: &TransferRequest) -> Result<(), CoreError> {
        for attempt in 1..=self.config.max_retries {
            let (from, to) = self.read_and_validate(request).await?;

            let writes = plan_writes(&from, &to, request.amount);

            let first_applied = self
                .accounts
                .compare_and_set_balance(writes[0].account_id, writes[0].expected, writes[0].new)
                .await?;
            if !first_applied {
                self.backoff(attempt).await;
                continue;
            }

            let second_applied = self
                .accounts
                .compare_and_set_balance(writes[1].account_id, writes[1].expected, writes[1].new)
                .await?;
            if second_applied {
                return Ok(());
            }

            // Half-applied: undo the first write before the next cycle.
            self.compensate(&writes[0]).await?;
            self.backoff(attempt).await;
        }

        Err(CoreError::ConcurrentModification {
            attempts: self.config.max_retries,
        })
    }

    /// Undo an applied conditional write by re-applying its delta in
    /// reverse. The account may have moved on since our write, so the undo
    /// is itself a compare-and-set loop against fresh reads.
    async fn compensate(&self, write: &PlannedWrite) -> Result<(), CoreError> {
        let delta = write.expected - write.new; // reverse of what we applied
        for _ in 0..self.config.compensation_retries {
            let account = self
                .accounts
                .get(write.account_id)
                .await?
                .ok_or(CoreError::AccountNotFound(write.account_id))?;
            let restored = account.balance + delta;
            if self
                .accounts
                .compare_and_set_balance(write.account_id, account.balance, restored)
                .await?
            {
                return Ok(());
            }
        }
        // Exhausted: surface loudly. The pending row plus this log line is
        // the recovery evidence for operators.
        tracing::error!(
            account_id = write.account_id,
            "Compensation retries exhausted, balance left modified"
        );
        Err(CoreError::Internal(format!(
            "Failed to compensate write on account {}",
            write.account_id
        )))
    }

    async fn backoff(&self, attempt: u32) {
        tokio::time::sleep(self.config.retry_backoff * attempt).await;
    }
}

// ---------------------------------------------------------------------------
// Write planning
// ---------------------------------------------------------------------------

/// One conditional balance write.
#[derive(Debug, Clone)]
struct PlannedWrite {
    account_id: DbId,
    expected: Decimal,
    new: Decimal,
}

/// Plan the debit/credit pair in canonical order: the account with the
/// lower id is always written first, so two transfers crossing between the
/// same pair of accounts contend in the same order instead of interleaving.
fn plan_writes(from: &Account, to: &Account, amount: Decimal) -> [PlannedWrite; 2] {
    let debit = PlannedWrite {
        account_id: from.id,
        expected: from.balance,
        new: from.balance - amount,
    };
    let credit = PlannedWrite {
        account_id: to.id,
        expected: to.balance,
        new: to.balance + amount,
    };
    if from.id < to.id {
        [debit, credit]
    } else {
        [credit, debit]
    }
}

/// Generate a human-readable transaction reference, e.g. `TXN-6F9619FF8B86`.
fn generate_reference() -> String {
    let id = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("TXN-{}", &id[..12])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    use crate::memory::{
        CollectingAuditSink, InMemoryAccountStore, InMemoryTransactionLog, ManualClock,
    };
    use crate::store::TransactionStatus;

    struct Fixture {
        engine: TransferEngine,
        accounts: Arc<InMemoryAccountStore>,
        log: Arc<InMemoryTransactionLog>,
        audit: Arc<CollectingAuditSink>,
    }

    fn fixture() -> Fixture {
        fixture_with_accounts(Arc::new(InMemoryAccountStore::new()))
    }

    fn fixture_with_accounts(accounts: Arc<InMemoryAccountStore>) -> Fixture {
        let log = Arc::new(InMemoryTransactionLog::new());
        let audit = Arc::new(CollectingAuditSink::new());
        let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
        let engine = TransferEngine::new(
            accounts.clone(),
            log.clone(),
            audit.clone(),
            clock,
            TransferConfig {
                retry_backoff: Duration::from_millis(1),
                ..TransferConfig::default()
            },
        );
        Fixture {
            engine,
            accounts,
            log,
            audit,
        }
    }

    fn account(id: DbId, balance: Decimal) -> Account {
        Account {
            id,
            balance,
            currency: "USD".to_string(),
            status: AccountStatus::Active,
        }
    }

    fn request(from: DbId, to: DbId, amount: Decimal) -> TransferRequest {
        TransferRequest {
            from_account_id: from,
            to_account_id: to,
            amount,
            description: None,
            idempotency_key: None,
        }
    }

    #[tokio::test]
    async fn transfer_moves_funds_and_completes() {
        let f = fixture();
        f.accounts.put(account(1, dec!(100.00)));
        f.accounts.put(account(2, dec!(0.00)));

        let record = f
            .engine
            .transfer(request(1, 2, dec!(40.00)))
            .await
            .expect("transfer should succeed");

        assert_eq!(record.status, TransactionStatus::Completed);
        assert!(record.completed_at.is_some());
        assert!(record.reference_number.starts_with("TXN-"));
        assert_eq!(f.accounts.balance_of(1), dec!(60.00));
        assert_eq!(f.accounts.balance_of(2), dec!(40.00));
        assert_eq!(f.audit.count_action(actions::TRANSFER_COMPLETED), 1);
    }

    #[tokio::test]
    async fn insufficient_funds_rejects_without_mutation() {
        let f = fixture();
        f.accounts.put(account(1, dec!(10.00)));
        f.accounts.put(account(2, dec!(0.00)));

        let result = f.engine.transfer(request(1, 2, dec!(40.00))).await;

        assert_matches!(
            result,
            Err(CoreError::InsufficientFunds { available, requested, .. })
                if available == dec!(10.00) && requested == dec!(40.00)
        );
        assert_eq!(f.accounts.balance_of(1), dec!(10.00));
        assert_eq!(f.accounts.balance_of(2), dec!(0.00));
    }

    #[tokio::test]
    async fn non_positive_amount_rejected_before_any_read() {
        let f = fixture();
        f.accounts.put(account(1, dec!(100.00)));
        f.accounts.put(account(2, dec!(0.00)));

        let result = f.engine.transfer(request(1, 2, dec!(0.00))).await;
        assert_matches!(result, Err(CoreError::InvalidAmount(_)));

        let result = f.engine.transfer(request(1, 2, dec!(-5.00))).await;
        assert_matches!(result, Err(CoreError::InvalidAmount(_)));

        assert_eq!(f.accounts.read_count(), 0, "no account read before validation");
        assert!(f.log.records().is_empty());
    }

    #[tokio::test]
    async fn self_transfer_rejected() {
        let f = fixture();
        f.accounts.put(account(1, dec!(100.00)));

        let result = f.engine.transfer(request(1, 1, dec!(10.00))).await;

        assert_matches!(result, Err(CoreError::InvalidOperation(_)));
        assert_eq!(f.accounts.read_count(), 0);
        assert_eq!(f.accounts.balance_of(1), dec!(100.00));
    }

    #[tokio::test]
    async fn missing_accounts_are_reported() {
        let f = fixture();
        f.accounts.put(account(1, dec!(100.00)));

        let result = f.engine.transfer(request(1, 99, dec!(10.00))).await;
        assert_matches!(result, Err(CoreError::AccountNotFound(99)));

        let result = f.engine.transfer(request(98, 1, dec!(10.00))).await;
        assert_matches!(result, Err(CoreError::AccountNotFound(98)));
    }

    #[tokio::test]
    async fn frozen_account_cannot_move_money() {
        let f = fixture();
        f.accounts.put(Account {
            status: AccountStatus::Frozen,
            ..account(1, dec!(100.00))
        });
        f.accounts.put(account(2, dec!(0.00)));

        let result = f.engine.transfer(request(1, 2, dec!(10.00))).await;
        assert_matches!(result, Err(CoreError::AccountFrozen(1)));

        let result = f.engine.transfer(request(2, 1, dec!(10.00))).await;
        assert_matches!(result, Err(CoreError::AccountFrozen(1)));
    }

    #[tokio::test]
    async fn currency_mismatch_is_rejected() {
        let f = fixture();
        f.accounts.put(account(1, dec!(100.00)));
        f.accounts.put(Account {
            currency: "EUR".to_string(),
            ..account(2, dec!(0.00))
        });

        let result = f.engine.transfer(request(1, 2, dec!(10.00))).await;
        assert_matches!(result, Err(CoreError::CurrencyMismatch { .. }));
    }

    #[tokio::test]
    async fn idempotency_key_replays_instead_of_reapplying() {
        let f = fixture();
        f.accounts.put(account(1, dec!(100.00)));
        f.accounts.put(account(2, dec!(0.00)));

        let mut req = request(1, 2, dec!(40.00));
        req.idempotency_key = Some("order-123".to_string());

        let first = f.engine.transfer(req.clone()).await.unwrap();
        let second = f.engine.transfer(req).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.reference_number, second.reference_number);
        // Applied exactly once.
        assert_eq!(f.accounts.balance_of(1), dec!(60.00));
        assert_eq!(f.accounts.balance_of(2), dec!(40.00));
        assert_eq!(f.log.records().len(), 1);
    }

    #[tokio::test]
    async fn failed_transaction_does_not_block_idempotent_retry() {
        let f = fixture();
        f.accounts.put(account(1, dec!(10.00)));
        f.accounts.put(account(2, dec!(0.00)));

        let mut req = request(1, 2, dec!(40.00));
        req.idempotency_key = Some("order-456".to_string());

        // First attempt fails on funds (no record is created: validation
        // failed before the pending row).
        let result = f.engine.transfer(req.clone()).await;
        assert_matches!(result, Err(CoreError::InsufficientFunds { .. }));

        // Top up and retry under the same key: must apply.
        f.accounts.put(account(1, dec!(100.00)));
        let record = f.engine.transfer(req).await.unwrap();
        assert_eq!(record.status, TransactionStatus::Completed);
        assert_eq!(f.accounts.balance_of(2), dec!(40.00));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_transfers_drain_account_to_exactly_zero() {
        const N: usize = 8;
        let accounts = Arc::new(InMemoryAccountStore::new());
        accounts.put(account(1, dec!(100.00)));
        accounts.put(account(2, dec!(0.00)));

        let log = Arc::new(InMemoryTransactionLog::new());
        // A retry bound far above the contention level: every order must
        // eventually land, and the drain must be exact.
        let engine = Arc::new(TransferEngine::new(
            accounts.clone(),
            log,
            Arc::new(CollectingAuditSink::new()),
            Arc::new(ManualClock::new(chrono::Utc::now())),
            TransferConfig {
                max_retries: 100,
                retry_backoff: Duration::from_millis(1),
                compensation_retries: 5,
            },
        ));

        // 8 concurrent transfers of 12.50 from a balance of exactly 100.00.
        let mut handles = Vec::new();
        for _ in 0..N {
            let engine = Arc::clone(&engine);
            handles.push(tokio::spawn(async move {
                engine.transfer(request(1, 2, dec!(12.50))).await
            }));
        }

        for handle in handles {
            let record = handle
                .await
                .expect("task must not panic")
                .expect("every transfer must eventually land");
            assert_eq!(record.status, TransactionStatus::Completed);
        }

        // No lost updates and no overdraft: exactly drained.
        assert_eq!(accounts.balance_of(1), dec!(0.00));
        assert_eq!(accounts.balance_of(2), dec!(100.00));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn crossing_transfers_between_same_pair_preserve_total() {
        let accounts = Arc::new(InMemoryAccountStore::new());
        accounts.put(account(1, dec!(500.00)));
        accounts.put(account(2, dec!(500.00)));

        let f = Arc::new(fixture_with_accounts(accounts.clone()));

        let mut handles = Vec::new();
        for i in 0..10 {
            let f = Arc::clone(&f);
            // Alternate direction: 1->2 and 2->1 interleaved.
            let (from, to) = if i % 2 == 0 { (1, 2) } else { (2, 1) };
            handles.push(tokio::spawn(async move {
                f.engine.transfer(request(from, to, dec!(25.00))).await
            }));
        }
        for handle in handles {
            let _ = handle.await.expect("task must not panic");
        }

        assert_eq!(
            accounts.balance_of(1) + accounts.balance_of(2),
            dec!(1000.00),
            "money is neither created nor destroyed"
        );
    }

    // -----------------------------------------------------------------------
    // Contention and failure paths
    // -----------------------------------------------------------------------

    /// Account store whose conditional writes always lose, as if another
    /// writer beats us on every attempt.
    struct AlwaysContendedStore {
        inner: InMemoryAccountStore,
    }

    #[async_trait]
    impl AccountStore for AlwaysContendedStore {
        async fn get(&self, id: DbId) -> Result<Option<Account>, CoreError> {
            self.inner.get(id).await
        }
        async fn compare_and_set_balance(
            &self,
            _id: DbId,
            _expected: Decimal,
            _new: Decimal,
        ) -> Result<bool, CoreError> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn exhausted_retries_surface_concurrent_modification() {
        let inner = InMemoryAccountStore::new();
        inner.put(account(1, dec!(100.00)));
        inner.put(account(2, dec!(0.00)));
        let accounts = Arc::new(AlwaysContendedStore { inner });

        let log = Arc::new(InMemoryTransactionLog::new());
        let audit = Arc::new(CollectingAuditSink::new());
        let engine = TransferEngine::new(
            accounts,
            log.clone(),
            audit.clone(),
            Arc::new(ManualClock::new(chrono::Utc::now())),
            TransferConfig {
                max_retries: 3,
                retry_backoff: Duration::from_millis(1),
                compensation_retries: 5,
            },
        );

        let result = engine.transfer(request(1, 2, dec!(10.00))).await;

        assert_matches!(result, Err(CoreError::ConcurrentModification { attempts: 3 }));

        // The pending row was created and marked failed: crash evidence.
        let records = log.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, TransactionStatus::Failed);
        assert!(records[0].failure_reason.as_deref().unwrap().contains("retries"));
        assert_eq!(audit.count_action(actions::TRANSFER_FAILED), 1);
    }

    /// Store that fails the Nth conditional write once, then delegates.
    /// Exercises the compensation path: the first write of the pair lands,
    /// the second loses, and the engine must undo the first before retrying.
    struct SecondWriteLosesOnce {
        inner: InMemoryAccountStore,
        cas_calls: std::sync::atomic::AtomicU32,
    }

    #[async_trait]
    impl AccountStore for SecondWriteLosesOnce {
        async fn get(&self, id: DbId) -> Result<Option<Account>, CoreError> {
            self.inner.get(id).await
        }
        async fn compare_and_set_balance(
            &self,
            id: DbId,
            expected: Decimal,
            new: Decimal,
        ) -> Result<bool, CoreError> {
            let call = self
                .cas_calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if call == 1 {
                // Second CAS of the first cycle loses.
                return Ok(false);
            }
            self.inner.compare_and_set_balance(id, expected, new).await
        }
    }

    #[tokio::test]
    async fn lost_second_write_is_compensated_then_retried() {
        let inner = InMemoryAccountStore::new();
        inner.put(account(1, dec!(100.00)));
        inner.put(account(2, dec!(0.00)));
        let accounts = Arc::new(SecondWriteLosesOnce {
            inner,
            cas_calls: std::sync::atomic::AtomicU32::new(0),
        });

        let log = Arc::new(InMemoryTransactionLog::new());
        let audit = Arc::new(CollectingAuditSink::new());
        let engine = TransferEngine::new(
            accounts.clone(),
            log.clone(),
            audit,
            Arc::new(ManualClock::new(chrono::Utc::now())),
            TransferConfig {
                max_retries: 3,
                retry_backoff: Duration::from_millis(1),
                compensation_retries: 5,
            },
        );

        let record = engine
            .transfer(request(1, 2, dec!(40.00)))
            .await
            .expect("second cycle should succeed");

        assert_eq!(record.status, TransactionStatus::Completed);
        // End state is exactly one application of the transfer.
        assert_eq!(accounts.inner.balance_of(1), dec!(60.00));
        assert_eq!(accounts.inner.balance_of(2), dec!(40.00));
    }

    #[tokio::test]
    async fn canonical_write_order_is_by_account_id() {
        let from = account(7, dec!(100.00));
        let to = account(3, dec!(50.00));

        let writes = plan_writes(&from, &to, dec!(10.00));

        // The lower id (the credit side here) is written first.
        assert_eq!(writes[0].account_id, 3);
        assert_eq!(writes[0].new, dec!(60.00));
        assert_eq!(writes[1].account_id, 7);
        assert_eq!(writes[1].new, dec!(90.00));
    }
}
