//! Repository for the `transactions` table.

use sqlx::PgPool;

use securebank_core::types::{DbId, Timestamp};

use crate::models::transaction::{CreateTransaction, Transaction};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, reference_number, from_account_id, to_account_id, amount, \
                        currency, description, status, failure_reason, idempotency_key, \
                        created_at, completed_at";

/// Provides insert and single-transition updates for transactions.
pub struct TransactionRepo;

impl TransactionRepo {
    /// Insert a new `pending` transaction, returning the created row.
    pub async fn create_pending(
        pool: &PgPool,
        input: &CreateTransaction,
    ) -> Result<Transaction, sqlx::Error> {
        let query = format!(
            "INSERT INTO transactions (reference_number, from_account_id, to_account_id,
                                       amount, currency, description, idempotency_key)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Transaction>(&query)
            .bind(&input.reference_number)
            .bind(input.from_account_id)
            .bind(input.to_account_id)
            .bind(input.amount)
            .bind(&input.currency)
            .bind(&input.description)
            .bind(&input.idempotency_key)
            .fetch_one(pool)
            .await
    }

    /// Find a transaction by its public reference number.
    pub async fn find_by_reference(
        pool: &PgPool,
        reference: &str,
    ) -> Result<Option<Transaction>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM transactions WHERE reference_number = $1");
        sqlx::query_as::<_, Transaction>(&query)
            .bind(reference)
            .fetch_optional(pool)
            .await
    }

    /// Find the most recent non-failed transaction carrying this idempotency
    /// key. Failed rows are excluded so a failed order can be retried.
    pub async fn find_by_idempotency_key(
        pool: &PgPool,
        key: &str,
    ) -> Result<Option<Transaction>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM transactions
             WHERE idempotency_key = $1 AND status <> 'failed'
             ORDER BY created_at DESC
             LIMIT 1"
        );
        sqlx::query_as::<_, Transaction>(&query)
            .bind(key)
            .fetch_optional(pool)
            .await
    }

    /// Transition a pending transaction to `completed`.
    pub async fn mark_completed(
        pool: &PgPool,
        id: DbId,
        completed_at: Timestamp,
    ) -> Result<Transaction, sqlx::Error> {
        let query = format!(
            "UPDATE transactions SET status = 'completed', completed_at = $2
             WHERE id = $1 AND status = 'pending'
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Transaction>(&query)
            .bind(id)
            .bind(completed_at)
            .fetch_one(pool)
            .await
    }

    /// Transition a pending transaction to `failed` with a reason.
    pub async fn mark_failed(
        pool: &PgPool,
        id: DbId,
        reason: &str,
    ) -> Result<Transaction, sqlx::Error> {
        let query = format!(
            "UPDATE transactions SET status = 'failed', failure_reason = $2
             WHERE id = $1 AND status = 'pending'
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Transaction>(&query)
            .bind(id)
            .bind(reason)
            .fetch_one(pool)
            .await
    }

    /// List transactions touching an account (either side), newest first.
    pub async fn list_for_account(
        pool: &PgPool,
        account_id: DbId,
        limit: i64,
    ) -> Result<Vec<Transaction>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM transactions
             WHERE from_account_id = $1 OR to_account_id = $1
             ORDER BY created_at DESC
             LIMIT $2"
        );
        sqlx::query_as::<_, Transaction>(&query)
            .bind(account_id)
            .bind(limit)
            .fetch_all(pool)
            .await
    }
}
