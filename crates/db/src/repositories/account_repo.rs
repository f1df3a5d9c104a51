//! Repository for the `accounts` table.
//!
//! The balance column has exactly one mutation path:
//! [`AccountRepo::compare_and_set_balance`], a conditional UPDATE whose
//! WHERE clause carries the expected balance. Per-account mutual exclusion
//! falls out of the row-level atomicity of that statement.

use rust_decimal::Decimal;
use sqlx::PgPool;

use securebank_core::types::DbId;

use crate::models::account::{Account, CreateAccount};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, owner_user_id, account_number, balance, currency, \
                        status, created_at, updated_at";

/// Provides CRUD operations and the conditional balance write for accounts.
pub struct AccountRepo;

impl AccountRepo {
    /// Insert a new account, returning the created row.
    pub async fn create(pool: &PgPool, input: &CreateAccount) -> Result<Account, sqlx::Error> {
        let query = format!(
            "INSERT INTO accounts (owner_user_id, account_number, balance, currency)
             VALUES ($1, $2, $3, $4)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Account>(&query)
            .bind(input.owner_user_id)
            .bind(&input.account_number)
            .bind(input.balance)
            .bind(&input.currency)
            .fetch_one(pool)
            .await
    }

    /// Find an account by internal ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Account>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM accounts WHERE id = $1");
        sqlx::query_as::<_, Account>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List all accounts owned by a user, oldest first.
    pub async fn list_for_user(pool: &PgPool, user_id: DbId) -> Result<Vec<Account>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM accounts WHERE owner_user_id = $1 ORDER BY created_at"
        );
        sqlx::query_as::<_, Account>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    /// Atomically set the balance to `new` if it still equals `expected`.
    ///
    /// Returns `false` when the precondition failed (a concurrent writer
    /// changed the balance since it was read).
    pub async fn compare_and_set_balance(
        pool: &PgPool,
        id: DbId,
        expected: Decimal,
        new: Decimal,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE accounts SET balance = $3, updated_at = NOW()
             WHERE id = $1 AND balance = $2",
        )
        .bind(id)
        .bind(expected)
        .bind(new)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Update account status (`active`, `frozen`, `closed`). Returns `true`
    /// if the row was updated.
    pub async fn set_status(pool: &PgPool, id: DbId, status: &str) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE accounts SET status = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(status)
                .execute(pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}
