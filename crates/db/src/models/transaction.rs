//! Transaction entity model and DTOs.
//!
//! Rows are created `pending` and transition exactly once to `completed`
//! or `failed`; there is no update DTO by design.

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;

use securebank_core::types::{DbId, Timestamp};

/// Full transaction row from the `transactions` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Transaction {
    pub id: DbId,
    pub reference_number: String,
    pub from_account_id: DbId,
    pub to_account_id: DbId,
    pub amount: Decimal,
    pub currency: String,
    pub description: Option<String>,
    /// `pending`, `completed`, or `failed`.
    pub status: String,
    pub failure_reason: Option<String>,
    pub idempotency_key: Option<String>,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

/// DTO for creating a pending transaction.
pub struct CreateTransaction {
    pub reference_number: String,
    pub from_account_id: DbId,
    pub to_account_id: DbId,
    pub amount: Decimal,
    pub currency: String,
    pub description: Option<String>,
    pub idempotency_key: Option<String>,
}
