//! Account entity model and DTOs.

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;

use securebank_core::types::{DbId, Timestamp};

/// Full account row from the `accounts` table.
#[derive(Debug, Clone, FromRow)]
pub struct Account {
    pub id: DbId,
    pub owner_user_id: DbId,
    pub account_number: String,
    pub balance: Decimal,
    pub currency: String,
    /// `active`, `frozen`, or `closed`.
    pub status: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Account representation for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct AccountResponse {
    pub id: DbId,
    pub account_number: String,
    pub balance: Decimal,
    pub currency: String,
    pub status: String,
    pub created_at: Timestamp,
}

impl From<&Account> for AccountResponse {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            account_number: account.account_number.clone(),
            balance: account.balance,
            currency: account.currency.clone(),
            status: account.status.clone(),
            created_at: account.created_at,
        }
    }
}

/// DTO for creating a new account.
pub struct CreateAccount {
    pub owner_user_id: DbId,
    pub account_number: String,
    pub balance: Decimal,
    pub currency: String,
}
