//! Handlers for the `/accounts` resource.
//!
//! All endpoints are owner-scoped: an account that exists but belongs to
//! someone else answers 404, not 403, so account ids cannot be probed.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use securebank_core::error::CoreError;
use securebank_core::types::DbId;
use securebank_db::models::account::{Account, AccountResponse, CreateAccount};
use securebank_db::models::transaction::Transaction;
use securebank_db::repositories::{AccountRepo, TransactionRepo};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::state::AppState;

/// Default page size for transaction listings.
const DEFAULT_TRANSACTION_LIMIT: i64 = 50;
/// Hard cap on transaction listing size.
const MAX_TRANSACTION_LIMIT: i64 = 200;

/// Query parameters for `GET /accounts/{id}/transactions`.
#[derive(Debug, Deserialize)]
pub struct TransactionListQuery {
    pub limit: Option<i64>,
}

/// Request body for `POST /accounts`.
#[derive(Debug, Deserialize)]
pub struct OpenAccountRequest {
    /// ISO currency code. Defaults to `USD`.
    pub currency: Option<String>,
}

/// POST /api/v1/accounts
///
/// Open a new account for the authenticated user with a zero balance and a
/// generated account number.
pub async fn open_account(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(input): Json<OpenAccountRequest>,
) -> AppResult<(StatusCode, Json<AccountResponse>)> {
    let currency = input.currency.unwrap_or_else(|| "USD".to_string());
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(AppError::Core(CoreError::Validation(
            "Currency must be a 3-letter ISO code".into(),
        )));
    }

    let account = AccountRepo::create(
        &state.pool,
        &CreateAccount {
            owner_user_id: auth_user.user_id,
            account_number: generate_account_number(),
            balance: Decimal::ZERO,
            currency,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(AccountResponse::from(&account))))
}

/// Generate a customer-visible account number, e.g. `SB-6F9619FF8B`.
fn generate_account_number() -> String {
    let id = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("SB-{}", &id[..10])
}

/// GET /api/v1/accounts
///
/// List the authenticated user's accounts.
pub async fn list_accounts(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<Vec<AccountResponse>>> {
    let accounts = AccountRepo::list_for_user(&state.pool, auth_user.user_id).await?;
    Ok(Json(accounts.iter().map(AccountResponse::from).collect()))
}

/// GET /api/v1/accounts/{id}
pub async fn get_account(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<Json<AccountResponse>> {
    let account = load_owned_account(&state, &auth_user, id).await?;
    Ok(Json(AccountResponse::from(&account)))
}

/// GET /api/v1/accounts/{id}/transactions
///
/// List transactions touching the account (either side), newest first.
pub async fn list_account_transactions(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<DbId>,
    Query(query): Query<TransactionListQuery>,
) -> AppResult<Json<Vec<Transaction>>> {
    let account = load_owned_account(&state, &auth_user, id).await?;

    let limit = query
        .limit
        .unwrap_or(DEFAULT_TRANSACTION_LIMIT)
        .clamp(1, MAX_TRANSACTION_LIMIT);
    let transactions = TransactionRepo::list_for_account(&state.pool, account.id, limit).await?;
    Ok(Json(transactions))
}

/// Load an account and enforce ownership. Admins see every account;
/// everyone else gets 404 for accounts they do not own.
pub(crate) async fn load_owned_account(
    state: &AppState,
    auth_user: &AuthUser,
    id: DbId,
) -> Result<Account, AppError> {
    let account = AccountRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::AccountNotFound(id)))?;

    if account.owner_user_id != auth_user.user_id && !auth_user.is_admin() {
        return Err(AppError::Core(CoreError::AccountNotFound(id)));
    }
    Ok(account)
}
