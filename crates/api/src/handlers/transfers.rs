//! Handlers for the `/transfers` resource.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use securebank_core::error::CoreError;
use securebank_core::types::{DbId, Timestamp};
use securebank_db::repositories::{AccountRepo, TransactionRepo};
use securebank_engine::store::{TransactionRecord, TransactionStatus};
use securebank_engine::TransferRequest;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Request body for `POST /transfers`.
#[derive(Debug, Deserialize)]
pub struct CreateTransferRequest {
    pub from_account_id: DbId,
    pub to_account_id: DbId,
    pub amount: Decimal,
    pub description: Option<String>,
}

/// External representation of a transaction.
#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub reference_number: String,
    pub from_account_id: DbId,
    pub to_account_id: DbId,
    pub amount: Decimal,
    pub currency: String,
    pub description: Option<String>,
    pub status: String,
    pub failure_reason: Option<String>,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl From<TransactionRecord> for TransactionResponse {
    fn from(record: TransactionRecord) -> Self {
        Self {
            reference_number: record.reference_number,
            from_account_id: record.from_account_id,
            to_account_id: record.to_account_id,
            amount: record.amount,
            currency: record.currency,
            description: record.description,
            status: record.status.as_str().to_string(),
            failure_reason: record.failure_reason,
            created_at: record.created_at,
            completed_at: record.completed_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/transfers
///
/// Move funds between two accounts. The source account must belong to the
/// authenticated user. An optional `Idempotency-Key` header makes client
/// retries safe: the same key returns the original transaction.
pub async fn create_transfer(
    State(state): State<AppState>,
    auth_user: AuthUser,
    headers: HeaderMap,
    Json(input): Json<CreateTransferRequest>,
) -> AppResult<(StatusCode, Json<TransactionResponse>)> {
    // Ownership gate on the source account before the engine runs.
    let source = AccountRepo::find_by_id(&state.pool, input.from_account_id)
        .await?
        .ok_or(AppError::Core(CoreError::AccountNotFound(
            input.from_account_id,
        )))?;
    if source.owner_user_id != auth_user.user_id && !auth_user.is_admin() {
        return Err(AppError::Core(CoreError::Forbidden(
            "You do not own the source account".into(),
        )));
    }

    let idempotency_key = headers
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .filter(|s| !s.is_empty());

    let record = state
        .transfers
        .transfer(TransferRequest {
            from_account_id: input.from_account_id,
            to_account_id: input.to_account_id,
            amount: input.amount,
            description: input.description,
            idempotency_key,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(TransactionResponse::from(record))))
}

/// GET /api/v1/transfers/{reference}
///
/// Fetch a transaction by its public reference. Visible only to owners of
/// either side of the transfer (and admins); anyone else gets 404.
pub async fn get_transfer(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(reference): Path<String>,
) -> AppResult<Json<TransactionResponse>> {
    let transaction = TransactionRepo::find_by_reference(&state.pool, &reference)
        .await?
        .ok_or_else(|| not_found(&reference))?;

    if !auth_user.is_admin() {
        let owns_side = owns_account(&state, auth_user.user_id, transaction.from_account_id)
            .await?
            || owns_account(&state, auth_user.user_id, transaction.to_account_id).await?;
        if !owns_side {
            return Err(not_found(&reference));
        }
    }

    let record = TransactionRecord {
        id: transaction.id,
        reference_number: transaction.reference_number,
        from_account_id: transaction.from_account_id,
        to_account_id: transaction.to_account_id,
        amount: transaction.amount,
        currency: transaction.currency,
        description: transaction.description,
        status: TransactionStatus::parse(&transaction.status),
        failure_reason: transaction.failure_reason,
        idempotency_key: transaction.idempotency_key,
        created_at: transaction.created_at,
        completed_at: transaction.completed_at,
    };
    Ok(Json(TransactionResponse::from(record)))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn not_found(reference: &str) -> AppError {
    AppError::NotFound(format!("Transaction {reference} not found"))
}

async fn owns_account(
    state: &AppState,
    user_id: DbId,
    account_id: DbId,
) -> Result<bool, AppError> {
    let account = AccountRepo::find_by_id(&state.pool, account_id).await?;
    Ok(account.is_some_and(|a| a.owner_user_id == user_id))
}
