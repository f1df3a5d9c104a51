//! Route definitions for the `/accounts` resource.

use axum::routing::get;
use axum::Router;

use crate::handlers::accounts;
use crate::state::AppState;

/// Routes mounted at `/accounts`. All require authentication.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(accounts::list_accounts).post(accounts::open_account))
        .route("/{id}", get(accounts::get_account))
        .route("/{id}/transactions", get(accounts::list_account_transactions))
}
