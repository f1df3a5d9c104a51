pub mod accounts;
pub mod audit;
pub mod auth;
pub mod health;
pub mod transfers;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /auth/login                    login (public, rate limited)
/// /auth/refresh                  refresh (public)
/// /auth/logout                   logout this session (requires auth)
/// /auth/logout-all               logout every session (requires auth)
///
/// /accounts                      list my accounts (GET), open one (POST)
/// /accounts/{id}                 get one account
/// /accounts/{id}/transactions    account transaction history
///
/// /transfers                     create a transfer (POST)
/// /transfers/{reference}         get a transfer by reference
///
/// /admin/audit                   audit log listing (admin only)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/accounts", accounts::router())
        .nest("/transfers", transfers::router())
        .nest("/admin/audit", audit::router())
}
