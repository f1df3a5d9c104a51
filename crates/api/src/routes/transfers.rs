//! Route definitions for the `/transfers` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::transfers;
use crate::state::AppState;

/// Routes mounted at `/transfers`. All require authentication.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(transfers::create_transfer))
        .route("/{reference}", get(transfers::get_transfer))
}
