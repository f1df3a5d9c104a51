//! Route definitions for the `/admin/audit` resource.

use axum::routing::get;
use axum::Router;

use crate::handlers::audit;
use crate::state::AppState;

/// Routes mounted at `/admin/audit`. Admin only.
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(audit::list_audit_log))
}
