//! Handlers for the `/admin/audit` resource (admin-only audit log access).

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use securebank_core::error::CoreError;
use securebank_core::types::DbId;
use securebank_db::models::audit::AuditLog;
use securebank_db::repositories::AuditLogRepo;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::state::AppState;

/// Default page size for audit listings.
const DEFAULT_AUDIT_LIMIT: i64 = 100;
/// Hard cap on audit listing size.
const MAX_AUDIT_LIMIT: i64 = 500;

/// Query parameters for `GET /admin/audit`.
#[derive(Debug, Deserialize)]
pub struct AuditListQuery {
    /// Filter by acting user.
    pub actor_user_id: Option<DbId>,
    /// Filter by action name (e.g. `login_failed`).
    pub action: Option<String>,
    pub limit: Option<i64>,
}

/// GET /api/v1/admin/audit
///
/// List recent audit log entries, optionally filtered by actor or action.
/// Admin only.
pub async fn list_audit_log(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<AuditListQuery>,
) -> AppResult<Json<Vec<AuditLog>>> {
    if !auth_user.is_admin() {
        return Err(AppError::Core(CoreError::Forbidden(
            "Admin role required".into(),
        )));
    }

    let limit = query
        .limit
        .unwrap_or(DEFAULT_AUDIT_LIMIT)
        .clamp(1, MAX_AUDIT_LIMIT);

    let entries = match (query.actor_user_id, query.action) {
        (Some(actor), _) => AuditLogRepo::list_for_actor(&state.pool, actor, limit).await?,
        (None, Some(action)) => AuditLogRepo::list_for_action(&state.pool, &action, limit).await?,
        (None, None) => AuditLogRepo::list_recent(&state.pool, limit).await?,
    };

    Ok(Json(entries))
}
