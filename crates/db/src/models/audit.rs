//! Audit log entity model and DTOs.
//!
//! Audit rows are immutable once created (no `updated_at`) and chained via
//! `integrity_hash` for tamper evidence.

use serde::Serialize;
use sqlx::FromRow;

use securebank_core::types::{DbId, Timestamp};

/// A single audit log entry.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AuditLog {
    pub id: DbId,
    pub actor_user_id: Option<DbId>,
    pub action: String,
    pub category: String,
    pub resource: Option<String>,
    pub resource_id: Option<String>,
    pub details_json: serde_json::Value,
    /// `success` or `failure`.
    pub status: String,
    pub integrity_hash: String,
    pub occurred_at: Timestamp,
    pub created_at: Timestamp,
}

/// DTO for inserting a new audit log entry.
#[derive(Debug, Clone)]
pub struct CreateAuditLog {
    pub actor_user_id: Option<DbId>,
    pub action: String,
    pub category: String,
    pub resource: Option<String>,
    pub resource_id: Option<String>,
    pub details_json: serde_json::Value,
    pub status: String,
    pub integrity_hash: String,
    pub occurred_at: Timestamp,
}
