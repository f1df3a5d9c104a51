//! Repository for the `audit_log` table.

use sqlx::PgPool;

use securebank_core::types::DbId;

use crate::models::audit::{AuditLog, CreateAuditLog};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, actor_user_id, action, category, resource, resource_id, \
                        details_json, status, integrity_hash, occurred_at, created_at";

/// Provides insert and query operations for audit log entries.
pub struct AuditLogRepo;

impl AuditLogRepo {
    /// Insert a new entry, returning the created row.
    pub async fn create(pool: &PgPool, input: &CreateAuditLog) -> Result<AuditLog, sqlx::Error> {
        let query = format!(
            "INSERT INTO audit_log (actor_user_id, action, category, resource, resource_id,
                                    details_json, status, integrity_hash, occurred_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AuditLog>(&query)
            .bind(input.actor_user_id)
            .bind(&input.action)
            .bind(&input.category)
            .bind(&input.resource)
            .bind(&input.resource_id)
            .bind(&input.details_json)
            .bind(&input.status)
            .bind(&input.integrity_hash)
            .bind(input.occurred_at)
            .fetch_one(pool)
            .await
    }

    /// Integrity hash of the most recent entry, or `None` for an empty log.
    /// The next entry chains from this value.
    pub async fn last_integrity_hash(pool: &PgPool) -> Result<Option<String>, sqlx::Error> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT integrity_hash FROM audit_log ORDER BY id DESC LIMIT 1")
                .fetch_optional(pool)
                .await?;
        Ok(row.map(|r| r.0))
    }

    /// List the most recent entries, newest first.
    pub async fn list_recent(pool: &PgPool, limit: i64) -> Result<Vec<AuditLog>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM audit_log
             ORDER BY occurred_at DESC
             LIMIT $1"
        );
        sqlx::query_as::<_, AuditLog>(&query)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// List the most recent entries for an actor, newest first.
    pub async fn list_for_actor(
        pool: &PgPool,
        actor_user_id: DbId,
        limit: i64,
    ) -> Result<Vec<AuditLog>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM audit_log
             WHERE actor_user_id = $1
             ORDER BY occurred_at DESC
             LIMIT $2"
        );
        sqlx::query_as::<_, AuditLog>(&query)
            .bind(actor_user_id)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// List the most recent entries with a given action, newest first.
    pub async fn list_for_action(
        pool: &PgPool,
        action: &str,
        limit: i64,
    ) -> Result<Vec<AuditLog>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM audit_log
             WHERE action = $1
             ORDER BY occurred_at DESC
             LIMIT $2"
        );
        sqlx::query_as::<_, AuditLog>(&query)
            .bind(action)
            .bind(limit)
            .fetch_all(pool)
            .await
    }
}
