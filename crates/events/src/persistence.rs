//! Durable audit event persistence service.
//!
//! [`AuditPersistence`] subscribes to the [`AuditBus`](crate::bus::AuditBus)
//! broadcast channel and writes every received event to the `audit_log`
//! table. It runs as a single long-lived background task, which keeps the
//! integrity hash chain linear (one writer, no concurrent chain forks), and
//! shuts down gracefully when the bus sender is dropped.
//!
//! Writes are best-effort with bounded retry: a persistently failing insert
//! is logged and dropped rather than blocking the queue behind it.

use std::time::Duration;

use tokio::sync::broadcast;

use securebank_core::audit::{
    action_to_category, compute_integrity_hash, redact_sensitive_fields, AuditEvent,
};
use securebank_db::models::audit::CreateAuditLog;
use securebank_db::repositories::AuditLogRepo;
use securebank_db::DbPool;

/// Insert attempts per event before giving up.
const MAX_WRITE_ATTEMPTS: u32 = 3;

/// Pause between failed insert attempts.
const WRITE_RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Background service that persists audit events to the database.
pub struct AuditPersistence;

impl AuditPersistence {
    /// Run the persistence loop.
    ///
    /// Subscribes via the provided `receiver` and persists every event it
    /// receives. The loop exits when the channel is closed (i.e. the
    /// [`AuditBus`](crate::bus::AuditBus) is dropped).
    pub async fn run(pool: DbPool, mut receiver: broadcast::Receiver<AuditEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    Self::persist_with_retry(&pool, &event).await;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(
                        skipped = n,
                        "Audit persistence lagged, some events were not persisted"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Audit bus closed, persistence shutting down");
                    break;
                }
            }
        }
    }

    /// Attempt the insert up to [`MAX_WRITE_ATTEMPTS`] times, then drop the
    /// event with an error log. Audit delivery must never back-pressure the
    /// operations being audited.
    async fn persist_with_retry(pool: &DbPool, event: &AuditEvent) {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            match Self::persist(pool, event).await {
                Ok(()) => return,
                Err(e) if attempt < MAX_WRITE_ATTEMPTS => {
                    tracing::warn!(
                        error = %e,
                        action = %event.action,
                        attempt,
                        "Audit insert failed, retrying"
                    );
                    tokio::time::sleep(WRITE_RETRY_BACKOFF).await;
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        action = %event.action,
                        "Audit insert failed, dropping event"
                    );
                }
            }
        }
    }

    /// Write a single event to the `audit_log` table.
    ///
    /// The stored row carries redacted details and an integrity hash chained
    /// from the previous row's hash.
    async fn persist(pool: &DbPool, event: &AuditEvent) -> Result<(), sqlx::Error> {
        let details = redact_sensitive_fields(&event.details);

        let prev_hash = AuditLogRepo::last_integrity_hash(pool).await?;
        let entry_data = serde_json::json!({
            "action": event.action,
            "actor_user_id": event.actor_user_id,
            "resource": event.resource,
            "resource_id": event.resource_id,
            "details": details,
            "status": event.status.as_str(),
            "occurred_at": event.occurred_at.timestamp_millis(),
        })
        .to_string();
        let integrity_hash = compute_integrity_hash(prev_hash.as_deref(), &entry_data);

        AuditLogRepo::create(
            pool,
            &CreateAuditLog {
                actor_user_id: event.actor_user_id,
                action: event.action.clone(),
                category: action_to_category(&event.action).to_string(),
                resource: event.resource.clone(),
                resource_id: event.resource_id.clone(),
                details_json: details,
                status: event.status.as_str().to_string(),
                integrity_hash,
                occurred_at: event.occurred_at,
            },
        )
        .await?;
        Ok(())
    }
}
