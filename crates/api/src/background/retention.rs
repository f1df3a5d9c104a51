//! Periodic retention sweeps.
//!
//! Two loops on a fixed interval using `tokio::time::interval`:
//! login-attempt pruning (the ledger keeps a 24-hour window) and
//! expired/revoked session cleanup. Both run until cancelled.

use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use securebank_db::repositories::{LoginAttemptRepo, SessionRepo};

/// Default login-attempt retention period: 24 hours.
const DEFAULT_ATTEMPT_RETENTION_HOURS: i64 = 24;

/// How often the sweeps run.
const SWEEP_INTERVAL: Duration = Duration::from_secs(3600); // 1 hour

/// Run the login-attempt retention loop.
///
/// Deletes `login_attempts` rows older than `LOGIN_ATTEMPT_RETENTION_HOURS`
/// (defaults to 24). Runs until `cancel` is triggered.
pub async fn run_attempt_retention(pool: PgPool, cancel: CancellationToken) {
    let retention_hours: i64 = std::env::var("LOGIN_ATTEMPT_RETENTION_HOURS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_ATTEMPT_RETENTION_HOURS);

    tracing::info!(
        retention_hours,
        interval_secs = SWEEP_INTERVAL.as_secs(),
        "Login attempt retention job started"
    );

    let mut interval = tokio::time::interval(SWEEP_INTERVAL);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Login attempt retention job stopping");
                break;
            }
            _ = interval.tick() => {
                let cutoff = Utc::now() - chrono::Duration::hours(retention_hours);
                match LoginAttemptRepo::delete_older_than(&pool, cutoff).await {
                    Ok(deleted) => {
                        if deleted > 0 {
                            tracing::info!(deleted, "Attempt retention: purged old rows");
                        } else {
                            tracing::debug!("Attempt retention: no rows to purge");
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Attempt retention: sweep failed");
                    }
                }
            }
        }
    }
}

/// Run the session cleanup loop.
///
/// Deletes expired or revoked `user_sessions` rows. Runs until `cancel` is
/// triggered.
pub async fn run_session_cleanup(pool: PgPool, cancel: CancellationToken) {
    tracing::info!(
        interval_secs = SWEEP_INTERVAL.as_secs(),
        "Session cleanup job started"
    );

    let mut interval = tokio::time::interval(SWEEP_INTERVAL);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Session cleanup job stopping");
                break;
            }
            _ = interval.tick() => {
                match SessionRepo::cleanup_expired(&pool).await {
                    Ok(deleted) => {
                        if deleted > 0 {
                            tracing::info!(deleted, "Session cleanup: removed dead sessions");
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Session cleanup: sweep failed");
                    }
                }
            }
        }
    }
}
