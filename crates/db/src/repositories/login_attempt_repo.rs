//! Repository for the `login_attempts` table.
//!
//! Append-mostly: rows are inserted on every attempt, queried through
//! sliding time windows by the rate limiter, and deleted only by the
//! post-login reset and the retention sweep.

use sqlx::PgPool;

use securebank_core::ratelimit::AttemptWindow;
use securebank_core::types::Timestamp;

use crate::models::login_attempt::{CreateLoginAttempt, LoginAttempt};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, email, success, ip_address, user_agent, attempted_at";

/// Provides append and windowed-query operations for login attempts.
pub struct LoginAttemptRepo;

impl LoginAttemptRepo {
    /// Append an attempt, returning the created row.
    pub async fn create(
        pool: &PgPool,
        input: &CreateLoginAttempt,
    ) -> Result<LoginAttempt, sqlx::Error> {
        let query = format!(
            "INSERT INTO login_attempts (email, success, ip_address, user_agent, attempted_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, LoginAttempt>(&query)
            .bind(&input.email)
            .bind(input.success)
            .bind(&input.ip_address)
            .bind(&input.user_agent)
            .bind(input.attempted_at)
            .fetch_one(pool)
            .await
    }

    /// Failed-attempt count and oldest failure for an email since `since`.
    pub async fn failed_window(
        pool: &PgPool,
        email: &str,
        since: Timestamp,
    ) -> Result<AttemptWindow, sqlx::Error> {
        let row: (i64, Option<Timestamp>) = sqlx::query_as(
            "SELECT COUNT(*), MIN(attempted_at) FROM login_attempts
             WHERE email = $1 AND success = false AND attempted_at > $2",
        )
        .bind(email)
        .bind(since)
        .fetch_one(pool)
        .await?;

        Ok(AttemptWindow {
            failed_count: row.0 as u32,
            oldest_failure: row.1,
        })
    }

    /// Failed-attempt count for an IP across all emails since `since`.
    pub async fn failed_count_for_ip(
        pool: &PgPool,
        ip: &str,
        since: Timestamp,
    ) -> Result<u32, sqlx::Error> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM login_attempts
             WHERE ip_address = $1 AND success = false AND attempted_at > $2",
        )
        .bind(ip)
        .bind(since)
        .fetch_one(pool)
        .await?;
        Ok(row.0 as u32)
    }

    /// Delete the failed-attempt history for an email (post-login reset).
    /// Successful attempts are retained. Returns the deleted count.
    pub async fn clear_failures(pool: &PgPool, email: &str) -> Result<u64, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM login_attempts WHERE email = $1 AND success = false")
                .bind(email)
                .execute(pool)
                .await?;
        Ok(result.rows_affected())
    }

    /// Delete attempts older than `cutoff` (retention sweep). Returns the
    /// deleted count.
    pub async fn delete_older_than(pool: &PgPool, cutoff: Timestamp) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM login_attempts WHERE attempted_at < $1")
            .bind(cutoff)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
