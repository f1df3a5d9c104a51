//! Login rate limiter over the attempt ledger.
//!
//! [`RateLimiter`] combines the pure policy in
//! [`securebank_core::ratelimit`] with an injected [`AttemptLedger`]:
//! `check_rate_limit` is a pure read, `record_attempt` is the only mutation,
//! and every ledger failure degrades to a permissive decision (fail-open) so
//! a storage glitch never locks a legitimate user out.

use std::sync::Arc;

use securebank_core::audit::{actions, AuditEvent, AuditSink};
use securebank_core::clock::Clock;
use securebank_core::ratelimit::{evaluate, RateLimitConfig, RateLimitDecision};
use securebank_core::types::Timestamp;

use crate::store::{AttemptLedger, NewLoginAttempt};

/// Normalize an email for ledger keying: trimmed, lowercase.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Brute-force protection service.
pub struct RateLimiter {
    ledger: Arc<dyn AttemptLedger>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(
        ledger: Arc<dyn AttemptLedger>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        config: RateLimitConfig,
    ) -> Self {
        Self {
            ledger,
            audit,
            clock,
            config,
        }
    }

    /// Policy parameters in effect.
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Compute the rate-limit decision for an attempt. Pure read: performs
    /// no mutation, and reflects any attempt recorded before this call.
    pub async fn check_rate_limit(&self, email: &str, ip: Option<&str>) -> RateLimitDecision {
        let email = normalize_email(email);
        let now = self.clock.now();

        let window_start = now
            - chrono::Duration::from_std(self.config.lockout_window)
                .unwrap_or_else(|_| chrono::Duration::minutes(15));
        let email_window = match self.ledger.failed_window(&email, window_start).await {
            Ok(window) => window,
            Err(e) => {
                tracing::warn!(error = %e, "Attempt ledger unreachable, rate limit failing open");
                return RateLimitDecision::fail_open(&self.config);
            }
        };

        let ip_failed_count = match ip {
            Some(ip) => {
                let ip_window_start = now
                    - chrono::Duration::from_std(self.config.ip_window)
                        .unwrap_or_else(|_| chrono::Duration::minutes(5));
                match self.ledger.failed_count_for_ip(ip, ip_window_start).await {
                    Ok(count) => count,
                    Err(e) => {
                        tracing::warn!(error = %e, "IP counter unreachable, ignoring IP limit");
                        0
                    }
                }
            }
            None => 0,
        };

        evaluate(&email_window, ip_failed_count, now, &self.config)
    }

    /// Append an attempt to the ledger.
    ///
    /// If the email has accumulated enough recent failures, a
    /// `suspicious_activity` audit event is emitted. Ledger errors are
    /// swallowed: recording is best-effort and must not fail the login path.
    pub async fn record_attempt(
        &self,
        email: &str,
        success: bool,
        ip: Option<&str>,
        user_agent: Option<&str>,
    ) {
        let email = normalize_email(email);
        let now = self.clock.now();

        let attempt = NewLoginAttempt {
            email: email.clone(),
            success,
            ip_address: ip.map(str::to_string),
            user_agent: user_agent.map(str::to_string),
            attempted_at: now,
        };
        if let Err(e) = self.ledger.record(attempt).await {
            tracing::warn!(error = %e, "Failed to record login attempt");
            return;
        }

        if !success {
            self.check_suspicious(&email, ip, now).await;
        }
    }

    /// Idempotent post-login reset: drops the failed-attempt history for the
    /// email so the next failure starts a fresh count. The audit trail is
    /// unaffected (it lives in the audit log, not the ledger).
    pub async fn clear_rate_limit(&self, email: &str) {
        let email = normalize_email(email);
        if let Err(e) = self.ledger.clear_failures(&email).await {
            tracing::warn!(error = %e, "Failed to clear rate limit history");
        }
    }

    /// Emit the suspicious-activity signal when recent failures cross the
    /// threshold. Best-effort by contract of [`AuditSink::emit`].
    async fn check_suspicious(&self, email: &str, ip: Option<&str>, now: Timestamp) {
        let window_start = now
            - chrono::Duration::from_std(self.config.suspicious_window)
                .unwrap_or_else(|_| chrono::Duration::minutes(5));
        let window = match self.ledger.failed_window(email, window_start).await {
            Ok(window) => window,
            Err(_) => return,
        };
        if window.failed_count >= self.config.suspicious_threshold {
            self.audit.emit(
                AuditEvent::new(actions::SUSPICIOUS_ACTIVITY)
                    .with_resource("login", email)
                    .with_details(serde_json::json!({
                        "recent_failures": window.failed_count,
                        "ip_address": ip,
                    }))
                    .failed(),
            );
        }
    }
}
