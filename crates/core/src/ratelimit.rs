//! Login rate-limit policy.
//!
//! Pure functions and constants: given the failed-attempt counts observed in
//! the ledger and the current time, compute whether a login attempt may
//! proceed, how long it must be delayed, and whether a CAPTCHA is required.
//! No I/O happens here; the engine layer feeds in ledger data.

use std::time::Duration;

use serde::Serialize;

use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tunable rate-limit policy parameters.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Failed attempts inside the lockout window before the email is denied.
    pub max_attempts: u32,
    /// Sliding window over which failed attempts count toward lockout.
    pub lockout_window: Duration,
    /// Failed attempts at which a CAPTCHA becomes required.
    pub captcha_threshold: u32,
    /// Window for the suspicious-activity audit signal.
    pub suspicious_window: Duration,
    /// Failed attempts inside [`suspicious_window`](Self::suspicious_window)
    /// that trigger the suspicious-activity signal.
    pub suspicious_threshold: u32,
    /// Window for the secondary per-IP counter.
    pub ip_window: Duration,
    /// The per-IP counter denies at `ip_multiplier * max_attempts` failures,
    /// regardless of any single email's count. Defends against credential
    /// stuffing spread across many emails from one network.
    pub ip_multiplier: u32,
    /// Delay table keyed by the number of prior failed attempts: the first
    /// attempt is undelayed, the fifth waits 10 seconds.
    pub progressive_delays_ms: [u64; 5],
}

/// Default progressive-delay table.
const DEFAULT_PROGRESSIVE_DELAYS_MS: [u64; 5] = [0, 1_000, 2_000, 5_000, 10_000];

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lockout_window: Duration::from_secs(15 * 60),
            captcha_threshold: 3,
            suspicious_window: Duration::from_secs(5 * 60),
            suspicious_threshold: 3,
            ip_window: Duration::from_secs(5 * 60),
            ip_multiplier: 2,
            progressive_delays_ms: DEFAULT_PROGRESSIVE_DELAYS_MS,
        }
    }
}

impl RateLimitConfig {
    /// Failed attempts from a single IP at which the IP is denied.
    pub fn ip_max_attempts(&self) -> u32 {
        self.ip_multiplier * self.max_attempts
    }

    /// Server-side delay (milliseconds) to apply before processing the next
    /// attempt, given the number of prior failures inside the lockout
    /// window. Clamps at the table maximum.
    pub fn progressive_delay_ms(&self, prior_failures: u32) -> u64 {
        let idx = (prior_failures as usize).min(self.progressive_delays_ms.len() - 1);
        self.progressive_delays_ms[idx]
    }
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitDecision {
    /// Whether the attempt may proceed to credential verification.
    pub allowed: bool,
    /// Attempts left before lockout (0 when denied).
    pub remaining_attempts: u32,
    /// When the lockout expires, if denied on the per-email counter.
    pub reset_at: Option<Timestamp>,
    /// Seconds until the caller should retry, if denied.
    pub retry_after_secs: Option<i64>,
    /// User-presentable denial message. Never contains the email address or
    /// attempt counts (account-enumeration defence).
    pub message: Option<String>,
    /// Whether the client must solve a CAPTCHA before the next attempt.
    pub require_captcha: bool,
    /// Server-side progressive delay to apply before processing.
    pub delay_ms: u64,
}

impl RateLimitDecision {
    /// The permissive default, used when the ledger is unreachable:
    /// availability is prioritized over strict lockout, so infrastructure
    /// failure never locks a legitimate user out.
    pub fn fail_open(config: &RateLimitConfig) -> Self {
        Self {
            allowed: true,
            remaining_attempts: config.max_attempts,
            reset_at: None,
            retry_after_secs: None,
            message: None,
            require_captcha: false,
            delay_ms: 0,
        }
    }
}

/// Failed-attempt data for one email within the lockout window.
#[derive(Debug, Clone, Default)]
pub struct AttemptWindow {
    /// Failed attempts inside the window.
    pub failed_count: u32,
    /// Timestamp of the oldest failed attempt inside the window.
    pub oldest_failure: Option<Timestamp>,
}

/// Compute the rate-limit decision for one attempt.
///
/// `email_window` covers the per-email lockout window; `ip_failed_count` is
/// the secondary counter over [`RateLimitConfig::ip_window`]. The IP-based
/// denial takes precedence in the returned message.
pub fn evaluate(
    email_window: &AttemptWindow,
    ip_failed_count: u32,
    now: Timestamp,
    config: &RateLimitConfig,
) -> RateLimitDecision {
    // Secondary IP counter: denies regardless of the per-email count.
    if ip_failed_count >= config.ip_max_attempts() {
        let retry_after = config.ip_window.as_secs() as i64;
        return RateLimitDecision {
            allowed: false,
            remaining_attempts: 0,
            reset_at: Some(now + chrono::Duration::seconds(retry_after)),
            retry_after_secs: Some(retry_after),
            message: Some(
                "Too many login attempts from this network. Please try again later.".to_string(),
            ),
            require_captcha: true,
            delay_ms: 0,
        };
    }

    let failed = email_window.failed_count;

    if failed >= config.max_attempts {
        // Reset is anchored on the oldest qualifying failure: once it ages
        // out of the sliding window the count drops below the threshold.
        let window = chrono::Duration::from_std(config.lockout_window)
            .unwrap_or_else(|_| chrono::Duration::minutes(15));
        let reset_at = email_window.oldest_failure.map(|t| t + window);
        let retry_after_secs = reset_at
            .map(|t| (t - now).num_seconds().max(0))
            .unwrap_or_else(|| window.num_seconds());
        let minutes = (retry_after_secs + 59) / 60;
        return RateLimitDecision {
            allowed: false,
            remaining_attempts: 0,
            reset_at,
            retry_after_secs: Some(retry_after_secs),
            message: Some(format!(
                "Too many failed login attempts. Please try again in {minutes} minute{}.",
                if minutes == 1 { "" } else { "s" }
            )),
            require_captcha: true,
            delay_ms: 0,
        };
    }

    RateLimitDecision {
        allowed: true,
        remaining_attempts: config.max_attempts - failed,
        reset_at: None,
        retry_after_secs: None,
        message: None,
        require_captcha: failed >= config.captcha_threshold,
        delay_ms: config.progressive_delay_ms(failed),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
