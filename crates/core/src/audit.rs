//! Audit event envelope, action constants, and redaction rules.
//!
//! This module lives in `core` (zero internal deps) so both the engine layer
//! (which emits events) and the events/persistence layer (which stores them)
//! share one vocabulary.

use serde::{Deserialize, Serialize};

use crate::hashing;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Action constants
// ---------------------------------------------------------------------------

/// Known action names for audit events.
pub mod actions {
    pub const LOGIN_SUCCEEDED: &str = "login_succeeded";
    pub const LOGIN_FAILED: &str = "login_failed";
    pub const LOGIN_RATE_LIMITED: &str = "login_rate_limited";
    pub const SUSPICIOUS_ACTIVITY: &str = "suspicious_activity";
    pub const TOKEN_REFRESHED: &str = "token_refreshed";
    pub const TOKEN_REUSE_DETECTED: &str = "token_reuse_detected";
    pub const SESSION_REVOKED: &str = "session_revoked";
    pub const LOGOUT: &str = "logout";
    pub const TRANSFER_COMPLETED: &str = "transfer_completed";
    pub const TRANSFER_FAILED: &str = "transfer_failed";
}

/// Known categories for retention-policy grouping.
pub mod categories {
    pub const AUTHENTICATION: &str = "authentication";
    pub const SECURITY: &str = "security";
    pub const TRANSACTIONS: &str = "transactions";
    pub const OPERATIONS: &str = "operations";
}

/// Map an action name to its log category.
///
/// Unknown actions default to `"operations"`.
pub fn action_to_category(action: &str) -> &'static str {
    match action {
        actions::LOGIN_SUCCEEDED
        | actions::LOGIN_FAILED
        | actions::LOGIN_RATE_LIMITED
        | actions::TOKEN_REFRESHED
        | actions::LOGOUT => categories::AUTHENTICATION,
        actions::SUSPICIOUS_ACTIVITY
        | actions::TOKEN_REUSE_DETECTED
        | actions::SESSION_REVOKED => categories::SECURITY,
        actions::TRANSFER_COMPLETED | actions::TRANSFER_FAILED => categories::TRANSACTIONS,
        _ => categories::OPERATIONS,
    }
}

// ---------------------------------------------------------------------------
// Event envelope
// ---------------------------------------------------------------------------

/// Terminal outcome of the audited operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Success,
    Failure,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Success => "success",
            AuditStatus::Failure => "failure",
        }
    }
}

/// A structured audit event.
///
/// Constructed via [`AuditEvent::new`] and enriched with the builder methods.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Action name, one of [`actions`].
    pub action: String,

    /// The user that performed (or attempted) the action, if known.
    pub actor_user_id: Option<DbId>,

    /// Kind of the affected resource (e.g. `"account"`, `"session"`).
    pub resource: Option<String>,

    /// Identifier of the affected resource.
    pub resource_id: Option<String>,

    /// Free-form JSON payload with event-specific data. Redacted before
    /// persistence via [`redact_sensitive_fields`].
    pub details: serde_json::Value,

    /// Outcome of the operation.
    pub status: AuditStatus,

    /// When the event occurred (UTC).
    pub occurred_at: Timestamp,
}

impl AuditEvent {
    /// Create a new success event with only the required `action`.
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            actor_user_id: None,
            resource: None,
            resource_id: None,
            details: serde_json::Value::Object(Default::default()),
            status: AuditStatus::Success,
            occurred_at: chrono::Utc::now(),
        }
    }

    /// Attach the acting user.
    pub fn with_actor(mut self, user_id: DbId) -> Self {
        self.actor_user_id = Some(user_id);
        self
    }

    /// Attach the affected resource.
    pub fn with_resource(mut self, resource: impl Into<String>, id: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self.resource_id = Some(id.into());
        self
    }

    /// Set the JSON payload.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    /// Mark the event as a failure outcome.
    pub fn failed(mut self) -> Self {
        self.status = AuditStatus::Failure;
        self
    }
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

/// Fire-and-forget audit event consumer.
///
/// `emit` must never block on I/O and must never fail the caller: the
/// primary operation's outcome is independent of audit delivery.
pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

// ---------------------------------------------------------------------------
// Integrity hash chain
// ---------------------------------------------------------------------------

/// Known seed value for the first entry in the hash chain.
const CHAIN_SEED: &str = "AUDIT_LOG_CHAIN_SEED_V1";

/// Compute the SHA-256 integrity hash for an audit log entry.
///
/// `prev_hash` is the integrity hash of the previous entry, or `None` for
/// the first entry in the chain (which uses a known seed value).
/// `entry_data` is a canonical string representation of the entry's content.
pub fn compute_integrity_hash(prev_hash: Option<&str>, entry_data: &str) -> String {
    let prev = prev_hash.unwrap_or(CHAIN_SEED);
    let combined = format!("{prev}|{entry_data}");
    hashing::sha256_hex(combined.as_bytes())
}

// ---------------------------------------------------------------------------
// Sensitive field redaction
// ---------------------------------------------------------------------------

/// Fields redacted from audit details before storage.
pub const SENSITIVE_FIELDS: &[&str] = &[
    "password",
    "token",
    "secret",
    "access_token",
    "refresh_token",
    "authorization",
    "credential",
    "account_number",
    "card_number",
    "ssn",
];

/// Redact sensitive fields from a JSON value (recursive).
///
/// Replaces the value of any key matching [`SENSITIVE_FIELDS`] with
/// `"[REDACTED]"` and returns a new value with redactions applied.
pub fn redact_sensitive_fields(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut redacted = serde_json::Map::new();
            for (key, val) in map {
                let lower_key = key.to_lowercase();
                if SENSITIVE_FIELDS.iter().any(|f| lower_key.contains(f)) {
                    redacted.insert(
                        key.clone(),
                        serde_json::Value::String("[REDACTED]".to_string()),
                    );
                } else {
                    redacted.insert(key.clone(), redact_sensitive_fields(val));
                }
            }
            serde_json::Value::Object(redacted)
        }
        serde_json::Value::Array(arr) => {
            serde_json::Value::Array(arr.iter().map(redact_sensitive_fields).collect())
        }
        other => other.clone(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // action_to_category mapping
    // -----------------------------------------------------------------------

    #[test]
    fn login_actions_map_to_authentication() {
        assert_eq!(
            action_to_category(actions::LOGIN_SUCCEEDED),
            categories::AUTHENTICATION
        );
        assert_eq!(
            action_to_category(actions::LOGIN_FAILED),
            categories::AUTHENTICATION
        );
    }

    #[test]
    fn reuse_detection_maps_to_security() {
        assert_eq!(
            action_to_category(actions::TOKEN_REUSE_DETECTED),
            categories::SECURITY
        );
        assert_eq!(
            action_to_category(actions::SUSPICIOUS_ACTIVITY),
            categories::SECURITY
        );
    }

    #[test]
    fn transfers_map_to_transactions() {
        assert_eq!(
            action_to_category(actions::TRANSFER_COMPLETED),
            categories::TRANSACTIONS
        );
    }

    #[test]
    fn unknown_action_maps_to_operations() {
        assert_eq!(action_to_category("some_unknown_action"), categories::OPERATIONS);
    }

    // -----------------------------------------------------------------------
    // Event builder
    // -----------------------------------------------------------------------

    #[test]
    fn default_event_has_empty_optional_fields() {
        let event = AuditEvent::new(actions::LOGOUT);
        assert_eq!(event.action, "logout");
        assert!(event.actor_user_id.is_none());
        assert!(event.resource.is_none());
        assert!(event.details.is_object());
        assert_eq!(event.status, AuditStatus::Success);
    }

    #[test]
    fn builder_methods_populate_fields() {
        let event = AuditEvent::new(actions::TRANSFER_FAILED)
            .with_actor(7)
            .with_resource("transaction", "TXN-123")
            .with_details(serde_json::json!({"reason": "insufficient funds"}))
            .failed();

        assert_eq!(event.actor_user_id, Some(7));
        assert_eq!(event.resource.as_deref(), Some("transaction"));
        assert_eq!(event.resource_id.as_deref(), Some("TXN-123"));
        assert_eq!(event.status, AuditStatus::Failure);
        assert_eq!(event.details["reason"], "insufficient funds");
    }

    // -----------------------------------------------------------------------
    // Integrity hash computation
    // -----------------------------------------------------------------------

    #[test]
    fn first_entry_uses_seed() {
        let hash = compute_integrity_hash(None, "test_data");
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn chained_entry_uses_previous_hash() {
        let first = compute_integrity_hash(None, "entry_1");
        let second = compute_integrity_hash(Some(&first), "entry_2");
        assert_ne!(first, second);
        assert_eq!(second.len(), 64);
    }

    #[test]
    fn same_input_produces_same_hash() {
        let a = compute_integrity_hash(None, "same_data");
        let b = compute_integrity_hash(None, "same_data");
        assert_eq!(a, b);
    }

    #[test]
    fn different_prev_hash_produces_different_result() {
        let a = compute_integrity_hash(Some("hash_a"), "same_data");
        let b = compute_integrity_hash(Some("hash_b"), "same_data");
        assert_ne!(a, b);
    }

    // -----------------------------------------------------------------------
    // Sensitive field redaction
    // -----------------------------------------------------------------------

    #[test]
    fn redacts_password_field() {
        let input = serde_json::json!({"email": "alice@test.com", "password": "s3cret"});
        let result = redact_sensitive_fields(&input);
        assert_eq!(result["email"], "alice@test.com");
        assert_eq!(result["password"], "[REDACTED]");
    }

    #[test]
    fn redacts_token_fields() {
        let input = serde_json::json!({"refresh_token": "abc123", "amount": "40.00"});
        let result = redact_sensitive_fields(&input);
        assert_eq!(result["refresh_token"], "[REDACTED]");
        assert_eq!(result["amount"], "40.00");
    }

    #[test]
    fn handles_nested_objects_and_arrays() {
        let input = serde_json::json!({
            "outer": {"account_number": "4111-1111", "name": "checking"},
            "list": [{"token": "hidden"}]
        });
        let result = redact_sensitive_fields(&input);
        assert_eq!(result["outer"]["account_number"], "[REDACTED]");
        assert_eq!(result["outer"]["name"], "checking");
        assert_eq!(result["list"][0]["token"], "[REDACTED]");
    }

    #[test]
    fn non_object_values_unchanged() {
        let input = serde_json::json!("plain_string");
        let result = redact_sensitive_fields(&input);
        assert_eq!(result, "plain_string");
    }
}
