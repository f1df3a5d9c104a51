//! SecureBank audit event infrastructure.
//!
//! - [`AuditBus`] — in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`, implementing the core's fire-and-forget
//!   [`AuditSink`](securebank_core::audit::AuditSink).
//! - [`AuditPersistence`] — background service that durably writes every
//!   event to the `audit_log` table with a chained integrity hash.

pub mod bus;
pub mod persistence;

pub use bus::AuditBus;
pub use persistence::AuditPersistence;
