//! SecureBank security core.
//!
//! The three engines with real concurrency semantics, built over injected
//! collaborator traits so they never touch the web framework or the
//! database driver directly:
//!
//! - [`ratelimit::RateLimiter`] — login brute-force protection (progressive
//!   delay, lockout, CAPTCHA escalation) over an append-only attempt ledger.
//! - [`token::TokenService`] — access/refresh token issuance, verification,
//!   and rotation with refresh-reuse detection.
//! - [`transfer::TransferEngine`] — atomic balance movement between two
//!   accounts via optimistic compare-and-set with bounded retry.
//!
//! [`store`] defines the collaborator traits; [`memory`] provides in-memory
//! implementations used by the engines' own tests.

pub mod memory;
pub mod ratelimit;
pub mod store;
pub mod token;
pub mod transfer;

pub use ratelimit::RateLimiter;
pub use token::{IssuedTokens, TokenConfig, TokenService};
pub use transfer::{TransferConfig, TransferEngine, TransferRequest};
