//! Authentication primitives for the HTTP layer.
//!
//! - [`password`] -- Argon2id password hashing and verification.
//!
//! Token handling lives in `securebank-engine`; this module only covers the
//! credential check that happens before tokens are issued.

pub mod password;
