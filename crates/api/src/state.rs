use std::sync::Arc;

use securebank_core::clock::SystemClock;
use securebank_engine::transfer::TransferConfig;
use securebank_engine::{RateLimiter, TokenService, TransferEngine};
use securebank_events::AuditBus;

use crate::config::ServerConfig;
use crate::stores::{PgAccountStore, PgAttemptLedger, PgSessionStore, PgTransactionLog};

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: securebank_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Login brute-force protection.
    pub rate_limiter: Arc<RateLimiter>,
    /// Token issuance, verification, and rotation.
    pub tokens: Arc<TokenService>,
    /// Atomic funds movement.
    pub transfers: Arc<TransferEngine>,
    /// Audit event bus shared with the persistence service.
    pub audit: Arc<AuditBus>,
}

impl AppState {
    /// Wire the engines over their PostgreSQL-backed collaborators.
    ///
    /// `audit` is shared so the caller can also hand its receiver to the
    /// persistence service.
    pub fn build(
        pool: securebank_db::DbPool,
        config: ServerConfig,
        audit: Arc<AuditBus>,
    ) -> Self {
        let clock = Arc::new(SystemClock);

        let rate_limiter = Arc::new(RateLimiter::new(
            Arc::new(PgAttemptLedger::new(pool.clone())),
            audit.clone(),
            clock.clone(),
            config.rate_limit.clone(),
        ));

        let tokens = Arc::new(TokenService::new(
            Arc::new(PgSessionStore::new(pool.clone())),
            audit.clone(),
            clock.clone(),
            config.token.clone(),
        ));

        let transfers = Arc::new(TransferEngine::new(
            Arc::new(PgAccountStore::new(pool.clone())),
            Arc::new(PgTransactionLog::new(pool.clone())),
            audit.clone(),
            clock,
            TransferConfig::default(),
        ));

        Self {
            pool,
            config: Arc::new(config),
            rate_limiter,
            tokens,
            transfers,
            audit,
        }
    }
}
