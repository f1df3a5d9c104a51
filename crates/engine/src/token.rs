//! Access/refresh token lifecycle.
//!
//! Access tokens are short-lived HS256 JWTs and are unrevocable before
//! expiry (stateless by design); refresh tokens are the revocation boundary.
//! Both embed the session id (`sid`), and the server stores only the SHA-256
//! hash of the current refresh token. Rotation swaps that hash atomically;
//! presentation of a superseded refresh token is treated as theft and
//! revokes the whole session.

use std::sync::Arc;

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use securebank_core::audit::{actions, AuditEvent, AuditSink};
use securebank_core::clock::Clock;
use securebank_core::error::CoreError;
use securebank_core::hashing::sha256_hex;
use securebank_core::types::DbId;

use crate::store::{NewSession, SessionStore};

// ---------------------------------------------------------------------------
// Claims and configuration
// ---------------------------------------------------------------------------

/// Discriminator for the two token kinds, carried in the `token_use` claim
/// so a refresh token can never pass as an access token or vice versa.
const USE_ACCESS: &str = "access";
const USE_REFRESH: &str = "refresh";

/// JWT claims embedded in every token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject -- the user's internal database id.
    pub sub: DbId,
    /// The user's email address.
    pub email: String,
    /// The user's role name (e.g. `"admin"`, `"customer"`).
    pub role: String,
    /// Session id: the durable server-side handle for revocation.
    pub sid: String,
    /// Expiration time (UTC Unix timestamp).
    pub exp: i64,
    /// Issued-at time (UTC Unix timestamp).
    pub iat: i64,
    /// Issuer claim, validated on decode.
    pub iss: String,
    /// Audience claim, validated on decode.
    pub aud: String,
    /// Unique token identifier (UUID v4).
    pub jti: String,
    /// Either `"access"` or `"refresh"`.
    pub token_use: String,
}

/// Configuration for token generation and validation.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// HMAC-SHA256 secret used to sign and verify tokens.
    pub secret: String,
    /// Access token lifetime in minutes (default: 15).
    pub access_token_expiry_mins: i64,
    /// Refresh token lifetime in days (default: 7).
    pub refresh_token_expiry_days: i64,
    /// `iss` claim stamped into every token.
    pub issuer: String,
    /// `aud` claim stamped into every token.
    pub audience: String,
}

/// Default access token expiry in minutes.
const DEFAULT_ACCESS_EXPIRY_MINS: i64 = 15;
/// Default refresh token expiry in days.
const DEFAULT_REFRESH_EXPIRY_DAYS: i64 = 7;
/// Default issuer claim.
const DEFAULT_ISSUER: &str = "securebank";
/// Default audience claim.
const DEFAULT_AUDIENCE: &str = "securebank-clients";

impl TokenConfig {
    /// Load token configuration from environment variables.
    ///
    /// | Env Var                    | Required | Default               |
    /// |----------------------------|----------|-----------------------|
    /// | `JWT_SECRET`               | **yes**  | --                    |
    /// | `JWT_ACCESS_EXPIRY_MINS`   | no       | `15`                  |
    /// | `JWT_REFRESH_EXPIRY_DAYS`  | no       | `7`                   |
    /// | `JWT_ISSUER`               | no       | `securebank`          |
    /// | `JWT_AUDIENCE`             | no       | `securebank-clients`  |
    ///
    /// # Panics
    ///
    /// Panics if `JWT_SECRET` is not set or is empty.
    pub fn from_env() -> Self {
        let secret =
            std::env::var("JWT_SECRET").expect("JWT_SECRET must be set in the environment");
        assert!(!secret.is_empty(), "JWT_SECRET must not be empty");

        let access_token_expiry_mins: i64 = std::env::var("JWT_ACCESS_EXPIRY_MINS")
            .unwrap_or_else(|_| DEFAULT_ACCESS_EXPIRY_MINS.to_string())
            .parse()
            .expect("JWT_ACCESS_EXPIRY_MINS must be a valid i64");

        let refresh_token_expiry_days: i64 = std::env::var("JWT_REFRESH_EXPIRY_DAYS")
            .unwrap_or_else(|_| DEFAULT_REFRESH_EXPIRY_DAYS.to_string())
            .parse()
            .expect("JWT_REFRESH_EXPIRY_DAYS must be a valid i64");

        let issuer = std::env::var("JWT_ISSUER").unwrap_or_else(|_| DEFAULT_ISSUER.to_string());
        let audience =
            std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| DEFAULT_AUDIENCE.to_string());

        Self {
            secret,
            access_token_expiry_mins,
            refresh_token_expiry_days,
            issuer,
            audience,
        }
    }
}

/// A freshly issued access/refresh pair plus its session handle.
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub session_id: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Issues, verifies, and rotates signed token pairs; tracks session identity
/// through an injected [`SessionStore`].
pub struct TokenService {
    sessions: Arc<dyn SessionStore>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    config: TokenConfig,
}

impl TokenService {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        config: TokenConfig,
    ) -> Self {
        Self {
            sessions,
            audit,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Issue a new access/refresh pair and persist the backing session.
    pub async fn issue_token_pair(
        &self,
        user_id: DbId,
        email: &str,
        role: &str,
        user_agent: Option<String>,
        ip_address: Option<String>,
    ) -> Result<IssuedTokens, CoreError> {
        let session_id = Uuid::new_v4().to_string();
        let now = self.clock.now().timestamp();

        let access_token = self.sign(user_id, email, role, &session_id, USE_ACCESS, now)?;
        let refresh_token = self.sign(user_id, email, role, &session_id, USE_REFRESH, now)?;

        let expires_at = self.clock.now()
            + chrono::Duration::days(self.config.refresh_token_expiry_days);
        self.sessions
            .create(NewSession {
                session_id: session_id.clone(),
                user_id,
                refresh_token_hash: sha256_hex(refresh_token.as_bytes()),
                expires_at,
                user_agent,
                ip_address,
            })
            .await?;

        Ok(IssuedTokens {
            access_token,
            refresh_token,
            session_id,
            expires_in: self.config.access_token_expiry_mins * 60,
        })
    }

    /// Validate an access token, returning its claims.
    ///
    /// Fails with [`CoreError::TokenExpired`] when only the expiry is wrong,
    /// and [`CoreError::TokenInvalid`] for any signature/claims mismatch --
    /// including a refresh token presented as an access token.
    pub fn verify_access_token(&self, token: &str) -> Result<Claims, CoreError> {
        let claims = self.decode(token, CoreError::TokenExpired)?;
        if claims.token_use != USE_ACCESS {
            return Err(CoreError::TokenInvalid(
                "Not an access token".to_string(),
            ));
        }
        Ok(claims)
    }

    /// Validate a refresh token, returning its claims.
    ///
    /// Same failure split as [`verify_access_token`](Self::verify_access_token),
    /// namespaced with [`CoreError::RefreshTokenExpired`] so callers cannot
    /// confuse which token expired.
    pub fn verify_refresh_token(&self, token: &str) -> Result<Claims, CoreError> {
        let claims = self.decode(token, CoreError::RefreshTokenExpired)?;
        if claims.token_use != USE_REFRESH {
            return Err(CoreError::TokenInvalid(
                "Not a refresh token".to_string(),
            ));
        }
        Ok(claims)
    }

    /// Rotate a refresh token: verify it, atomically supersede the session's
    /// refresh lineage, and return a new pair bound to the same session.
    ///
    /// A structurally valid refresh token whose hash no longer matches the
    /// stored lineage is evidence of theft (the token was already rotated by
    /// someone): the entire session is revoked and the caller gets
    /// [`CoreError::SessionRevoked`].
    pub async fn rotate_refresh_token(&self, old_token: &str) -> Result<IssuedTokens, CoreError> {
        let claims = self.verify_refresh_token(old_token)?;

        let session = self
            .sessions
            .find(&claims.sid)
            .await?
            .ok_or_else(|| CoreError::TokenInvalid("Unknown session".to_string()))?;

        if session.is_revoked {
            return Err(CoreError::SessionRevoked);
        }
        if session.expires_at <= self.clock.now() {
            return Err(CoreError::RefreshTokenExpired);
        }

        let presented_hash = sha256_hex(old_token.as_bytes());
        if session.refresh_token_hash != presented_hash {
            return self.handle_reuse(&claims).await;
        }

        let now = self.clock.now().timestamp();
        let access_token =
            self.sign(claims.sub, &claims.email, &claims.role, &claims.sid, USE_ACCESS, now)?;
        let refresh_token =
            self.sign(claims.sub, &claims.email, &claims.role, &claims.sid, USE_REFRESH, now)?;
        let new_expires_at =
            self.clock.now() + chrono::Duration::days(self.config.refresh_token_expiry_days);

        let rotated = self
            .sessions
            .rotate_refresh_hash(
                &claims.sid,
                &presented_hash,
                &sha256_hex(refresh_token.as_bytes()),
                new_expires_at,
            )
            .await?;
        if !rotated {
            // Lost the swap to a concurrent rotation: someone else holds
            // this token too. Same treatment as a stale-hash presentation.
            return self.handle_reuse(&claims).await;
        }

        self.audit.emit(
            AuditEvent::new(actions::TOKEN_REFRESHED)
                .with_actor(claims.sub)
                .with_resource("session", &claims.sid),
        );

        Ok(IssuedTokens {
            access_token,
            refresh_token,
            session_id: claims.sid,
            expires_in: self.config.access_token_expiry_mins * 60,
        })
    }

    /// Invalidate only the presented session. Other sessions of the same
    /// user stay live (multi-device support).
    pub async fn logout(&self, session_id: &str, user_id: DbId) -> Result<(), CoreError> {
        self.sessions.revoke(session_id).await?;
        self.audit.emit(
            AuditEvent::new(actions::LOGOUT)
                .with_actor(user_id)
                .with_resource("session", session_id),
        );
        Ok(())
    }

    /// Revoke every active session of a user ("logout everywhere").
    pub async fn revoke_all_sessions(&self, user_id: DbId) -> Result<u64, CoreError> {
        let revoked = self.sessions.revoke_all_for_user(user_id).await?;
        if revoked > 0 {
            self.audit.emit(
                AuditEvent::new(actions::SESSION_REVOKED)
                    .with_actor(user_id)
                    .with_details(serde_json::json!({ "revoked_sessions": revoked })),
            );
        }
        Ok(revoked)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Refresh-token reuse: revoke the session and surface the compromise.
    async fn handle_reuse(&self, claims: &Claims) -> Result<IssuedTokens, CoreError> {
        self.sessions.revoke(&claims.sid).await?;
        self.audit.emit(
            AuditEvent::new(actions::TOKEN_REUSE_DETECTED)
                .with_actor(claims.sub)
                .with_resource("session", &claims.sid)
                .failed(),
        );
        Err(CoreError::SessionRevoked)
    }

    fn sign(
        &self,
        user_id: DbId,
        email: &str,
        role: &str,
        session_id: &str,
        token_use: &str,
        now: i64,
    ) -> Result<String, CoreError> {
        let exp = match token_use {
            USE_REFRESH => now + self.config.refresh_token_expiry_days * 24 * 3600,
            _ => now + self.config.access_token_expiry_mins * 60,
        };

        let claims = Claims {
            sub: user_id,
            email: email.to_string(),
            role: role.to_string(),
            sid: session_id.to_string(),
            exp,
            iat: now,
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
            jti: Uuid::new_v4().to_string(),
            token_use: token_use.to_string(),
        };

        encode(
            &Header::default(), // HS256
            &claims,
            &EncodingKey::from_secret(self.config.secret.as_bytes()),
        )
        .map_err(|e| CoreError::Internal(format!("Token signing failed: {e}")))
    }

    /// Decode and validate signature, expiry, issuer, and audience.
    /// `expired_error` is the kind surfaced for an expiry-only failure.
    fn decode(&self, token: &str, expired_error: CoreError) -> Result<Claims, CoreError> {
        let mut validation = Validation::default(); // HS256, validates exp
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_audience(&[&self.config.audience]);

        match decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.secret.as_bytes()),
            &validation,
        ) {
            Ok(data) => Ok(data.claims),
            Err(e) => match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => Err(expired_error),
                _ => Err(CoreError::TokenInvalid(e.to_string())),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
