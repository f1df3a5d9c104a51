//! Handlers for the `/auth` resource (login, refresh, logout).

use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};

use securebank_core::audit::{actions, AuditEvent, AuditSink};
use securebank_core::error::CoreError;
use securebank_db::models::user::UserResponse;
use securebank_db::repositories::UserRepo;
use securebank_engine::ratelimit::normalize_email;

use crate::auth::password::verify_password;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::state::AppState;

/// The one message every failed credential check returns -- identical
/// whether the email is unknown, the password is wrong, or the account is
/// disabled or unverified. Anything more specific would let an attacker
/// enumerate accounts from the response.
const GENERIC_LOGIN_ERROR: &str = "Invalid email or password";

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Request body for `POST /auth/login`.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for `POST /auth/refresh`.
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Successful authentication response returned by login and refresh.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    pub user: UserResponse,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/auth/login
///
/// Authenticate with email + password. Consults the rate limiter before the
/// credentials are even looked at; returns access and refresh tokens.
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let email = normalize_email(&input.email);
    let (ip, user_agent) = client_meta(&headers);

    // 1. Rate-limit gate.
    let decision = state
        .rate_limiter
        .check_rate_limit(&email, ip.as_deref())
        .await;
    if !decision.allowed {
        state.audit.emit(
            AuditEvent::new(actions::LOGIN_RATE_LIMITED)
                .with_resource("login", &email)
                .failed(),
        );
        return Err(AppError::RateLimited(decision));
    }

    // 2. Progressive delay, applied server-side so clearing client state
    // does not bypass it.
    if decision.delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(decision.delay_ms)).await;
    }

    // 3. Look up the user. An unknown email is recorded as a failed attempt
    // so lockout behaviour cannot be used to probe which emails exist.
    let Some(user) = UserRepo::find_by_email(&state.pool, &email).await? else {
        state
            .rate_limiter
            .record_attempt(&email, false, ip.as_deref(), user_agent.as_deref())
            .await;
        return Err(login_failure(&state, &email, "unknown email"));
    };

    // 4. Verify the password.
    let password_valid = verify_password(&input.password, &user.password_hash)
        .map_err(|e| AppError::InternalError(format!("Password verification error: {e}")))?;
    if !password_valid {
        state
            .rate_limiter
            .record_attempt(&email, false, ip.as_deref(), user_agent.as_deref())
            .await;
        return Err(login_failure(&state, &email, "wrong password"));
    }

    // 5. Account state gates. Same generic message as a wrong password: a
    // correct password against a disabled or unverified account must not be
    // distinguishable from the outside.
    if !user.is_active {
        return Err(login_failure(&state, &email, "account deactivated"));
    }
    if !user.is_verified {
        return Err(login_failure(&state, &email, "email not verified"));
    }

    // 6. Success: record the attempt, reset the failure history, and stamp
    // the login time.
    state
        .rate_limiter
        .record_attempt(&email, true, ip.as_deref(), user_agent.as_deref())
        .await;
    state.rate_limiter.clear_rate_limit(&email).await;
    UserRepo::record_successful_login(&state.pool, user.id).await?;

    // 7. Issue the token pair and its backing session.
    let issued = state
        .tokens
        .issue_token_pair(user.id, &user.email, &user.role, user_agent, ip)
        .await?;

    state.audit.emit(
        AuditEvent::new(actions::LOGIN_SUCCEEDED)
            .with_actor(user.id)
            .with_resource("session", &issued.session_id),
    );

    Ok(Json(AuthResponse {
        access_token: issued.access_token,
        refresh_token: issued.refresh_token,
        expires_in: issued.expires_in,
        user: UserResponse::from(&user),
    }))
}

/// POST /api/v1/auth/refresh
///
/// Exchange a valid refresh token for a new pair. Rotation happens in the
/// engine: a superseded token revokes the whole session.
pub async fn refresh(
    State(state): State<AppState>,
    Json(input): Json<RefreshRequest>,
) -> AppResult<Json<AuthResponse>> {
    // Cheap claims check first so the user row can be validated before the
    // lineage is rotated.
    let claims = state.tokens.verify_refresh_token(&input.refresh_token)?;

    let user = UserRepo::find_by_id(&state.pool, claims.sub)
        .await?
        .ok_or_else(|| AppError::Core(CoreError::Unauthorized("User no longer exists".into())))?;

    if !user.is_active {
        // A deactivated user keeps no live sessions.
        state.tokens.revoke_all_sessions(user.id).await?;
        return Err(AppError::Core(CoreError::Forbidden(
            "Account is deactivated".into(),
        )));
    }

    let issued = state.tokens.rotate_refresh_token(&input.refresh_token).await?;

    Ok(Json(AuthResponse {
        access_token: issued.access_token,
        refresh_token: issued.refresh_token,
        expires_in: issued.expires_in,
        user: UserResponse::from(&user),
    }))
}

/// POST /api/v1/auth/logout
///
/// Revoke only the session the presented access token belongs to. Other
/// devices stay logged in. Returns 204 No Content.
pub async fn logout(State(state): State<AppState>, auth_user: AuthUser) -> AppResult<StatusCode> {
    state
        .tokens
        .logout(&auth_user.session_id, auth_user.user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/auth/logout-all
///
/// Revoke every session of the authenticated user. Returns 204 No Content.
pub async fn logout_all(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<StatusCode> {
    state.tokens.revoke_all_sessions(auth_user.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Audit the precise failure reason internally, return the generic error
/// externally.
fn login_failure(state: &AppState, email: &str, reason: &str) -> AppError {
    state.audit.emit(
        AuditEvent::new(actions::LOGIN_FAILED)
            .with_resource("login", email)
            .with_details(serde_json::json!({ "reason": reason }))
            .failed(),
    );
    AppError::Core(CoreError::Unauthorized(GENERIC_LOGIN_ERROR.into()))
}

/// Extract client IP (first `X-Forwarded-For` hop) and user agent.
fn client_meta(headers: &HeaderMap) -> (Option<String>, Option<String>) {
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    (ip, user_agent)
}
