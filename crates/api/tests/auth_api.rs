//! HTTP-level integration tests for the auth endpoints.
//!
//! Cover login, the generic-error invariant, rate limiting, token refresh
//! with rotation and reuse detection, and logout semantics.

mod common;

use axum::http::{header, StatusCode};
use common::{body_json, get, get_auth, post_json, post_json_auth};
use sqlx::PgPool;

use securebank_api::auth::password::hash_password;
use securebank_db::models::user::{CreateUser, User};
use securebank_db::repositories::UserRepo;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const PASSWORD: &str = "test_password_123!";

/// Create a verified, active test user and return the row.
async fn create_test_user(pool: &PgPool, email: &str) -> User {
    let hashed = hash_password(PASSWORD).expect("hashing should succeed");
    let user = UserRepo::create(
        pool,
        &CreateUser {
            email: email.to_string(),
            password_hash: hashed,
            full_name: "Test User".to_string(),
            role: "customer".to_string(),
        },
    )
    .await
    .expect("user creation should succeed");
    UserRepo::set_verified(pool, user.id)
        .await
        .expect("verification should succeed");
    user
}

/// Log in via the API and return the JSON response containing
/// `access_token`, `refresh_token`, and `user` info.
async fn login_user(app: axum::Router, email: &str, password: &str) -> serde_json::Value {
    let body = serde_json::json!({ "email": email, "password": password });
    let response = post_json(app, "/api/v1/auth/login", body).await;
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

/// Fire a login attempt with the wrong password, returning the response.
async fn failed_login(app: axum::Router, email: &str) -> axum::http::Response<axum::body::Body> {
    let body = serde_json::json!({ "email": email, "password": "wrong_password" });
    post_json(app, "/api/v1/auth/login", body).await
}

// ---------------------------------------------------------------------------
// Login
// ---------------------------------------------------------------------------

/// Successful login returns 200 with tokens and user info.
#[sqlx::test(migrations = "../db/migrations")]
async fn test_login_success(pool: PgPool) {
    let user = create_test_user(&pool, "login@test.com").await;
    let app = common::build_test_app(pool);

    let json = login_user(app, "login@test.com", PASSWORD).await;

    assert!(json["access_token"].is_string(), "response must contain access_token");
    assert!(json["refresh_token"].is_string(), "response must contain refresh_token");
    assert!(json["expires_in"].is_number(), "response must contain expires_in");
    assert_eq!(json["user"]["id"], user.id);
    assert_eq!(json["user"]["email"], "login@test.com");
    assert_eq!(json["user"]["role"], "customer");
}

/// Email addresses are normalized: mixed-case login matches.
#[sqlx::test(migrations = "../db/migrations")]
async fn test_login_email_is_case_insensitive(pool: PgPool) {
    create_test_user(&pool, "case@test.com").await;
    let app = common::build_test_app(pool);

    let json = login_user(app, "  Case@Test.COM ", PASSWORD).await;
    assert_eq!(json["user"]["email"], "case@test.com");
}

/// The four distinguishable failure causes all produce byte-identical
/// response bodies: unknown email, wrong password, unverified account,
/// deactivated account.
#[sqlx::test(migrations = "../db/migrations")]
async fn test_login_failures_are_indistinguishable(pool: PgPool) {
    // Wrong password.
    create_test_user(&pool, "known@test.com").await;

    // Unverified.
    let hashed = hash_password(PASSWORD).unwrap();
    UserRepo::create(
        &pool,
        &CreateUser {
            email: "unverified@test.com".to_string(),
            password_hash: hashed,
            full_name: "Unverified".to_string(),
            role: "customer".to_string(),
        },
    )
    .await
    .unwrap();

    // Deactivated.
    let deactivated = create_test_user(&pool, "gone@test.com").await;
    UserRepo::deactivate(&pool, deactivated.id).await.unwrap();

    let cases = [
        ("ghost@test.com", "whatever"),     // unknown email
        ("known@test.com", "wrong_pass"),   // wrong password
        ("unverified@test.com", PASSWORD),  // correct password, unverified
        ("gone@test.com", PASSWORD),        // correct password, deactivated
    ];

    let mut bodies = Vec::new();
    for (email, password) in cases {
        let app = common::build_test_app(pool.clone());
        let body = serde_json::json!({ "email": email, "password": password });
        let response = post_json(app, "/api/v1/auth/login", body).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "case: {email}");
        bodies.push(body_json(response).await);
    }

    for body in &bodies[1..] {
        assert_eq!(
            body, &bodies[0],
            "every auth failure must return the identical body"
        );
    }
    assert_eq!(bodies[0]["error"], "Invalid email or password");
}

// ---------------------------------------------------------------------------
// Rate limiting
// ---------------------------------------------------------------------------

/// After 5 failed attempts the 6th is denied with 429 and retry metadata.
#[sqlx::test(migrations = "../db/migrations")]
async fn test_rate_limit_locks_after_max_failures(pool: PgPool) {
    create_test_user(&pool, "lockme@test.com").await;

    for _ in 0..5 {
        let app = common::build_test_app(pool.clone());
        let response = failed_login(app, "lockme@test.com").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    // The 6th attempt is rate limited even with the correct password.
    let app = common::build_test_app(pool);
    let body = serde_json::json!({ "email": "lockme@test.com", "password": PASSWORD });
    let response = post_json(app, "/api/v1/auth/login", body).await;

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after = response
        .headers()
        .get(header::RETRY_AFTER)
        .expect("429 must carry Retry-After")
        .to_str()
        .unwrap()
        .parse::<i64>()
        .unwrap();
    assert!(retry_after > 0 && retry_after <= 15 * 60);

    let json = body_json(response).await;
    assert_eq!(json["code"], "RATE_LIMITED");
    assert_eq!(json["captcha_required"], true);
    // Anti-enumeration: the denial must not echo the email back.
    let message = json["error"].as_str().unwrap();
    assert!(!message.contains("lockme@test.com"));
}

/// A successful login resets the failure history.
#[sqlx::test(migrations = "../db/migrations")]
async fn test_successful_login_resets_failure_count(pool: PgPool) {
    create_test_user(&pool, "reset@test.com").await;

    for _ in 0..4 {
        let app = common::build_test_app(pool.clone());
        failed_login(app, "reset@test.com").await;
    }

    let app = common::build_test_app(pool.clone());
    login_user(app, "reset@test.com", PASSWORD).await;

    // Two more failures after the reset: total would be 6 without the
    // reset, but we must still get 401 (not 429).
    for _ in 0..2 {
        let app = common::build_test_app(pool.clone());
        let response = failed_login(app, "reset@test.com").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

// ---------------------------------------------------------------------------
// Refresh and rotation
// ---------------------------------------------------------------------------

/// A valid refresh token returns a new, rotated pair.
#[sqlx::test(migrations = "../db/migrations")]
async fn test_token_refresh_rotates(pool: PgPool) {
    create_test_user(&pool, "refresher@test.com").await;

    let app = common::build_test_app(pool.clone());
    let login_json = login_user(app, "refresher@test.com", PASSWORD).await;
    let refresh_token = login_json["refresh_token"].as_str().unwrap();

    let app = common::build_test_app(pool);
    let body = serde_json::json!({ "refresh_token": refresh_token });
    let response = post_json(app, "/api/v1/auth/refresh", body).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["access_token"].is_string());
    // Token rotation: the new refresh token must differ from the original.
    assert_ne!(
        json["refresh_token"].as_str().unwrap(),
        refresh_token,
        "refresh token must rotate on use"
    );
}

/// Replaying a rotated refresh token kills the whole session, including the
/// legitimately rotated successor.
#[sqlx::test(migrations = "../db/migrations")]
async fn test_refresh_reuse_revokes_session(pool: PgPool) {
    create_test_user(&pool, "victim@test.com").await;

    let app = common::build_test_app(pool.clone());
    let login_json = login_user(app, "victim@test.com", PASSWORD).await;
    let stolen = login_json["refresh_token"].as_str().unwrap().to_string();

    // Legitimate rotation.
    let app = common::build_test_app(pool.clone());
    let response =
        post_json(app, "/api/v1/auth/refresh", serde_json::json!({ "refresh_token": stolen })).await;
    assert_eq!(response.status(), StatusCode::OK);
    let rotated = body_json(response).await["refresh_token"]
        .as_str()
        .unwrap()
        .to_string();

    // Replay of the stale token: compromise signal, 401.
    let app = common::build_test_app(pool.clone());
    let response =
        post_json(app, "/api/v1/auth/refresh", serde_json::json!({ "refresh_token": stolen })).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["code"], "SESSION_REVOKED");

    // The whole lineage is dead: the rotated token fails too.
    let app = common::build_test_app(pool);
    let response = post_json(
        app,
        "/api/v1/auth/refresh",
        serde_json::json!({ "refresh_token": rotated }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

/// Refreshing with a garbage token returns 401.
#[sqlx::test(migrations = "../db/migrations")]
async fn test_refresh_with_invalid_token(pool: PgPool) {
    let app = common::build_test_app(pool);

    let body = serde_json::json!({ "refresh_token": "not-a-real-token" });
    let response = post_json(app, "/api/v1/auth/refresh", body).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ---------------------------------------------------------------------------
// Logout
// ---------------------------------------------------------------------------

/// Logout revokes the presented session and returns 204 No Content.
#[sqlx::test(migrations = "../db/migrations")]
async fn test_logout_revokes_session(pool: PgPool) {
    create_test_user(&pool, "logout@test.com").await;

    let app = common::build_test_app(pool.clone());
    let login_json = login_user(app, "logout@test.com", PASSWORD).await;
    let access_token = login_json["access_token"].as_str().unwrap();
    let refresh_token = login_json["refresh_token"].as_str().unwrap();

    let app = common::build_test_app(pool.clone());
    let response =
        post_json_auth(app, "/api/v1/auth/logout", serde_json::json!({}), access_token).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // The session's refresh token is dead.
    let app = common::build_test_app(pool);
    let response = post_json(
        app,
        "/api/v1/auth/refresh",
        serde_json::json!({ "refresh_token": refresh_token }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

/// Logout only affects the presented session: other devices stay live.
#[sqlx::test(migrations = "../db/migrations")]
async fn test_logout_spares_other_sessions(pool: PgPool) {
    create_test_user(&pool, "devices@test.com").await;

    let app = common::build_test_app(pool.clone());
    let device_a = login_user(app, "devices@test.com", PASSWORD).await;
    let app = common::build_test_app(pool.clone());
    let device_b = login_user(app, "devices@test.com", PASSWORD).await;

    let app = common::build_test_app(pool.clone());
    let response = post_json_auth(
        app,
        "/api/v1/auth/logout",
        serde_json::json!({}),
        device_a["access_token"].as_str().unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // Device B can still refresh.
    let app = common::build_test_app(pool);
    let response = post_json(
        app,
        "/api/v1/auth/refresh",
        serde_json::json!({ "refresh_token": device_b["refresh_token"].as_str().unwrap() }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

/// Logout-all revokes every session of the user.
#[sqlx::test(migrations = "../db/migrations")]
async fn test_logout_all_revokes_every_session(pool: PgPool) {
    create_test_user(&pool, "everywhere@test.com").await;

    let app = common::build_test_app(pool.clone());
    let device_a = login_user(app, "everywhere@test.com", PASSWORD).await;
    let app = common::build_test_app(pool.clone());
    let device_b = login_user(app, "everywhere@test.com", PASSWORD).await;

    let app = common::build_test_app(pool.clone());
    let response = post_json_auth(
        app,
        "/api/v1/auth/logout-all",
        serde_json::json!({}),
        device_a["access_token"].as_str().unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    for tokens in [&device_a, &device_b] {
        let app = common::build_test_app(pool.clone());
        let response = post_json(
            app,
            "/api/v1/auth/refresh",
            serde_json::json!({ "refresh_token": tokens["refresh_token"].as_str().unwrap() }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

// ---------------------------------------------------------------------------
// Protected endpoints
// ---------------------------------------------------------------------------

/// Protected endpoints reject missing and malformed tokens with 401.
#[sqlx::test(migrations = "../db/migrations")]
async fn test_protected_endpoint_requires_auth(pool: PgPool) {
    let app = common::build_test_app(pool.clone());
    let response = get(app, "/api/v1/accounts").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let app = common::build_test_app(pool);
    let response = get_auth(app, "/api/v1/accounts", "garbage-token").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

/// The audit listing is admin-only: customers get 403, admins 200.
#[sqlx::test(migrations = "../db/migrations")]
async fn test_audit_listing_requires_admin(pool: PgPool) {
    create_test_user(&pool, "customer@test.com").await;

    // Create an admin by hand (no admin-creation endpoint in this API).
    let hashed = hash_password(PASSWORD).unwrap();
    let admin = UserRepo::create(
        &pool,
        &CreateUser {
            email: "admin@test.com".to_string(),
            password_hash: hashed,
            full_name: "Admin".to_string(),
            role: "admin".to_string(),
        },
    )
    .await
    .unwrap();
    UserRepo::set_verified(&pool, admin.id).await.unwrap();

    let app = common::build_test_app(pool.clone());
    let customer = login_user(app, "customer@test.com", PASSWORD).await;
    let app = common::build_test_app(pool.clone());
    let response = get_auth(
        app,
        "/api/v1/admin/audit",
        customer["access_token"].as_str().unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let app = common::build_test_app(pool.clone());
    let admin_login = login_user(app, "admin@test.com", PASSWORD).await;
    let app = common::build_test_app(pool);
    let response = get_auth(
        app,
        "/api/v1/admin/audit?limit=10",
        admin_login["access_token"].as_str().unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json.is_array(), "audit listing should be an array");
}
