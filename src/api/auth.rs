//! Account routes: registration, login, profile and password flows.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use tracing::{info, warn};
use validator::Validate;

use super::{ApiError, ApiJson, ApiPath, ApiResponse, ApiResult, AppState, AuthUser};
use crate::auth::{
    hash_password, verify_password, AuthPayload, ForgotPasswordRequest, LoginRequest, PasswordReset, RegisterRequest,
    ResetPasswordRequest, Session, UpdatePasswordRequest,
};
use crate::domain::aggregates::{Role, User};
use crate::domain::value_objects::Email;
use crate::domain::FieldErrors;
use crate::store::Store;
use crate::Config;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password/:token", post(reset_password))
        .route("/auth/update-password", post(update_password))
        .route("/users/profile", get(profile))
}

async fn start_session(state: &AppState, user: User) -> Result<AuthPayload, ApiError> {
    let session = Session::issue(user.id, state.config.session_ttl_hours);
    state.store.create_session(&session).await?;
    Ok(AuthPayload { token: session.token, user })
}

async fn register(State(state): State<AppState>, ApiJson(req): ApiJson<RegisterRequest>) -> Result<(StatusCode, ApiResponse<AuthPayload>), ApiError> {
    let mut errors = match req.validate() { Ok(()) => FieldErrors::new(), Err(e) => e.into() };
    let email = Email::parse(req.email.as_str());
    if email.is_err() { errors.add("email", "Email is invalid"); }
    errors.into_result()?;
    let email = email.map_err(|e| ApiError::field("email", e.to_string()))?;
    if state.store.user_by_email(&email).await?.is_some() {
        return Err(ApiError::field("email", "Email is already registered"));
    }
    let mut user = User::new(req.full_name.trim(), email, hash_password(&req.password));
    user.phone_number = req.phone_number.map(|p| p.trim().to_string()).filter(|p| !p.is_empty());
    state.store.create_user(&user).await?;
    info!(user_id = %user.id, "user registered");
    let payload = start_session(&state, user).await?;
    Ok((StatusCode::CREATED, ApiResponse::with_message(payload, "Registration successful")))
}

async fn login(State(state): State<AppState>, ApiJson(req): ApiJson<LoginRequest>) -> ApiResult<AuthPayload> {
    const INVALID: ApiError = ApiError::Unauthorized("Invalid email or password");
    let email = Email::parse(req.email.as_str()).map_err(|_| INVALID)?;
    let user = state.store.user_by_email(&email).await?.ok_or(INVALID)?;
    if !verify_password(&req.password, &user.password_hash) { return Err(INVALID); }
    if !user.is_active() { return Err(ApiError::Forbidden("Account is inactive")); }
    let payload = start_session(&state, user).await?;
    Ok(ApiResponse::with_message(payload, "Login successful"))
}

async fn logout(State(state): State<AppState>, auth: AuthUser) -> ApiResult<()> {
    state.store.delete_session(&auth.token).await?;
    Ok(ApiResponse::with_message((), "Logged out"))
}

async fn profile(auth: AuthUser) -> ApiResult<User> {
    Ok(ApiResponse::ok(auth.user))
}

/// Always answers the same way so the endpoint cannot be used to probe for
/// registered addresses.
async fn forgot_password(State(state): State<AppState>, ApiJson(req): ApiJson<ForgotPasswordRequest>) -> ApiResult<()> {
    if let Ok(email) = Email::parse(req.email.as_str()) {
        if let Some(user) = state.store.user_by_email(&email).await?.filter(User::is_active) {
            let reset = PasswordReset::issue(user.id);
            state.store.create_password_reset(&reset).await?;
            info!(user_id = %user.id, token = %reset.token, expires_at = %reset.expires_at, "password reset issued");
        }
    }
    Ok(ApiResponse::with_message((), "If the email is registered, a reset link has been sent"))
}

async fn reset_password(
    State(state): State<AppState>,
    ApiPath(token): ApiPath<String>,
    ApiJson(req): ApiJson<ResetPasswordRequest>,
) -> ApiResult<()> {
    req.validate().map_err(FieldErrors::from)?;
    let reset = state.store.take_password_reset(&token).await?
        .filter(|r| !r.is_expired())
        .ok_or_else(|| ApiError::BadRequest("Reset token is invalid or has expired".into()))?;
    let mut user = state.store.user(reset.user_id).await?.ok_or_else(|| ApiError::NotFound("User not found".into()))?;
    user.password_hash = hash_password(&req.password);
    state.store.update_user(&user).await?;
    state.store.delete_user_sessions(user.id).await?;
    info!(user_id = %user.id, "password reset");
    Ok(ApiResponse::with_message((), "Password has been reset"))
}

/// Rotates every session of the user and hands back a fresh one.
async fn update_password(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(req): ApiJson<UpdatePasswordRequest>,
) -> ApiResult<AuthPayload> {
    req.validate().map_err(FieldErrors::from)?;
    let mut user = auth.user;
    if !verify_password(&req.current_password, &user.password_hash) {
        return Err(ApiError::field("currentPassword", "Current password is incorrect"));
    }
    user.password_hash = hash_password(&req.new_password);
    state.store.update_user(&user).await?;
    state.store.delete_user_sessions(user.id).await?;
    let payload = start_session(&state, user).await?;
    Ok(ApiResponse::with_message(payload, "Password updated"))
}

/// Creates the configured bootstrap admin, or promotes the account if it
/// already exists.
pub async fn ensure_admin(store: &dyn Store, config: &Config) -> crate::Result<()> {
    let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) else { return Ok(()) };
    let Ok(email) = Email::parse(email.as_str()) else {
        warn!(%email, "ADMIN_EMAIL is not a valid address, skipping admin bootstrap");
        return Ok(());
    };
    match store.user_by_email(&email).await? {
        Some(user) if user.is_admin() => {}
        Some(mut user) => {
            user.role = Role::Admin;
            store.update_user(&user).await?;
            info!(%email, "promoted existing user to admin");
        }
        None => {
            let mut admin = User::new("Administrator", email.clone(), hash_password(password));
            admin.role = Role::Admin;
            store.create_user(&admin).await?;
            info!(%email, "bootstrap admin created");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::TestApp;
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_register_login_profile() {
        let app = TestApp::new();
        let (status, body) = app.request("POST", "/api/auth/register", None, Some(json!({
            "fullName": "Jane Doe", "email": "Jane@Example.com", "password": "secret1"
        }))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["user"]["email"], "jane@example.com");
        assert!(body["data"]["user"].get("passwordHash").is_none());

        let (status, body) = app.request("POST", "/api/auth/login", None, Some(json!({"email": "jane@example.com", "password": "secret1"}))).await;
        assert_eq!(status, StatusCode::OK);
        let token = TestApp::payload(&body).token;
        let (_, body) = app.request("GET", "/api/users/profile", Some(&token), None).await;
        assert_eq!(body["data"]["fullName"], "Jane Doe");

        let (status, _) = app.request("POST", "/api/auth/login", None, Some(json!({"email": "jane@example.com", "password": "nope123"}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_register_reports_field_errors() {
        let app = TestApp::new();
        app.user("taken@shop.test", Role::Customer).await;
        let (status, body) = app.request("POST", "/api/auth/register", None, Some(json!({
            "fullName": "", "email": "taken@shop.test", "password": "123"
        }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["errors"]["fullName"].is_string());
        assert!(body["errors"]["password"].is_string());

        let (status, body) = app.request("POST", "/api/auth/register", None, Some(json!({
            "fullName": "Dup", "email": "taken@shop.test", "password": "secret1"
        }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"]["email"], "Email is already registered");
    }

    #[tokio::test]
    async fn test_forgot_and_reset_password() {
        let app = TestApp::new();
        let (user, old_token) = app.user("reset@shop.test", Role::Customer).await;
        let (status, unknown) = app.request("POST", "/api/auth/forgot-password", None, Some(json!({"email": "ghost@shop.test"}))).await;
        assert_eq!(status, StatusCode::OK);
        let (_, known) = app.request("POST", "/api/auth/forgot-password", None, Some(json!({"email": "reset@shop.test"}))).await;
        assert_eq!(unknown, known);

        let reset = PasswordReset::issue(user.id);
        app.state.store.create_password_reset(&reset).await.unwrap();
        let uri = format!("/api/auth/reset-password/{}", reset.token);
        let (status, _) = app.request("POST", &uri, None, Some(json!({"password": "brandnew"}))).await;
        assert_eq!(status, StatusCode::OK);
        // single use
        let (status, _) = app.request("POST", &uri, None, Some(json!({"password": "brandnew"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        // old sessions are gone
        let (status, _) = app.request("GET", "/api/users/profile", Some(&old_token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = app.request("POST", "/api/auth/login", None, Some(json!({"email": "reset@shop.test", "password": "brandnew"}))).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_update_password_requires_current() {
        let app = TestApp::new();
        let (_, token) = app.user("pw@shop.test", Role::Customer).await;
        let (status, body) = app.request("POST", "/api/auth/update-password", Some(&token), Some(json!({
            "currentPassword": "wrong", "newPassword": "another1"
        }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"]["currentPassword"], "Current password is incorrect");

        let (status, body) = app.request("POST", "/api/auth/update-password", Some(&token), Some(json!({
            "currentPassword": "secret1", "newPassword": "another1"
        }))).await;
        assert_eq!(status, StatusCode::OK);
        let fresh = TestApp::payload(&body).token;
        assert_ne!(fresh, token);
        let (status, _) = app.request("GET", "/api/users/profile", Some(&fresh), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_inactive_user_cannot_login() {
        let app = TestApp::new();
        let (mut user, _) = app.user("off@shop.test", Role::Customer).await;
        user.status = crate::domain::aggregates::UserStatus::Inactive;
        app.state.store.update_user(&user).await.unwrap();
        let (status, _) = app.request("POST", "/api/auth/login", None, Some(json!({"email": "off@shop.test", "password": "secret1"}))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_ensure_admin_creates_then_promotes() {
        let store = MemoryStore::new();
        let config = Config { admin_email: Some("root@shop.test".into()), admin_password: Some("secret1".into()), ..Config::default() };
        ensure_admin(&store, &config).await.unwrap();
        ensure_admin(&store, &config).await.unwrap();
        let admin = store.user_by_email(&Email::parse("root@shop.test").unwrap()).await.unwrap().unwrap();
        assert!(admin.is_admin());
        assert!(verify_password("secret1", &admin.password_hash));
    }
}
