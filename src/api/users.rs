//! Admin user management.

use axum::extract::State;
use axum::routing::{get, patch, put};
use axum::Router;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use super::{AdminUser, ApiError, ApiJson, ApiPath, ApiQuery, ApiResponse, ApiResult, AppState};
use crate::domain::aggregates::{Role, User, UserStatus, UserUpdate};
use crate::domain::FieldErrors;
use crate::store::{Page, Pagination, UserFilter, UserStatistics};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin/users", get(list))
        .route("/admin/users/statistics", get(statistics))
        .route("/admin/users/:id", put(update).delete(remove))
        .route("/admin/users/:id/status", patch(set_status))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserQuery {
    role: Option<Role>,
    status: Option<UserStatus>,
    search: Option<String>,
    page: Option<u32>,
    per_page: Option<u32>,
}

fn not_found() -> ApiError { ApiError::NotFound("User not found".into()) }

async fn list(State(state): State<AppState>, _admin: AdminUser, ApiQuery(q): ApiQuery<UserQuery>) -> ApiResult<Page<User>> {
    let filter = UserFilter { role: q.role, status: q.status, search: q.search, pagination: Pagination::new(q.page, q.per_page) };
    Ok(ApiResponse::ok(state.store.list_users(&filter).await?))
}

async fn update(State(state): State<AppState>, _admin: AdminUser, ApiPath(id): ApiPath<Uuid>, ApiJson(req): ApiJson<UserUpdate>) -> ApiResult<User> {
    req.validate().map_err(FieldErrors::from)?;
    let mut user = state.store.user(id).await?.ok_or_else(not_found)?;
    user.apply(req);
    state.store.update_user(&user).await?;
    Ok(ApiResponse::with_message(user, "User updated"))
}

#[derive(Debug, Deserialize)]
struct StatusRequest { status: UserStatus }

async fn set_status(State(state): State<AppState>, AdminUser(admin): AdminUser, ApiPath(id): ApiPath<Uuid>, ApiJson(req): ApiJson<StatusRequest>) -> ApiResult<User> {
    if id == admin.id && req.status == UserStatus::Inactive {
        return Err(ApiError::BadRequest("You cannot deactivate your own account".into()));
    }
    let mut user = state.store.user(id).await?.ok_or_else(not_found)?;
    user.status = req.status;
    state.store.update_user(&user).await?;
    if user.status == UserStatus::Inactive {
        state.store.delete_user_sessions(user.id).await?;
    }
    info!(user_id = %user.id, status = user.status.as_str(), "user status changed");
    Ok(ApiResponse::ok(user))
}

async fn remove(State(state): State<AppState>, AdminUser(admin): AdminUser, ApiPath(id): ApiPath<Uuid>) -> ApiResult<()> {
    if id == admin.id { return Err(ApiError::BadRequest("You cannot delete your own account".into())); }
    if !state.store.delete_user(id).await? { return Err(not_found()); }
    info!(user_id = %id, admin_id = %admin.id, "user deleted");
    Ok(ApiResponse::with_message((), "User deleted"))
}

async fn statistics(State(state): State<AppState>, _admin: AdminUser) -> ApiResult<UserStatistics> {
    Ok(ApiResponse::ok(state.store.user_statistics().await?))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::TestApp;
    use super::*;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_admin_cannot_delete_self() {
        let app = TestApp::new();
        let (admin, token) = app.user("boss@shop.test", Role::Admin).await;
        let (status, _) = app.request("DELETE", &format!("/api/admin/users/{}", admin.id), Some(&token), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (customer, _) = app.user("c@shop.test", Role::Customer).await;
        let (status, _) = app.request("DELETE", &format!("/api/admin/users/{}", customer.id), Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app.request("DELETE", &format!("/api/admin/users/{}", customer.id), Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_deactivation_ends_sessions() {
        let app = TestApp::new();
        let admin = app.admin().await;
        let (customer, session) = app.user("c@shop.test", Role::Customer).await;
        let (status, body) = app.request("PATCH", &format!("/api/admin/users/{}/status", customer.id), Some(&admin), Some(json!({"status": "inactive"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "inactive");
        let (status, _) = app.request("GET", "/api/users/profile", Some(&session), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_list_filters_and_statistics() {
        let app = TestApp::new();
        let admin = app.admin().await;
        app.user("ann@shop.test", Role::Customer).await;
        app.user("bob@shop.test", Role::Customer).await;
        let (_, body) = app.request("GET", "/api/admin/users?role=customer&search=ann", Some(&admin), None).await;
        assert_eq!(body["data"]["total"], 1);
        assert_eq!(body["data"]["items"][0]["email"], "ann@shop.test");

        let (_, body) = app.request("GET", "/api/admin/users/statistics", Some(&admin), None).await;
        assert_eq!(body["data"]["totalUsers"], 3);
        assert_eq!(body["data"]["admins"], 1);
        assert_eq!(body["data"]["customers"], 2);
    }

    #[tokio::test]
    async fn test_update_validates() {
        let app = TestApp::new();
        let admin = app.admin().await;
        let (customer, _) = app.user("c@shop.test", Role::Customer).await;
        let uri = format!("/api/admin/users/{}", customer.id);
        let (status, body) = app.request("PUT", &uri, Some(&admin), Some(json!({"fullName": "", "role": "customer"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["errors"]["fullName"].is_string());
        let (status, body) = app.request("PUT", &uri, Some(&admin), Some(json!({"fullName": "Carol", "phoneNumber": "0901234567", "role": "admin"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["role"], "admin");
    }
}
