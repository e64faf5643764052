//! Category routes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use super::{AdminUser, ApiError, ApiJson, ApiResponse, ApiResult, AppState};
use crate::domain::aggregates::Category;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin/categories", get(list).post(create))
        .route("/admin/categories/parents", get(parents))
}

async fn list(State(state): State<AppState>, _admin: AdminUser) -> ApiResult<Vec<Category>> {
    Ok(ApiResponse::ok(state.store.categories().await?))
}

/// Top-level categories, offered as parents in the category form.
async fn parents(State(state): State<AppState>, _admin: AdminUser) -> ApiResult<Vec<Category>> {
    let mut categories = state.store.categories().await?;
    categories.retain(|c| c.parent_id.is_none());
    Ok(ApiResponse::ok(categories))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CategoryRequest {
    name: String,
    #[serde(default)]
    parent_id: Option<Uuid>,
    #[serde(default)]
    description: Option<String>,
}

async fn create(State(state): State<AppState>, _admin: AdminUser, ApiJson(req): ApiJson<CategoryRequest>) -> Result<(StatusCode, ApiResponse<Category>), ApiError> {
    if req.name.trim().is_empty() { return Err(ApiError::field("name", "Category name is required")); }
    if let Some(parent_id) = req.parent_id {
        if !state.store.categories().await?.iter().any(|c| c.id == parent_id) {
            return Err(ApiError::field("parentId", "Parent category does not exist"));
        }
    }
    let category = Category::create(&req.name, req.parent_id, req.description.filter(|d| !d.trim().is_empty()));
    state.store.create_category(&category).await?;
    Ok((StatusCode::CREATED, ApiResponse::with_message(category, "Category created")))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::TestApp;
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_parents_lists_top_level_only() {
        let app = TestApp::new();
        let admin = app.admin().await;
        let (status, body) = app.request("POST", "/api/admin/categories", Some(&admin), Some(json!({"name": "Men Clothing"}))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["slug"], "men-clothing");
        let parent = body["data"]["id"].clone();
        app.request("POST", "/api/admin/categories", Some(&admin), Some(json!({"name": "Shirts", "parentId": parent}))).await;

        let (_, body) = app.request("GET", "/api/admin/categories", Some(&admin), None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 2);
        let (_, body) = app.request("GET", "/api/admin/categories/parents", Some(&admin), None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let (status, _) = app.request("POST", "/api/admin/categories", Some(&admin), Some(json!({"name": "Orphan", "parentId": Uuid::now_v7()}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
