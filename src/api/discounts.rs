//! Discount code routes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tracing::info;

use super::{AdminUser, ApiError, ApiJson, ApiPath, ApiResponse, ApiResult, AppState, AuthUser};
use crate::domain::aggregates::{DiscountCode, DiscountError, NewDiscount};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/discounts", get(list).post(create))
        .route("/discounts/:code", get(lookup).patch(set_active).delete(remove))
}

async fn find(state: &AppState, code: &str) -> Result<DiscountCode, ApiError> {
    state.store.discount(&code.trim().to_uppercase()).await?.ok_or_else(|| ApiError::NotFound("Discount code not found".into()))
}

async fn list(State(state): State<AppState>, _admin: AdminUser) -> ApiResult<Vec<DiscountCode>> {
    Ok(ApiResponse::ok(state.store.list_discounts().await?))
}

async fn create(State(state): State<AppState>, _admin: AdminUser, ApiJson(input): ApiJson<NewDiscount>) -> Result<(StatusCode, ApiResponse<DiscountCode>), ApiError> {
    let discount = DiscountCode::create(input)?;
    state.store.create_discount(&discount).await?;
    info!(code = %discount.code, "discount code created");
    Ok((StatusCode::CREATED, ApiResponse::with_message(discount, "Discount code created")))
}

/// Shoppers only get codes they can still redeem.
async fn lookup(State(state): State<AppState>, auth: AuthUser, ApiPath(code): ApiPath<String>) -> ApiResult<DiscountCode> {
    let discount = find(&state, &code).await?;
    if !auth.user.is_admin() { discount.ensure_redeemable()?; }
    Ok(ApiResponse::ok(discount))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActiveRequest { is_active: bool }

async fn set_active(State(state): State<AppState>, _admin: AdminUser, ApiPath(code): ApiPath<String>, ApiJson(req): ApiJson<ActiveRequest>) -> ApiResult<DiscountCode> {
    let mut discount = find(&state, &code).await?;
    discount.is_active = req.is_active;
    state.store.update_discount(&discount).await?;
    Ok(ApiResponse::ok(find(&state, &discount.code).await?))
}

/// Codes that were redeemed are kept.
async fn remove(State(state): State<AppState>, _admin: AdminUser, ApiPath(code): ApiPath<String>) -> ApiResult<()> {
    let discount = find(&state, &code).await?;
    if !discount.can_delete() { return Err(DiscountError::InUse(discount.code).into()); }
    if !state.store.delete_discount(&discount.code).await? {
        return Err(DiscountError::InUse(discount.code).into());
    }
    info!(code = %discount.code, "discount code deleted");
    Ok(ApiResponse::with_message((), "Discount code deleted"))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::TestApp;
    use super::*;
    use crate::domain::aggregates::Role;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_validates_on_server_too() {
        let app = TestApp::new();
        let admin = app.admin().await;
        let (status, body) = app.request("POST", "/api/discounts", Some(&admin), Some(json!({
            "code": "AB12C", "discountType": "percentage", "discountValue": 150, "usageLimit": 5
        }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"]["discountValue"], "Percentage must be between 1 and 100");

        let (status, body) = app.request("POST", "/api/discounts", Some(&admin), Some(json!({
            "code": "ab12c", "discountType": "percentage", "discountValue": 15, "usageLimit": 5
        }))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["code"], "AB12C");
        let (status, _) = app.request("POST", "/api/discounts", Some(&admin), Some(json!({
            "code": "AB12C", "discountType": "fixed", "discountValue": 1000, "usageLimit": 1
        }))).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_used_codes_cannot_be_deleted() {
        let app = TestApp::new();
        let admin = app.admin().await;
        app.request("POST", "/api/discounts", Some(&admin), Some(json!({
            "code": "USED1", "discountType": "fixed", "discountValue": 1000, "usageLimit": 2
        }))).await;
        app.state.store.redeem_discount("USED1").await.unwrap();
        let (status, body) = app.request("DELETE", "/api/discounts/USED1", Some(&admin), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["message"].as_str().unwrap().contains("cannot be deleted"));

        app.request("POST", "/api/discounts", Some(&admin), Some(json!({
            "code": "FRESH", "discountType": "fixed", "discountValue": 1000, "usageLimit": 2
        }))).await;
        let (status, _) = app.request("DELETE", "/api/discounts/FRESH", Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_toggle_and_customer_lookup() {
        let app = TestApp::new();
        let admin = app.admin().await;
        let (_, shopper) = app.user("c@shop.test", Role::Customer).await;
        app.request("POST", "/api/discounts", Some(&admin), Some(json!({
            "code": "SALE5", "discountType": "percentage", "discountValue": 5, "usageLimit": 3
        }))).await;
        let (status, _) = app.request("GET", "/api/discounts/sale5", Some(&shopper), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = app.request("PATCH", "/api/discounts/SALE5", Some(&admin), Some(json!({"isActive": false}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["isActive"], false);
        let (status, _) = app.request("GET", "/api/discounts/SALE5", Some(&shopper), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        let (status, _) = app.request("GET", "/api/discounts/SALE5", Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app.request("GET", "/api/discounts", Some(&shopper), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
