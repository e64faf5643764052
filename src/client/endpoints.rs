//! One method per REST route.

use reqwest::Method;
use serde_json::json;
use uuid::Uuid;

use super::{ApiClient, ClientError, ListQuery};
use crate::api::OrderTracking;
use crate::auth::{AuthPayload, ForgotPasswordRequest, LoginRequest, RegisterRequest, ResetPasswordRequest, UpdatePasswordRequest};
use crate::domain::aggregates::{
    Category, CheckoutRequest, DiscountCode, ImageInput, ImagePatch, NewDiscount, Order, OrderStatus, Product, ProductImage,
    ProductInput, User, UserStatus, UserUpdate, Variant, VariantInput,
};
use crate::store::{BestSeller, OrderStatistics, Page, RevenuePoint, UserStatistics};

impl ApiClient {
    // auth

    pub async fn register(&self, req: &RegisterRequest) -> Result<User, ClientError> {
        let payload: AuthPayload = self.send(Method::POST, "/auth/register", req).await?;
        self.session.sign_in(&payload).await?;
        Ok(payload.user)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User, ClientError> {
        let req = LoginRequest { email: email.to_string(), password: password.to_string() };
        let payload: AuthPayload = self.send(Method::POST, "/auth/login", &req).await?;
        self.session.sign_in(&payload).await?;
        Ok(payload.user)
    }

    /// Signs out locally even when the server call fails.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let remote: Result<(), ClientError> = self.send(Method::POST, "/auth/logout", &json!({})).await;
        self.session.teardown().await?;
        remote
    }

    pub async fn profile(&self) -> Result<User, ClientError> { self.get("/users/profile").await }

    pub async fn forgot_password(&self, email: &str) -> Result<(), ClientError> {
        self.send(Method::POST, "/auth/forgot-password", &ForgotPasswordRequest { email: email.to_string() }).await
    }

    pub async fn reset_password(&self, token: &str, password: &str) -> Result<(), ClientError> {
        let req = ResetPasswordRequest { password: password.to_string() };
        self.send(Method::POST, &format!("/auth/reset-password/{token}"), &req).await
    }

    pub async fn update_password(&self, current_password: &str, new_password: &str) -> Result<(), ClientError> {
        let req = UpdatePasswordRequest { current_password: current_password.to_string(), new_password: new_password.to_string() };
        let payload: AuthPayload = self.send(Method::POST, "/auth/update-password", &req).await?;
        self.session.sign_in(&payload).await
    }

    // catalog

    pub async fn products(&self, query: &ListQuery) -> Result<Page<Product>, ClientError> { self.get_query("/products", query).await }

    pub async fn product(&self, id: Uuid) -> Result<Product, ClientError> { self.get(&format!("/products/{id}")).await }

    pub async fn admin_products(&self, query: &ListQuery) -> Result<Page<Product>, ClientError> {
        self.get_query("/admin/products", query).await
    }

    pub async fn admin_product(&self, id: Uuid) -> Result<Product, ClientError> { self.get(&format!("/admin/products/{id}")).await }

    pub async fn create_product(&self, input: &ProductInput) -> Result<Product, ClientError> {
        self.send(Method::POST, "/admin/products", input).await
    }

    pub async fn update_product(&self, id: Uuid, input: &ProductInput) -> Result<Product, ClientError> {
        self.send(Method::PUT, &format!("/admin/products/{id}"), input).await
    }

    pub async fn delete_product(&self, id: Uuid) -> Result<(), ClientError> { self.delete(&format!("/admin/products/{id}")).await }

    pub async fn set_product_active(&self, id: Uuid, is_active: bool) -> Result<Product, ClientError> {
        self.send(Method::PATCH, &format!("/admin/products/{id}/status"), &json!({ "isActive": is_active })).await
    }

    pub async fn best_selling(&self, limit: u32) -> Result<Vec<BestSeller>, ClientError> {
        self.get_query("/admin/products/best-selling", &[("limit", limit)]).await
    }

    pub async fn variants(&self, product_id: Uuid) -> Result<Vec<Variant>, ClientError> {
        self.get(&format!("/admin/products/{product_id}/variants")).await
    }

    pub async fn create_variant(&self, product_id: Uuid, input: &VariantInput) -> Result<Variant, ClientError> {
        self.send(Method::POST, &format!("/admin/products/{product_id}/variants"), input).await
    }

    pub async fn update_variant(&self, product_id: Uuid, variant_id: Uuid, input: &VariantInput) -> Result<Variant, ClientError> {
        self.send(Method::PUT, &format!("/admin/products/{product_id}/variants/{variant_id}"), input).await
    }

    pub async fn delete_variant(&self, product_id: Uuid, variant_id: Uuid) -> Result<(), ClientError> {
        self.delete(&format!("/admin/products/{product_id}/variants/{variant_id}")).await
    }

    pub async fn images(&self, product_id: Uuid) -> Result<Vec<ProductImage>, ClientError> {
        self.get(&format!("/admin/products/{product_id}/images")).await
    }

    pub async fn create_image(&self, product_id: Uuid, input: &ImageInput) -> Result<ProductImage, ClientError> {
        self.send(Method::POST, &format!("/admin/products/{product_id}/images"), input).await
    }

    pub async fn update_image(&self, product_id: Uuid, image_id: Uuid, patch: &ImagePatch) -> Result<ProductImage, ClientError> {
        self.send(Method::PATCH, &format!("/admin/products/{product_id}/images/{image_id}"), patch).await
    }

    pub async fn delete_image(&self, product_id: Uuid, image_id: Uuid) -> Result<(), ClientError> {
        self.delete(&format!("/admin/products/{product_id}/images/{image_id}")).await
    }

    pub async fn reorder_images(&self, product_id: Uuid, image_ids: &[Uuid]) -> Result<Vec<ProductImage>, ClientError> {
        self.send(Method::PUT, &format!("/admin/products/{product_id}/images/order"), &json!({ "imageIds": image_ids })).await
    }

    pub async fn categories(&self) -> Result<Vec<Category>, ClientError> { self.get("/admin/categories").await }

    pub async fn parent_categories(&self) -> Result<Vec<Category>, ClientError> { self.get("/admin/categories/parents").await }

    pub async fn create_category(&self, name: &str, parent_id: Option<Uuid>, description: Option<&str>) -> Result<Category, ClientError> {
        let body = json!({ "name": name, "parentId": parent_id, "description": description });
        self.send(Method::POST, "/admin/categories", &body).await
    }

    // orders

    pub async fn checkout(&self, req: &CheckoutRequest) -> Result<Order, ClientError> { self.send(Method::POST, "/orders", req).await }

    pub async fn my_orders(&self, query: &ListQuery) -> Result<Page<Order>, ClientError> { self.get_query("/orders/user", query).await }

    pub async fn my_order(&self, id: Uuid) -> Result<Order, ClientError> { self.get(&format!("/orders/user/{id}")).await }

    pub async fn tracking(&self, id: Uuid) -> Result<OrderTracking, ClientError> {
        self.get(&format!("/orders/user/{id}/tracking")).await
    }

    pub async fn cancel_order(&self, id: Uuid, reason: &str) -> Result<Order, ClientError> {
        self.send(Method::POST, &format!("/orders/user/{id}/cancel"), &json!({ "reason": reason })).await
    }

    pub async fn admin_orders(&self, query: &ListQuery) -> Result<Page<Order>, ClientError> {
        self.get_query("/admin/orders", query).await
    }

    pub async fn admin_order(&self, id: Uuid) -> Result<Order, ClientError> { self.get(&format!("/admin/orders/{id}")).await }

    pub async fn update_order_status(&self, id: Uuid, status: OrderStatus, note: Option<&str>) -> Result<Order, ClientError> {
        let body = json!({ "status": status, "note": note });
        self.send(Method::PATCH, &format!("/admin/orders/{id}/status"), &body).await
    }

    pub async fn order_statistics(&self) -> Result<OrderStatistics, ClientError> { self.get("/admin/orders/statistics").await }

    pub async fn revenue_chart(&self, days: u32) -> Result<Vec<RevenuePoint>, ClientError> {
        self.get_query("/admin/orders/revenue-chart", &[("days", days)]).await
    }

    // discounts

    pub async fn discounts(&self) -> Result<Vec<DiscountCode>, ClientError> { self.get("/discounts").await }

    pub async fn discount(&self, code: &str) -> Result<DiscountCode, ClientError> { self.get(&format!("/discounts/{code}")).await }

    pub async fn create_discount(&self, input: &NewDiscount) -> Result<DiscountCode, ClientError> {
        self.send(Method::POST, "/discounts", input).await
    }

    pub async fn set_discount_active(&self, code: &str, is_active: bool) -> Result<DiscountCode, ClientError> {
        self.send(Method::PATCH, &format!("/discounts/{code}"), &json!({ "isActive": is_active })).await
    }

    pub async fn delete_discount(&self, code: &str) -> Result<(), ClientError> { self.delete(&format!("/discounts/{code}")).await }

    // users

    pub async fn users(&self, query: &ListQuery) -> Result<Page<User>, ClientError> { self.get_query("/admin/users", query).await }

    pub async fn update_user(&self, id: Uuid, update: &UserUpdate) -> Result<User, ClientError> {
        self.send(Method::PUT, &format!("/admin/users/{id}"), update).await
    }

    pub async fn set_user_status(&self, id: Uuid, status: UserStatus) -> Result<User, ClientError> {
        self.send(Method::PATCH, &format!("/admin/users/{id}/status"), &json!({ "status": status })).await
    }

    pub async fn delete_user(&self, id: Uuid) -> Result<(), ClientError> { self.delete(&format!("/admin/users/{id}")).await }

    pub async fn user_statistics(&self) -> Result<UserStatistics, ClientError> { self.get("/admin/users/statistics").await }
}
