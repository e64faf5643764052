//! Catalog routes: public browsing plus the admin product, variant and
//! image managers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, patch, put};
use axum::Router;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use super::{AdminUser, ApiError, ApiJson, ApiPath, ApiQuery, ApiResponse, ApiResult, AppState};
use crate::domain::aggregates::image::{ensure_main, reorder, set_main};
use crate::domain::aggregates::{ImageError, ImageInput, ImagePatch, Product, ProductImage, ProductInput, Variant, VariantInput};
use crate::domain::events::{DomainEvent, ProductEvent};
use crate::domain::FieldErrors;
use crate::store::{BestSeller, Page, Pagination, ProductFilter};

pub const DEFAULT_BEST_SELLERS: u32 = 10;
pub const MAX_BEST_SELLERS: u32 = 50;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(public_products))
        .route("/products/:id", get(public_product))
        .route("/admin/products", get(admin_products).post(create_product))
        .route("/admin/products/best-selling", get(best_selling))
        .route("/admin/products/:id", get(admin_product).put(update_product).delete(delete_product))
        .route("/admin/products/:id/status", patch(set_status))
        .route("/admin/products/:id/variants", get(list_variants).post(create_variant))
        .route("/admin/products/:id/variants/:variant_id", put(update_variant).delete(delete_variant))
        .route("/admin/products/:id/images", get(list_images).post(create_image))
        .route("/admin/products/:id/images/order", put(reorder_images))
        .route("/admin/products/:id/images/:image_id", patch(update_image).delete(delete_image))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProductQuery {
    search: Option<String>,
    category_id: Option<Uuid>,
    is_active: Option<bool>,
    page: Option<u32>,
    per_page: Option<u32>,
}

impl ProductQuery {
    fn filter(self, is_active: Option<bool>) -> ProductFilter {
        ProductFilter {
            search: self.search, category_id: self.category_id, is_active,
            pagination: Pagination::new(self.page, self.per_page),
        }
    }
}

fn product_not_found() -> ApiError { ApiError::NotFound("Product not found".into()) }

async fn load_product(state: &AppState, id: Uuid) -> Result<Product, ApiError> {
    state.store.product(id).await?.ok_or_else(product_not_found)
}

// =============================================================================
// Public catalog
// =============================================================================

async fn public_products(State(state): State<AppState>, ApiQuery(query): ApiQuery<ProductQuery>) -> ApiResult<Page<Product>> {
    let page = state.store.list_products(&query.filter(Some(true))).await?;
    Ok(ApiResponse::ok(page))
}

async fn public_product(State(state): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> ApiResult<Product> {
    let mut product = state.store.product(id).await?.filter(|p| p.flags.is_active).ok_or_else(product_not_found)?;
    product.variants.retain(|v| v.is_active);
    Ok(ApiResponse::ok(product))
}

// =============================================================================
// Admin products
// =============================================================================

async fn admin_products(State(state): State<AppState>, _admin: AdminUser, ApiQuery(query): ApiQuery<ProductQuery>) -> ApiResult<Page<Product>> {
    let is_active = query.is_active;
    let page = state.store.list_products(&query.filter(is_active)).await?;
    Ok(ApiResponse::ok(page))
}

async fn admin_product(State(state): State<AppState>, _admin: AdminUser, ApiPath(id): ApiPath<Uuid>) -> ApiResult<Product> {
    Ok(ApiResponse::ok(load_product(&state, id).await?))
}

async fn create_product(State(state): State<AppState>, _admin: AdminUser, ApiJson(input): ApiJson<ProductInput>) -> Result<(StatusCode, ApiResponse<Product>), ApiError> {
    input.check()?;
    let product = Product::create(input);
    state.store.create_product(&product).await?;
    info!(product_id = %product.id, name = %product.name, "product created");
    state.events.publish(DomainEvent::Product(ProductEvent::Created { product_id: product.id })).await;
    Ok((StatusCode::CREATED, ApiResponse::with_message(product, "Product created")))
}

async fn update_product(State(state): State<AppState>, _admin: AdminUser, ApiPath(id): ApiPath<Uuid>, ApiJson(input): ApiJson<ProductInput>) -> ApiResult<Product> {
    input.check()?;
    let mut product = load_product(&state, id).await?;
    product.apply(input);
    state.store.update_product(&product).await?;
    Ok(ApiResponse::with_message(product, "Product updated"))
}

async fn delete_product(State(state): State<AppState>, _admin: AdminUser, ApiPath(id): ApiPath<Uuid>) -> ApiResult<()> {
    if !state.store.delete_product(id).await? { return Err(product_not_found()); }
    info!(product_id = %id, "product deleted");
    Ok(ApiResponse::with_message((), "Product deleted"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusRequest { is_active: bool }

async fn set_status(State(state): State<AppState>, _admin: AdminUser, ApiPath(id): ApiPath<Uuid>, ApiJson(req): ApiJson<StatusRequest>) -> ApiResult<Product> {
    let mut product = load_product(&state, id).await?;
    product.set_active(req.is_active);
    state.store.update_product(&product).await?;
    Ok(ApiResponse::ok(product))
}

#[derive(Debug, Deserialize)]
struct BestSellerQuery { limit: Option<u32> }

async fn best_selling(State(state): State<AppState>, _admin: AdminUser, ApiQuery(query): ApiQuery<BestSellerQuery>) -> ApiResult<Vec<BestSeller>> {
    let limit = query.limit.unwrap_or(DEFAULT_BEST_SELLERS).clamp(1, MAX_BEST_SELLERS);
    Ok(ApiResponse::ok(state.store.best_sellers(limit).await?))
}

// =============================================================================
// Variants
// =============================================================================

async fn list_variants(State(state): State<AppState>, _admin: AdminUser, ApiPath(id): ApiPath<Uuid>) -> ApiResult<Vec<Variant>> {
    load_product(&state, id).await?;
    Ok(ApiResponse::ok(state.store.variants(id).await?))
}

async fn create_variant(State(state): State<AppState>, _admin: AdminUser, ApiPath(id): ApiPath<Uuid>, ApiJson(input): ApiJson<VariantInput>) -> Result<(StatusCode, ApiResponse<Variant>), ApiError> {
    let product = load_product(&state, id).await?;
    input.check(&product.variants, None)?;
    let variant = Variant::from_input(product.id, input)?;
    state.store.create_variant(&variant).await?;
    info!(product_id = %product.id, sku = %variant.sku, "variant created");
    Ok((StatusCode::CREATED, ApiResponse::with_message(variant, "Variant created")))
}

async fn update_variant(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiPath((id, variant_id)): ApiPath<(Uuid, Uuid)>,
    ApiJson(input): ApiJson<VariantInput>,
) -> ApiResult<Variant> {
    let product = load_product(&state, id).await?;
    let mut variant = product.variant(variant_id).cloned().ok_or_else(|| ApiError::NotFound("Variant not found".into()))?;
    input.check(&product.variants, Some(variant_id))?;
    variant.apply(input)?;
    state.store.update_variant(&variant).await?;
    Ok(ApiResponse::with_message(variant, "Variant updated"))
}

async fn delete_variant(State(state): State<AppState>, _admin: AdminUser, ApiPath((id, variant_id)): ApiPath<(Uuid, Uuid)>) -> ApiResult<()> {
    if !state.store.delete_variant(id, variant_id).await? {
        return Err(ApiError::NotFound("Variant not found".into()));
    }
    info!(product_id = %id, %variant_id, "variant deleted");
    Ok(ApiResponse::with_message((), "Variant deleted"))
}

// =============================================================================
// Images
// =============================================================================

/// Repairs main flags after the pool membership changed and persists the
/// images whose flag moved.
async fn settle_main_flags(state: &AppState, product_id: Uuid) -> Result<Vec<ProductImage>, ApiError> {
    let mut images = state.store.images(product_id).await?;
    let changed = ensure_main(&mut images);
    if !changed.is_empty() {
        let dirty: Vec<ProductImage> = images.iter().filter(|i| changed.contains(&i.id)).cloned().collect();
        state.store.save_images(product_id, &dirty).await?;
    }
    Ok(images)
}

async fn list_images(State(state): State<AppState>, _admin: AdminUser, ApiPath(id): ApiPath<Uuid>) -> ApiResult<Vec<ProductImage>> {
    load_product(&state, id).await?;
    Ok(ApiResponse::ok(state.store.images(id).await?))
}

async fn create_image(State(state): State<AppState>, _admin: AdminUser, ApiPath(id): ApiPath<Uuid>, ApiJson(input): ApiJson<ImageInput>) -> Result<(StatusCode, ApiResponse<ProductImage>), ApiError> {
    input.validate().map_err(FieldErrors::from)?;
    let product = load_product(&state, id).await?;
    if let Some(variant_id) = input.variant_id {
        if product.variant(variant_id).is_none() { return Err(ImageError::UnknownVariant(variant_id).into()); }
    }
    let sort_order = product.images.iter().map(|i| i.sort_order + 1).max().unwrap_or(0);
    let is_main = input.is_main;
    let image = ProductImage::create(product.id, input, sort_order);
    state.store.create_image(&image).await?;
    if is_main {
        let mut images = state.store.images(product.id).await?;
        set_main(&mut images, image.id)?;
        state.store.save_images(product.id, &images).await?;
    }
    let images = settle_main_flags(&state, product.id).await?;
    let image = images.into_iter().find(|i| i.id == image.id).ok_or(ImageError::NotFound(image.id))?;
    Ok((StatusCode::CREATED, ApiResponse::with_message(image, "Image added")))
}

async fn update_image(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiPath((id, image_id)): ApiPath<(Uuid, Uuid)>,
    ApiJson(patch): ApiJson<ImagePatch>,
) -> ApiResult<ProductImage> {
    patch.validate().map_err(FieldErrors::from)?;
    load_product(&state, id).await?;
    let mut images = state.store.images(id).await?;
    let image = images.iter_mut().find(|i| i.id == image_id).ok_or(ImageError::NotFound(image_id))?;
    if let Some(alt) = patch.alt {
        image.alt = alt.trim().to_string();
    }
    match patch.is_main {
        Some(true) => set_main(&mut images, image_id)?,
        Some(false) => {
            if let Some(image) = images.iter_mut().find(|i| i.id == image_id) { image.is_main = false; }
        }
        None => {}
    }
    state.store.save_images(id, &images).await?;
    let images = settle_main_flags(&state, id).await?;
    let image = images.into_iter().find(|i| i.id == image_id).ok_or(ImageError::NotFound(image_id))?;
    Ok(ApiResponse::with_message(image, "Image updated"))
}

async fn delete_image(State(state): State<AppState>, _admin: AdminUser, ApiPath((id, image_id)): ApiPath<(Uuid, Uuid)>) -> ApiResult<()> {
    if !state.store.delete_image(id, image_id).await? {
        return Err(ImageError::NotFound(image_id).into());
    }
    settle_main_flags(&state, id).await?;
    Ok(ApiResponse::with_message((), "Image deleted"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReorderRequest { image_ids: Vec<Uuid> }

async fn reorder_images(State(state): State<AppState>, _admin: AdminUser, ApiPath(id): ApiPath<Uuid>, ApiJson(req): ApiJson<ReorderRequest>) -> ApiResult<Vec<ProductImage>> {
    load_product(&state, id).await?;
    let mut images = state.store.images(id).await?;
    reorder(&mut images, &req.image_ids)?;
    state.store.save_images(id, &images).await?;
    Ok(ApiResponse::with_message(images, "Image order saved"))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::TestApp;
    use super::*;
    use crate::domain::aggregates::Role;
    use serde_json::{json, Value};

    async fn create_product(app: &TestApp, token: &str, body: Value) -> String {
        let (status, body) = app.request("POST", "/api/admin/products", Some(token), Some(body)).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["data"]["id"].as_str().unwrap().to_string()
    }

    fn variant_body(sku: &str, price: i64, sale: Option<i64>) -> Value {
        json!({"sku": sku, "name": "Red / XL", "price": price, "salePrice": sale, "inventory": 3, "attributes": {"color": "red", "size": "XL"}})
    }

    #[tokio::test]
    async fn test_public_catalog_hides_inactive() {
        let app = TestApp::new();
        let admin = app.admin().await;
        let live = create_product(&app, &admin, json!({"name": "Live", "basePrice": 100, "isActive": true})).await;
        let hidden = create_product(&app, &admin, json!({"name": "Draft", "basePrice": 100})).await;
        let (_, body) = app.request("GET", "/api/products", None, None).await;
        assert_eq!(body["data"]["total"], 1);
        assert_eq!(body["data"]["items"][0]["id"], live.as_str());
        let (status, _) = app.request("GET", &format!("/api/products/{hidden}"), None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (_, body) = app.request("GET", "/api/admin/products?search=dra", Some(&admin), None).await;
        assert_eq!(body["data"]["total"], 1);
    }

    #[tokio::test]
    async fn test_variant_validation_and_sku_uniqueness() {
        let app = TestApp::new();
        let admin = app.admin().await;
        let id = create_product(&app, &admin, json!({"name": "Tee", "basePrice": 100, "hasVariants": true})).await;
        let uri = format!("/api/admin/products/{id}/variants");

        let (status, body) = app.request("POST", &uri, Some(&admin), Some(variant_body("TEE-RED", 100, Some(100)))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"]["salePrice"], "Sale price must be lower than the regular price");

        let (status, _) = app.request("POST", &uri, Some(&admin), Some(variant_body("TEE-RED", 100, Some(80)))).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) = app.request("POST", &uri, Some(&admin), Some(variant_body("tee-red", 120, None))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"]["sku"], "SKU already exists for this product");
    }

    #[tokio::test]
    async fn test_variant_attributes_survive_reload() {
        let app = TestApp::new();
        let admin = app.admin().await;
        let id = create_product(&app, &admin, json!({"name": "Tee", "basePrice": 100})).await;
        let (_, body) = app.request("POST", &format!("/api/admin/products/{id}/variants"), Some(&admin), Some(variant_body("TEE-1", 100, None))).await;
        let variant_id = body["data"]["id"].as_str().unwrap().to_string();

        let mut edited = variant_body("TEE-1", 100, None);
        edited["attributes"] = json!({"color": "navy", "fit": "slim", "size": "L"});
        let (status, _) = app.request("PUT", &format!("/api/admin/products/{id}/variants/{variant_id}"), Some(&admin), Some(edited)).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = app.request("GET", &format!("/api/admin/products/{id}"), Some(&admin), None).await;
        assert_eq!(body["data"]["variants"][0]["attributes"], json!({"color": "navy", "fit": "slim", "size": "L"}));
    }

    #[tokio::test]
    async fn test_images_keep_one_main_per_pool() {
        let app = TestApp::new();
        let admin = app.admin().await;
        let id = create_product(&app, &admin, json!({"name": "Mug", "basePrice": 100})).await;
        let uri = format!("/api/admin/products/{id}/images");
        let mut ids = Vec::new();
        for n in 0..3 {
            let (status, body) = app.request("POST", &uri, Some(&admin), Some(json!({"imageUrl": format!("https://cdn.shop.test/{n}.jpg")}))).await;
            assert_eq!(status, StatusCode::CREATED);
            ids.push(body["data"]["id"].as_str().unwrap().to_string());
        }
        let (_, body) = app.request("GET", &uri, Some(&admin), None).await;
        let mains: Vec<bool> = body["data"].as_array().unwrap().iter().map(|i| i["isMain"].as_bool().unwrap()).collect();
        assert_eq!(mains, vec![true, false, false]);

        let (status, _) = app.request("PATCH", &format!("{uri}/{}", ids[2]), Some(&admin), Some(json!({"isMain": true}))).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = app.request("GET", &uri, Some(&admin), None).await;
        let mains: Vec<bool> = body["data"].as_array().unwrap().iter().map(|i| i["isMain"].as_bool().unwrap()).collect();
        assert_eq!(mains, vec![false, false, true]);

        // deleting the main promotes the first remaining image
        app.request("DELETE", &format!("{uri}/{}", ids[2]), Some(&admin), None).await;
        let (_, body) = app.request("GET", &uri, Some(&admin), None).await;
        assert_eq!(body["data"][0]["isMain"], true);
    }

    #[tokio::test]
    async fn test_long_alt_text_is_rejected() {
        let app = TestApp::new();
        let admin = app.admin().await;
        let id = create_product(&app, &admin, json!({"name": "Mug", "basePrice": 100})).await;
        let uri = format!("/api/admin/products/{id}/images");
        let (_, body) = app.request("POST", &uri, Some(&admin), Some(json!({"imageUrl": "https://cdn.shop.test/mug.jpg"}))).await;
        let image = format!("{uri}/{}", body["data"]["id"].as_str().unwrap());

        let (status, body) = app.request("PATCH", &image, Some(&admin), Some(json!({"alt": "x".repeat(256)}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"]["alt"], "Alt text must be at most 255 characters");

        let (status, body) = app.request("PATCH", &image, Some(&admin), Some(json!({"alt": " White mug "}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["alt"], "White mug");
    }

    #[tokio::test]
    async fn test_reorder_persists() {
        let app = TestApp::new();
        let admin = app.admin().await;
        let id = create_product(&app, &admin, json!({"name": "Mug", "basePrice": 100})).await;
        let uri = format!("/api/admin/products/{id}/images");
        let mut ids = Vec::new();
        for n in 0..2 {
            let (_, body) = app.request("POST", &uri, Some(&admin), Some(json!({"imageUrl": format!("https://cdn.shop.test/{n}.jpg")}))).await;
            ids.push(body["data"]["id"].clone());
        }
        let (status, _) = app.request("PUT", &format!("{uri}/order"), Some(&admin), Some(json!({"imageIds": [ids[1], ids[0]]}))).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = app.request("GET", &uri, Some(&admin), None).await;
        assert_eq!(body["data"][0]["id"], ids[1]);
        let (status, _) = app.request("PUT", &format!("{uri}/order"), Some(&admin), Some(json!({"imageIds": [ids[1]]}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_variant_image_requires_own_variant() {
        let app = TestApp::new();
        let admin = app.admin().await;
        let id = create_product(&app, &admin, json!({"name": "Mug", "basePrice": 100})).await;
        let (status, body) = app.request("POST", &format!("/api/admin/products/{id}/images"), Some(&admin), Some(json!({
            "imageUrl": "https://cdn.shop.test/v.jpg", "variantId": Uuid::now_v7()
        }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["errors"]["variantId"].is_string());
    }

    #[tokio::test]
    async fn test_best_selling_requires_admin() {
        let app = TestApp::new();
        let (_, token) = app.user("c@shop.test", Role::Customer).await;
        let (status, _) = app.request("GET", "/api/admin/products/best-selling", Some(&token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let admin = app.admin().await;
        let (status, body) = app.request("GET", "/api/admin/products/best-selling", Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], json!([]));
    }
}
