//! REST API
//!
//! Every route under `/api` answers with the `{success, message?, data}`
//! envelope. Failures carry `success: false`, a message, and for
//! validation failures an `errors` map keyed by field.

pub mod auth;
mod categories;
mod discounts;
mod orders;
mod products;
mod users;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts};
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::domain::aggregates::{DiscountError, ImageError, OrderError, User, VariantError};
use crate::domain::events::EventPublisher;
use crate::domain::FieldErrors;
use crate::store::Store;
use crate::{Config, EcommerceError};

pub use auth::ensure_admin;
pub use orders::OrderTracking;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub events: EventPublisher,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, events: EventPublisher, config: Config) -> Self {
        Self { store, events, config: Arc::new(config) }
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .merge(auth::routes())
        .merge(orders::routes())
        .merge(products::routes())
        .merge(discounts::routes())
        .merge(users::routes())
        .merge(categories::routes());

    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "opensase-storefront"})) }))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// =============================================================================
// Envelope
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self { Self { success: true, message: None, data } }
    pub fn with_message(data: T, message: impl Into<String>) -> Self { Self { success: true, message: Some(message.into()), data } }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response { Json(self).into_response() }
}

pub type ApiResult<T> = Result<ApiResponse<T>, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("Validation failed")]
    Validation(FieldErrors),
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Internal server error")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<&'a FieldErrors>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.add(field, message);
        Self::Validation(errors)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(detail) = &self {
            tracing::error!(%detail, "request failed");
        }
        let errors = match &self { Self::Validation(e) => Some(e), _ => None };
        let body = ErrorBody { success: false, message: self.to_string(), errors };
        (self.status(), Json(body)).into_response()
    }
}

impl From<EcommerceError> for ApiError {
    fn from(err: EcommerceError) -> Self {
        match err {
            EcommerceError::NotFound(what) => Self::NotFound(format!("{what} not found")),
            EcommerceError::Conflict(msg) => Self::Conflict(msg),
            e @ EcommerceError::InsufficientInventory { .. } => Self::Conflict(e.to_string()),
            EcommerceError::StorageError(msg) => Self::Internal(msg),
        }
    }
}

impl From<FieldErrors> for ApiError {
    fn from(errors: FieldErrors) -> Self { Self::Validation(errors) }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::UnknownStatus(_) | OrderError::NoItems => Self::BadRequest(err.to_string()),
            OrderError::ReasonRequired => Self::field("reason", err.to_string()),
            OrderError::Terminal(_) | OrderError::InvalidTransition { .. } | OrderError::NotCancellable(_) => Self::Conflict(err.to_string()),
        }
    }
}

impl From<DiscountError> for ApiError {
    fn from(err: DiscountError) -> Self {
        match err {
            DiscountError::UnknownType(_) => Self::BadRequest(err.to_string()),
            _ => Self::Conflict(err.to_string()),
        }
    }
}

impl From<ImageError> for ApiError {
    fn from(err: ImageError) -> Self {
        match err {
            ImageError::NotFound(_) => Self::NotFound(err.to_string()),
            ImageError::OrderMismatch => Self::field("imageIds", err.to_string()),
            ImageError::UnknownVariant(_) => Self::field("variantId", err.to_string()),
        }
    }
}

impl From<VariantError> for ApiError {
    fn from(err: VariantError) -> Self {
        match err {
            VariantError::Sku(e) => Self::field("sku", e.to_string()),
            VariantError::NotFound => Self::NotFound(err.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self { Self::BadRequest(rejection.body_text()) }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self { Self::BadRequest(rejection.body_text()) }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self { Self::BadRequest(rejection.body_text()) }
}

// =============================================================================
// Extractors
// =============================================================================

/// `Json` whose rejection uses the failure envelope.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

/// The caller behind a valid bearer token.
pub struct AuthUser { pub user: User, pub token: String }

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts.headers.get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ApiError::Unauthorized("Authentication required"))?;
        let session = state.store.session(token).await?.ok_or(ApiError::Unauthorized("Session is invalid or has expired"))?;
        if session.is_expired() {
            state.store.delete_session(token).await?;
            return Err(ApiError::Unauthorized("Session is invalid or has expired"));
        }
        let user = state.store.user(session.user_id).await?.ok_or(ApiError::Unauthorized("Session is invalid or has expired"))?;
        if !user.is_active() { return Err(ApiError::Forbidden("Account is inactive")); }
        Ok(Self { user, token: session.token })
    }
}

pub struct AdminUser(pub User);

#[axum::async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthUser { user, .. } = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() { return Err(ApiError::Forbidden("Admin access required")); }
        Ok(Self(user))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::auth::{hash_password, AuthPayload};
    use crate::domain::aggregates::Role;
    use crate::domain::value_objects::Email;
    use crate::store::MemoryStore;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    pub struct TestApp { pub state: AppState, pub router: Router }

    impl TestApp {
        pub fn new() -> Self {
            let state = AppState::new(Arc::new(MemoryStore::new()), EventPublisher::default(), Config::default());
            Self { router: router(state.clone()), state }
        }

        pub async fn request(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(token) = token { builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}")); }
            let request = match body {
                Some(json) => builder.header(header::CONTENT_TYPE, "application/json").body(Body::from(json.to_string())).unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };
            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
            (status, json)
        }

        /// Registers a user directly in the store and returns a bearer token.
        pub async fn user(&self, email: &str, role: Role) -> (User, String) {
            let mut user = User::new("Test User", Email::parse(email).unwrap(), hash_password("secret1"));
            user.role = role;
            self.state.store.create_user(&user).await.unwrap();
            let session = crate::auth::Session::issue(user.id, 1);
            self.state.store.create_session(&session).await.unwrap();
            (user, session.token)
        }

        pub async fn admin(&self) -> String { self.user("admin@shop.test", Role::Admin).await.1 }

        pub fn payload(json: &Value) -> AuthPayload { serde_json::from_value(json["data"].clone()).unwrap() }
    }
}
