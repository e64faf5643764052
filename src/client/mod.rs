//! Typed client for the storefront API
//!
//! [`ApiClient`] attaches the session's bearer token to every call and
//! unwraps the `{success, message?, data}` envelope. The managers built on
//! top of it keep local state for one screen of the admin console: they
//! validate before submitting, apply optimistic edits where the server
//! call is cheap to undo, and re-fetch where the server decides.

pub mod dashboard;
pub mod discounts;
pub mod editor;
mod endpoints;
pub mod images;
pub mod optimistic;
pub mod orders;
pub mod session;

pub use dashboard::Dashboard;
pub use discounts::DiscountManager;
pub use editor::{ProductEditor, VariantManager};
pub use images::{HttpUploader, ImageManager, ImageUploader, UploadReport};
pub use optimistic::Optimistic;
pub use orders::OrderDetail;
pub use session::{FileTokenStore, MemoryTokenStore, Session, TokenStore};

use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::domain::completion::SaveBlocked;
use crate::domain::FieldErrors;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-2xx answer from the server.
    #[error("{message}")]
    Http { status: u16, message: String },

    /// 2xx answer with `success: false`.
    #[error("{message}")]
    Rejected { message: String },

    /// Field errors, either found before submitting or returned by the server.
    #[error("validation failed: {0}")]
    Validation(FieldErrors),

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("token storage failed: {0}")]
    Storage(#[from] std::io::Error),

    #[error("not signed in")]
    Unauthenticated,

    /// A local rule refused the action; nothing was sent.
    #[error("{0}")]
    Blocked(String),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Validation(_) => Some(400),
            _ => None,
        }
    }

    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self { Self::Validation(errors) => Some(errors), _ => None }
    }
}

impl From<FieldErrors> for ClientError {
    fn from(errors: FieldErrors) -> Self { Self::Validation(errors) }
}

impl From<SaveBlocked> for ClientError {
    fn from(reason: SaveBlocked) -> Self { Self::Blocked(reason.to_string()) }
}

/// Filters and paging shared by the list endpoints. Unset fields are left
/// out of the query string.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_page: Option<u32>,
}

impl ListQuery {
    pub fn page(page: u32, per_page: u32) -> Self { Self { page: Some(page), per_page: Some(per_page), ..Default::default() } }
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    session: Arc<Session>,
}

impl ApiClient {
    /// `base_url` is the server root, e.g. `http://localhost:8083`.
    pub fn new(base_url: impl Into<String>, session: Arc<Session>) -> Self {
        Self::with_http(reqwest::Client::new(), base_url, session)
    }

    pub fn with_http(http: reqwest::Client, base_url: impl Into<String>, session: Arc<Session>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url, session }
    }

    pub fn session(&self) -> &Arc<Session> { &self.session }

    pub fn base_url(&self) -> &str { &self.base_url }

    async fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut builder = self.http.request(method, format!("{}/api{}", self.base_url, path));
        if let Some(token) = self.session.token().await {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn execute<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ClientError> {
        let response = builder.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            match serde_json::from_slice(&bytes) {
                Ok(body) => body,
                Err(e) if status.is_success() => return Err(ClientError::Decode(e.to_string())),
                Err(_) => Value::Null,
            }
        };
        debug!(status = status.as_u16(), "api response");
        unwrap_envelope(status, body)
    }

    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let builder = self.request(Method::GET, path).await;
        self.execute(builder).await
    }

    pub(crate) async fn get_query<T: DeserializeOwned, Q: Serialize + ?Sized>(&self, path: &str, query: &Q) -> Result<T, ClientError> {
        let builder = self.request(Method::GET, path).await.query(query);
        self.execute(builder).await
    }

    pub(crate) async fn send<T: DeserializeOwned, B: Serialize + ?Sized>(&self, method: Method, path: &str, body: &B) -> Result<T, ClientError> {
        let builder = self.request(method, path).await.json(body);
        self.execute(builder).await
    }

    pub(crate) async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let builder = self.request(Method::DELETE, path).await;
        self.execute(builder).await
    }
}

/// Turns a response into the envelope's `data`, or the matching error.
pub fn unwrap_envelope<T: DeserializeOwned>(status: StatusCode, body: Value) -> Result<T, ClientError> {
    let message = body.get("message").and_then(Value::as_str).map(str::to_string);
    if !status.is_success() {
        let errors = body.get("errors").cloned().and_then(|e| serde_json::from_value::<FieldErrors>(e).ok());
        if let Some(errors) = errors.filter(|e| !e.is_empty()) {
            return Err(ClientError::Validation(errors));
        }
        let message = message.unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
        return Err(ClientError::Http { status: status.as_u16(), message });
    }
    if body.get("success").and_then(Value::as_bool) == Some(false) {
        return Err(ClientError::Rejected { message: message.unwrap_or_else(|| "request was not successful".into()) });
    }
    let data = body.get("data").cloned().unwrap_or(Value::Null);
    serde_json::from_value(data).map_err(|e| ClientError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unwrap_success() {
        let n: i64 = unwrap_envelope(StatusCode::OK, json!({"success": true, "data": 42})).unwrap();
        assert_eq!(n, 42);
        let () = unwrap_envelope(StatusCode::OK, json!({"success": true, "message": "Deleted"})).unwrap();
    }

    #[test]
    fn test_business_failure_on_2xx() {
        let err = unwrap_envelope::<i64>(StatusCode::OK, json!({"success": false, "message": "Out of stock"})).unwrap_err();
        assert!(matches!(err, ClientError::Rejected { ref message } if message == "Out of stock"));
    }

    #[test]
    fn test_field_errors_become_validation() {
        let body = json!({"success": false, "message": "Validation failed", "errors": {"sku": "SKU already exists"}});
        let err = unwrap_envelope::<i64>(StatusCode::BAD_REQUEST, body).unwrap_err();
        assert_eq!(err.field_errors().and_then(|e| e.get("sku")), Some("SKU already exists"));
    }

    #[test]
    fn test_http_failure_keeps_status() {
        let err = unwrap_envelope::<i64>(StatusCode::CONFLICT, json!({"success": false, "message": "Order is delivered"})).unwrap_err();
        assert_eq!(err.status(), Some(409));
        assert_eq!(err.to_string(), "Order is delivered");
        let err = unwrap_envelope::<i64>(StatusCode::BAD_GATEWAY, Value::Null).unwrap_err();
        assert_eq!(err.to_string(), "Bad Gateway");
    }

    #[test]
    fn test_list_query_skips_unset() {
        let query = serde_json::to_value(ListQuery { search: Some("shirt".into()), ..ListQuery::page(2, 10) }).unwrap();
        assert_eq!(query, json!({"search": "shirt", "page": 2, "perPage": 10}));
    }
}
