//! Admin dashboard
//!
//! The three sections load concurrently. A failing section is listed in
//! [`Dashboard::failures`] while the others still render.

use tracing::warn;

use super::{ApiClient, ClientError};
use crate::store::{BestSeller, OrderStatistics, UserStatistics};

pub const ORDER_STATISTICS: &str = "Order statistics";
pub const USER_STATISTICS: &str = "User statistics";
pub const BEST_SELLERS: &str = "Best selling products";

const BEST_SELLER_LIMIT: u32 = 5;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SectionFailure {
    pub section: &'static str,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct Dashboard {
    pub order_statistics: Option<OrderStatistics>,
    pub user_statistics: Option<UserStatistics>,
    pub best_sellers: Option<Vec<BestSeller>>,
    pub failures: Vec<SectionFailure>,
}

impl Dashboard {
    pub async fn load(client: &ApiClient) -> Self {
        let (orders, users, best) = futures::join!(
            client.order_statistics(),
            client.user_statistics(),
            client.best_selling(BEST_SELLER_LIMIT),
        );
        let mut dashboard = Self::default();
        dashboard.order_statistics = dashboard.section(ORDER_STATISTICS, orders);
        dashboard.user_statistics = dashboard.section(USER_STATISTICS, users);
        dashboard.best_sellers = dashboard.section(BEST_SELLERS, best);
        dashboard
    }

    fn section<T>(&mut self, section: &'static str, result: Result<T, ClientError>) -> Option<T> {
        match result {
            Ok(data) => Some(data),
            Err(e) => {
                warn!(section, error = %e, "dashboard section failed");
                self.failures.push(SectionFailure { section, message: e.to_string() });
                None
            }
        }
    }

    pub fn is_partial(&self) -> bool { !self.failures.is_empty() }

    pub fn failed_sections(&self) -> Vec<&'static str> { self.failures.iter().map(|f| f.section).collect() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Session;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use std::sync::Arc;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_failing_best_sellers_keeps_other_sections() {
        let router = Router::new()
            .route("/api/admin/orders/statistics", get(|| async {
                Json(json!({"success": true, "data": {"totalOrders": 4, "byStatus": {"pending": 4}, "totalRevenue": 0, "pendingOrders": 4}}))
            }))
            .route("/api/admin/users/statistics", get(|| async {
                Json(json!({"success": true, "data": {"totalUsers": 2, "activeUsers": 2, "inactiveUsers": 0, "admins": 1, "customers": 1}}))
            }))
            .route("/api/admin/products/best-selling", get(|| async {
                (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"success": false, "message": "Internal server error"})))
            }));
        let client = ApiClient::new(serve(router).await, Arc::new(Session::in_memory()));

        let dashboard = Dashboard::load(&client).await;
        assert_eq!(dashboard.order_statistics.as_ref().map(|s| s.total_orders), Some(4));
        assert_eq!(dashboard.user_statistics.as_ref().map(|s| s.customers), Some(1));
        assert!(dashboard.best_sellers.is_none());
        assert!(dashboard.is_partial());
        assert_eq!(dashboard.failed_sections(), vec![BEST_SELLERS]);
        assert_eq!(dashboard.failures[0].message, "Internal server error");
    }
}
