//! REST gateway over the hosted backend
//!
//! Row-level filters follow the `column=op.value` query convention; writes
//! ask for the written rows back so callers always get server truth.

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::json;

use shared::client::{AuthSession, SignInRequest};
use shared::models::{
    CustomerProfile, DiningTable, DiningTableCreate, MenuItem, MenuItemCreate, MenuItemUpdate,
    Order, OrderCreate, OrderItem, OrderItemCreate, OrderStatus, OrderStatusUpdate,
    RequestStatus, RestaurantProfile, RestaurantUpdate, ServiceRequest, ServiceRequestCreate,
};

use super::{Backend, PAGE_SIZE, Page};
use crate::{ClientConfig, ClientError, ClientResult, HttpClient};

/// Orders are always read together with their line items
const ORDER_SELECT: &str = "*,items:order_items(*)";

fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

/// Backend gateway over HTTP
#[derive(Debug, Clone)]
pub struct RestBackend {
    http: HttpClient,
}

impl RestBackend {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    pub fn from_config(config: &ClientConfig) -> ClientResult<Self> {
        Ok(Self::new(config.build_http_client()?))
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> ClientResult<Vec<T>> {
        self.http.get(&HttpClient::rest_path(table), query).await
    }

    /// Select exactly one row; an empty result is not-found
    async fn select_one<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> ClientResult<T> {
        self.select(table, query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::NotFound(format!("{table}: {query:?}")))
    }

    async fn insert_rows<T: DeserializeOwned, B: serde::Serialize + ?Sized>(
        &self,
        table: &str,
        body: &B,
    ) -> ClientResult<Vec<T>> {
        self.http.post(&HttpClient::rest_path(table), &[], body).await
    }

    /// Patch rows by id; zero rows touched is not-found
    async fn patch_one<T: DeserializeOwned, B: serde::Serialize + ?Sized>(
        &self,
        table: &str,
        id: &str,
        select: Option<&str>,
        body: &B,
    ) -> ClientResult<T> {
        let mut query = vec![("id", eq(id))];
        if let Some(select) = select {
            query.push(("select", select.to_string()));
        }
        let rows: Vec<T> = self
            .http
            .patch(&HttpClient::rest_path(table), &query, body)
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| ClientError::NotFound(format!("{table}: {id}")))
    }
}

#[async_trait]
impl Backend for RestBackend {
    async fn sign_in(&self, email: &str, password: &str) -> ClientResult<AuthSession> {
        let request = SignInRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let builder = self
            .http
            .request(Method::POST, "auth/v1/token")
            .query(&[("grant_type", "password")])
            .json(&request);

        let session: AuthSession = match self.http.send(builder).await {
            Ok(session) => session,
            Err(ClientError::Validation(_)) => return Err(ClientError::Unauthorized),
            Err(e) => return Err(e),
        };
        self.http.set_token(Some(session.access_token.clone()));
        tracing::info!(user_id = %session.user.id, "Signed in");
        Ok(session)
    }

    async fn sign_out(&self) -> ClientResult<()> {
        let builder = self.http.request(Method::POST, "auth/v1/logout");
        let result = self.http.send::<serde_json::Value>(builder).await;
        self.http.set_token(None);
        result.map(|_| ())
    }

    async fn fetch_profile(&self, user_id: &str) -> ClientResult<CustomerProfile> {
        self.select_one("profiles", &[("id", eq(user_id))]).await
    }

    async fn fetch_restaurant(&self, id: &str) -> ClientResult<RestaurantProfile> {
        self.select_one("restaurants", &[("id", eq(id))]).await
    }

    async fn update_restaurant(
        &self,
        id: &str,
        update: &RestaurantUpdate,
    ) -> ClientResult<RestaurantProfile> {
        self.patch_one("restaurants", id, None, update).await
    }

    async fn fetch_table(&self, id: &str) -> ClientResult<DiningTable> {
        self.select_one("tables", &[("id", eq(id))]).await
    }

    async fn find_table(
        &self,
        restaurant_id: &str,
        table_number: i32,
    ) -> ClientResult<Option<DiningTable>> {
        let rows: Vec<DiningTable> = self
            .select(
                "tables",
                &[
                    ("restaurant_id", eq(restaurant_id)),
                    ("table_number", eq(table_number)),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn create_table(
        &self,
        restaurant_id: &str,
        table_number: i32,
    ) -> ClientResult<DiningTable> {
        let body = DiningTableCreate {
            restaurant_id: restaurant_id.to_string(),
            table_number,
        };
        self.insert_rows::<DiningTable, _>("tables", &body)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::InvalidResponse("Missing created table".to_string()))
    }

    async fn list_tables(&self, restaurant_id: &str) -> ClientResult<Vec<DiningTable>> {
        self.select(
            "tables",
            &[
                ("restaurant_id", eq(restaurant_id)),
                ("order", "table_number.asc".to_string()),
            ],
        )
        .await
    }

    async fn fetch_menu(&self, restaurant_id: &str) -> ClientResult<Vec<MenuItem>> {
        self.select(
            "menu_items",
            &[
                ("restaurant_id", eq(restaurant_id)),
                ("deleted_at", "is.null".to_string()),
                ("order", "category.asc,name.asc".to_string()),
            ],
        )
        .await
    }

    async fn insert_menu_items(&self, items: &[MenuItemCreate]) -> ClientResult<Vec<MenuItem>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        self.insert_rows("menu_items", items).await
    }

    async fn update_menu_item(&self, id: &str, update: &MenuItemUpdate) -> ClientResult<MenuItem> {
        self.patch_one("menu_items", id, None, update).await
    }

    async fn soft_delete_menu_item(&self, id: &str) -> ClientResult<MenuItem> {
        let body = json!({ "deleted_at": chrono::Utc::now() });
        self.patch_one("menu_items", id, None, &body).await
    }

    async fn delete_menu(&self, restaurant_id: &str) -> ClientResult<()> {
        self.http
            .delete(
                &HttpClient::rest_path("menu_items"),
                &[
                    ("restaurant_id", eq(restaurant_id)),
                    ("deleted_at", "is.null".to_string()),
                ],
            )
            .await
    }

    async fn fetch_orders_page(
        &self,
        restaurant_id: &str,
        page: usize,
    ) -> ClientResult<Page<Order>> {
        let rows = self
            .select(
                "orders",
                &[
                    ("restaurant_id", eq(restaurant_id)),
                    ("select", ORDER_SELECT.to_string()),
                    ("order", "created_at.desc".to_string()),
                    ("limit", PAGE_SIZE.to_string()),
                    ("offset", Page::<Order>::offset(page).to_string()),
                ],
            )
            .await?;
        Ok(Page::new(rows, page))
    }

    async fn fetch_order(&self, id: &str) -> ClientResult<Order> {
        self.select_one(
            "orders",
            &[("id", eq(id)), ("select", ORDER_SELECT.to_string())],
        )
        .await
    }

    async fn insert_order(&self, order: &OrderCreate) -> ClientResult<Order> {
        self.insert_rows::<Order, _>("orders", order)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::InvalidResponse("Missing created order".to_string()))
    }

    async fn insert_order_items(&self, items: &[OrderItemCreate]) -> ClientResult<Vec<OrderItem>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        self.insert_rows("order_items", items).await
    }

    async fn delete_order(&self, id: &str) -> ClientResult<()> {
        self.http
            .delete(&HttpClient::rest_path("orders"), &[("id", eq(id))])
            .await
    }

    async fn update_order_status(&self, id: &str, status: OrderStatus) -> ClientResult<Order> {
        self.patch_one("orders", id, Some(ORDER_SELECT), &OrderStatusUpdate { status })
            .await
    }

    async fn fetch_service_requests(&self, restaurant_id: &str) -> ClientResult<Vec<ServiceRequest>> {
        self.select(
            "service_requests",
            &[
                ("restaurant_id", eq(restaurant_id)),
                ("status", eq("PENDING")),
                ("order", "created_at.desc".to_string()),
            ],
        )
        .await
    }

    async fn insert_service_request(
        &self,
        request: &ServiceRequestCreate,
    ) -> ClientResult<ServiceRequest> {
        self.insert_rows::<ServiceRequest, _>("service_requests", request)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::InvalidResponse("Missing created request".to_string()))
    }

    async fn complete_service_request(&self, id: &str) -> ClientResult<ServiceRequest> {
        let body = json!({ "status": RequestStatus::Completed });
        self.patch_one("service_requests", id, None, &body).await
    }
}
