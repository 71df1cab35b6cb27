//! Backend Gateway
//!
//! One async call per entity operation. Expected failures (not-found,
//! permission-denied) come back as [`ClientError`] values, never panics.
//!
//! - [`RestBackend`]: the hosted backend over HTTP
//! - [`MemoryBackend`]: in-process implementation with the same contract

mod memory;
mod rest;

pub use memory::{FaultKind, GatewayOp, MemoryBackend};
pub use rest::RestBackend;

use async_trait::async_trait;
use shared::client::AuthSession;
use shared::models::{
    CustomerProfile, DiningTable, MenuItem, MenuItemCreate, MenuItemUpdate, Order, OrderCreate,
    OrderItem, OrderItemCreate, OrderStatus, RestaurantProfile, RestaurantUpdate, ServiceRequest,
    ServiceRequestCreate,
};

use crate::ClientResult;

/// Fixed order page size
pub const PAGE_SIZE: usize = 20;

/// One page of a recency-ordered collection
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub rows: Vec<T>,
    /// Zero-based page index
    pub page: usize,
}

impl<T> Page<T> {
    pub fn new(rows: Vec<T>, page: usize) -> Self {
        Self { rows, page }
    }

    /// A full page means another page may exist
    pub fn has_more(&self) -> bool {
        self.rows.len() == PAGE_SIZE
    }

    /// Row offset of a zero-based page
    pub fn offset(page: usize) -> usize {
        page * PAGE_SIZE
    }
}

/// Typed access to the backend entities
#[async_trait]
pub trait Backend: Send + Sync {
    // ========== Auth / Profiles ==========

    /// Password sign-in; subsequent calls run as that user
    async fn sign_in(&self, email: &str, password: &str) -> ClientResult<AuthSession>;

    /// Drop the user session; subsequent calls run as a guest
    async fn sign_out(&self) -> ClientResult<()>;

    async fn fetch_profile(&self, user_id: &str) -> ClientResult<CustomerProfile>;

    // ========== Restaurants ==========

    async fn fetch_restaurant(&self, id: &str) -> ClientResult<RestaurantProfile>;

    async fn update_restaurant(
        &self,
        id: &str,
        update: &RestaurantUpdate,
    ) -> ClientResult<RestaurantProfile>;

    // ========== Tables ==========

    async fn fetch_table(&self, id: &str) -> ClientResult<DiningTable>;

    /// Lookup by display number; `Ok(None)` when absent
    async fn find_table(
        &self,
        restaurant_id: &str,
        table_number: i32,
    ) -> ClientResult<Option<DiningTable>>;

    async fn create_table(&self, restaurant_id: &str, table_number: i32)
    -> ClientResult<DiningTable>;

    async fn list_tables(&self, restaurant_id: &str) -> ClientResult<Vec<DiningTable>>;

    // ========== Menu Items ==========

    /// Active (not soft-deleted) items of a restaurant
    async fn fetch_menu(&self, restaurant_id: &str) -> ClientResult<Vec<MenuItem>>;

    async fn insert_menu_items(&self, items: &[MenuItemCreate]) -> ClientResult<Vec<MenuItem>>;

    async fn update_menu_item(&self, id: &str, update: &MenuItemUpdate) -> ClientResult<MenuItem>;

    async fn soft_delete_menu_item(&self, id: &str) -> ClientResult<MenuItem>;

    /// Remove the active menu rows of a restaurant (used by whole-menu
    /// replacement); soft-deleted rows stay for order history
    async fn delete_menu(&self, restaurant_id: &str) -> ClientResult<()>;

    // ========== Orders ==========

    /// Zero-based page of orders (with items), newest first
    async fn fetch_orders_page(&self, restaurant_id: &str, page: usize)
    -> ClientResult<Page<Order>>;

    /// Single order with its line items
    async fn fetch_order(&self, id: &str) -> ClientResult<Order>;

    async fn insert_order(&self, order: &OrderCreate) -> ClientResult<Order>;

    async fn insert_order_items(&self, items: &[OrderItemCreate]) -> ClientResult<Vec<OrderItem>>;

    /// Remove an order header (compensation for a failed multi-step write)
    async fn delete_order(&self, id: &str) -> ClientResult<()>;

    async fn update_order_status(&self, id: &str, status: OrderStatus) -> ClientResult<Order>;

    // ========== Service Requests ==========

    /// Pending requests, newest first
    async fn fetch_service_requests(&self, restaurant_id: &str) -> ClientResult<Vec<ServiceRequest>>;

    async fn insert_service_request(
        &self,
        request: &ServiceRequestCreate,
    ) -> ClientResult<ServiceRequest>;

    async fn complete_service_request(&self, id: &str) -> ClientResult<ServiceRequest>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_has_more() {
        assert!(Page::new(vec![0u8; PAGE_SIZE], 0).has_more());
        assert!(!Page::new(vec![0u8; PAGE_SIZE - 1], 3).has_more());
        assert!(!Page::<u8>::new(vec![], 1).has_more());
        assert_eq!(Page::<u8>::offset(2), 40);
    }
}
