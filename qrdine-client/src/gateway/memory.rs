//! In-process backend
//!
//! Same contract as the hosted backend, including the permission policy
//! (guests read public rows and insert orders, order items and service
//! requests; staff/admin may mutate everything) and foreign-key checks.
//! Used by tests and the CLI demo mode. Faults and latency can be
//! injected per operation to exercise rollback and compensation paths.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use shared::client::{AuthSession, AuthUser};
use shared::message::{ChangeEvent, ResourceTable};
use shared::models::{
    CustomerProfile, DiningTable, MenuItem, MenuItemCreate, MenuItemUpdate, Order, OrderCreate,
    OrderItem, OrderItemCreate, OrderStatus, RequestStatus, RestaurantProfile, RestaurantUpdate,
    Role, ServiceRequest, ServiceRequestCreate,
};

use super::{Backend, PAGE_SIZE, Page};
use crate::realtime::MemoryRealtime;
use crate::{ClientError, ClientResult};

/// Gateway operation (for fault injection and call inspection)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOp {
    SignIn,
    SignOut,
    FetchProfile,
    FetchRestaurant,
    UpdateRestaurant,
    FetchTable,
    FindTable,
    CreateTable,
    ListTables,
    FetchMenu,
    InsertMenuItems,
    UpdateMenuItem,
    SoftDeleteMenuItem,
    DeleteMenu,
    FetchOrdersPage,
    FetchOrder,
    InsertOrder,
    InsertOrderItems,
    DeleteOrder,
    UpdateOrderStatus,
    FetchServiceRequests,
    InsertServiceRequest,
    CompleteServiceRequest,
}

impl GatewayOp {
    /// Whether the operation mutates backend rows
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            GatewayOp::UpdateRestaurant
                | GatewayOp::CreateTable
                | GatewayOp::InsertMenuItems
                | GatewayOp::UpdateMenuItem
                | GatewayOp::SoftDeleteMenuItem
                | GatewayOp::DeleteMenu
                | GatewayOp::InsertOrder
                | GatewayOp::InsertOrderItems
                | GatewayOp::DeleteOrder
                | GatewayOp::UpdateOrderStatus
                | GatewayOp::InsertServiceRequest
                | GatewayOp::CompleteServiceRequest
        )
    }
}

/// Injected failure kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    NotFound,
    Forbidden,
    Connectivity,
    Internal,
}

impl FaultKind {
    fn into_error(self, op: GatewayOp) -> ClientError {
        match self {
            FaultKind::NotFound => ClientError::NotFound(format!("{op:?}")),
            FaultKind::Forbidden => ClientError::Forbidden(format!("{op:?}")),
            FaultKind::Connectivity => ClientError::Connectivity(format!("{op:?}: unreachable")),
            FaultKind::Internal => ClientError::Internal(format!("{op:?}: injected failure")),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryStore {
    restaurants: HashMap<String, RestaurantProfile>,
    tables: Vec<DiningTable>,
    menu: Vec<MenuItem>,
    /// Headers only, in insertion order
    orders: Vec<Order>,
    order_items: Vec<OrderItem>,
    requests: Vec<ServiceRequest>,
    profiles: HashMap<String, CustomerProfile>,
    /// email -> (password, user id)
    accounts: HashMap<String, (String, String)>,
    session: Option<AuthSession>,
    faults: HashMap<GatewayOp, Vec<FaultKind>>,
    latency: HashMap<GatewayOp, Duration>,
    offline: bool,
    calls: Vec<GatewayOp>,
}

impl MemoryStore {
    fn enter(&mut self, op: GatewayOp) -> ClientResult<()> {
        self.calls.push(op);
        if self.offline {
            return Err(FaultKind::Connectivity.into_error(op));
        }
        if let Some(queue) = self.faults.get_mut(&op)
            && !queue.is_empty()
        {
            let fault = queue.remove(0);
            tracing::debug!(op = ?op, fault = ?fault, "Injected gateway fault");
            return Err(fault.into_error(op));
        }
        Ok(())
    }

    fn caller_role(&self) -> Option<Role> {
        let session = self.session.as_ref()?;
        Some(
            self.profiles
                .get(&session.user.id)
                .map(|p| p.role)
                .unwrap_or_default(),
        )
    }

    fn require_staff(&self, table: &str) -> ClientResult<()> {
        match self.caller_role() {
            Some(role) if role.is_staff() => Ok(()),
            _ => Err(ClientError::Forbidden(format!(
                "permission denied for table {table}"
            ))),
        }
    }

    fn with_items(&self, header: &Order) -> Order {
        let mut order = header.clone();
        order.items = self
            .order_items
            .iter()
            .filter(|i| i.order_id == order.id)
            .cloned()
            .collect();
        order
    }

    fn table_exists(&self, restaurant_id: &str, table_id: &str) -> bool {
        self.tables
            .iter()
            .any(|t| t.id == table_id && t.restaurant_id == restaurant_id)
    }
}

/// In-process backend
#[derive(Debug, Default)]
pub struct MemoryBackend {
    store: Mutex<MemoryStore>,
    feed: Option<MemoryRealtime>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish row changes to a realtime feed, like the hosted backend does
    pub fn with_feed(mut self, feed: MemoryRealtime) -> Self {
        self.feed = Some(feed);
        self
    }

    fn lock(&self) -> MutexGuard<'_, MemoryStore> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Injected latency, awaited before the store is touched
    async fn pause(&self, op: GatewayOp) {
        let delay = self.lock().latency.get(&op).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn publish(&self, event: ChangeEvent) {
        if let Some(feed) = &self.feed {
            feed.publish(event);
        }
    }

    // ========== Seeding ==========

    pub fn add_restaurant(&self, id: &str, name: &str) -> RestaurantProfile {
        let profile = RestaurantProfile {
            id: id.to_string(),
            name: name.to_string(),
            restaurant_type: None,
            location: None,
            contact: None,
            created_at: Some(Utc::now()),
        };
        self.lock()
            .restaurants
            .insert(profile.id.clone(), profile.clone());
        profile
    }

    pub fn add_table(&self, restaurant_id: &str, table_id: &str, table_number: i32) -> DiningTable {
        let table = DiningTable {
            id: table_id.to_string(),
            restaurant_id: restaurant_id.to_string(),
            table_number,
        };
        self.lock().tables.push(table.clone());
        table
    }

    pub fn add_menu_item(&self, item: MenuItem) -> MenuItem {
        self.lock().menu.push(item.clone());
        item
    }

    pub fn add_order(&self, order: Order) -> Order {
        let mut store = self.lock();
        store.order_items.extend(order.items.iter().cloned());
        let mut header = order.clone();
        header.items.clear();
        store.orders.push(header);
        order
    }

    pub fn add_service_request(&self, request: ServiceRequest) -> ServiceRequest {
        self.lock().requests.push(request.clone());
        request
    }

    /// Register a sign-in account with its profile row
    pub fn add_account(&self, email: &str, password: &str, profile: CustomerProfile) {
        let mut store = self.lock();
        store
            .accounts
            .insert(email.to_string(), (password.to_string(), profile.id.clone()));
        store.profiles.insert(profile.id.clone(), profile);
    }

    /// Drop a profile row while keeping the account (simulates a broken profile)
    pub fn remove_profile(&self, user_id: &str) {
        self.lock().profiles.remove(user_id);
    }

    // ========== Fault injection ==========

    /// Fail the next call of `op` with `kind`
    pub fn fail_next(&self, op: GatewayOp, kind: FaultKind) {
        self.lock().faults.entry(op).or_default().push(kind);
    }

    /// Delay every call of `op` (order reads and writes honour this)
    pub fn set_latency(&self, op: GatewayOp, delay: Duration) {
        self.lock().latency.insert(op, delay);
    }

    /// Make every call fail with a connectivity error
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    // ========== Inspection ==========

    pub fn calls(&self) -> Vec<GatewayOp> {
        self.lock().calls.clone()
    }

    pub fn write_count(&self) -> usize {
        self.lock().calls.iter().filter(|op| op.is_write()).count()
    }

    pub fn call_count(&self, op: GatewayOp) -> usize {
        self.lock().calls.iter().filter(|c| **c == op).count()
    }

    pub fn tables(&self) -> Vec<DiningTable> {
        self.lock().tables.clone()
    }

    /// All orders of a restaurant with items, in insertion order
    pub fn orders(&self, restaurant_id: &str) -> Vec<Order> {
        let store = self.lock();
        store
            .orders
            .iter()
            .filter(|o| o.restaurant_id == restaurant_id)
            .map(|o| store.with_items(o))
            .collect()
    }

    /// All menu rows of a restaurant, soft-deleted included
    pub fn menu_rows(&self, restaurant_id: &str) -> Vec<MenuItem> {
        self.lock()
            .menu
            .iter()
            .filter(|m| m.restaurant_id == restaurant_id)
            .cloned()
            .collect()
    }

    pub fn service_requests(&self) -> Vec<ServiceRequest> {
        self.lock().requests.clone()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn sign_in(&self, email: &str, password: &str) -> ClientResult<AuthSession> {
        let mut store = self.lock();
        store.enter(GatewayOp::SignIn)?;

        let user_id = match store.accounts.get(email) {
            Some((expected, user_id)) if expected == password => user_id.clone(),
            _ => return Err(ClientError::Unauthorized),
        };
        let session = AuthSession {
            access_token: Uuid::new_v4().to_string(),
            refresh_token: None,
            expires_at: Some(Utc::now().timestamp() + 3600),
            user: AuthUser {
                id: user_id,
                email: Some(email.to_string()),
            },
        };
        store.session = Some(session.clone());
        Ok(session)
    }

    async fn sign_out(&self) -> ClientResult<()> {
        let mut store = self.lock();
        store.session = None;
        store.enter(GatewayOp::SignOut)
    }

    async fn fetch_profile(&self, user_id: &str) -> ClientResult<CustomerProfile> {
        let mut store = self.lock();
        store.enter(GatewayOp::FetchProfile)?;
        store
            .profiles
            .get(user_id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("profile {user_id}")))
    }

    async fn fetch_restaurant(&self, id: &str) -> ClientResult<RestaurantProfile> {
        let mut store = self.lock();
        store.enter(GatewayOp::FetchRestaurant)?;
        store
            .restaurants
            .get(id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("restaurant {id}")))
    }

    async fn update_restaurant(
        &self,
        id: &str,
        update: &RestaurantUpdate,
    ) -> ClientResult<RestaurantProfile> {
        let mut store = self.lock();
        store.enter(GatewayOp::UpdateRestaurant)?;
        store.require_staff("restaurants")?;
        let profile = store
            .restaurants
            .get_mut(id)
            .ok_or_else(|| ClientError::NotFound(format!("restaurant {id}")))?;
        profile.apply(update);
        Ok(profile.clone())
    }

    async fn fetch_table(&self, id: &str) -> ClientResult<DiningTable> {
        let mut store = self.lock();
        store.enter(GatewayOp::FetchTable)?;
        store
            .tables
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("table {id}")))
    }

    async fn find_table(
        &self,
        restaurant_id: &str,
        table_number: i32,
    ) -> ClientResult<Option<DiningTable>> {
        let mut store = self.lock();
        store.enter(GatewayOp::FindTable)?;
        Ok(store
            .tables
            .iter()
            .find(|t| t.restaurant_id == restaurant_id && t.table_number == table_number)
            .cloned())
    }

    async fn create_table(
        &self,
        restaurant_id: &str,
        table_number: i32,
    ) -> ClientResult<DiningTable> {
        let mut store = self.lock();
        store.enter(GatewayOp::CreateTable)?;
        store.require_staff("tables")?;

        if store
            .tables
            .iter()
            .any(|t| t.restaurant_id == restaurant_id && t.table_number == table_number)
        {
            return Err(ClientError::Validation(format!(
                "duplicate table {table_number} for restaurant {restaurant_id}"
            )));
        }
        let table = DiningTable {
            id: Uuid::new_v4().to_string(),
            restaurant_id: restaurant_id.to_string(),
            table_number,
        };
        store.tables.push(table.clone());
        Ok(table)
    }

    async fn list_tables(&self, restaurant_id: &str) -> ClientResult<Vec<DiningTable>> {
        let mut store = self.lock();
        store.enter(GatewayOp::ListTables)?;
        let mut tables: Vec<DiningTable> = store
            .tables
            .iter()
            .filter(|t| t.restaurant_id == restaurant_id)
            .cloned()
            .collect();
        tables.sort_by_key(|t| t.table_number);
        Ok(tables)
    }

    async fn fetch_menu(&self, restaurant_id: &str) -> ClientResult<Vec<MenuItem>> {
        let mut store = self.lock();
        store.enter(GatewayOp::FetchMenu)?;
        Ok(store
            .menu
            .iter()
            .filter(|m| m.restaurant_id == restaurant_id && m.is_active())
            .cloned()
            .collect())
    }

    async fn insert_menu_items(&self, items: &[MenuItemCreate]) -> ClientResult<Vec<MenuItem>> {
        let created: Vec<MenuItem> = {
            let mut store = self.lock();
            store.enter(GatewayOp::InsertMenuItems)?;
            store.require_staff("menu_items")?;

            if let Some(id) = items
                .iter()
                .filter_map(|c| c.id.as_deref())
                .find(|id| store.menu.iter().any(|m| m.id == *id))
            {
                return Err(ClientError::Validation(format!("duplicate menu item {id}")));
            }
            let created: Vec<MenuItem> = items
                .iter()
                .map(|c| MenuItem {
                    id: c.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string()),
                    restaurant_id: c.restaurant_id.clone(),
                    name: c.name.clone(),
                    description: c.description.clone(),
                    price: c.price,
                    category: c.category.clone(),
                    dietary_tags: c.dietary_tags.clone(),
                    in_stock: c.in_stock,
                    image_url: c.image_url.clone(),
                    deleted_at: None,
                })
                .collect();
            store.menu.extend(created.iter().cloned());
            created
        };
        for item in &created {
            self.publish(ChangeEvent::insert(ResourceTable::MenuItems, item));
        }
        Ok(created)
    }

    async fn update_menu_item(&self, id: &str, update: &MenuItemUpdate) -> ClientResult<MenuItem> {
        let item = {
            let mut store = self.lock();
            store.enter(GatewayOp::UpdateMenuItem)?;
            store.require_staff("menu_items")?;
            let item = store
                .menu
                .iter_mut()
                .find(|m| m.id == id)
                .ok_or_else(|| ClientError::NotFound(format!("menu item {id}")))?;
            item.apply(update);
            item.clone()
        };
        self.publish(ChangeEvent::update(ResourceTable::MenuItems, &item));
        Ok(item)
    }

    async fn soft_delete_menu_item(&self, id: &str) -> ClientResult<MenuItem> {
        let item = {
            let mut store = self.lock();
            store.enter(GatewayOp::SoftDeleteMenuItem)?;
            store.require_staff("menu_items")?;
            let item = store
                .menu
                .iter_mut()
                .find(|m| m.id == id)
                .ok_or_else(|| ClientError::NotFound(format!("menu item {id}")))?;
            item.deleted_at = Some(Utc::now());
            item.clone()
        };
        self.publish(ChangeEvent::update(ResourceTable::MenuItems, &item));
        Ok(item)
    }

    async fn delete_menu(&self, restaurant_id: &str) -> ClientResult<()> {
        let removed: Vec<MenuItem> = {
            let mut store = self.lock();
            store.enter(GatewayOp::DeleteMenu)?;
            store.require_staff("menu_items")?;
            // 软删除的行保留，历史订单仍引用它们
            let (removed, kept): (Vec<MenuItem>, Vec<MenuItem>) = std::mem::take(&mut store.menu)
                .into_iter()
                .partition(|m| m.restaurant_id == restaurant_id && m.is_active());
            store.menu = kept;
            removed
        };
        for item in &removed {
            self.publish(ChangeEvent::delete(
                ResourceTable::MenuItems,
                serde_json::json!({ "id": item.id, "restaurant_id": item.restaurant_id }),
            ));
        }
        Ok(())
    }

    async fn fetch_orders_page(
        &self,
        restaurant_id: &str,
        page: usize,
    ) -> ClientResult<Page<Order>> {
        self.pause(GatewayOp::FetchOrdersPage).await;
        let mut store = self.lock();
        store.enter(GatewayOp::FetchOrdersPage)?;

        // newest first; ties keep reverse insertion order
        let mut headers: Vec<&Order> = store
            .orders
            .iter()
            .rev()
            .filter(|o| o.restaurant_id == restaurant_id)
            .collect();
        headers.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let rows = headers
            .into_iter()
            .skip(Page::<Order>::offset(page))
            .take(PAGE_SIZE)
            .map(|o| store.with_items(o))
            .collect();
        Ok(Page::new(rows, page))
    }

    async fn fetch_order(&self, id: &str) -> ClientResult<Order> {
        self.pause(GatewayOp::FetchOrder).await;
        let mut store = self.lock();
        store.enter(GatewayOp::FetchOrder)?;
        let header = store
            .orders
            .iter()
            .find(|o| o.id == id)
            .ok_or_else(|| ClientError::NotFound(format!("order {id}")))?;
        Ok(store.with_items(header))
    }

    async fn insert_order(&self, order: &OrderCreate) -> ClientResult<Order> {
        self.pause(GatewayOp::InsertOrder).await;
        let created = {
            let mut store = self.lock();
            store.enter(GatewayOp::InsertOrder)?;
            if !store.restaurants.contains_key(&order.restaurant_id)
                || !store.table_exists(&order.restaurant_id, &order.table_id)
            {
                return Err(ClientError::Validation(
                    "order references unknown restaurant or table".to_string(),
                ));
            }
            let created = Order {
                id: Uuid::new_v4().to_string(),
                restaurant_id: order.restaurant_id.clone(),
                table_id: order.table_id.clone(),
                table_number: order.table_number.clone(),
                status: order.status,
                subtotal: order.subtotal,
                tax: order.tax,
                total: order.total,
                created_at: Utc::now(),
                items: Vec::new(),
            };
            store.orders.push(created.clone());
            created
        };
        self.publish(ChangeEvent::insert(ResourceTable::Orders, &created));
        Ok(created)
    }

    async fn insert_order_items(&self, items: &[OrderItemCreate]) -> ClientResult<Vec<OrderItem>> {
        self.pause(GatewayOp::InsertOrderItems).await;
        let created: Vec<OrderItem> = {
            let mut store = self.lock();
            store.enter(GatewayOp::InsertOrderItems)?;

            for item in items {
                if item.quantity <= 0 {
                    return Err(ClientError::Validation(format!(
                        "quantity must be positive for {}",
                        item.menu_item_id
                    )));
                }
                if !store.orders.iter().any(|o| o.id == item.order_id) {
                    return Err(ClientError::Validation(format!(
                        "unknown order {}",
                        item.order_id
                    )));
                }
            }
            let created: Vec<OrderItem> = items
                .iter()
                .map(|c| OrderItem {
                    id: Uuid::new_v4().to_string(),
                    order_id: c.order_id.clone(),
                    menu_item_id: c.menu_item_id.clone(),
                    name: c.name.clone(),
                    quantity: c.quantity,
                    price_at_time: c.price_at_time,
                })
                .collect();
            store.order_items.extend(created.iter().cloned());
            created
        };
        // 明细行没有 restaurant_id，和托管后端一样原样推送
        for item in &created {
            self.publish(ChangeEvent::insert(ResourceTable::OrderItems, item));
        }
        Ok(created)
    }

    async fn delete_order(&self, id: &str) -> ClientResult<()> {
        let removed = {
            let mut store = self.lock();
            store.enter(GatewayOp::DeleteOrder)?;
            let position = store.orders.iter().position(|o| o.id == id);
            let removed = position.map(|index| store.orders.remove(index));
            store.order_items.retain(|i| i.order_id != id);
            removed
        };
        let Some(removed) = removed else {
            return Err(ClientError::NotFound(format!("order {id}")));
        };
        self.publish(ChangeEvent::delete(
            ResourceTable::Orders,
            serde_json::json!({ "id": removed.id, "restaurant_id": removed.restaurant_id }),
        ));
        Ok(())
    }

    async fn update_order_status(&self, id: &str, status: OrderStatus) -> ClientResult<Order> {
        self.pause(GatewayOp::UpdateOrderStatus).await;
        let order = {
            let mut store = self.lock();
            store.enter(GatewayOp::UpdateOrderStatus)?;
            store.require_staff("orders")?;
            let header = store
                .orders
                .iter_mut()
                .find(|o| o.id == id)
                .ok_or_else(|| ClientError::NotFound(format!("order {id}")))?;
            header.status = status;
            let header = header.clone();
            store.with_items(&header)
        };
        let mut header = order.clone();
        header.items.clear();
        self.publish(ChangeEvent::update(ResourceTable::Orders, &header));
        Ok(order)
    }

    async fn fetch_service_requests(&self, restaurant_id: &str) -> ClientResult<Vec<ServiceRequest>> {
        let mut store = self.lock();
        store.enter(GatewayOp::FetchServiceRequests)?;
        let mut pending: Vec<ServiceRequest> = store
            .requests
            .iter()
            .rev()
            .filter(|r| r.restaurant_id == restaurant_id && r.status == RequestStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(pending)
    }

    async fn insert_service_request(
        &self,
        request: &ServiceRequestCreate,
    ) -> ClientResult<ServiceRequest> {
        let created = {
            let mut store = self.lock();
            store.enter(GatewayOp::InsertServiceRequest)?;
            if !store.table_exists(&request.restaurant_id, &request.table_id) {
                return Err(ClientError::Validation(
                    "service request references unknown table".to_string(),
                ));
            }
            let created = ServiceRequest {
                id: Uuid::new_v4().to_string(),
                restaurant_id: request.restaurant_id.clone(),
                table_id: request.table_id.clone(),
                table_number: request.table_number.clone(),
                request_type: request.request_type,
                status: request.status,
                note: request.note.clone(),
                created_at: Utc::now(),
            };
            store.requests.push(created.clone());
            created
        };
        self.publish(ChangeEvent::insert(ResourceTable::ServiceRequests, &created));
        Ok(created)
    }

    async fn complete_service_request(&self, id: &str) -> ClientResult<ServiceRequest> {
        let request = {
            let mut store = self.lock();
            store.enter(GatewayOp::CompleteServiceRequest)?;
            store.require_staff("service_requests")?;
            let request = store
                .requests
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| ClientError::NotFound(format!("service request {id}")))?;
            request.status = RequestStatus::Completed;
            request.clone()
        };
        self.publish(ChangeEvent::update(ResourceTable::ServiceRequests, &request));
        Ok(request)
    }
}
