//! Store state types

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::client::AuthSession;
use shared::models::{
    CustomerProfile, MenuItem, MenuItemCreate, MenuSnapshot, Order, OrderStatus,
    RestaurantProfile, ServiceRequest,
};
use shared::money::{Totals, format_amount};

/// One cart line (client only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    /// Menu item as it was when added
    pub item: MenuItem,
    pub quantity: i32,
}

impl CartItem {
    pub fn line_total(&self) -> Decimal {
        self.item.price * Decimal::from(self.quantity)
    }
}

/// Table the guest session is bound to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableBinding {
    pub restaurant_id: String,
    pub table_id: String,
    pub table_number: Option<String>,
}

/// Confirmation record of the last placed order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub order_id: String,
    pub restaurant_id: String,
    pub table_number: Option<String>,
    pub lines: Vec<CartItem>,
    pub totals: Totals,
    pub placed_at: DateTime<Utc>,
}

impl OrderReceipt {
    /// Total with two decimals, e.g. `262.50`
    pub fn total_display(&self) -> String {
        format_amount(self.totals.total)
    }
}

/// Loaded order pages plus in-flight status writes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrdersState {
    pub list: Vec<Order>,
    /// Last fetched zero-based page
    pub page: usize,
    pub has_more: bool,
    /// Orders with an unconfirmed optimistic status change
    pub updating: HashSet<String>,
}

impl OrdersState {
    pub fn find(&self, id: &str) -> Option<&Order> {
        self.list.iter().find(|o| o.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.find(id).is_some()
    }

    pub fn is_updating(&self, id: &str) -> bool {
        self.updating.contains(id)
    }
}

/// Sign-in state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthState {
    pub session: Option<AuthSession>,
    pub profile: Option<CustomerProfile>,
}

impl AuthState {
    pub fn is_signed_in(&self) -> bool {
        self.session.is_some() && self.profile.is_some()
    }

    pub fn is_staff(&self) -> bool {
        self.profile.as_ref().is_some_and(|p| p.role.is_staff())
    }
}

/// Compensating action for a multi-step write that stopped half-way
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Compensation {
    /// Remove an order header whose line items were never written
    DeleteOrder { order_id: String },
    /// Put back a menu that was deleted before a failed replacement
    RestoreMenu {
        restaurant_id: String,
        items: Vec<MenuItemCreate>,
    },
}

/// Intent log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingCompensation {
    pub compensation: Compensation,
    pub last_error: String,
    pub attempts: u32,
    pub recorded_at: DateTime<Utc>,
}

/// Everything the UI renders
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppState {
    /// Tenant asked for by the last `switch_tenant` (kept for retry)
    pub requested_tenant: Option<String>,
    pub restaurant: Option<RestaurantProfile>,
    pub table: Option<TableBinding>,
    pub cart: Vec<CartItem>,
    pub last_order: Option<OrderReceipt>,
    pub menu: MenuSnapshot,
    /// Menu currently shown came from the local cache
    pub menu_from_cache: bool,
    pub orders: OrdersState,
    pub service_requests: Vec<ServiceRequest>,
    pub auth: AuthState,
    pub pending_compensations: Vec<PendingCompensation>,
    /// Blocking full-page error (backend unreachable)
    pub fatal_error: Option<String>,
    /// Change feed dropped; cleared when `retry` re-opens it
    pub realtime_error: Option<String>,
}

impl AppState {
    pub fn restaurant_id(&self) -> Option<&str> {
        self.restaurant.as_ref().map(|r| r.id.as_str())
    }

    pub fn cart_totals(&self) -> Totals {
        Totals::from_lines(self.cart.iter().map(|l| (l.item.price, l.quantity)))
    }

    pub fn cart_count(&self) -> i32 {
        self.cart.iter().map(|l| l.quantity).sum()
    }
}

/// Top-level view decided at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum LandingView {
    CustomerMenu {
        restaurant_id: String,
        table_id: String,
        table_number: Option<String>,
    },
    RescanQr {
        reason: String,
    },
    AdminDashboard {
        restaurant_id: String,
    },
    SignIn,
    ConnectionError {
        message: String,
    },
}

/// Item sold across loaded orders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopItem {
    pub name: String,
    pub quantity: i32,
    pub revenue: Decimal,
}

/// Summary over the loaded orders
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub order_count: usize,
    /// Sum of totals, cancelled orders excluded
    pub revenue: Decimal,
    pub average_ticket: Decimal,
    pub by_status: BTreeMap<String, usize>,
    pub top_items: Vec<TopItem>,
}

impl DashboardStats {
    pub fn count(&self, status: OrderStatus) -> usize {
        self.by_status.get(status.as_str()).copied().unwrap_or(0)
    }
}
