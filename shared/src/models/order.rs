//! Order Model

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Order status
///
/// Guests create orders as `Pending`; every later transition belongs to staff.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Preparing,
    Ready,
    Served,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::Served,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Preparing => "preparing",
            Self::Ready => "ready",
            Self::Served => "served",
            Self::Cancelled => "cancelled",
        }
    }

    /// Still on the kitchen board
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Preparing | Self::Ready)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown order status: {s}"))
    }
}

/// Order line item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub menu_item_id: String,
    /// Item name at time of order
    #[serde(default)]
    pub name: String,
    pub quantity: i32,
    /// Unit price at time of order
    pub price_at_time: Decimal,
}

impl OrderItem {
    pub fn line_total(&self) -> Decimal {
        self.price_at_time * Decimal::from(self.quantity)
    }
}

/// Order entity (header + line items)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub restaurant_id: String,
    pub table_id: String,
    #[serde(default)]
    pub table_number: Option<String>,
    pub status: OrderStatus,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub items: Vec<OrderItem>,
}

impl Order {
    pub fn item_count(&self) -> i32 {
        self.items.iter().map(|i| i.quantity).sum()
    }
}

/// Create order header payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreate {
    pub restaurant_id: String,
    pub table_id: String,
    pub table_number: Option<String>,
    pub status: OrderStatus,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

/// Create order line payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItemCreate {
    pub order_id: String,
    pub menu_item_id: String,
    pub name: String,
    pub quantity: i32,
    pub price_at_time: Decimal,
}

/// Status patch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusUpdate {
    pub status: OrderStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serde_and_parse() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::Preparing).unwrap(),
            "\"preparing\""
        );
        assert_eq!("READY".parse::<OrderStatus>().unwrap(), OrderStatus::Ready);
        assert!("lost".parse::<OrderStatus>().is_err());
        assert!(OrderStatus::Pending.is_open());
        assert!(!OrderStatus::Served.is_open());
    }

    #[test]
    fn test_order_deserialize_with_items() {
        let json = r#"{
            "id": "o-1",
            "restaurant_id": "r-1",
            "table_id": "t-1",
            "table_number": "5",
            "status": "pending",
            "subtotal": 250,
            "tax": 12.5,
            "total": 262.5,
            "created_at": "2026-10-01T12:00:00Z",
            "items": [
                {"id": "i-1", "order_id": "o-1", "menu_item_id": "m-1", "name": "Soup", "quantity": 2, "price_at_time": 100}
            ]
        }"#;
        let order: Order = serde_json::from_str(json).unwrap();
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.item_count(), 2);
        assert_eq!(order.items[0].line_total(), Decimal::from(200));
        assert_eq!(order.total, Decimal::new(2625, 1));
    }
}
