//! Dashboard analytics over the loaded orders

use std::collections::HashMap;

use rust_decimal::Decimal;
use shared::models::{Order, OrderStatus};

use super::{AppContext, DashboardStats, TopItem};

const TOP_ITEMS: usize = 5;

impl DashboardStats {
    pub fn from_orders(orders: &[Order]) -> Self {
        let mut stats = DashboardStats {
            order_count: orders.len(),
            ..Default::default()
        };
        for status in OrderStatus::ALL {
            stats.by_status.insert(status.as_str().to_string(), 0);
        }

        let mut billed = 0usize;
        let mut items: HashMap<&str, TopItem> = HashMap::new();
        for order in orders {
            *stats
                .by_status
                .entry(order.status.as_str().to_string())
                .or_default() += 1;
            if order.status == OrderStatus::Cancelled {
                continue;
            }
            billed += 1;
            stats.revenue += order.total;

            for line in &order.items {
                let entry = items.entry(line.name.as_str()).or_insert_with(|| TopItem {
                    name: line.name.clone(),
                    quantity: 0,
                    revenue: Decimal::ZERO,
                });
                entry.quantity += line.quantity;
                entry.revenue += line.line_total();
            }
        }

        if billed > 0 {
            stats.average_ticket = (stats.revenue / Decimal::from(billed)).round_dp(2);
        }

        let mut top: Vec<TopItem> = items.into_values().collect();
        top.sort_by(|a, b| b.quantity.cmp(&a.quantity).then_with(|| a.name.cmp(&b.name)));
        top.truncate(TOP_ITEMS);
        stats.top_items = top;
        stats
    }
}

impl AppContext {
    pub async fn dashboard_stats(&self) -> DashboardStats {
        DashboardStats::from_orders(&self.state.read().await.orders.list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shared::models::OrderItem;

    fn order(id: &str, status: OrderStatus, lines: &[(&str, i32, i64)]) -> Order {
        let items: Vec<OrderItem> = lines
            .iter()
            .enumerate()
            .map(|(i, (name, qty, price))| OrderItem {
                id: format!("{id}-{i}"),
                order_id: id.to_string(),
                menu_item_id: format!("m-{name}"),
                name: name.to_string(),
                quantity: *qty,
                price_at_time: Decimal::from(*price),
            })
            .collect();
        let subtotal: Decimal = items.iter().map(|i| i.line_total()).sum();
        Order {
            id: id.to_string(),
            restaurant_id: "r-1".into(),
            table_id: "t-1".into(),
            table_number: Some("1".into()),
            status,
            subtotal,
            tax: Decimal::ZERO,
            total: subtotal,
            created_at: Utc::now(),
            items,
        }
    }

    #[test]
    fn test_stats_exclude_cancelled_revenue() {
        let orders = vec![
            order("o1", OrderStatus::Served, &[("Naan", 2, 30), ("Dal", 1, 140)]),
            order("o2", OrderStatus::Pending, &[("Naan", 3, 30)]),
            order("o3", OrderStatus::Cancelled, &[("Biryani", 10, 300)]),
        ];
        let stats = DashboardStats::from_orders(&orders);

        assert_eq!(stats.order_count, 3);
        assert_eq!(stats.revenue, Decimal::from(290));
        assert_eq!(stats.average_ticket, Decimal::from(145));
        assert_eq!(stats.count(OrderStatus::Cancelled), 1);
        assert_eq!(stats.count(OrderStatus::Ready), 0);

        assert_eq!(stats.top_items[0].name, "Naan");
        assert_eq!(stats.top_items[0].quantity, 5);
        assert!(stats.top_items.iter().all(|i| i.name != "Biryani"));
    }

    #[test]
    fn test_empty_stats() {
        let stats = DashboardStats::from_orders(&[]);
        assert_eq!(stats.revenue, Decimal::ZERO);
        assert_eq!(stats.average_ticket, Decimal::ZERO);
        assert!(stats.top_items.is_empty());
    }
}
