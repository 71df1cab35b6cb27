//! Order operations
//!
//! 下单 (header + line items 两步写入，失败时补偿)、乐观状态更新、分页加载。

use chrono::Utc;
use shared::message::{NotificationCategory, NotificationPayload};
use shared::models::{OrderCreate, OrderItemCreate, OrderStatus};
use shared::money::Totals;

use super::{AppContext, AppError, AppResult, Compensation, OrderReceipt};

impl AppContext {
    /// Place the cart as an order for the bound table
    ///
    /// Returns `Ok(None)` without touching the backend when the cart is
    /// empty or no restaurant/table is bound.
    pub async fn place_order(&self) -> AppResult<Option<OrderReceipt>> {
        let (restaurant_id, table, lines) = {
            let state = self.state.read().await;
            match (state.restaurant_id(), &state.table) {
                (Some(rid), Some(table)) if !state.cart.is_empty() => {
                    (rid.to_string(), table.clone(), state.cart.clone())
                }
                _ => {
                    tracing::debug!("place_order skipped: empty cart or no session");
                    return Ok(None);
                }
            }
        };

        let totals = Totals::from_lines(lines.iter().map(|l| (l.item.price, l.quantity)));
        let header = OrderCreate {
            restaurant_id: restaurant_id.clone(),
            table_id: table.table_id.clone(),
            table_number: table.table_number.clone(),
            status: OrderStatus::Pending,
            subtotal: totals.subtotal,
            tax: totals.tax,
            total: totals.total,
        };

        let order = match self.backend.insert_order(&header).await {
            Ok(order) => order,
            Err(e) => return Err(self.fail(e, "Order failed", NotificationCategory::Order).await),
        };

        let items: Vec<OrderItemCreate> = lines
            .iter()
            .map(|l| OrderItemCreate {
                order_id: order.id.clone(),
                menu_item_id: l.item.id.clone(),
                name: l.item.name.clone(),
                quantity: l.quantity,
                price_at_time: l.item.price,
            })
            .collect();

        if let Err(e) = self.backend.insert_order_items(&items).await {
            tracing::error!(order_id = %order.id, error = %e, "Order items failed, compensating");
            let compensation = Compensation::DeleteOrder {
                order_id: order.id.clone(),
            };
            self.compensate(compensation).await;
            let err = self.fail(e, "Order failed", NotificationCategory::Order).await;
            return Err(AppError::PartialFailure(format!(
                "order {} header written, items failed: {}",
                order.id, err
            )));
        }

        let receipt = OrderReceipt {
            order_id: order.id.clone(),
            restaurant_id,
            table_number: table.table_number,
            lines,
            totals,
            placed_at: Utc::now(),
        };
        {
            let mut state = self.state.write().await;
            state.cart.clear();
            state.last_order = Some(receipt.clone());
        }

        tracing::info!(order_id = %order.id, total = %receipt.total_display(), "Order placed");
        self.notify(
            NotificationPayload::success("Order placed", format!("Total {}", receipt.total_display()))
                .with_category(NotificationCategory::Order),
        );
        Ok(Some(receipt))
    }

    /// Optimistically change an order's status
    ///
    /// The local order is patched first; if the backend rejects the write
    /// that order gets its previous status back. Other rows, including
    /// ones inserted by realtime events meanwhile, are left alone.
    pub async fn update_order_status(&self, order_id: &str, status: OrderStatus) -> AppResult<()> {
        let previous = {
            let mut state = self.state.write().await;
            let index = state.orders.list.iter().position(|o| o.id == order_id);
            let Some(index) = index else {
                drop(state);
                self.notify(
                    NotificationPayload::warning("Order not found", order_id)
                        .with_category(NotificationCategory::Order),
                );
                return Err(AppError::OrderNotFound(order_id.to_string()));
            };
            let previous = state.orders.list[index].status;
            state.orders.list[index].status = status;
            state.orders.updating.insert(order_id.to_string());
            previous
        };

        let result = self.backend.update_order_status(order_id, status).await;

        {
            let mut state = self.state.write().await;
            state.orders.updating.remove(order_id);
            // 只回滚目标订单；期间实时插入的订单保留
            let restored = match &result {
                Ok(confirmed) => confirmed.status,
                Err(_) => previous,
            };
            if let Some(order) = state.orders.list.iter_mut().find(|o| o.id == order_id) {
                order.status = restored;
            }
        }

        match result {
            Ok(_) => {
                tracing::info!(order_id = %order_id, status = %status, "Order status updated");
                self.notify(
                    NotificationPayload::success("Order updated", format!("Order marked {status}"))
                        .with_category(NotificationCategory::Order),
                );
                Ok(())
            }
            Err(e) => Err(self.fail(e, "Status update failed", NotificationCategory::Order).await),
        }
    }

    /// Fetch one zero-based page of orders
    ///
    /// Page 0 replaces the list; later pages append, skipping ids already
    /// present.
    pub async fn load_orders(&self, page: usize) -> AppResult<()> {
        let restaurant_id = self.active_restaurant_id().await?;
        let fetched = match self.backend.fetch_orders_page(&restaurant_id, page).await {
            Ok(fetched) => fetched,
            Err(e) => return Err(self.fail(e, "Orders unavailable", NotificationCategory::Order).await),
        };

        let mut state = self.state.write().await;
        // 租户已切换，丢弃过期结果
        if state.restaurant_id() != Some(restaurant_id.as_str()) {
            return Ok(());
        }
        let has_more = fetched.has_more();
        if page == 0 {
            state.orders.list = fetched.rows;
        } else {
            for order in fetched.rows {
                if !state.orders.contains(&order.id) {
                    state.orders.list.push(order);
                }
            }
        }
        state.orders.page = page;
        state.orders.has_more = has_more;
        tracing::debug!(restaurant_id = %restaurant_id, page, has_more, "Orders loaded");
        Ok(())
    }

    /// Load the next page; `Ok(false)` when there is nothing more
    pub async fn load_more_orders(&self) -> AppResult<bool> {
        let (has_more, next) = {
            let state = self.state.read().await;
            (state.orders.has_more, state.orders.page + 1)
        };
        if !has_more {
            return Ok(false);
        }
        self.load_orders(next).await?;
        Ok(true)
    }
}
