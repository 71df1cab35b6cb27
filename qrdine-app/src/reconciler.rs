//! Realtime Reconciler
//!
//! 把后端推送的行变更写回 `AppContext`:
//! - orders INSERT: 拉取完整订单 (含明细)，按 id 去重后插到列表头部
//! - orders UPDATE: 只更新匹配 id 的 `status`
//! - orders DELETE: 按 id 移除
//! - order_items: 父订单已在列表中时重新拉取该订单 (明细行不带餐厅，按订单 id 过滤)
//! - service_requests / menu_items: 整体重新拉取
//!
//! 事件处理按 id 打补丁，不依赖列表位置，处理过程中穿插的网络请求不会破坏顺序一致性。

use std::sync::{Arc, Weak};

use qrdine_client::Subscription;
use shared::message::{ChangeEvent, ChangeKind, NotificationCategory, NotificationPayload, ResourceTable};
use shared::models::OrderStatus;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::store::{AppContext, AppResult};

/// Running subscription loop for one restaurant
#[derive(Debug)]
pub struct Reconciler {
    restaurant_id: String,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Reconciler {
    /// Drive `subscription` into `ctx` on a tokio task
    ///
    /// The task holds only a weak reference to the context and ends when
    /// the subscription is cancelled, the source closes, or the context
    /// is dropped. A source that closes on its own is reported through
    /// `AppContext::on_feed_lost`.
    pub fn spawn(ctx: &Arc<AppContext>, mut subscription: Subscription) -> Self {
        let restaurant_id = subscription.restaurant_id().to_string();
        let token = subscription.cancel_handle();
        let weak: Weak<AppContext> = Arc::downgrade(ctx);

        let handle = tokio::spawn(async move {
            tracing::info!(restaurant_id = %subscription.restaurant_id(), "Reconciler started");
            while let Some(event) = subscription.recv().await {
                let Some(ctx) = weak.upgrade() else {
                    break;
                };
                if let Err(e) = ctx.apply_change(event).await {
                    tracing::warn!(error = %e, "Failed to apply change event");
                }
            }
            if !subscription.is_cancelled()
                && let Some(ctx) = weak.upgrade()
            {
                ctx.on_feed_lost(subscription.restaurant_id()).await;
            }
            tracing::info!(restaurant_id = %subscription.restaurant_id(), "Reconciler stopped");
        });

        Self {
            restaurant_id,
            token,
            handle,
        }
    }

    pub fn restaurant_id(&self) -> &str {
        &self.restaurant_id
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancel the subscription and wait for the loop to exit
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await
            && e.is_panic()
        {
            tracing::error!(restaurant_id = %self.restaurant_id, "Reconciler task panicked");
        }
    }
}

impl AppContext {
    /// Apply one backend change event to the store
    pub async fn apply_change(&self, event: ChangeEvent) -> AppResult<()> {
        let active = self.read().await.restaurant_id().map(str::to_string);
        if let (Some(active), Some(event_rid)) = (active.as_deref(), event.restaurant_id())
            && active != event_rid
        {
            tracing::debug!(active = %active, event = %event_rid, "Ignoring change for another restaurant");
            return Ok(());
        }

        tracing::debug!(table = %event.table.as_str(), kind = ?event.kind, id = ?event.record_id(), "Change event");
        match (event.table, event.kind) {
            (ResourceTable::Orders, ChangeKind::Insert) => self.on_order_inserted(&event).await,
            (ResourceTable::Orders, ChangeKind::Update) => {
                self.on_order_updated(&event).await;
                Ok(())
            }
            (ResourceTable::Orders, ChangeKind::Delete) => {
                if let Some(id) = event.record_id() {
                    self.state_mut().await.orders.list.retain(|o| o.id != id);
                }
                Ok(())
            }
            (ResourceTable::OrderItems, _) => self.on_order_items_changed(&event).await,
            (ResourceTable::ServiceRequests, _) => self.refresh_service_requests().await,
            (ResourceTable::MenuItems, _) => self.refresh_menu().await,
        }
    }

    async fn on_order_inserted(&self, event: &ChangeEvent) -> AppResult<()> {
        let Some(id) = event.record_id() else {
            return Ok(());
        };
        if self.read().await.orders.contains(id) {
            return Ok(());
        }

        let order = match self.backend().fetch_order(id).await {
            Ok(order) => order,
            Err(e) if e.is_not_found() => {
                tracing::debug!(order_id = %id, "Inserted order vanished before fetch");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let table = order.table_number.clone();
        {
            let mut state = self.state_mut().await;
            // 拉取期间可能已被其他事件插入
            if state.restaurant_id() != Some(order.restaurant_id.as_str())
                || state.orders.contains(&order.id)
            {
                return Ok(());
            }
            state.orders.list.insert(0, order);
        }

        self.notify(
            NotificationPayload::info(
                "New order",
                format!("Table {}", table.as_deref().unwrap_or("-")),
            )
            .with_category(NotificationCategory::Order),
        );
        Ok(())
    }

    /// 明细变化时重新拉取父订单，只替换仍在列表中的同 id 订单
    async fn on_order_items_changed(&self, event: &ChangeEvent) -> AppResult<()> {
        let Some(order_id) = event.order_id() else {
            return Ok(());
        };
        if !self.read().await.orders.contains(order_id) {
            return Ok(());
        }

        let order = match self.backend().fetch_order(order_id).await {
            Ok(order) => order,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let mut state = self.state_mut().await;
        if let Some(slot) = state.orders.list.iter_mut().find(|o| o.id == order.id) {
            // 状态以 orders 事件为准，避免覆盖进行中的乐观更新
            let status = slot.status;
            *slot = order;
            slot.status = status;
        }
        Ok(())
    }

    async fn on_order_updated(&self, event: &ChangeEvent) {
        let (Some(id), Some(record)) = (event.record_id(), event.record.as_ref()) else {
            return;
        };
        let status = record
            .get("status")
            .and_then(|s| s.as_str())
            .and_then(|s| s.parse::<OrderStatus>().ok());
        let Some(status) = status else {
            tracing::warn!(order_id = %id, "Order update without a readable status");
            return;
        };

        let mut state = self.state_mut().await;
        if let Some(order) = state.orders.list.iter_mut().find(|o| o.id == id) {
            order.status = status;
        }
    }
}
