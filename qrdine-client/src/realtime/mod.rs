// qrdine-client/src/realtime/mod.rs
// 实时变更订阅 - 订阅抽象、错误类型

mod memory;
mod websocket;

pub use memory::MemoryRealtime;
pub use websocket::{WebSocketRealtime, parse_postgres_change};

use async_trait::async_trait;
use shared::message::{ChangeEvent, SubscriptionFilter};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// 订阅通道容量
pub const SUBSCRIPTION_BUFFER: usize = 256;

/// 实时订阅错误
#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Join rejected: {0}")]
    JoinRejected(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// 变更事件来源
///
/// 每次 `subscribe` 打开一个独立订阅；调用方负责在打开新订阅前取消旧订阅。
#[async_trait]
pub trait RealtimeSource: Send + Sync {
    async fn subscribe(&self, filter: SubscriptionFilter) -> Result<Subscription, RealtimeError>;
}

/// 单个实时订阅
///
/// 通过 channel 交付事件；`cancel()` 或 drop 时关闭底层连接。
#[derive(Debug)]
pub struct Subscription {
    filter: SubscriptionFilter,
    rx: mpsc::Receiver<ChangeEvent>,
    token: CancellationToken,
}

impl Subscription {
    pub fn new(
        filter: SubscriptionFilter,
        rx: mpsc::Receiver<ChangeEvent>,
        token: CancellationToken,
    ) -> Self {
        Self { filter, rx, token }
    }

    /// Channel pair plus a subscription bound to it (for source implementations)
    pub fn channel(
        filter: SubscriptionFilter,
    ) -> (mpsc::Sender<ChangeEvent>, CancellationToken, Self) {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let token = CancellationToken::new();
        let sub = Self::new(filter, rx, token.clone());
        (tx, token, sub)
    }

    pub fn filter(&self) -> &SubscriptionFilter {
        &self.filter
    }

    pub fn restaurant_id(&self) -> &str {
        &self.filter.restaurant_id
    }

    /// 接收下一条事件；订阅取消或来源关闭时返回 None
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        if self.token.is_cancelled() {
            return None;
        }
        tokio::select! {
            _ = self.token.cancelled() => None,
            event = self.rx.recv() => event,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 取消句柄 (可在订阅被移动到任务中后取消)
    pub fn cancel_handle(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::message::{ChangeKind, ResourceTable};

    #[tokio::test]
    async fn test_subscription_recv_and_cancel() {
        let (tx, _token, mut sub) = Subscription::channel(SubscriptionFilter::for_restaurant("r-1"));

        tx.send(ChangeEvent::new(ResourceTable::Orders, ChangeKind::Insert, None))
            .await
            .unwrap();
        let event = sub.recv().await.unwrap();
        assert_eq!(event.table, ResourceTable::Orders);

        let handle = sub.cancel_handle();
        sub.cancel();
        assert!(handle.is_cancelled());
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_drop_cancels() {
        let (_tx, token, sub) = Subscription::channel(SubscriptionFilter::for_restaurant("r-1"));
        assert!(!token.is_cancelled());
        drop(sub);
        assert!(token.is_cancelled());
    }
}
