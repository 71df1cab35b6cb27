//! In-process change feed (for In-Process communication and tests)

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use shared::message::{ChangeEvent, SubscriptionFilter};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::{RealtimeError, RealtimeSource, Subscription};

/// Broadcast-backed change feed
///
/// `publish` fans events out to every open subscription whose filter
/// matches. Each subscription is served by its own forwarding task that
/// stops once the subscription is cancelled or the feed is disconnected.
#[derive(Debug, Clone)]
pub struct MemoryRealtime {
    tx: broadcast::Sender<ChangeEvent>,
    /// (subscription token, disconnect token)
    tokens: Arc<Mutex<Vec<(CancellationToken, CancellationToken)>>>,
    opened: Arc<AtomicUsize>,
}

impl Default for MemoryRealtime {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRealtime {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self {
            tx,
            tokens: Arc::new(Mutex::new(Vec::new())),
            opened: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Emit an event to all matching subscriptions
    pub fn publish(&self, event: ChangeEvent) {
        if let Err(e) = self.tx.send(event) {
            tracing::trace!("No subscribers for change event: {}", e);
        }
    }

    /// Subscriptions opened and neither cancelled nor disconnected
    pub fn active_subscriptions(&self) -> usize {
        let mut tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        tokens.retain(|(sub, link)| !sub.is_cancelled() && !link.is_cancelled());
        tokens.len()
    }

    /// Subscriptions ever opened
    pub fn total_subscriptions(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Close every open subscription from the source side, as a dropped
    /// connection would
    pub fn disconnect_all(&self) {
        let tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        for (_, link) in tokens.iter() {
            link.cancel();
        }
    }
}

#[async_trait]
impl RealtimeSource for MemoryRealtime {
    async fn subscribe(&self, filter: SubscriptionFilter) -> Result<Subscription, RealtimeError> {
        let (tx, token, sub) = Subscription::channel(filter.clone());
        let mut rx = self.tx.subscribe();
        let link = CancellationToken::new();

        self.tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((token.clone(), link.clone()));
        self.opened.fetch_add(1, Ordering::SeqCst);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = link.cancelled() => break,
                    received = rx.recv() => match received {
                        Ok(event) => {
                            if filter.matches(&event) && tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(skipped = n, "Realtime subscriber lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            tracing::debug!(restaurant_id = %filter.restaurant_id, "Memory subscription closed");
        });

        Ok(sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared::message::{ChangeKind, ResourceTable};
    use std::time::Duration;

    fn event(restaurant: &str) -> ChangeEvent {
        ChangeEvent::new(
            ResourceTable::Orders,
            ChangeKind::Insert,
            Some(json!({"id": "o-1", "restaurant_id": restaurant})),
        )
    }

    #[tokio::test]
    async fn test_filtered_delivery() {
        let feed = MemoryRealtime::new();
        let mut sub = feed
            .subscribe(SubscriptionFilter::for_restaurant("r-1"))
            .await
            .unwrap();

        feed.publish(event("r-2"));
        feed.publish(event("r-1"));

        let got = tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.restaurant_id(), Some("r-1"));
    }

    #[tokio::test]
    async fn test_active_subscription_count() {
        let feed = MemoryRealtime::new();
        let a = feed
            .subscribe(SubscriptionFilter::for_restaurant("r-1"))
            .await
            .unwrap();
        let b = feed
            .subscribe(SubscriptionFilter::for_restaurant("r-2"))
            .await
            .unwrap();
        assert_eq!(feed.active_subscriptions(), 2);

        a.cancel();
        assert_eq!(feed.active_subscriptions(), 1);
        drop(b);
        assert_eq!(feed.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_ends_subscription_without_cancel() {
        let feed = MemoryRealtime::new();
        let mut sub = feed
            .subscribe(SubscriptionFilter::for_restaurant("r-1"))
            .await
            .unwrap();

        feed.disconnect_all();
        let got = tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .unwrap();
        assert!(got.is_none());
        assert!(!sub.is_cancelled());
        assert_eq!(feed.active_subscriptions(), 0);
        assert_eq!(feed.total_subscriptions(), 1);
    }
}
