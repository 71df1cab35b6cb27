//! Cart operations

use rust_decimal::Decimal;
use shared::models::MenuItem;

use super::{AppContext, CartItem};

impl AppContext {
    /// Add one unit of an item; out-of-stock items are ignored
    pub async fn add_to_cart(&self, item: &MenuItem) {
        if !item.in_stock {
            tracing::debug!(item_id = %item.id, "Out of stock, not added");
            return;
        }
        let mut state = self.state.write().await;
        match state.cart.iter_mut().find(|line| line.item.id == item.id) {
            Some(line) => line.quantity += 1,
            None => state.cart.push(CartItem {
                item: item.clone(),
                quantity: 1,
            }),
        }
    }

    /// Change a line's quantity by `delta`; reaching zero removes the line
    pub async fn update_quantity(&self, item_id: &str, delta: i32) {
        let mut state = self.state.write().await;
        let Some(index) = state.cart.iter().position(|line| line.item.id == item_id) else {
            return;
        };
        let quantity = state.cart[index].quantity.saturating_add(delta).max(0);
        if quantity == 0 {
            state.cart.remove(index);
        } else {
            state.cart[index].quantity = quantity;
        }
    }

    pub async fn clear_cart(&self) {
        self.state.write().await.cart.clear();
    }

    pub async fn cart_subtotal(&self) -> Decimal {
        self.state.read().await.cart_totals().subtotal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::menu_cache::MenuCache;
    use qrdine_client::{MemoryBackend, MemoryRealtime};
    use std::sync::Arc;

    fn item(id: &str, price: i64, in_stock: bool) -> MenuItem {
        MenuItem {
            id: id.to_string(),
            restaurant_id: "r-1".into(),
            name: format!("Dish {id}"),
            description: None,
            price: Decimal::from(price),
            category: "Mains".into(),
            dietary_tags: vec![],
            in_stock,
            image_url: None,
            deleted_at: None,
        }
    }

    fn context(dir: &tempfile::TempDir) -> Arc<AppContext> {
        AppContext::new(
            Arc::new(MemoryBackend::new()),
            Arc::new(MemoryRealtime::new()),
            MenuCache::new(dir.path()),
        )
    }

    async fn assert_cart_invariants(ctx: &AppContext) {
        let state = ctx.read().await;
        for (i, line) in state.cart.iter().enumerate() {
            assert!(line.quantity > 0, "line {} has quantity {}", line.item.id, line.quantity);
            assert!(
                state.cart[i + 1..].iter().all(|other| other.item.id != line.item.id),
                "duplicate line for {}",
                line.item.id
            );
        }
    }

    #[tokio::test]
    async fn test_add_increments_existing_line() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        let a = item("a", 100, true);

        ctx.add_to_cart(&a).await;
        ctx.add_to_cart(&a).await;
        ctx.add_to_cart(&item("b", 50, true)).await;

        let state = ctx.snapshot().await;
        assert_eq!(state.cart.len(), 2);
        assert_eq!(state.cart[0].quantity, 2);
        assert_eq!(ctx.cart_subtotal().await, Decimal::from(250));
    }

    #[tokio::test]
    async fn test_out_of_stock_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);

        ctx.add_to_cart(&item("a", 100, false)).await;
        assert!(ctx.read().await.cart.is_empty());
    }

    #[tokio::test]
    async fn test_quantity_clamps_and_removes() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        let a = item("a", 100, true);

        ctx.add_to_cart(&a).await;
        ctx.update_quantity("a", 3).await;
        assert_eq!(ctx.read().await.cart[0].quantity, 4);

        ctx.update_quantity("a", -10).await;
        assert!(ctx.read().await.cart.is_empty());

        // unknown ids are a no-op
        ctx.update_quantity("zzz", 1).await;
        assert!(ctx.read().await.cart.is_empty());
    }

    #[tokio::test]
    async fn test_mixed_sequence_keeps_invariants() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        let items = [item("a", 10, true), item("b", 20, true), item("c", 30, true)];

        // 固定的伪随机序列
        let mut seed: u32 = 7;
        for _ in 0..200 {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let target = &items[(seed >> 16) as usize % items.len()];
            match (seed >> 8) % 3 {
                0 => ctx.add_to_cart(target).await,
                1 => ctx.update_quantity(&target.id, 1).await,
                _ => ctx.update_quantity(&target.id, -2).await,
            }
            assert_cart_invariants(&ctx).await;
        }

        ctx.clear_cart().await;
        assert_eq!(ctx.cart_subtotal().await, Decimal::ZERO);
    }
}
