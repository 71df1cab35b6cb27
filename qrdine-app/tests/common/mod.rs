// qrdine-app/tests/common/mod.rs
// 集成测试公共夹具

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use qrdine_app::{AppContext, AppState, MenuCache, SessionParams};
use qrdine_client::{MemoryBackend, MemoryRealtime};
use rust_decimal::Decimal;
use shared::models::{CustomerProfile, MenuItem, Order, OrderItem, OrderStatus, Role};
use tempfile::TempDir;

pub const R1: &str = "R1";
pub const R2: &str = "R2";
pub const T1: &str = "T1";
pub const ADMIN_EMAIL: &str = "owner@spice.test";
pub const ADMIN_PASSWORD: &str = "secret";

pub struct Fixture {
    pub backend: Arc<MemoryBackend>,
    pub feed: MemoryRealtime,
    pub dir: TempDir,
}

pub fn menu_item(id: &str, restaurant_id: &str, category: &str, price: i64, in_stock: bool) -> MenuItem {
    MenuItem {
        id: id.to_string(),
        restaurant_id: restaurant_id.to_string(),
        name: format!("Dish {id}"),
        description: None,
        price: Decimal::from(price),
        category: category.to_string(),
        dietary_tags: vec![],
        in_stock,
        image_url: None,
        deleted_at: None,
    }
}

/// Order `n` minutes after a fixed epoch, with one line
pub fn order(id: &str, restaurant_id: &str, minute: i64, status: OrderStatus) -> Order {
    let price = Decimal::from(100);
    Order {
        id: id.to_string(),
        restaurant_id: restaurant_id.to_string(),
        table_id: T1.to_string(),
        table_number: Some("5".to_string()),
        status,
        subtotal: price,
        tax: Decimal::new(5, 0),
        total: Decimal::from(105),
        created_at: Utc.timestamp_opt(1_700_000_000 + minute * 60, 0).unwrap(),
        items: vec![OrderItem {
            id: format!("{id}-1"),
            order_id: id.to_string(),
            menu_item_id: "A".to_string(),
            name: "Dish A".to_string(),
            quantity: 1,
            price_at_time: price,
        }],
    }
}

impl Fixture {
    pub fn new() -> Self {
        let feed = MemoryRealtime::new();
        let backend = Arc::new(MemoryBackend::new().with_feed(feed.clone()));

        backend.add_restaurant(R1, "Spice Route");
        backend.add_restaurant(R2, "Noodle Bar");
        backend.add_table(R1, T1, 5);
        backend.add_table(R2, "T2", 1);

        backend.add_menu_item(menu_item("A", R1, "Mains", 100, true));
        backend.add_menu_item(menu_item("B", R1, "Drinks", 50, true));
        backend.add_menu_item(menu_item("C", R1, "Mains", 80, false));
        let mut gone = menu_item("D", R1, "Desserts", 60, true);
        gone.deleted_at = Some(Utc::now());
        backend.add_menu_item(gone);
        backend.add_menu_item(menu_item("N1", R2, "Noodles", 90, true));

        backend.add_account(
            ADMIN_EMAIL,
            ADMIN_PASSWORD,
            CustomerProfile {
                id: "u-admin".to_string(),
                email: Some(ADMIN_EMAIL.to_string()),
                full_name: Some("Asha Owner".to_string()),
                role: Role::Admin,
                current_restaurant_id: Some(R1.to_string()),
            },
        );

        Self {
            backend,
            feed,
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn context(&self) -> Arc<AppContext> {
        AppContext::new(
            self.backend.clone(),
            Arc::new(self.feed.clone()),
            MenuCache::new(self.dir.path()),
        )
    }

    pub fn item(&self, id: &str) -> MenuItem {
        self.backend
            .menu_rows(R1)
            .into_iter()
            .find(|m| m.id == id)
            .unwrap()
    }
}

pub fn params(url: &str) -> SessionParams {
    url.parse().unwrap()
}

pub fn guest_link() -> SessionParams {
    params("https://order.example.com/?rid=R1&tableId=T1&tableNo=5")
}

/// Guest context opened on table 5 of R1
pub async fn guest(fixture: &Fixture) -> Arc<AppContext> {
    let ctx = fixture.context();
    ctx.open(&guest_link()).await.unwrap();
    ctx
}

/// Admin context signed in and on the R1 dashboard
pub async fn admin(fixture: &Fixture) -> Arc<AppContext> {
    let ctx = fixture.context();
    ctx.sign_in(ADMIN_EMAIL, ADMIN_PASSWORD).await.unwrap();
    ctx.open(&SessionParams::default()).await.unwrap();
    ctx
}

/// Poll until the predicate holds (realtime delivery is asynchronous)
pub async fn wait_until<F>(ctx: &AppContext, predicate: F) -> bool
where
    F: Fn(&AppState) -> bool,
{
    for _ in 0..200 {
        if predicate(&*ctx.read().await) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
