//! Realtime reconciliation against the in-memory change feed

mod common;

use common::*;
use qrdine_app::Reconciler;
use qrdine_client::{Backend, Subscription};
use rust_decimal::Decimal;
use serde_json::json;
use shared::message::{ChangeEvent, NotificationCategory, NotificationLevel, ResourceTable, SubscriptionFilter};
use shared::models::{
    OrderCreate, OrderItemCreate, OrderStatus, RequestStatus, RequestType, ServiceRequestCreate,
};

fn order_create() -> OrderCreate {
    OrderCreate {
        restaurant_id: R1.to_string(),
        table_id: T1.to_string(),
        table_number: Some("5".to_string()),
        status: OrderStatus::Pending,
        subtotal: Decimal::from(100),
        tax: Decimal::from(5),
        total: Decimal::from(105),
    }
}

#[tokio::test]
async fn test_inserted_order_goes_to_head_once() {
    let fx = Fixture::new();
    fx.backend.add_order(order("o-1", R1, 1, OrderStatus::Served));
    let ctx = admin(&fx).await;

    let created = fx.backend.insert_order(&order_create()).await.unwrap();
    assert!(wait_until(&ctx, |s| s.orders.list.first().is_some_and(|o| o.id == created.id)).await);

    // 重复事件不产生重复行
    let duplicate = ChangeEvent::insert(ResourceTable::Orders, &created);
    fx.feed.publish(duplicate.clone());
    ctx.apply_change(duplicate).await.unwrap();

    let state = ctx.snapshot().await;
    assert_eq!(state.orders.list.len(), 2);
    assert_eq!(state.orders.list.iter().filter(|o| o.id == created.id).count(), 1);
    ctx.shutdown().await;
}

#[tokio::test]
async fn test_order_items_fill_in_after_header_insert() {
    let fx = Fixture::new();
    let ctx = admin(&fx).await;

    // 顾客端先写订单头，再写明细
    let created = fx.backend.insert_order(&order_create()).await.unwrap();
    assert!(wait_until(&ctx, |s| s.orders.contains(&created.id)).await);
    assert!(ctx.read().await.orders.find(&created.id).unwrap().items.is_empty());

    fx.backend
        .insert_order_items(&[OrderItemCreate {
            order_id: created.id.clone(),
            menu_item_id: "A".to_string(),
            name: "Dish A".to_string(),
            quantity: 2,
            price_at_time: Decimal::from(100),
        }])
        .await
        .unwrap();

    assert!(wait_until(&ctx, |s| s
        .orders
        .find(&created.id)
        .is_some_and(|o| o.items.len() == 1 && o.items[0].quantity == 2))
    .await);
    assert_eq!(fx.backend.orders(R1)[0].items.len(), 1);
    ctx.shutdown().await;
}

#[tokio::test]
async fn test_order_items_for_unloaded_orders_are_ignored() {
    let fx = Fixture::new();
    let ctx = admin(&fx).await;
    let before = fx.backend.calls().len();

    ctx.apply_change(ChangeEvent::insert(
        ResourceTable::OrderItems,
        &json!({ "id": "i-1", "order_id": "elsewhere", "quantity": 1 }),
    ))
    .await
    .unwrap();

    assert_eq!(fx.backend.calls().len(), before);
    ctx.shutdown().await;
}

#[tokio::test]
async fn test_insert_of_vanished_order_is_ignored() {
    let fx = Fixture::new();
    let ctx = admin(&fx).await;

    let ghost = ChangeEvent::insert(
        ResourceTable::Orders,
        &json!({ "id": "ghost", "restaurant_id": R1 }),
    );
    ctx.apply_change(ghost).await.unwrap();
    assert!(ctx.read().await.orders.list.is_empty());
    ctx.shutdown().await;
}

#[tokio::test]
async fn test_update_patches_status_only() {
    let fx = Fixture::new();
    fx.backend.add_order(order("o-1", R1, 1, OrderStatus::Pending));
    let ctx = admin(&fx).await;

    fx.feed.publish(ChangeEvent::update(
        ResourceTable::Orders,
        &json!({ "id": "o-1", "restaurant_id": R1, "status": "ready", "total": 999 }),
    ));
    assert!(wait_until(&ctx, |s| s
        .orders
        .find("o-1")
        .is_some_and(|o| o.status == OrderStatus::Ready))
    .await);

    let state = ctx.snapshot().await;
    let order = state.orders.find("o-1").unwrap();
    assert_eq!(order.total, Decimal::from(105));
    assert_eq!(order.items.len(), 1);
    ctx.shutdown().await;
}

#[tokio::test]
async fn test_update_with_unknown_status_changes_nothing() {
    let fx = Fixture::new();
    fx.backend.add_order(order("o-1", R1, 1, OrderStatus::Pending));
    let ctx = admin(&fx).await;
    let before = ctx.read().await.orders.list.clone();

    ctx.apply_change(ChangeEvent::update(
        ResourceTable::Orders,
        &json!({ "id": "o-1", "restaurant_id": R1, "status": "teleported" }),
    ))
    .await
    .unwrap();
    assert_eq!(ctx.read().await.orders.list, before);
    ctx.shutdown().await;
}

#[tokio::test]
async fn test_staff_status_change_reaches_guest() {
    let fx = Fixture::new();
    let guest_ctx = guest(&fx).await;
    guest_ctx.add_to_cart(&fx.item("A")).await;
    let receipt = guest_ctx.place_order().await.unwrap().unwrap();
    assert!(wait_until(&guest_ctx, |s| s.orders.contains(&receipt.order_id)).await);

    let staff = admin(&fx).await;
    staff
        .update_order_status(&receipt.order_id, OrderStatus::Ready)
        .await
        .unwrap();

    assert!(wait_until(&guest_ctx, |s| s
        .orders
        .find(&receipt.order_id)
        .is_some_and(|o| o.status == OrderStatus::Ready))
    .await);
    guest_ctx.shutdown().await;
    staff.shutdown().await;
}

#[tokio::test]
async fn test_delete_removes_order() {
    let fx = Fixture::new();
    fx.backend.add_order(order("o-1", R1, 1, OrderStatus::Pending));
    fx.backend.add_order(order("o-2", R1, 2, OrderStatus::Pending));
    let ctx = admin(&fx).await;

    fx.backend.delete_order("o-1").await.unwrap();
    assert!(wait_until(&ctx, |s| !s.orders.contains("o-1")).await);
    assert!(ctx.read().await.orders.contains("o-2"));
    ctx.shutdown().await;
}

#[tokio::test]
async fn test_service_request_change_refetches() {
    let fx = Fixture::new();
    let ctx = admin(&fx).await;
    assert!(ctx.read().await.service_requests.is_empty());

    let created = fx
        .backend
        .insert_service_request(&ServiceRequestCreate {
            restaurant_id: R1.to_string(),
            table_id: T1.to_string(),
            table_number: Some("5".to_string()),
            request_type: RequestType::RequestBill,
            status: RequestStatus::Pending,
            note: None,
        })
        .await
        .unwrap();

    assert!(wait_until(&ctx, |s| s.service_requests.iter().any(|r| r.id == created.id)).await);
    ctx.shutdown().await;
}

#[tokio::test]
async fn test_events_for_other_restaurants_are_ignored() {
    let fx = Fixture::new();
    fx.backend.add_order(order("o-1", R1, 1, OrderStatus::Pending));
    let ctx = admin(&fx).await;
    let before = fx.backend.calls().len();

    ctx.apply_change(ChangeEvent::delete(
        ResourceTable::Orders,
        json!({ "id": "o-1", "restaurant_id": R2 }),
    ))
    .await
    .unwrap();
    ctx.apply_change(ChangeEvent::insert(
        ResourceTable::ServiceRequests,
        &json!({ "id": "sr-9", "restaurant_id": R2 }),
    ))
    .await
    .unwrap();

    assert!(ctx.read().await.orders.contains("o-1"));
    assert_eq!(fx.backend.calls().len(), before);
    ctx.shutdown().await;
}

#[tokio::test]
async fn test_one_subscription_per_tenant() {
    let fx = Fixture::new();
    let ctx = admin(&fx).await;
    assert_eq!(fx.feed.active_subscriptions(), 1);

    ctx.switch_tenant(R2).await.unwrap();
    assert_eq!(fx.feed.active_subscriptions(), 1);
    assert!(ctx.has_subscription().await);

    // 同一餐厅重新加载也只保留一个订阅
    ctx.switch_tenant(R2).await.unwrap();
    assert_eq!(fx.feed.active_subscriptions(), 1);

    ctx.shutdown().await;
    assert_eq!(fx.feed.active_subscriptions(), 0);
    assert!(!ctx.has_subscription().await);
}

#[tokio::test]
async fn test_old_tenant_events_stop_after_switch() {
    let fx = Fixture::new();
    let ctx = admin(&fx).await;
    ctx.switch_tenant(R2).await.unwrap();

    fx.backend.insert_order(&order_create()).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let state = ctx.snapshot().await;
    assert_eq!(state.restaurant_id(), Some(R2));
    assert!(state.orders.list.is_empty());
    ctx.shutdown().await;
}

#[tokio::test]
async fn test_reconciler_drives_a_channel_subscription() {
    let fx = Fixture::new();
    fx.backend.add_order(order("o-1", R1, 1, OrderStatus::Pending));
    let ctx = admin(&fx).await;
    ctx.shutdown().await;

    let (tx, _token, subscription) = Subscription::channel(SubscriptionFilter::for_restaurant(R1));
    let reconciler = Reconciler::spawn(&ctx, subscription);
    assert_eq!(reconciler.restaurant_id(), R1);

    tx.send(ChangeEvent::update(
        ResourceTable::Orders,
        &json!({ "id": "o-1", "restaurant_id": R1, "status": "served" }),
    ))
    .await
    .unwrap();
    assert!(wait_until(&ctx, |s| s
        .orders
        .find("o-1")
        .is_some_and(|o| o.status == OrderStatus::Served))
    .await);

    reconciler.stop().await;
    assert!(tx.is_closed());
}

#[tokio::test]
async fn test_reconciler_ends_when_context_dropped() {
    let fx = Fixture::new();
    let ctx = fx.context();
    ctx.switch_tenant(R1).await.unwrap();
    ctx.shutdown().await;

    let (tx, _token, subscription) = Subscription::channel(SubscriptionFilter::for_restaurant(R1));
    let reconciler = Reconciler::spawn(&ctx, subscription);
    drop(ctx);

    tx.send(ChangeEvent::delete(
        ResourceTable::Orders,
        json!({ "id": "o-1", "restaurant_id": R1 }),
    ))
    .await
    .unwrap();

    for _ in 0..100 {
        if reconciler.is_finished() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(reconciler.is_finished());
}

#[tokio::test]
async fn test_closed_channel_reports_feed_loss() {
    let fx = Fixture::new();
    let ctx = admin(&fx).await;
    ctx.shutdown().await;
    let mut toasts = ctx.subscribe_notifications();

    let (tx, _token, subscription) = Subscription::channel(SubscriptionFilter::for_restaurant(R1));
    let reconciler = Reconciler::spawn(&ctx, subscription);
    drop(tx);

    assert!(wait_until(&ctx, |s| s.realtime_error.is_some()).await);
    let toast = toasts.recv().await.unwrap();
    assert_eq!(toast.level, NotificationLevel::Warning);
    assert_eq!(toast.category, NotificationCategory::Network);
    for _ in 0..100 {
        if reconciler.is_finished() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(reconciler.is_finished());

    // retry 重新打开订阅
    ctx.retry().await.unwrap();
    let state = ctx.snapshot().await;
    assert!(state.realtime_error.is_none());
    assert!(state.fatal_error.is_none());
    assert!(ctx.has_subscription().await);
    assert_eq!(fx.feed.active_subscriptions(), 1);
    ctx.shutdown().await;
}

#[tokio::test]
async fn test_retry_after_feed_loss_keeps_cart_and_catches_up() {
    let fx = Fixture::new();
    let ctx = guest(&fx).await;
    ctx.add_to_cart(&fx.item("A")).await;

    fx.feed.disconnect_all();
    assert!(wait_until(&ctx, |s| s.realtime_error.is_some()).await);
    assert!(!ctx.has_subscription().await);

    // 断线期间的订单在 retry 时补拉
    let missed = fx.backend.insert_order(&order_create()).await.unwrap();
    ctx.retry().await.unwrap();

    let state = ctx.snapshot().await;
    assert!(state.realtime_error.is_none());
    assert_eq!(state.cart.len(), 1);
    assert!(state.orders.contains(&missed.id));
    assert!(state.table.is_some());
    assert_eq!(fx.feed.active_subscriptions(), 1);

    let live = fx.backend.insert_order(&order_create()).await.unwrap();
    assert!(wait_until(&ctx, |s| s.orders.contains(&live.id)).await);
    ctx.shutdown().await;
}

#[tokio::test]
async fn test_sign_in_and_out_reopen_the_subscription() {
    let fx = Fixture::new();
    let ctx = guest(&fx).await;
    assert_eq!(fx.feed.total_subscriptions(), 1);

    ctx.sign_in(ADMIN_EMAIL, ADMIN_PASSWORD).await.unwrap();
    assert_eq!(fx.feed.total_subscriptions(), 2);
    assert_eq!(fx.feed.active_subscriptions(), 1);

    ctx.sign_out().await;
    assert_eq!(fx.feed.total_subscriptions(), 3);
    assert_eq!(fx.feed.active_subscriptions(), 1);
    assert!(ctx.has_subscription().await);
    ctx.shutdown().await;
}
