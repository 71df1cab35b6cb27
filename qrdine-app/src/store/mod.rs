//! Application State Store
//!
//! `AppContext` 是整个运行实例唯一的状态持有者：
//! - 会话 (租户 / 桌台)
//! - 购物车与最近一次下单回执
//! - 菜单、订单、服务请求
//! - 登录状态
//! - 补偿意图日志
//!
//! 所有写操作都经过这里；实时事件由 [`Reconciler`](crate::reconciler::Reconciler)
//! 回调 `apply_change` 写入，与用户操作共用同一把锁。

mod analytics;
mod auth;
mod cart;
mod error;
mod intent;
mod menu;
mod orders;
mod service;
mod types;

pub use error::{AppError, AppResult};
pub use types::{
    AppState, AuthState, CartItem, Compensation, DashboardStats, LandingView, OrderReceipt,
    OrdersState, PendingCompensation, TableBinding, TopItem,
};

use std::sync::Arc;

use qrdine_client::{Backend, ClientError, RealtimeSource};
use shared::message::{NotificationCategory, NotificationPayload, SubscriptionFilter};
use shared::models::{MenuSnapshot, RestaurantProfile};
use tokio::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard, broadcast};

use crate::menu_cache::MenuCache;
use crate::reconciler::Reconciler;
use crate::session::{SessionParams, SessionResolution, resolve};

/// 通知通道容量
const NOTIFICATION_CAPACITY: usize = 64;

/// 应用上下文
pub struct AppContext {
    backend: Arc<dyn Backend>,
    realtime: Arc<dyn RealtimeSource>,
    cache: MenuCache,
    state: RwLock<AppState>,
    notifications: broadcast::Sender<NotificationPayload>,
    /// 当前餐厅的实时订阅 (至多一个)
    reconciler: Mutex<Option<Reconciler>>,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl AppContext {
    pub fn new(
        backend: Arc<dyn Backend>,
        realtime: Arc<dyn RealtimeSource>,
        cache: MenuCache,
    ) -> Arc<Self> {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Arc::new(Self {
            backend,
            realtime,
            cache,
            state: RwLock::new(AppState::default()),
            notifications,
            reconciler: Mutex::new(None),
        })
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Read access to the live state
    pub async fn read(&self) -> RwLockReadGuard<'_, AppState> {
        self.state.read().await
    }

    pub(crate) async fn state_mut(&self) -> RwLockWriteGuard<'_, AppState> {
        self.state.write().await
    }

    /// Owned copy of the current state
    pub async fn snapshot(&self) -> AppState {
        self.state.read().await.clone()
    }

    /// 订阅通知 (toast)
    pub fn subscribe_notifications(&self) -> broadcast::Receiver<NotificationPayload> {
        self.notifications.subscribe()
    }

    pub(crate) fn notify(&self, payload: NotificationPayload) {
        if payload.is_error() {
            tracing::warn!(title = %payload.title, message = %payload.message, "Notify");
        } else {
            tracing::debug!(title = %payload.title, message = %payload.message, "Notify");
        }
        // 没有订阅者时忽略
        let _ = self.notifications.send(payload);
    }

    /// Surface a backend failure and turn it into an [`AppError`]
    ///
    /// Connectivity failures set the blocking fatal error; every other
    /// failure becomes an error toast.
    pub(crate) async fn fail(
        &self,
        err: ClientError,
        title: &str,
        category: NotificationCategory,
    ) -> AppError {
        if err.is_connectivity() {
            let message = err.to_string();
            self.state.write().await.fatal_error = Some(message.clone());
            self.notify(
                NotificationPayload::error("Connection lost", message)
                    .with_category(NotificationCategory::Network),
            );
        } else {
            self.notify(NotificationPayload::error(title, err.to_string()).with_category(category));
        }
        AppError::Client(err)
    }

    pub(crate) async fn active_restaurant_id(&self) -> AppResult<String> {
        self.state
            .read()
            .await
            .restaurant_id()
            .map(str::to_string)
            .ok_or(AppError::NoTenant)
    }

    // ========== Tenant Lifecycle ==========

    /// Enter a restaurant scope
    ///
    /// On not-found the operation fails and the previous tenant stays
    /// fully intact.
    pub async fn switch_tenant(self: &Arc<Self>, restaurant_id: &str) -> AppResult<RestaurantProfile> {
        tracing::info!(restaurant_id = %restaurant_id, "Switching tenant");

        let profile = match self.backend.fetch_restaurant(restaurant_id).await {
            Ok(profile) => profile,
            Err(e) => {
                if e.is_connectivity() {
                    self.state.write().await.requested_tenant = Some(restaurant_id.to_string());
                }
                return Err(self.fail(e, "Restaurant unavailable", NotificationCategory::Session).await);
            }
        };

        // 先关闭旧订阅，再打开新订阅
        self.stop_realtime().await;

        {
            let mut state = self.state.write().await;
            let changed = state.restaurant_id() != Some(profile.id.as_str());
            state.requested_tenant = Some(profile.id.clone());
            state.restaurant = Some(profile.clone());
            state.cart.clear();
            state.last_order = None;
            state.fatal_error = None;
            if state
                .table
                .as_ref()
                .is_some_and(|t| t.restaurant_id != profile.id)
            {
                state.table = None;
            }
            if changed {
                state.menu = MenuSnapshot::default();
                state.menu_from_cache = false;
                state.orders = OrdersState::default();
                state.service_requests.clear();
            }
        }

        self.load_cached_menu(&profile.id).await;
        tolerate(&profile.id, self.refresh_menu().await)?;
        tolerate(&profile.id, self.load_orders(0).await)?;
        tolerate(&profile.id, self.refresh_service_requests().await)?;
        self.start_realtime(&profile.id).await;

        tracing::info!(restaurant_id = %profile.id, name = %profile.name, "Tenant ready");
        Ok(profile)
    }

    /// Bind the guest session to a table
    ///
    /// The binding survives a reload of the same restaurant and is dropped
    /// when another restaurant is entered.
    pub async fn bind_table(&self, restaurant_id: &str, table_id: &str, table_number: Option<String>) {
        self.state.write().await.table = Some(TableBinding {
            restaurant_id: restaurant_id.to_string(),
            table_id: table_id.to_string(),
            table_number,
        });
    }

    /// Clear the blocking error and reload the requested tenant
    ///
    /// When only the change feed was lost, the tenant is kept (cart
    /// included): its data is re-fetched and the feed re-opened.
    pub async fn retry(self: &Arc<Self>) -> AppResult<Option<RestaurantProfile>> {
        let (tenant, feed_only) = {
            let mut state = self.state.write().await;
            let feed_only = state.fatal_error.is_none()
                && state.realtime_error.is_some()
                && state.restaurant_id().is_some()
                && state.restaurant_id() == state.requested_tenant.as_deref();
            state.fatal_error = None;
            (state.requested_tenant.clone(), feed_only)
        };
        match tenant {
            Some(id) if feed_only => self.resume_feed(&id).await.map(Some),
            Some(id) => self.switch_tenant(&id).await.map(Some),
            None => Ok(None),
        }
    }

    /// Catch up on what a dropped feed missed, then re-open it
    async fn resume_feed(self: &Arc<Self>, restaurant_id: &str) -> AppResult<RestaurantProfile> {
        tracing::info!(restaurant_id = %restaurant_id, "Resuming live updates");
        self.stop_realtime().await;
        tolerate(restaurant_id, self.refresh_menu().await)?;
        tolerate(restaurant_id, self.load_orders(0).await)?;
        tolerate(restaurant_id, self.refresh_service_requests().await)?;
        self.start_realtime(restaurant_id).await;
        self.state
            .read()
            .await
            .restaurant
            .clone()
            .ok_or(AppError::NoTenant)
    }

    /// Re-open the active restaurant's feed (after the credentials changed)
    pub(crate) async fn renew_realtime(self: &Arc<Self>) {
        let Some(restaurant_id) = self.state.read().await.restaurant_id().map(str::to_string) else {
            return;
        };
        self.stop_realtime().await;
        self.start_realtime(&restaurant_id).await;
    }

    /// Called by the reconciler when its source closed on its own
    pub(crate) async fn on_feed_lost(&self, restaurant_id: &str) {
        {
            let mut state = self.state.write().await;
            if state.restaurant_id() != Some(restaurant_id) {
                return;
            }
            state.realtime_error = Some("Live updates interrupted".to_string());
        }
        tracing::warn!(restaurant_id = %restaurant_id, "Change feed lost");
        self.notify(
            NotificationPayload::warning("Live updates interrupted", "Retry to reconnect")
                .with_category(NotificationCategory::Network),
        );
    }

    /// Tear down the realtime subscription
    pub async fn shutdown(&self) {
        self.stop_realtime().await;
        tracing::info!("AppContext shut down");
    }

    /// Whether a realtime subscription is currently running
    pub async fn has_subscription(&self) -> bool {
        self.reconciler
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| !r.is_finished())
    }

    async fn stop_realtime(&self) {
        let previous = self.reconciler.lock().await.take();
        if let Some(reconciler) = previous {
            tracing::debug!(restaurant_id = %reconciler.restaurant_id(), "Closing realtime subscription");
            reconciler.stop().await;
        }
    }

    async fn start_realtime(self: &Arc<Self>, restaurant_id: &str) {
        let filter = SubscriptionFilter::for_restaurant(restaurant_id);
        match self.realtime.subscribe(filter).await {
            Ok(subscription) => {
                let reconciler = Reconciler::spawn(self, subscription);
                *self.reconciler.lock().await = Some(reconciler);
                self.state.write().await.realtime_error = None;
            }
            Err(e) => {
                tracing::warn!(restaurant_id = %restaurant_id, error = %e, "Realtime subscription failed");
                self.state.write().await.realtime_error = Some(e.to_string());
                self.notify(
                    NotificationPayload::warning("Live updates unavailable", e.to_string())
                        .with_category(NotificationCategory::Network),
                );
            }
        }
    }

    // ========== Landing ==========

    /// Decide the top-level view for a location
    pub async fn landing_view(&self, params: &SessionParams) -> LandingView {
        let state = self.state.read().await;
        if let Some(message) = &state.fatal_error {
            return LandingView::ConnectionError {
                message: message.clone(),
            };
        }

        match resolve(params) {
            SessionResolution::Guest {
                restaurant_id,
                table_id,
                table_number,
            } => LandingView::CustomerMenu {
                restaurant_id,
                table_id,
                table_number,
            },
            SessionResolution::Incomplete { reason, .. } => LandingView::RescanQr { reason },
            SessionResolution::NoSession => match state
                .auth
                .profile
                .as_ref()
                .and_then(|p| p.managed_restaurant())
            {
                Some(restaurant_id) => LandingView::AdminDashboard {
                    restaurant_id: restaurant_id.to_string(),
                },
                None => LandingView::SignIn,
            },
        }
    }

    /// Decide the view and load whatever it needs
    pub async fn open(self: &Arc<Self>, params: &SessionParams) -> AppResult<LandingView> {
        let view = self.landing_view(params).await;
        let loaded = match &view {
            LandingView::CustomerMenu {
                restaurant_id,
                table_id,
                table_number,
            } => {
                let result = self.switch_tenant(restaurant_id).await;
                if result.is_ok() && !self.table_belongs(restaurant_id, table_id).await {
                    tracing::warn!(restaurant_id = %restaurant_id, table_id = %table_id, "Scanned table not found");
                    return Ok(LandingView::RescanQr {
                        reason: "This table is no longer available, please rescan the QR code"
                            .to_string(),
                    });
                }
                // 连接失败时也绑定，retry 后无需重新扫码
                if result.is_ok() || result.as_ref().is_err_and(AppError::is_connectivity) {
                    self.bind_table(restaurant_id, table_id, table_number.clone())
                        .await;
                }
                result.map(|_| ())
            }
            LandingView::AdminDashboard { restaurant_id } => {
                self.switch_tenant(restaurant_id).await.map(|_| ())
            }
            _ => Ok(()),
        };

        match loaded {
            Ok(()) => Ok(view),
            Err(e) if e.is_connectivity() => Ok(self.landing_view(params).await),
            Err(e) => Err(e),
        }
    }
}

/// 只有连接失败中断租户加载；其他失败已提示，保留已有内容继续
fn tolerate(restaurant_id: &str, result: AppResult<()>) -> AppResult<()> {
    match result {
        Err(e) if e.is_connectivity() => Err(e),
        Err(e) => {
            tracing::warn!(restaurant_id = %restaurant_id, error = %e, "Partial tenant load");
            Ok(())
        }
        Ok(()) => Ok(()),
    }
}
