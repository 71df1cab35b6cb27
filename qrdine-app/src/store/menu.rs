//! Menu operations and the display cache

use shared::message::{NotificationCategory, NotificationPayload};
use shared::models::{MenuItem, MenuItemCreate, MenuItemUpdate, MenuSnapshot};

use super::{AppContext, AppError, AppResult, Compensation};

impl AppContext {
    /// Show the cached snapshot, if any, until the network answers
    pub(crate) async fn load_cached_menu(&self, restaurant_id: &str) {
        match self.cache.load(restaurant_id) {
            Ok(Some(snapshot)) => {
                tracing::debug!(restaurant_id = %restaurant_id, items = snapshot.items.len(), "Menu served from cache");
                let mut state = self.state.write().await;
                if state.restaurant_id() == Some(restaurant_id) {
                    state.menu = snapshot;
                    state.menu_from_cache = true;
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(restaurant_id = %restaurant_id, error = %e, "Menu cache unreadable"),
        }
    }

    /// Replace the in-memory menu and mirror it into the cache
    async fn store_menu(&self, restaurant_id: &str, items: Vec<MenuItem>) {
        let snapshot = MenuSnapshot::from_items(items);
        if let Err(e) = self.cache.save(restaurant_id, &snapshot) {
            tracing::warn!(restaurant_id = %restaurant_id, error = %e, "Failed to write menu cache");
        }
        let mut state = self.state.write().await;
        if state.restaurant_id() == Some(restaurant_id) {
            state.menu = snapshot;
            state.menu_from_cache = false;
        }
    }

    /// Re-fetch the active menu from the backend
    pub async fn refresh_menu(&self) -> AppResult<()> {
        let restaurant_id = self.active_restaurant_id().await?;
        match self.backend.fetch_menu(&restaurant_id).await {
            Ok(items) => {
                tracing::debug!(restaurant_id = %restaurant_id, items = items.len(), "Menu fetched");
                self.store_menu(&restaurant_id, items).await;
                Ok(())
            }
            Err(e) => Err(self.fail(e, "Menu unavailable", NotificationCategory::Menu).await),
        }
    }

    async fn current_items(&self) -> Vec<MenuItem> {
        self.state.read().await.menu.items.clone()
    }

    pub async fn add_menu_item(&self, mut item: MenuItemCreate) -> AppResult<MenuItem> {
        let restaurant_id = self.active_restaurant_id().await?;
        item.restaurant_id = restaurant_id.clone();

        let created = match self.backend.insert_menu_items(std::slice::from_ref(&item)).await {
            Ok(mut rows) if !rows.is_empty() => rows.remove(0),
            Ok(_) => {
                return Err(AppError::Client(qrdine_client::ClientError::InvalidResponse(
                    "insert returned no rows".into(),
                )));
            }
            Err(e) => return Err(self.fail(e, "Could not add item", NotificationCategory::Menu).await),
        };

        let mut items = self.current_items().await;
        items.retain(|i| i.id != created.id);
        items.push(created.clone());
        self.store_menu(&restaurant_id, items).await;

        self.notify(
            NotificationPayload::success("Menu updated", format!("Added {}", created.name))
                .with_category(NotificationCategory::Menu),
        );
        Ok(created)
    }

    pub async fn update_menu_item(&self, id: &str, update: &MenuItemUpdate) -> AppResult<MenuItem> {
        let restaurant_id = self.active_restaurant_id().await?;
        let updated = match self.backend.update_menu_item(id, update).await {
            Ok(item) => item,
            Err(e) => return Err(self.fail(e, "Could not update item", NotificationCategory::Menu).await),
        };

        let mut items = self.current_items().await;
        match items.iter_mut().find(|i| i.id == updated.id) {
            Some(existing) => *existing = updated.clone(),
            None => items.push(updated.clone()),
        }
        self.store_menu(&restaurant_id, items).await;
        Ok(updated)
    }

    /// Soft delete: the row stays, marked with `deleted_at`
    pub async fn delete_menu_item(&self, id: &str) -> AppResult<()> {
        let restaurant_id = self.active_restaurant_id().await?;
        if let Err(e) = self.backend.soft_delete_menu_item(id).await {
            return Err(self.fail(e, "Could not delete item", NotificationCategory::Menu).await);
        }

        let mut items = self.current_items().await;
        items.retain(|i| i.id != id);
        self.store_menu(&restaurant_id, items).await;
        Ok(())
    }

    /// Replace the whole menu of the active restaurant
    ///
    /// Delete then insert. If the insert fails, the pre-delete menu is
    /// re-inserted; a failed restore goes to the intent log.
    pub async fn replace_menu(&self, items: Vec<MenuItemCreate>) -> AppResult<Vec<MenuItem>> {
        let restaurant_id = self.active_restaurant_id().await?;

        let previous = match self.backend.fetch_menu(&restaurant_id).await {
            Ok(previous) => previous,
            Err(e) => return Err(self.fail(e, "Menu replace failed", NotificationCategory::Menu).await),
        };
        if let Err(e) = self.backend.delete_menu(&restaurant_id).await {
            return Err(self.fail(e, "Menu replace failed", NotificationCategory::Menu).await);
        }

        let items: Vec<MenuItemCreate> = items
            .into_iter()
            .map(|mut item| {
                item.restaurant_id = restaurant_id.clone();
                item
            })
            .collect();

        match self.backend.insert_menu_items(&items).await {
            Ok(created) => {
                tracing::info!(restaurant_id = %restaurant_id, items = created.len(), "Menu replaced");
                self.store_menu(&restaurant_id, created.clone()).await;
                self.notify(
                    NotificationPayload::success("Menu replaced", format!("{} items", created.len()))
                        .with_category(NotificationCategory::Menu),
                );
                Ok(created)
            }
            Err(e) => {
                tracing::error!(restaurant_id = %restaurant_id, error = %e, "Menu insert failed, restoring previous menu");
                let restore = Compensation::RestoreMenu {
                    restaurant_id: restaurant_id.clone(),
                    items: previous.iter().map(MenuItemCreate::from_item).collect(),
                };
                if self.compensate(restore).await {
                    // 按原 id 写回，重新拉取以同步服务端字段
                    if let Err(refresh) = self.refresh_menu().await {
                        tracing::warn!(error = %refresh, "Menu refresh after restore failed");
                    }
                } else {
                    self.store_menu(&restaurant_id, Vec::new()).await;
                }
                let err = self.fail(e, "Menu replace failed", NotificationCategory::Menu).await;
                Err(AppError::PartialFailure(format!(
                    "menu of {restaurant_id} deleted, insert failed: {err}"
                )))
            }
        }
    }
}
