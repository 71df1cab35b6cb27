//! Service requests, tables and the restaurant profile

use shared::message::{NotificationCategory, NotificationPayload};
use shared::models::{
    DiningTable, RequestStatus, RequestType, RestaurantProfile, RestaurantUpdate, ServiceRequest,
    ServiceRequestCreate,
};

use super::{AppContext, AppResult};

impl AppContext {
    /// Re-fetch pending service requests of the active restaurant
    pub async fn refresh_service_requests(&self) -> AppResult<()> {
        let restaurant_id = self.active_restaurant_id().await?;
        match self.backend.fetch_service_requests(&restaurant_id).await {
            Ok(requests) => {
                let mut state = self.state.write().await;
                if state.restaurant_id() == Some(restaurant_id.as_str()) {
                    state.service_requests = requests;
                }
                Ok(())
            }
            Err(e) => Err(self.fail(e, "Requests unavailable", NotificationCategory::Service).await),
        }
    }

    /// Raise a request from the bound table; `Ok(None)` without a table
    pub async fn request_service(
        &self,
        request_type: RequestType,
        note: Option<String>,
    ) -> AppResult<Option<ServiceRequest>> {
        let (restaurant_id, table) = {
            let state = self.state.read().await;
            match (state.restaurant_id(), &state.table) {
                (Some(rid), Some(table)) => (rid.to_string(), table.clone()),
                _ => return Ok(None),
            }
        };

        let request = ServiceRequestCreate {
            restaurant_id,
            table_id: table.table_id,
            table_number: table.table_number,
            request_type,
            status: RequestStatus::Pending,
            note: note.filter(|n| !n.trim().is_empty()),
        };
        match self.backend.insert_service_request(&request).await {
            Ok(created) => {
                tracing::info!(request_id = %created.id, kind = %request_type, "Service requested");
                let message = match request_type {
                    RequestType::CallWaiter => "A waiter is on the way",
                    RequestType::RequestBill => "Your bill is being prepared",
                    RequestType::Other => "Staff have been notified",
                };
                self.notify(
                    NotificationPayload::success("Request sent", message)
                        .with_category(NotificationCategory::Service),
                );
                Ok(Some(created))
            }
            Err(e) => Err(self.fail(e, "Request failed", NotificationCategory::Service).await),
        }
    }

    /// Mark a request handled (staff)
    pub async fn complete_service_request(&self, id: &str) -> AppResult<()> {
        if let Err(e) = self.backend.complete_service_request(id).await {
            return Err(self.fail(e, "Could not complete request", NotificationCategory::Service).await);
        }
        self.state
            .write()
            .await
            .service_requests
            .retain(|r| r.id != id);
        Ok(())
    }

    /// Look up a table by display number, creating it if missing (staff)
    ///
    /// A permission-denied answer resolves to `Ok(None)` instead of an
    /// error, as does calling it without an active restaurant.
    pub async fn ensure_table(&self, table_number: i32) -> AppResult<Option<DiningTable>> {
        let Some(restaurant_id) = self.state.read().await.restaurant_id().map(str::to_string) else {
            return Ok(None);
        };

        match self.backend.find_table(&restaurant_id, table_number).await {
            Ok(Some(table)) => return Ok(Some(table)),
            Ok(None) => {}
            Err(e) if e.is_permission_denied() => return Ok(None),
            Err(e) => return Err(self.fail(e, "Table lookup failed", NotificationCategory::Session).await),
        }

        match self.backend.create_table(&restaurant_id, table_number).await {
            Ok(table) => {
                tracing::info!(table_id = %table.id, table_number, "Table created");
                Ok(Some(table))
            }
            Err(e) if e.is_permission_denied() => {
                tracing::debug!(table_number, "Table creation not permitted");
                Ok(None)
            }
            Err(e) => Err(self.fail(e, "Table creation failed", NotificationCategory::Session).await),
        }
    }

    pub async fn list_tables(&self) -> AppResult<Vec<DiningTable>> {
        let restaurant_id = self.active_restaurant_id().await?;
        match self.backend.list_tables(&restaurant_id).await {
            Ok(tables) => Ok(tables),
            Err(e) => Err(self.fail(e, "Tables unavailable", NotificationCategory::Session).await),
        }
    }

    /// Whether a scanned table still exists in the restaurant
    ///
    /// Only a definite answer rejects the table: lookup failures are
    /// logged and treated as valid.
    pub(crate) async fn table_belongs(&self, restaurant_id: &str, table_id: &str) -> bool {
        match self.backend.fetch_table(table_id).await {
            Ok(table) => table.restaurant_id == restaurant_id,
            Err(e) if e.is_not_found() => false,
            Err(e) => {
                tracing::warn!(table_id = %table_id, error = %e, "Table check failed, keeping binding");
                true
            }
        }
    }

    /// Edit the active restaurant's profile (staff)
    pub async fn update_restaurant_profile(
        &self,
        update: &RestaurantUpdate,
    ) -> AppResult<RestaurantProfile> {
        let restaurant_id = self.active_restaurant_id().await?;
        let profile = match self.backend.update_restaurant(&restaurant_id, update).await {
            Ok(profile) => profile,
            Err(e) => {
                return Err(self.fail(e, "Could not update restaurant", NotificationCategory::Session).await);
            }
        };

        tracing::info!(restaurant_id = %profile.id, name = %profile.name, "Restaurant profile updated");
        {
            let mut state = self.state.write().await;
            if state.restaurant_id() == Some(profile.id.as_str()) {
                state.restaurant = Some(profile.clone());
            }
        }
        self.notify(
            NotificationPayload::success("Restaurant updated", profile.name.clone())
                .with_category(NotificationCategory::Session),
        );
        Ok(profile)
    }
}
