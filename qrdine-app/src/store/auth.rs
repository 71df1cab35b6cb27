//! Sign-in state

use std::sync::Arc;

use shared::message::{NotificationCategory, NotificationPayload};
use shared::models::CustomerProfile;

use super::{AppContext, AppError, AppResult, AuthState};

impl AppContext {
    /// Password sign-in followed by the profile fetch
    ///
    /// A signed-in user without a readable profile is signed out again
    /// rather than left half-authenticated.
    pub async fn sign_in(self: &Arc<Self>, email: &str, password: &str) -> AppResult<CustomerProfile> {
        let session = match self.backend.sign_in(email, password).await {
            Ok(session) => session,
            Err(e) => return Err(self.fail(e, "Sign-in failed", NotificationCategory::Session).await),
        };

        let profile = match self.backend.fetch_profile(session.user_id()).await {
            Ok(profile) => profile,
            Err(e) => {
                tracing::error!(user_id = %session.user_id(), error = %e, "Profile fetch failed, forcing sign-out");
                if let Err(sign_out) = self.backend.sign_out().await {
                    tracing::warn!(error = %sign_out, "Forced sign-out failed");
                }
                self.state.write().await.auth = AuthState::default();
                if e.is_connectivity() {
                    return Err(self.fail(e, "Sign-in failed", NotificationCategory::Session).await);
                }
                self.notify(
                    NotificationPayload::error("Signed out", "Your profile could not be loaded")
                        .with_category(NotificationCategory::Session),
                );
                return Err(AppError::ProfileUnavailable(e.to_string()));
            }
        };

        tracing::info!(user_id = %profile.id, role = %profile.role, "Signed in");
        self.state.write().await.auth = AuthState {
            session: Some(session),
            profile: Some(profile.clone()),
        };
        // 订阅按连接鉴权，换了令牌要重新加入
        self.renew_realtime().await;
        Ok(profile)
    }

    pub async fn sign_out(self: &Arc<Self>) {
        if let Err(e) = self.backend.sign_out().await {
            tracing::warn!(error = %e, "Backend sign-out failed");
        }
        self.state.write().await.auth = AuthState::default();
        self.renew_realtime().await;
        self.notify(
            NotificationPayload::info("Signed out", "See you next time")
                .with_category(NotificationCategory::Session),
        );
    }
}
